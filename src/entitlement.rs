use crate::auth::AuthUser;
use crate::billing::{BillingError, BillingService};
use crate::models::{BillingInfo, Course, CourseRow, CourseType, TransactionFilter};
use std::collections::HashMap;

/// AccessDecision
///
/// Outcome of the entitlement check for one (course, requester) pair. The decision is
/// evaluated fresh on every request — nothing is cached or persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// The requester may view the course and its lessons.
    Granted,
    /// The course is paid and the requester is anonymous. This is a re-entry path
    /// (redirect to authentication), not a terminal failure.
    LoginRequired,
    /// The course is paid, the requester is authenticated, holds no active payment
    /// for it, and is not an administrator. Maps to 406, distinct from 404 and 403.
    NotAvailable,
}

/// resolve_course_access
///
/// The access-control decision procedure reconciling the local catalog with the
/// billing service:
///
/// 1. No billing counterpart, or type `free` → granted to everyone. A course the
///    billing service does not know about is always free (fail-open; billing is the
///    source of truth only for courses it knows).
/// 2. Paid and anonymous → login required.
/// 3. Any active payment transaction for the code → granted.
/// 4. ROLE_SUPER_ADMIN → granted (administrative override, bypasses entitlement).
/// 5. Otherwise → not available.
pub async fn resolve_course_access(
    billing: &dyn BillingService,
    code: &str,
    requester: Option<&AuthUser>,
) -> Result<AccessDecision, BillingError> {
    let billing_course = billing.course_by_code(code).await?;

    let is_free = billing_course
        .map(|bc| bc.course_type == CourseType::Free)
        .unwrap_or(true);
    if is_free {
        return Ok(AccessDecision::Granted);
    }

    let Some(user) = requester else {
        return Ok(AccessDecision::LoginRequired);
    };

    let entitlements = billing
        .transactions(
            &TransactionFilter::active_payments_for(code),
            &user.api_token,
        )
        .await?;

    if !entitlements.is_empty() || user.is_super_admin() {
        return Ok(AccessDecision::Granted);
    }

    Ok(AccessDecision::NotAvailable)
}

/// build_catalog
///
/// Joins the local course list with the billing catalog by `code` and produces the
/// composite listing rows.
///
/// Anonymous requesters see only courses whose billing entry is absent or free, all
/// labelled `{type: free}`. Authenticated requesters see every local course with its
/// billing metadata (defaulting to free when billing does not know the code) and the
/// matching active payment, fetched in exactly one batched transactions call —
/// never one call per course.
///
/// Rows follow the local course iteration order.
pub async fn build_catalog(
    billing: &dyn BillingService,
    local_courses: Vec<Course>,
    requester: Option<&AuthUser>,
) -> Result<Vec<CourseRow>, BillingError> {
    let billing_courses = billing.courses(None).await?;
    // Last-write-wins; codes repeating would violate the uniqueness invariant anyway.
    let billing_by_code: HashMap<String, _> = billing_courses
        .into_iter()
        .map(|bc| (bc.code.clone(), bc))
        .collect();

    let Some(user) = requester else {
        let rows = local_courses
            .into_iter()
            .filter(|course| {
                billing_by_code
                    .get(&course.code)
                    .map(|bc| bc.course_type == CourseType::Free)
                    .unwrap_or(true)
            })
            .map(|course| CourseRow {
                course,
                billing_info: BillingInfo::default(),
                transaction: None,
            })
            .collect();
        return Ok(rows);
    };

    // One batched fetch for the entire listing.
    let transactions = billing
        .transactions(&TransactionFilter::active_payments(), &user.api_token)
        .await?;
    let mut tx_by_code: HashMap<String, _> = transactions
        .into_iter()
        .filter_map(|tx| tx.course_code.clone().map(|code| (code, tx)))
        .collect();

    let rows = local_courses
        .into_iter()
        .map(|course| {
            let billing_info = billing_by_code
                .get(&course.code)
                .map(BillingInfo::from)
                .unwrap_or_default();
            let transaction = tx_by_code.remove(&course.code);
            CourseRow {
                course,
                billing_info,
                transaction,
            }
        })
        .collect();

    Ok(rows)
}
