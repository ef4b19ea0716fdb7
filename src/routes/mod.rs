//! Router module index.
//!
//! Organizes the application's routing logic into security-segregated modules. Access
//! control is applied explicitly at the module level (via Axum layers for
//! authentication, and in-handler role checks for the administrative module), so a
//! protected endpoint cannot be exposed by accident.

/// Routes accessible to all users. Read handlers enforce visibility through the
/// entitlement resolver rather than ahead of time, because free courses are open to
/// anonymous requesters too.
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware (a valid, unexpired
/// billing-issued bearer token).
pub mod authenticated;

/// Catalog write routes, restricted to ROLE_SUPER_ADMIN inside the handlers.
pub mod admin;
