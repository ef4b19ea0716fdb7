use course_portal::config::{AppConfig, Env};
use serial_test::serial;
use std::time::Duration;

// Process environment is shared; these tests mutate it and must not interleave.

fn set(key: &str, value: &str) {
    unsafe { std::env::set_var(key, value) }
}

fn unset(key: &str) {
    unsafe { std::env::remove_var(key) }
}

#[test]
#[serial]
fn loads_the_full_environment() {
    set("DATABASE_URL", "postgres://app:app@db:5432/portal");
    set("BILLING_URL", "http://billing.study-on.local");
    set("BILLING_TIMEOUT_SECS", "2");
    set("APP_ENV", "production");

    let config = AppConfig::load();
    assert_eq!(config.db_url, "postgres://app:app@db:5432/portal");
    assert_eq!(config.billing_url, "http://billing.study-on.local");
    assert_eq!(config.billing_timeout, Duration::from_secs(2));
    assert_eq!(config.env, Env::Production);

    unset("BILLING_TIMEOUT_SECS");
    unset("APP_ENV");
}

#[test]
#[serial]
fn falls_back_to_local_defaults() {
    set("DATABASE_URL", "postgres://app:app@db:5432/portal");
    set("BILLING_URL", "http://billing.study-on.local");
    unset("BILLING_TIMEOUT_SECS");
    unset("APP_ENV");

    let config = AppConfig::load();
    assert_eq!(config.env, Env::Local);
    assert_eq!(config.billing_timeout, Duration::from_secs(5));
}

#[test]
#[serial]
fn garbage_timeout_falls_back_to_the_default() {
    set("DATABASE_URL", "postgres://app:app@db:5432/portal");
    set("BILLING_URL", "http://billing.study-on.local");
    set("BILLING_TIMEOUT_SECS", "not-a-number");

    let config = AppConfig::load();
    assert_eq!(config.billing_timeout, Duration::from_secs(5));

    unset("BILLING_TIMEOUT_SECS");
}
