//! Tests for configuration loading.

use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use storedesk::config::{DeskConfig, BASE_URL_ENV};
use storedesk::error::DeskError;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

struct EnvGuard {
    saved: Option<String>,
}

impl EnvGuard {
    fn capture() -> Self {
        Self {
            saved: std::env::var(BASE_URL_ENV).ok(),
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.saved {
            Some(v) => std::env::set_var(BASE_URL_ENV, v),
            None => std::env::remove_var(BASE_URL_ENV),
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[test]
fn from_env_reads_base_url_and_applies_defaults() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture();
    std::env::set_var(BASE_URL_ENV, "https://api.shop.test/admin");

    let config = DeskConfig::from_env().unwrap();

    assert_eq!(config.base_url, "https://api.shop.test/admin");
    assert_eq!(config.request_timeout, Duration::from_secs(30));
    assert_eq!(config.refresh_path, "/auth/refresh");
    assert_eq!(config.keep_unused_for, Duration::from_secs(60));
    assert_eq!(
        config.url_for("/orders/A"),
        "https://api.shop.test/admin/orders/A"
    );
}

#[test]
fn from_env_rejects_missing_or_invalid_url() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture();

    std::env::remove_var(BASE_URL_ENV);
    assert!(matches!(
        DeskConfig::from_env(),
        Err(DeskError::Configuration(message)) if message.contains(BASE_URL_ENV)
    ));

    std::env::set_var(BASE_URL_ENV, "ftp://api.shop.test");
    assert!(matches!(
        DeskConfig::from_env(),
        Err(DeskError::Configuration(_))
    ));
}

#[test]
fn builder_overrides_defaults() {
    let config = DeskConfig::builder()
        .base_url("http://localhost:4000/")
        .refresh_path("/v2/auth/refresh")
        .keep_unused_for(Duration::ZERO)
        .build();

    config.validate().unwrap();
    assert_eq!(config.url_for("/v2/auth/refresh"), "http://localhost:4000/v2/auth/refresh");
    assert_eq!(config.keep_unused_for, Duration::ZERO);
}

#[test]
fn zero_timeout_is_rejected() {
    let config = DeskConfig::builder()
        .base_url("http://localhost:4000")
        .request_timeout(Duration::ZERO)
        .build();

    assert!(matches!(config.validate(), Err(DeskError::Configuration(_))));
}
