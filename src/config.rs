//! Runtime configuration.
//!
//! Everything comes from environment variables. VAPID keys are only checked
//! when an invocation starts, so a process can boot without them and answer
//! each request with a configuration error instead.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::InvocationError;
use crate::notifications::delivery::{
    DeliveryOptions, DEFAULT_CONCURRENCY, DEFAULT_REQUEST_TIMEOUT, DEFAULT_TTL_SECS,
};
use crate::notifications::vapid::{VapidError, VapidKeys};

/// Contact placed in the VAPID `sub` claim when none is configured.
pub const DEFAULT_SUBJECT: &str = "mailto:admin@example.com";

/// Default subscription table name.
pub const DEFAULT_TABLE: &str = "push_subscriptions";

/// Default listen address for `serve`.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Configuration for the relay.
#[derive(Clone)]
pub struct Config {
    /// Base64url VAPID public key.
    pub vapid_public_key: Option<String>,
    /// Base64url VAPID private scalar.
    pub vapid_private_key: Option<String>,
    /// Operator contact (`mailto:` or `https:` URI).
    pub vapid_subject: String,
    /// Subscription store base URL.
    pub store_url: Option<String>,
    /// Subscription store service key.
    pub store_key: Option<String>,
    /// Table holding subscription rows.
    pub subscriptions_table: String,
    /// Per-request bound on push service calls.
    pub request_timeout: Duration,
    /// Parallel deliveries per invocation.
    pub concurrency: usize,
    /// `TTL` header in seconds.
    pub ttl_secs: u32,
    /// Listen address for the HTTP front end.
    pub bind_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vapid_public_key: None,
            vapid_private_key: None,
            vapid_subject: DEFAULT_SUBJECT.to_string(),
            store_url: None,
            store_key: None,
            subscriptions_table: DEFAULT_TABLE.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            ttl_secs: DEFAULT_TTL_SECS,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("vapid_public_key", &self.vapid_public_key)
            .field("vapid_private_key", &self.vapid_private_key.as_ref().map(|_| "<redacted>"))
            .field("vapid_subject", &self.vapid_subject)
            .field("store_url", &self.store_url)
            .field("store_key", &self.store_key.as_ref().map(|_| "<redacted>"))
            .field("subscriptions_table", &self.subscriptions_table)
            .field("request_timeout", &self.request_timeout)
            .field("concurrency", &self.concurrency)
            .field("ttl_secs", &self.ttl_secs)
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}

impl Config {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from `lookup`. Blank values are treated as unset and
    /// unparseable numbers are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = var("VAPID_PUBLIC_KEY") {
            self.vapid_public_key = Some(key);
        }

        if let Some(key) = var("VAPID_PRIVATE_KEY") {
            self.vapid_private_key = Some(key);
        }

        if let Some(subject) = var("VAPID_SUBJECT") {
            self.vapid_subject = normalize_subject(&subject);
        }

        if let Some(url) = var("SUPABASE_URL") {
            self.store_url = Some(url);
        }

        if let Some(key) = var("SUPABASE_SERVICE_ROLE_KEY") {
            self.store_key = Some(key);
        }

        if let Some(table) = var("PUSH_SUBSCRIPTIONS_TABLE") {
            self.subscriptions_table = table;
        }

        if let Some(timeout) = var("PUSH_REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.trim().parse::<u64>() {
                self.request_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(concurrency) = var("PUSH_CONCURRENCY") {
            if let Ok(n) = concurrency.trim().parse::<usize>() {
                self.concurrency = n;
            }
        }

        if let Some(ttl) = var("PUSH_TTL_SECS") {
            if let Ok(secs) = ttl.trim().parse::<u32>() {
                self.ttl_secs = secs;
            }
        }

        if let Some(addr) = var("BIND_ADDR") {
            if let Ok(addr) = addr.trim().parse::<SocketAddr>() {
                self.bind_addr = addr;
            }
        }
    }

    /// Both VAPID keys are configured.
    pub fn has_vapid_keys(&self) -> bool {
        self.vapid_public_key.is_some() && self.vapid_private_key.is_some()
    }

    /// Load the VAPID keypair.
    ///
    /// The outer error is a missing key, which fails the whole invocation;
    /// the inner one is unusable key material, which fails each delivery.
    pub fn vapid_keys(&self) -> Result<Result<VapidKeys, VapidError>, InvocationError> {
        match (&self.vapid_public_key, &self.vapid_private_key) {
            (Some(public), Some(private)) => Ok(VapidKeys::from_base64url(public, private)),
            _ => Err(InvocationError::Config(
                "VAPID_PUBLIC_KEY and VAPID_PRIVATE_KEY must be set".to_string(),
            )),
        }
    }

    /// Delivery tunables.
    pub fn delivery_options(&self) -> DeliveryOptions {
        DeliveryOptions {
            ttl_secs: self.ttl_secs,
            concurrency: self.concurrency,
            request_timeout: self.request_timeout,
        }
    }
}

/// Ensure the contact is a URI: bare addresses become `mailto:`.
fn normalize_subject(subject: &str) -> String {
    let subject = subject.trim();
    if subject.starts_with("mailto:") || subject.starts_with("https:") {
        subject.to_string()
    } else {
        format!("mailto:{subject}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).cloned());
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.vapid_subject, DEFAULT_SUBJECT);
        assert_eq!(config.subscriptions_table, "push_subscriptions");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.ttl_secs, 86_400);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert!(!config.has_vapid_keys());
    }

    #[test]
    fn test_overrides() {
        let config = config_with(&[
            ("VAPID_SUBJECT", "ops@example.com"),
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("PUSH_CONCURRENCY", "2"),
            ("PUSH_TTL_SECS", "60"),
            ("PUSH_REQUEST_TIMEOUT_SECS", "3"),
            ("BIND_ADDR", "127.0.0.1:9000"),
        ]);
        assert_eq!(config.vapid_subject, "mailto:ops@example.com");
        assert_eq!(config.store_url.as_deref(), Some("https://abc.supabase.co"));
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.ttl_secs, 60);
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn test_invalid_numbers_are_ignored() {
        let config = config_with(&[("PUSH_CONCURRENCY", "lots"), ("PUSH_TTL_SECS", "-1")]);
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.ttl_secs, DEFAULT_TTL_SECS);
    }

    #[test]
    fn test_subject_keeps_uri_schemes() {
        assert_eq!(normalize_subject("https://example.com/contact"), "https://example.com/contact");
        assert_eq!(normalize_subject("mailto:a@b.c"), "mailto:a@b.c");
    }

    #[test]
    fn test_missing_vapid_keys_is_config_error() {
        let config = config_with(&[("VAPID_PUBLIC_KEY", "BAAA")]);
        let err = config.vapid_keys().unwrap_err();
        assert!(matches!(err, InvocationError::Config(_)));
        assert_eq!(err.status_code(), 500);

        // Blank counts as missing
        let config = config_with(&[("VAPID_PUBLIC_KEY", "BAAA"), ("VAPID_PRIVATE_KEY", "  ")]);
        assert!(config.vapid_keys().is_err());
    }

    #[test]
    fn test_malformed_vapid_keys_are_deferred() {
        let config = config_with(&[("VAPID_PUBLIC_KEY", "BAAA"), ("VAPID_PRIVATE_KEY", "AAAA")]);
        assert!(config.vapid_keys().unwrap().is_err());
    }

    #[test]
    fn test_valid_vapid_keys_load() {
        let keys = VapidKeys::generate().unwrap();
        let public = keys.public_key_base64url();
        let private = keys.private_key_base64url();
        let config = config_with(&[
            ("VAPID_PUBLIC_KEY", public.as_str()),
            ("VAPID_PRIVATE_KEY", private.as_str()),
        ]);
        let loaded = config.vapid_keys().unwrap().unwrap();
        assert_eq!(loaded.public_key(), keys.public_key());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = config_with(&[
            ("VAPID_PRIVATE_KEY", "c2VjcmV0"),
            ("SUPABASE_SERVICE_ROLE_KEY", "svc"),
        ]);
        let debug = format!("{config:?}");
        assert!(!debug.contains("c2VjcmV0"));
        assert!(!debug.contains("\"svc\""));
        assert!(debug.contains("<redacted>"));
    }
}
