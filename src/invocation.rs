//! One invocation: request in, aggregate counts out.
//!
//! The order of checks is fixed. Missing VAPID configuration is reported
//! before the request is even parsed; a bad request is reported before the
//! store is read. After that every failure lands in a per-subscription
//! outcome and the response only carries `sent`/`total`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::crypto::ece::MAX_PLAINTEXT_LEN;
use crate::crypto::CryptoProvider;
use crate::error::InvocationError;
use crate::notifications::delivery::{BatchReport, Dispatcher};
use crate::notifications::payload::NotificationPayload;
use crate::notifications::push::{RestSubscriptionStore, SubscriptionStore, Target};
use crate::notifications::vapid::VapidSigner;

/// Invocation body: `{"user_id": "<uuid>" | "all", "payload": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Recipient user, or `"all"`.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Notification content.
    #[serde(default)]
    pub payload: Option<NotificationPayload>,
}

impl InvocationRequest {
    /// Request for `user_id` with `payload`.
    pub fn new(user_id: impl Into<String>, payload: NotificationPayload) -> Self {
        Self {
            user_id: Some(user_id.into()),
            payload: Some(payload),
        }
    }

    /// Parse a raw JSON body.
    pub fn from_slice(body: &[u8]) -> Result<Self, InvocationError> {
        serde_json::from_slice(body)
            .map_err(|e| InvocationError::Input(format!("request body is not valid JSON: {e}")))
    }

    fn into_parts(self) -> Result<(Target, NotificationPayload), InvocationError> {
        let user_id = self
            .user_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| InvocationError::Input("missing user_id".to_string()))?;
        let payload = self
            .payload
            .ok_or_else(|| InvocationError::Input("missing payload".to_string()))?;
        Ok((Target::from_user_id(&user_id), payload))
    }
}

/// Success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvocationResponse {
    /// At least one subscription was attempted.
    Delivered {
        /// Always `true`; partial delivery is still success.
        success: bool,
        /// Subscriptions the push service accepted.
        sent: usize,
        /// Subscriptions attempted.
        total: usize,
    },
    /// The target matched nothing.
    NoSubscriptions {
        /// `"No subscriptions found"`.
        message: String,
        /// Always zero.
        sent: usize,
    },
}

impl From<&BatchReport> for InvocationResponse {
    fn from(report: &BatchReport) -> Self {
        if report.total == 0 {
            Self::NoSubscriptions {
                message: "No subscriptions found".to_string(),
                sent: 0,
            }
        } else {
            Self::Delivered {
                success: true,
                sent: report.sent,
                total: report.total,
            }
        }
    }
}

/// Failure body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human readable reason.
    pub error: String,
}

impl From<&InvocationError> for ErrorResponse {
    fn from(err: &InvocationError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

/// Runs invocations against one store with one configuration.
///
/// Holds no state between invocations beyond its collaborators; all key
/// material except the VAPID keypair is created per delivery.
pub struct Invoker {
    config: Config,
    store: Arc<dyn SubscriptionStore>,
    crypto: Arc<dyn CryptoProvider>,
    client: reqwest::Client,
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Invoker {
    /// Invoker over explicit collaborators.
    pub fn new(
        config: Config,
        store: Arc<dyn SubscriptionStore>,
        crypto: Arc<dyn CryptoProvider>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            store,
            crypto,
            client,
        }
    }

    /// Invoker backed by the configured REST store.
    pub fn from_config(
        config: Config,
        crypto: Arc<dyn CryptoProvider>,
    ) -> Result<Self, InvocationError> {
        let (Some(url), Some(key)) = (&config.store_url, &config.store_key) else {
            return Err(InvocationError::Config(
                "SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY must be set".to_string(),
            ));
        };

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| InvocationError::Config(format!("HTTP client: {e}")))?;
        let store = RestSubscriptionStore::new(
            client.clone(),
            url.clone(),
            key.clone(),
            config.subscriptions_table.clone(),
        );

        Ok(Self::new(config, Arc::new(store), crypto, client))
    }

    /// Handle a raw request body.
    pub async fn invoke_raw(&self, body: &[u8]) -> Result<InvocationResponse, InvocationError> {
        self.ensure_configured()?;
        let request = InvocationRequest::from_slice(body)?;
        let report = self.invoke(request).await?;
        Ok(InvocationResponse::from(&report))
    }

    /// Handle a parsed request, returning per-subscription detail.
    pub async fn invoke(&self, request: InvocationRequest) -> Result<BatchReport, InvocationError> {
        let keys = self.config.vapid_keys()?;
        let (target, payload) = request.into_parts()?;

        let plaintext = serialize_payload(&payload)?;

        let signer = keys.map(|keys| {
            VapidSigner::new(
                keys,
                self.config.vapid_subject.clone(),
                Arc::clone(&self.crypto),
            )
        });
        if let Err(e) = &signer {
            log::error!("[WebPush] Configured VAPID keys are unusable: {}", e);
        }

        let dispatcher = Dispatcher::new(
            self.client.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.crypto),
            signer,
            self.config.delivery_options(),
        );
        dispatcher.dispatch(&target, &plaintext).await
    }

    fn ensure_configured(&self) -> Result<(), InvocationError> {
        self.config.vapid_keys().map(|_| ())
    }
}

/// Canonical JSON for `payload`, rejected when it cannot fit one record.
fn serialize_payload(payload: &NotificationPayload) -> Result<Vec<u8>, InvocationError> {
    let plaintext = payload
        .to_json()
        .map_err(|e| InvocationError::Input(format!("payload is not serializable: {e}")))?;
    if plaintext.len() > MAX_PLAINTEXT_LEN {
        return Err(InvocationError::Input(format!(
            "payload of {} bytes exceeds the {MAX_PLAINTEXT_LEN} byte limit",
            plaintext.len()
        )));
    }
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shapes() {
        let empty = InvocationResponse::from(&BatchReport::default());
        assert_eq!(
            serde_json::to_value(&empty).unwrap(),
            serde_json::json!({"message": "No subscriptions found", "sent": 0})
        );

        let report = BatchReport {
            sent: 1,
            total: 2,
            outcomes: Vec::new(),
        };
        assert_eq!(
            serde_json::to_value(InvocationResponse::from(&report)).unwrap(),
            serde_json::json!({"success": true, "sent": 1, "total": 2})
        );
    }

    #[test]
    fn test_request_requires_user_id_and_payload() {
        let request = InvocationRequest::from_slice(br#"{"payload":{"title":"t","body":"b"}}"#)
            .unwrap();
        assert!(matches!(request.into_parts(), Err(InvocationError::Input(_))));

        let request = InvocationRequest::from_slice(br#"{"user_id":"all"}"#).unwrap();
        assert!(matches!(request.into_parts(), Err(InvocationError::Input(_))));

        let request = InvocationRequest::from_slice(
            br#"{"user_id":"","payload":{"title":"t","body":"b"}}"#,
        )
        .unwrap();
        assert!(matches!(request.into_parts(), Err(InvocationError::Input(_))));
    }

    #[test]
    fn test_request_selects_target() {
        let (target, payload) = InvocationRequest::new("all", NotificationPayload::new("t", "b"))
            .into_parts()
            .unwrap();
        assert_eq!(target, Target::All);
        assert_eq!(payload.url, "/");
    }

    #[test]
    fn test_serialize_payload_checks_record_limit() {
        let payload = NotificationPayload::new("t", "b");
        assert_eq!(serialize_payload(&payload).unwrap(), payload.to_json().unwrap());

        let oversized = NotificationPayload::new("t", "x".repeat(MAX_PLAINTEXT_LEN));
        assert!(matches!(
            serialize_payload(&oversized),
            Err(InvocationError::Input(_))
        ));
    }

    #[test]
    fn test_invoke_future_is_send() {
        fn assert_send<T: Send>(_: T) {}

        let invoker = Invoker::new(
            Config::default(),
            Arc::new(crate::notifications::push::InMemorySubscriptionStore::default()),
            Arc::new(crate::crypto::SystemCrypto),
            reqwest::Client::new(),
        );
        assert_send(invoker.invoke_raw(b"{}"));
    }

    #[test]
    fn test_malformed_json_is_input_error() {
        let err = InvocationRequest::from_slice(b"{not json").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_from_config_requires_store_credentials() {
        let err = Invoker::from_config(Config::default(), Arc::new(crate::crypto::SystemCrypto))
            .unwrap_err();
        assert!(matches!(err, InvocationError::Config(_)));
    }
}
