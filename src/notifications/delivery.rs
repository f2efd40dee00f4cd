//! Delivery orchestration.
//!
//! A [`Dispatcher`] takes one snapshot of the targeted subscriptions and
//! makes exactly one attempt per row:
//!
//! ```text
//! Pending -> Encrypting -> Signing -> Sending -> Delivered
//!                                             -> TransientFailure
//!                                             -> PermanentFailure (row deleted)
//! ```
//!
//! Every attempt resolves to a [`DeliveryOutcome`]; nothing a single
//! subscription does can fail the batch. Attempts run concurrently, each
//! with its own ephemeral key and salt.

// Rust guideline compliant 2026-02

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;

use super::push::{PushSubscription, SubscriptionStore, Target};
use super::vapid::{self, VapidError, VapidSigner};
use crate::crypto::{ece, CryptoProvider};
use crate::error::{InvocationError, PushError};

/// `TTL` header: how long the push service may queue the message.
pub const DEFAULT_TTL_SECS: u32 = 86_400;

/// Parallel attempts per invocation.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Upper bound on a single push service request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest push service error body kept in logs.
const MAX_LOGGED_BODY: usize = 200;

/// Tunables for one dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOptions {
    /// `TTL` header value in seconds.
    pub ttl_secs: u32,
    /// Maximum in-flight attempts. Zero is treated as one.
    pub concurrency: usize,
    /// Per-request timeout; expiry counts as a transient failure.
    pub request_timeout: Duration,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Terminal state of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Push service accepted the message (2xx).
    Delivered,
    /// Anything else; the row is kept for a later invocation.
    TransientFailure,
    /// Push service no longer knows the subscription (404/410); the row is deleted.
    PermanentFailure,
}

/// Result of one subscription's attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    /// Row id of the subscription.
    pub subscription_id: String,
    /// Terminal state.
    pub status: DeliveryStatus,
    /// Push service status, when a response arrived.
    pub http_status: Option<u16>,
    /// Failure before a response arrived.
    pub error: Option<PushError>,
}

impl DeliveryOutcome {
    fn responded(subscription_id: &str, status: DeliveryStatus, http_status: StatusCode) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            status,
            http_status: Some(http_status.as_u16()),
            error: None,
        }
    }

    fn failed(subscription_id: &str, error: PushError) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            status: DeliveryStatus::TransientFailure,
            http_status: None,
            error: Some(error),
        }
    }
}

/// Aggregate of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Attempts that ended [`DeliveryStatus::Delivered`].
    pub sent: usize,
    /// Subscriptions in the snapshot.
    pub total: usize,
    /// Per-subscription detail, in completion order.
    pub outcomes: Vec<DeliveryOutcome>,
}

impl BatchReport {
    fn from_outcomes(outcomes: Vec<DeliveryOutcome>) -> Self {
        Self {
            sent: outcomes
                .iter()
                .filter(|o| o.status == DeliveryStatus::Delivered)
                .count(),
            total: outcomes.len(),
            outcomes,
        }
    }

    /// Number of subscriptions removed as gone.
    pub fn pruned(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == DeliveryStatus::PermanentFailure)
            .count()
    }

    /// Outcome for a subscription id.
    pub fn outcome(&self, subscription_id: &str) -> Option<&DeliveryOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.subscription_id == subscription_id)
    }
}

/// `Authorization` header value per audience, or why there is none.
type Credentials = HashMap<String, Result<String, PushError>>;

/// Sends one notification to every subscription a target selects.
pub struct Dispatcher {
    client: reqwest::Client,
    store: Arc<dyn SubscriptionStore>,
    crypto: Arc<dyn CryptoProvider>,
    signer: Result<VapidSigner, VapidError>,
    options: DeliveryOptions,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("signer", &self.signer)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher.
    ///
    /// `signer` is the outcome of loading the configured VAPID keys. When it
    /// is an error every attempt fails with [`PushError::Signing`] and the
    /// batch still completes.
    pub fn new(
        client: reqwest::Client,
        store: Arc<dyn SubscriptionStore>,
        crypto: Arc<dyn CryptoProvider>,
        signer: Result<VapidSigner, VapidError>,
        options: DeliveryOptions,
    ) -> Self {
        Self {
            client,
            store,
            crypto,
            signer,
            options,
        }
    }

    /// Deliver `plaintext` (the serialized notification) to every
    /// subscription `target` selects.
    ///
    /// Only a failure to load the subscriptions is returned as an error.
    /// With no matching rows, returns an empty report without touching the
    /// crypto provider or the network.
    pub async fn dispatch(
        &self,
        target: &Target,
        plaintext: &[u8],
    ) -> Result<BatchReport, InvocationError> {
        let subscriptions = self.store.list(target).await?;
        if subscriptions.is_empty() {
            log::info!("[WebPush] No subscriptions found for {}", target);
            return Ok(BatchReport::default());
        }

        log::info!(
            "[WebPush] Sending to {} subscription(s) for {}",
            subscriptions.len(),
            target
        );
        let report = self
            .dispatch_snapshot(&subscriptions, plaintext, Utc::now())
            .await;
        log::info!(
            "[WebPush] Delivered {}/{} ({} pruned)",
            report.sent,
            report.total,
            report.pruned()
        );
        Ok(report)
    }

    async fn dispatch_snapshot(
        &self,
        subscriptions: &[PushSubscription],
        plaintext: &[u8],
        now: DateTime<Utc>,
    ) -> BatchReport {
        let credentials = self.credentials_by_origin(subscriptions, now);

        let attempts: Vec<_> = subscriptions
            .iter()
            .map(|subscription| self.deliver(subscription, plaintext, &credentials))
            .collect();
        let outcomes = stream::iter(attempts)
            .buffer_unordered(self.options.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        BatchReport::from_outcomes(outcomes)
    }

    /// One VAPID token per distinct audience in the snapshot.
    ///
    /// The token depends only on `aud`, the expiry window and our keys, so
    /// subscriptions on the same push service share it.
    fn credentials_by_origin(
        &self,
        subscriptions: &[PushSubscription],
        now: DateTime<Utc>,
    ) -> Credentials {
        let mut credentials = Credentials::new();
        for subscription in subscriptions {
            let Ok(aud) = vapid::audience(&subscription.endpoint) else {
                continue;
            };
            credentials.entry(aud).or_insert_with_key(|aud| {
                let signer = self.signer.as_ref().map_err(|e| PushError::from(e.clone()))?;
                let token = signer.sign_audience(aud.clone(), now)?;
                Ok(signer.authorization(&token))
            });
        }
        credentials
    }

    async fn deliver(
        &self,
        subscription: &PushSubscription,
        plaintext: &[u8],
        credentials: &Credentials,
    ) -> DeliveryOutcome {
        match self.attempt(subscription, plaintext, credentials).await {
            Ok(outcome) => outcome,
            Err(err) => {
                log::warn!(
                    "[WebPush] Subscription {} not delivered: {}",
                    subscription.id,
                    err
                );
                DeliveryOutcome::failed(&subscription.id, err)
            }
        }
    }

    async fn attempt(
        &self,
        subscription: &PushSubscription,
        plaintext: &[u8],
        credentials: &Credentials,
    ) -> Result<DeliveryOutcome, PushError> {
        let (public_key, auth) = subscription.decode_keys()?;
        let encrypted = ece::encrypt(self.crypto.as_ref(), &public_key, &auth, plaintext)?;

        let aud = vapid::audience(&subscription.endpoint)?;
        let authorization = match credentials.get(&aud) {
            Some(Ok(header)) => header.as_str(),
            Some(Err(err)) => return Err(err.clone()),
            None => return Err(PushError::InvalidEndpoint(aud)),
        };

        let response = self
            .client
            .post(&subscription.endpoint)
            .timeout(self.options.request_timeout)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_ENCODING, "aes128gcm")
            .header(CONTENT_LENGTH, encrypted.body.len())
            .header("TTL", self.options.ttl_secs)
            .header(AUTHORIZATION, authorization)
            .body(encrypted.body)
            .send()
            .await?;

        Ok(self.interpret(subscription, &aud, response).await)
    }

    async fn interpret(
        &self,
        subscription: &PushSubscription,
        aud: &str,
        response: reqwest::Response,
    ) -> DeliveryOutcome {
        let status = response.status();

        if status.is_success() {
            log::debug!(
                "[WebPush] Delivered to subscription {} via {}",
                subscription.id,
                aud
            );
            return DeliveryOutcome::responded(&subscription.id, DeliveryStatus::Delivered, status);
        }

        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            log::info!(
                "[WebPush] Subscription {} expired ({}), removing",
                subscription.id,
                status.as_u16()
            );
            if let Err(e) = self.store.delete(&subscription.id).await {
                log::warn!(
                    "[WebPush] Failed to remove subscription {}: {}",
                    subscription.id,
                    e
                );
            }
            return DeliveryOutcome::responded(
                &subscription.id,
                DeliveryStatus::PermanentFailure,
                status,
            );
        }

        let body = response.text().await.unwrap_or_default();
        log::warn!(
            "[WebPush] Push service {} returned {} for subscription {}: {}",
            aud,
            status.as_u16(),
            subscription.id,
            body.chars().take(MAX_LOGGED_BODY).collect::<String>()
        );
        DeliveryOutcome::responded(&subscription.id, DeliveryStatus::TransientFailure, status)
    }
}
