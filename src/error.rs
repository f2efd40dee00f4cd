//! Error taxonomy for an invocation.
//!
//! Only [`InvocationError`] ever reaches the caller. [`PushError`] is
//! confined to a single subscription and ends up in its
//! [`DeliveryOutcome`](crate::notifications::delivery::DeliveryOutcome).

use thiserror::Error;

use crate::codec::DecodeError;
use crate::crypto::ece::EceError;
use crate::notifications::push::StoreError;
use crate::notifications::vapid::VapidError;

/// Failure of one subscription's delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// `p256dh` or `auth` is not valid base64url of the right length.
    #[error("subscription key material: {0}")]
    Decode(#[from] DecodeError),
    /// `p256dh` decodes but is not a P-256 point.
    #[error("subscription public key is not a valid P-256 point")]
    InvalidSubscriberKey,
    /// Payload encryption failed for another reason.
    #[error("payload encryption failed: {0}")]
    Encryption(EceError),
    /// Endpoint has no origin to scope a VAPID token to.
    #[error("invalid push endpoint: {0}")]
    InvalidEndpoint(String),
    /// VAPID token could not be produced.
    #[error("VAPID: {0}")]
    Signing(VapidError),
    /// Request to the push service failed before a response arrived.
    #[error("push service request failed: {0}")]
    Network(String),
    /// Request to the push service exceeded the per-request bound.
    #[error("push service request timed out")]
    Timeout,
}

impl From<EceError> for PushError {
    fn from(err: EceError) -> Self {
        match err {
            EceError::InvalidSubscriberKey => Self::InvalidSubscriberKey,
            other => Self::Encryption(other),
        }
    }
}

impl From<VapidError> for PushError {
    fn from(err: VapidError) -> Self {
        match err {
            VapidError::InvalidEndpoint(endpoint) => Self::InvalidEndpoint(endpoint),
            other => Self::Signing(other),
        }
    }
}

impl From<reqwest::Error> for PushError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Failure of a whole invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    /// Required configuration (VAPID keys) absent or unusable.
    #[error("configuration error: {0}")]
    Config(String),
    /// Request body missing `user_id`/`payload` or otherwise malformed.
    #[error("invalid request: {0}")]
    Input(String),
    /// Subscriptions could not be loaded.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl InvocationError {
    /// HTTP status the front end answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Input(_) => 400,
            Self::Config(_) | Self::Store(_) => 500,
        }
    }
}
