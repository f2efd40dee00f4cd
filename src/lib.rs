//! webpush-relay - standalone Web Push delivery.
//!
//! Takes a notification and a target selector, and sends one encrypted
//! request per stored browser subscription to the browser vendor's push
//! service. The protocol is implemented directly: RFC 8291 payload
//! encryption in the RFC 8188 `aes128gcm` encoding, and RFC 8292 VAPID
//! tokens signed with ES256.
//!
//! # Architecture
//!
//! - **KeyCodec** - base64url and uncompressed P-256 points
//! - **CryptoProvider** - injected primitives, swappable in tests
//! - **Encoder** - ECDH + HKDF + AES-128-GCM into one record
//! - **Signer** - per-origin VAPID JWT
//! - **Dispatcher** - snapshot, deliver, prune
//!
//! # Modules
//!
//! - [`codec`] - base64url and EC point encoding
//! - [`crypto`] - provider trait, HKDF, `aes128gcm`
//! - [`notifications`] - subscriptions, VAPID, delivery
//! - [`invocation`] - request/response handling
//! - [`server`] - HTTP front end
//! - [`config`] - environment configuration

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod invocation;
pub mod notifications;
pub mod server;

// Re-export commonly used types
pub use config::Config;
pub use crypto::{CryptoProvider, SystemCrypto};
pub use error::{InvocationError, PushError};
pub use invocation::{InvocationRequest, InvocationResponse, Invoker};
pub use notifications::delivery::{BatchReport, DeliveryOutcome, DeliveryStatus, Dispatcher};
pub use notifications::payload::NotificationPayload;
pub use notifications::push::{PushSubscription, SubscriptionStore, Target};
pub use notifications::vapid::{VapidKeys, VapidSigner};
