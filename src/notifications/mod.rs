//! Web push notification delivery.
//!
//! Turns one notification and a target selector into one encrypted
//! RFC 8030 request per stored browser subscription.
//!
//! # Architecture
//!
//! ```text
//! Invocation { user_id | "all", payload }
//!     ↓
//! SubscriptionStore snapshot (filtered by user_id)
//!     ↓
//! per subscription: aes128gcm encrypt → VAPID token for endpoint origin → POST
//!     ↓
//! 2xx delivered · 404/410 row deleted · anything else kept
//! ```
//!
//! # VAPID Keys
//!
//! The operator's P-256 keypair (RFC 8292) identifies this server to every
//! push service. Browsers subscribe with the public key as their
//! `applicationServerKey`; the private key only ever signs tokens.
//!
//! # Push Subscriptions
//!
//! Written by the browser registration flow, read and pruned here. A row is
//! removed only when its push service answers 404 or 410.

// Rust guideline compliant 2026-02

pub mod delivery;
pub mod payload;
pub mod push;
pub mod vapid;
