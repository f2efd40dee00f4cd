//! Push subscriptions and the stores that hold them.
//!
//! Rows are written by the browser registration flow; this crate only reads
//! them and deletes the ones a push service reports as gone.

// Rust guideline compliant 2026-02

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::codec::{self, DecodeError, UncompressedPoint};
use crate::crypto::ece::AUTH_SECRET_LEN;

/// `user_id` value that selects every stored subscription.
pub const BROADCAST: &str = "all";

/// A browser's push subscription.
///
/// Contains everything needed to send a web push message to this browser.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    /// Row id.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Push service endpoint URL.
    pub endpoint: String,
    /// Browser's P-256 ECDH public key (base64url).
    pub p256dh: String,
    /// Shared auth secret (base64url).
    pub auth: String,
}

impl PushSubscription {
    /// Decode `p256dh` and `auth` from their wire form.
    pub fn decode_keys(&self) -> Result<(UncompressedPoint, [u8; AUTH_SECRET_LEN]), DecodeError> {
        let public = UncompressedPoint::from_base64url(&self.p256dh)?;
        let auth = codec::decode_array::<AUTH_SECRET_LEN>(&self.auth)?;
        Ok((public, auth))
    }
}

/// Accept both text and integer primary keys.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Which subscriptions an invocation addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// Every stored subscription.
    All,
    /// Subscriptions owned by one user.
    User(String),
}

impl Target {
    /// Interpret a request's `user_id`, honouring the broadcast sentinel.
    pub fn from_user_id(user_id: &str) -> Self {
        if user_id == BROADCAST {
            Self::All
        } else {
            Self::User(user_id.to_string())
        }
    }

    /// Whether `subscription` falls under this target.
    pub fn matches(&self, subscription: &PushSubscription) -> bool {
        match self {
            Self::All => true,
            Self::User(id) => subscription.user_id == *id,
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "{BROADCAST}"),
            Self::User(id) => write!(f, "user {id}"),
        }
    }
}

/// Subscription store failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Request never completed.
    #[error("subscription store request failed: {0}")]
    Request(String),
    /// Store answered with a non-success status.
    #[error("subscription store returned HTTP {status}: {body}")]
    Status {
        /// HTTP status.
        status: u16,
        /// Response body (truncated).
        body: String,
    },
    /// Rows could not be parsed.
    #[error("subscription store returned malformed rows: {0}")]
    Decode(String),
}

/// Read/delete access to persisted subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Snapshot of the subscriptions addressed by `target`.
    async fn list(&self, target: &Target) -> Result<Vec<PushSubscription>, StoreError>;

    /// Delete a subscription by row id. Deleting a missing row is not an error.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Subscriptions held in memory, keyed by row id.
///
/// Used by tests and by single-process deployments that load rows at start.
#[derive(Debug, Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: RwLock<BTreeMap<String, PushSubscription>>,
}

impl InMemorySubscriptionStore {
    /// Store pre-populated with `subscriptions`.
    pub fn with_subscriptions(subscriptions: impl IntoIterator<Item = PushSubscription>) -> Self {
        Self {
            subscriptions: RwLock::new(
                subscriptions
                    .into_iter()
                    .map(|sub| (sub.id.clone(), sub))
                    .collect(),
            ),
        }
    }

    /// Whether a row with `id` exists.
    pub async fn contains(&self, id: &str) -> bool {
        self.subscriptions.read().await.contains_key(id)
    }

    /// Number of stored subscriptions.
    pub async fn len(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.subscriptions.read().await.is_empty()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn list(&self, target: &Target) -> Result<Vec<PushSubscription>, StoreError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|sub| target.matches(sub))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.subscriptions.write().await.remove(id);
        Ok(())
    }
}

/// Subscriptions behind a PostgREST-style API (Supabase `/rest/v1`).
///
/// Authenticates with the service role key, which bypasses row-level
/// security; the key never leaves this process.
#[derive(Clone)]
pub struct RestSubscriptionStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    table: String,
}

impl std::fmt::Debug for RestSubscriptionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestSubscriptionStore")
            .field("base_url", &self.base_url)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl RestSubscriptionStore {
    /// `base_url` is the project URL, e.g. `https://abc.supabase.co`.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            table: table.into(),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        })
    }
}

#[async_trait]
impl SubscriptionStore for RestSubscriptionStore {
    async fn list(&self, target: &Target) -> Result<Vec<PushSubscription>, StoreError> {
        let mut query = vec![("select", "id,user_id,endpoint,p256dh,auth".to_string())];
        if let Target::User(id) = target {
            query.push(("user_id", format!("eq.{id}")));
        }

        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(&query)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        Self::check(response)
            .await?
            .json::<Vec<PushSubscription>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.delete(self.table_url()))
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        Self::check(response).await.map(|_| ())
    }
}
