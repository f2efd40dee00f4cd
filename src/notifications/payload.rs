//! The notification shown by the browser's service worker.

use serde::{Deserialize, Serialize};

/// Icon used when the caller does not supply one.
pub const DEFAULT_ICON: &str = "/icons/icon-192x192.png";

/// Deep link used when the caller does not supply one.
pub const DEFAULT_URL: &str = "/";

/// Notification content, serialized once per invocation and encrypted per
/// subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Notification title.
    pub title: String,
    /// Notification body text.
    pub body: String,
    /// Icon URL.
    #[serde(default = "default_icon")]
    pub icon: String,
    /// Page opened when the notification is clicked.
    #[serde(default = "default_url")]
    pub url: String,
}

fn default_icon() -> String {
    DEFAULT_ICON.to_string()
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

impl NotificationPayload {
    /// Payload with default icon and url.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: default_icon(),
            url: default_url(),
        }
    }

    /// Canonical JSON encoding (fields in declaration order).
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
