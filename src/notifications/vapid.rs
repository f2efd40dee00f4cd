//! VAPID application server identity (RFC 8292).
//!
//! [`VapidKeys`] is the long-lived P-256 keypair the push service knows us
//! by. [`VapidSigner`] turns it into the per-origin `Authorization` header:
//!
//! ```text
//! Authorization: vapid t=<header>.<claims>.<signature>, k=<public key>
//! ```
//!
//! The JWT is assembled by hand: header and claims are JSON, base64url'd,
//! and signed with ES256 producing the fixed-width `r || s` signature that
//! JWS requires (not DER).

// Rust guideline compliant 2026-02

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use p256::ecdsa::SigningKey;
use p256::PublicKey;
use p256::elliptic_curve::rand_core::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::codec::{self, DecodeError, UncompressedPoint};
use crate::crypto::{self, CryptoError, CryptoProvider};

/// Token lifetime. RFC 8292 caps this at 24 hours.
pub const TOKEN_TTL_HOURS: i64 = 12;

/// RFC 8292 upper bound on `exp - now`.
pub const MAX_TOKEN_TTL_HOURS: i64 = 24;

/// Invalid key material or an unsignable request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VapidError {
    /// Key could not be decoded.
    #[error("invalid VAPID {field}: {source}")]
    Decode {
        /// Which key was bad.
        field: &'static str,
        /// Why.
        source: DecodeError,
    },
    /// Private scalar is out of range or does not match the public key.
    #[error("invalid VAPID key pair: {0}")]
    KeyPair(String),
    /// Endpoint has no usable origin for `aud`.
    #[error("push endpoint has no origin: {0}")]
    InvalidEndpoint(String),
    /// ECDSA signing failed.
    #[error("VAPID signing failed: {0}")]
    Signing(#[from] CryptoError),
    /// JWT segment could not be serialized.
    #[error("VAPID claims serialization failed: {0}")]
    Serialize(String),
}

/// VAPID keypair for web push authentication.
///
/// The private key is the raw 32-byte P-256 scalar; the public key is the
/// 65-byte uncompressed point. Both travel as unpadded base64url.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "VapidKeysRepr", into = "VapidKeysRepr")]
pub struct VapidKeys {
    private_key: Zeroizing<[u8; 32]>,
    public_key: UncompressedPoint,
}

#[derive(Serialize, Deserialize)]
struct VapidKeysRepr {
    public_key: String,
    private_key: String,
}

impl TryFrom<VapidKeysRepr> for VapidKeys {
    type Error = VapidError;

    fn try_from(repr: VapidKeysRepr) -> Result<Self, Self::Error> {
        Self::from_base64url(&repr.public_key, &repr.private_key)
    }
}

impl From<VapidKeys> for VapidKeysRepr {
    fn from(keys: VapidKeys) -> Self {
        Self {
            public_key: keys.public_key_base64url(),
            private_key: keys.private_key_base64url(),
        }
    }
}

impl VapidKeys {
    /// Generate a fresh VAPID keypair.
    pub fn generate() -> Result<Self, VapidError> {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = PublicKey::from(signing_key.verifying_key());
        let public_key = crypto::uncompressed_public_key(&verifying_key)
            .map_err(|e| VapidError::KeyPair(e.to_string()))?;

        let mut private_key = Zeroizing::new([0u8; 32]);
        private_key.copy_from_slice(&signing_key.to_bytes());

        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Reconstruct from base64url-encoded strings (`VAPID_PUBLIC_KEY`,
    /// `VAPID_PRIVATE_KEY`).
    ///
    /// Validates the public key format, the private key scalar, and that the
    /// two belong together.
    pub fn from_base64url(public_key_b64: &str, private_key_b64: &str) -> Result<Self, VapidError> {
        let public_key = UncompressedPoint::from_base64url(public_key_b64).map_err(|source| {
            VapidError::Decode {
                field: "public key",
                source,
            }
        })?;
        let private_key = Zeroizing::new(codec::decode_array::<32>(private_key_b64).map_err(
            |source| VapidError::Decode {
                field: "private key",
                source,
            },
        )?);

        let signing_key = SigningKey::from_bytes((&*private_key).into())
            .map_err(|_| VapidError::KeyPair("private key is not a valid P-256 scalar".into()))?;
        let derived = crypto::uncompressed_public_key(&PublicKey::from(signing_key.verifying_key()))
            .map_err(|e| VapidError::KeyPair(e.to_string()))?;
        if derived != public_key {
            return Err(VapidError::KeyPair(
                "public key does not match private key".into(),
            ));
        }

        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Base64url-encoded uncompressed public key, the `k=` parameter.
    ///
    /// Also what browsers pass as `applicationServerKey` when subscribing.
    pub fn public_key_base64url(&self) -> String {
        self.public_key.to_base64url()
    }

    /// Base64url-encoded raw private scalar.
    pub fn private_key_base64url(&self) -> String {
        codec::encode(&self.private_key[..])
    }

    /// Uncompressed public key.
    pub fn public_key(&self) -> &UncompressedPoint {
        &self.public_key
    }

    fn private_scalar(&self) -> &[u8; 32] {
        &self.private_key
    }
}

impl std::fmt::Debug for VapidKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidKeys")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// `aud` for an endpoint: scheme, host and any non-default port.
pub fn audience(endpoint: &str) -> Result<String, VapidError> {
    let url = reqwest::Url::parse(endpoint)
        .map_err(|e| VapidError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(VapidError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(origin.ascii_serialization())
}

/// A signed VAPID JWT for one audience.
#[derive(Clone, PartialEq, Eq)]
pub struct VapidToken {
    /// Origin the token is scoped to.
    pub audience: String,
    /// Compact JWS.
    pub jwt: String,
    /// Expiry, unix seconds.
    pub expires_at: i64,
}

impl std::fmt::Debug for VapidToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidToken")
            .field("audience", &self.audience)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct JwtHeader {
    typ: &'static str,
    alg: &'static str,
}

#[derive(Serialize)]
struct JwtClaims<'a> {
    aud: &'a str,
    exp: i64,
    sub: &'a str,
}

/// Signs VAPID tokens with a fixed keypair and contact.
#[derive(Clone)]
pub struct VapidSigner {
    keys: VapidKeys,
    subject: String,
    crypto: Arc<dyn CryptoProvider>,
}

impl std::fmt::Debug for VapidSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidSigner")
            .field("keys", &self.keys)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl VapidSigner {
    /// `subject` is the operator contact (`mailto:` or `https:` URI).
    pub fn new(
        keys: VapidKeys,
        subject: impl Into<String>,
        crypto: Arc<dyn CryptoProvider>,
    ) -> Self {
        Self {
            keys,
            subject: subject.into(),
            crypto,
        }
    }

    /// The keypair this signer uses.
    pub fn keys(&self) -> &VapidKeys {
        &self.keys
    }

    /// Sign a token for the origin of `endpoint`, valid for
    /// [`TOKEN_TTL_HOURS`] from `now`.
    pub fn sign(&self, endpoint: &str, now: DateTime<Utc>) -> Result<VapidToken, VapidError> {
        let aud = audience(endpoint)?;
        self.sign_audience(aud, now)
    }

    /// Sign a token for an already-computed audience.
    pub fn sign_audience(&self, aud: String, now: DateTime<Utc>) -> Result<VapidToken, VapidError> {
        let exp = (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp();

        let header = serde_json::to_vec(&JwtHeader {
            typ: "JWT",
            alg: "ES256",
        })
        .map_err(|e| VapidError::Serialize(e.to_string()))?;
        let claims = serde_json::to_vec(&JwtClaims {
            aud: &aud,
            exp,
            sub: &self.subject,
        })
        .map_err(|e| VapidError::Serialize(e.to_string()))?;

        let signing_input = format!("{}.{}", codec::encode(&header), codec::encode(&claims));
        let signature = self
            .crypto
            .ecdsa_p256_sign(self.keys.private_scalar(), signing_input.as_bytes())?;

        Ok(VapidToken {
            audience: aud,
            jwt: format!("{signing_input}.{}", codec::encode(&signature)),
            expires_at: exp,
        })
    }

    /// `Authorization` header value for a token.
    pub fn authorization(&self, token: &VapidToken) -> String {
        format!(
            "vapid t={}, k={}",
            token.jwt,
            self.keys.public_key_base64url()
        )
    }
}
