//! Cryptographic capabilities used by the push pipeline.
//!
//! The encoder and signer never reach for a global RNG or key store: every
//! primitive goes through a [`CryptoProvider`]. Production code uses
//! [`SystemCrypto`] (p256 + aes-gcm + hmac, randomness from the OS). Tests
//! swap in providers that pin the ephemeral key and salt so RFC 8291 vectors
//! can be reproduced byte for byte.
//!
//! # Modules
//!
//! - [`hkdf`] - RFC 5869 extract-and-expand over the provider's HMAC
//! - [`ece`] - RFC 8291 key schedule and RFC 8188 `aes128gcm` framing

pub mod ece;
pub mod hkdf;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Nonce,
};
use hmac::{Hmac, Mac};
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use p256::elliptic_curve::rand_core::{OsRng, RngCore};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::codec::UncompressedPoint;

/// Record salt length (RFC 8188).
pub const SALT_LEN: usize = 16;

/// Raw ECDH output length (X coordinate of the shared point).
pub const SHARED_SECRET_LEN: usize = 32;

/// Fixed-width `r || s` ES256 signature length.
pub const SIGNATURE_LEN: usize = 64;

/// A primitive refused its input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Bytes do not describe a point on P-256.
    #[error("not a valid P-256 public key")]
    InvalidPublicKey,
    /// Bytes are not a valid P-256 scalar (zero or >= group order).
    #[error("not a valid P-256 private scalar")]
    InvalidPrivateKey,
    /// HMAC could not be keyed.
    #[error("HMAC failure: {0}")]
    Mac(String),
    /// AES-GCM rejected the key or plaintext.
    #[error("AES-GCM failure: {0}")]
    Aead(String),
}

/// A P-256 keypair. On the sending side it lives for exactly one message.
///
/// The secret scalar is zeroized when the key is dropped.
pub struct KeyPair {
    secret: SecretKey,
    public: UncompressedPoint,
}

impl KeyPair {
    /// Wrap an existing secret key.
    pub fn from_secret(secret: SecretKey) -> Result<Self, CryptoError> {
        let public = uncompressed_public_key(&secret.public_key())?;
        Ok(Self { secret, public })
    }

    /// Import a raw 32-byte big-endian scalar.
    pub fn from_scalar(scalar: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret =
            SecretKey::from_bytes(scalar.into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Self::from_secret(secret)
    }

    /// The public half, as sent in the `aes128gcm` key id.
    pub fn public(&self) -> &UncompressedPoint {
        &self.public
    }

    fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// The primitives the push pipeline depends on.
///
/// Implementations must be safe to share across concurrent deliveries; any
/// randomness they hand out belongs to the caller that asked for it.
pub trait CryptoProvider: Send + Sync {
    /// Fresh ephemeral P-256 keypair for one message.
    fn generate_ephemeral_key(&self) -> Result<KeyPair, CryptoError>;

    /// Fresh random record salt for one message.
    fn random_salt(&self) -> [u8; SALT_LEN];

    /// ECDH between our ephemeral key and a peer's static public key.
    fn ecdh(
        &self,
        local: &KeyPair,
        peer: &UncompressedPoint,
    ) -> Result<Zeroizing<[u8; SHARED_SECRET_LEN]>, CryptoError>;

    /// HMAC-SHA-256.
    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<[u8; 32], CryptoError>;

    /// AES-128-GCM with empty AAD; the 16-byte tag is appended.
    fn aes128gcm_encrypt(
        &self,
        key: &[u8; 16],
        nonce: &[u8; 12],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// AES-128-GCM open with empty AAD; `ciphertext` carries the tag.
    /// A tag mismatch is [`CryptoError::Aead`].
    fn aes128gcm_decrypt(
        &self,
        key: &[u8; 16],
        nonce: &[u8; 12],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// ECDSA P-256 with SHA-256, returning the raw `r || s` form.
    fn ecdsa_p256_sign(
        &self,
        private_scalar: &[u8; 32],
        message: &[u8],
    ) -> Result<[u8; SIGNATURE_LEN], CryptoError>;
}

/// Production provider backed by RustCrypto and the OS RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCrypto;

impl CryptoProvider for SystemCrypto {
    fn generate_ephemeral_key(&self) -> Result<KeyPair, CryptoError> {
        KeyPair::from_secret(SecretKey::random(&mut OsRng))
    }

    fn random_salt(&self) -> [u8; SALT_LEN] {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        salt
    }

    fn ecdh(
        &self,
        local: &KeyPair,
        peer: &UncompressedPoint,
    ) -> Result<Zeroizing<[u8; SHARED_SECRET_LEN]>, CryptoError> {
        let peer = import_public_key(peer)?;
        let shared =
            p256::ecdh::diffie_hellman(local.secret().to_nonzero_scalar(), peer.as_affine());

        let mut out = Zeroizing::new([0u8; SHARED_SECRET_LEN]);
        out.copy_from_slice(shared.raw_secret_bytes());
        Ok(out)
    }

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<[u8; 32], CryptoError> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
            .map_err(|e| CryptoError::Mac(e.to_string()))?;
        mac.update(data);

        let mut out = [0u8; 32];
        out.copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }

    fn aes128gcm_encrypt(
        &self,
        key: &[u8; 16],
        nonce: &[u8; 12],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher =
            Aes128Gcm::new_from_slice(key).map_err(|e| CryptoError::Aead(e.to_string()))?;
        cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|e| CryptoError::Aead(e.to_string()))
    }

    fn aes128gcm_decrypt(
        &self,
        key: &[u8; 16],
        nonce: &[u8; 12],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher =
            Aes128Gcm::new_from_slice(key).map_err(|e| CryptoError::Aead(e.to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CryptoError::Aead(e.to_string()))
    }

    fn ecdsa_p256_sign(
        &self,
        private_scalar: &[u8; 32],
        message: &[u8],
    ) -> Result<[u8; SIGNATURE_LEN], CryptoError> {
        let signing_key = SigningKey::from_bytes(private_scalar.into())
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        let signature: Signature = signing_key.sign(message);

        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(&signature.to_bytes());
        Ok(out)
    }
}

/// Parse a wire point into a curve point, rejecting off-curve input.
pub(crate) fn import_public_key(point: &UncompressedPoint) -> Result<PublicKey, CryptoError> {
    PublicKey::from_sec1_bytes(point.as_bytes()).map_err(|_| CryptoError::InvalidPublicKey)
}

/// SEC1 uncompressed encoding of a curve point.
pub(crate) fn uncompressed_public_key(key: &PublicKey) -> Result<UncompressedPoint, CryptoError> {
    let encoded = key.as_affine().to_encoded_point(false);
    match (encoded.x(), encoded.y()) {
        (Some(x), Some(y)) => {
            let mut xb = [0u8; 32];
            let mut yb = [0u8; 32];
            xb.copy_from_slice(x);
            yb.copy_from_slice(y);
            Ok(UncompressedPoint::from_coordinates(&xb, &yb))
        }
        _ => Err(CryptoError::InvalidPublicKey),
    }
}
