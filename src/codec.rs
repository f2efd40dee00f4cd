//! Wire encodings for push key material.
//!
//! Browsers hand out `p256dh`/`auth` and push services expect VAPID keys as
//! unpadded base64url. Clients are not consistent about padding (and a few
//! older ones emit the standard alphabet), so decoding is lenient while
//! encoding always produces the canonical unpadded url-safe form.
//!
//! P-256 public keys on the wire are SEC1 uncompressed points:
//!
//! ```text
//! 0x04 || X (32 bytes) || Y (32 bytes)
//! ```

// Rust guideline compliant 2026-02

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use thiserror::Error;

/// Length of an uncompressed SEC1 P-256 point.
pub const UNCOMPRESSED_POINT_LEN: usize = 65;

/// Length of one P-256 field element (an affine coordinate).
pub const COORDINATE_LEN: usize = 32;

const UNCOMPRESSED_TAG: u8 = 0x04;

/// url-safe alphabet, never pads on encode, accepts padded and unpadded input.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Key material could not be decoded from its wire form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Input is not valid base64url.
    #[error("malformed base64url: {0}")]
    Base64(String),
    /// Decoded bytes have the wrong length for the field.
    #[error("expected {expected} bytes, got {actual}")]
    Length {
        /// Length the field requires.
        expected: usize,
        /// Length that was decoded.
        actual: usize,
    },
    /// A 65-byte key that does not start with the uncompressed tag.
    #[error("public key is not an uncompressed SEC1 point")]
    NotUncompressed,
}

/// Decode base64url, tolerating missing or present `=` padding.
pub fn decode(input: &str) -> Result<Vec<u8>, DecodeError> {
    let normalized: String = input
        .trim()
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    BASE64URL
        .decode(normalized.as_bytes())
        .map_err(|e| DecodeError::Base64(e.to_string()))
}

/// Decode base64url into a fixed-size buffer.
pub fn decode_array<const N: usize>(input: &str) -> Result<[u8; N], DecodeError> {
    let bytes = decode(input)?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| DecodeError::Length { expected: N, actual })
}

/// Encode bytes as unpadded base64url.
pub fn encode(bytes: &[u8]) -> String {
    BASE64URL.encode(bytes)
}

/// An uncompressed P-256 point as it travels on the wire.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UncompressedPoint([u8; UNCOMPRESSED_POINT_LEN]);

impl UncompressedPoint {
    /// Validate the length and tag of a raw point.
    ///
    /// This does not check that the point lies on the curve; that happens
    /// when the crypto provider imports it.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let raw: [u8; UNCOMPRESSED_POINT_LEN] =
            bytes.try_into().map_err(|_| DecodeError::Length {
                expected: UNCOMPRESSED_POINT_LEN,
                actual: bytes.len(),
            })?;
        if raw[0] != UNCOMPRESSED_TAG {
            return Err(DecodeError::NotUncompressed);
        }
        Ok(Self(raw))
    }

    /// Decode a base64url point (the `p256dh` / `VAPID_PUBLIC_KEY` format).
    pub fn from_base64url(input: &str) -> Result<Self, DecodeError> {
        Self::from_slice(&decode(input)?)
    }

    /// Assemble a point from its affine coordinates.
    pub fn from_coordinates(x: &[u8; COORDINATE_LEN], y: &[u8; COORDINATE_LEN]) -> Self {
        let mut raw = [0u8; UNCOMPRESSED_POINT_LEN];
        raw[0] = UNCOMPRESSED_TAG;
        raw[1..=COORDINATE_LEN].copy_from_slice(x);
        raw[1 + COORDINATE_LEN..].copy_from_slice(y);
        Self(raw)
    }

    /// Affine X coordinate.
    pub fn x(&self) -> &[u8] {
        &self.0[1..=COORDINATE_LEN]
    }

    /// Affine Y coordinate.
    pub fn y(&self) -> &[u8] {
        &self.0[1 + COORDINATE_LEN..]
    }

    /// All 65 bytes, tag included.
    pub fn as_bytes(&self) -> &[u8; UNCOMPRESSED_POINT_LEN] {
        &self.0
    }

    /// Canonical unpadded base64url form.
    pub fn to_base64url(&self) -> String {
        encode(&self.0)
    }
}

impl std::fmt::Debug for UncompressedPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UncompressedPoint({})", self.to_base64url())
    }
}
