//! HKDF-SHA-256 (RFC 5869).
//!
//! Written against [`CryptoProvider::hmac_sha256`] rather than a packaged
//! HKDF so both halves of the derivation go through the same injected MAC.

use thiserror::Error;
use zeroize::Zeroizing;

use super::{CryptoError, CryptoProvider};

/// SHA-256 output length.
pub const HASH_LEN: usize = 32;

/// Largest output RFC 5869 permits for SHA-256 (255 blocks).
pub const MAX_OUTPUT_LEN: usize = 255 * HASH_LEN;

/// Key derivation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HkdfError {
    /// Requested output exceeds `255 * HashLen`.
    #[error("HKDF output of {requested} bytes exceeds the {max} byte limit")]
    InvalidLength {
        /// Bytes asked for.
        requested: usize,
        /// RFC 5869 bound.
        max: usize,
    },
    /// The underlying MAC failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// HKDF-Extract: `PRK = HMAC(salt, IKM)`.
///
/// An empty salt is replaced by `HashLen` zero bytes.
pub fn extract(
    crypto: &dyn CryptoProvider,
    salt: &[u8],
    ikm: &[u8],
) -> Result<Zeroizing<[u8; HASH_LEN]>, HkdfError> {
    let zero_salt = [0u8; HASH_LEN];
    let salt = if salt.is_empty() { &zero_salt[..] } else { salt };
    Ok(Zeroizing::new(crypto.hmac_sha256(salt, ikm)?))
}

/// HKDF-Expand: `T(i) = HMAC(PRK, T(i-1) || info || i)`, truncated to `length`.
pub fn expand(
    crypto: &dyn CryptoProvider,
    prk: &[u8],
    info: &[u8],
    length: usize,
) -> Result<Zeroizing<Vec<u8>>, HkdfError> {
    if length > MAX_OUTPUT_LEN {
        return Err(HkdfError::InvalidLength {
            requested: length,
            max: MAX_OUTPUT_LEN,
        });
    }

    let mut okm = Zeroizing::new(Vec::with_capacity(length));
    let mut block = Zeroizing::new(Vec::with_capacity(HASH_LEN + info.len() + 1));
    let mut previous: Zeroizing<Vec<u8>> = Zeroizing::new(Vec::new());
    let mut counter: u8 = 1;

    while okm.len() < length {
        block.clear();
        block.extend_from_slice(&previous);
        block.extend_from_slice(info);
        block.push(counter);

        let t = Zeroizing::new(crypto.hmac_sha256(prk, &block)?);
        let take = (length - okm.len()).min(HASH_LEN);
        okm.extend_from_slice(&t[..take]);

        previous.clear();
        previous.extend_from_slice(&t[..]);
        // at most 255 blocks, checked above
        counter = counter.wrapping_add(1);
    }

    Ok(okm)
}

/// Extract-then-expand in one call.
pub fn derive(
    crypto: &dyn CryptoProvider,
    salt: &[u8],
    ikm: &[u8],
    info: &[u8],
    length: usize,
) -> Result<Zeroizing<Vec<u8>>, HkdfError> {
    if length > MAX_OUTPUT_LEN {
        return Err(HkdfError::InvalidLength {
            requested: length,
            max: MAX_OUTPUT_LEN,
        });
    }
    let prk = extract(crypto, salt, ikm)?;
    expand(crypto, &prk[..], info, length)
}

/// [`derive`] into a fixed-size array.
pub fn derive_array<const N: usize>(
    crypto: &dyn CryptoProvider,
    salt: &[u8],
    ikm: &[u8],
    info: &[u8],
) -> Result<Zeroizing<[u8; N]>, HkdfError> {
    let okm = derive(crypto, salt, ikm, info, N)?;
    let mut out = Zeroizing::new([0u8; N]);
    out.copy_from_slice(&okm);
    Ok(out)
}
