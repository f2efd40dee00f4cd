//! Web Push message encryption (RFC 8291) in the `aes128gcm` content
//! coding (RFC 8188), single record.
//!
//! # Wire Format
//!
//! ```text
//! +-----------+---------------+------------+------------------+----------------------+
//! | salt (16) | rs (4, BE)    | idlen (1)  | keyid (idlen)    | ciphertext + tag(16) |
//! +-----------+---------------+------------+------------------+----------------------+
//! ```
//!
//! `keyid` is the sender's ephemeral public key (65 bytes). `rs` is always
//! 4096: an upper bound on the record size, not the length of this record.
//! The plaintext is terminated by the `0x02` last-record delimiter with no
//! further padding.

use thiserror::Error;
use zeroize::Zeroizing;

use super::hkdf::{self, HkdfError};
use super::{CryptoError, CryptoProvider, KeyPair, SALT_LEN};
use crate::codec::{UncompressedPoint, UNCOMPRESSED_POINT_LEN};

/// Length of the subscriber's auth secret.
pub const AUTH_SECRET_LEN: usize = 16;

/// Advertised record size.
pub const RECORD_SIZE: u32 = 4096;

/// AES-GCM tag length.
pub const TAG_LEN: usize = 16;

/// Delimiter marking the final (here: only) record.
pub const LAST_RECORD_DELIMITER: u8 = 0x02;

/// Header bytes before the ciphertext.
pub const HEADER_LEN: usize = SALT_LEN + 4 + 1 + UNCOMPRESSED_POINT_LEN;

/// Largest plaintext that still fits one record with its delimiter and tag.
pub const MAX_PLAINTEXT_LEN: usize = RECORD_SIZE as usize - TAG_LEN - 1;

const KEY_INFO_PREFIX: &[u8] = b"WebPush: info\0";
const CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";
const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";

/// Encryption or decryption of a push message failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EceError {
    /// The subscriber's `p256dh` is not a point on P-256.
    #[error("subscriber public key is not a valid P-256 point")]
    InvalidSubscriberKey,
    /// Plaintext does not fit a single record.
    #[error("payload of {len} bytes exceeds the {max} byte single-record limit")]
    PayloadTooLarge {
        /// Plaintext length.
        len: usize,
        /// Limit.
        max: usize,
    },
    /// Body is not a well-formed `aes128gcm` record.
    #[error("malformed aes128gcm body: {0}")]
    Malformed(&'static str),
    /// Authentication tag did not verify.
    #[error("aes128gcm record failed to authenticate")]
    Authentication,
    /// Key derivation failed.
    #[error(transparent)]
    Kdf(#[from] HkdfError),
    /// A primitive failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// One encrypted message, ready to POST.
#[derive(Debug, Clone)]
pub struct EncryptedPayload {
    /// Complete `aes128gcm` body.
    pub body: Vec<u8>,
    /// Ephemeral public key used for this message (also inside `body`).
    pub server_public: UncompressedPoint,
}

/// Content-encryption key and nonce for one record.
struct RecordKeys {
    cek: Zeroizing<[u8; 16]>,
    nonce: Zeroizing<[u8; 12]>,
}

/// `"WebPush: info\0" || ua_public || as_public`
fn key_info(ua_public: &UncompressedPoint, as_public: &UncompressedPoint) -> Vec<u8> {
    let mut info = Vec::with_capacity(KEY_INFO_PREFIX.len() + 2 * UNCOMPRESSED_POINT_LEN);
    info.extend_from_slice(KEY_INFO_PREFIX);
    info.extend_from_slice(ua_public.as_bytes());
    info.extend_from_slice(as_public.as_bytes());
    info
}

/// The RFC 8291 §3.3/§3.4 key schedule, shared by both directions.
fn derive_record_keys(
    crypto: &dyn CryptoProvider,
    shared_secret: &[u8],
    auth: &[u8; AUTH_SECRET_LEN],
    ua_public: &UncompressedPoint,
    as_public: &UncompressedPoint,
    salt: &[u8; SALT_LEN],
) -> Result<RecordKeys, EceError> {
    let ikm = hkdf::derive_array::<32>(
        crypto,
        auth,
        shared_secret,
        &key_info(ua_public, as_public),
    )?;
    let cek = hkdf::derive_array::<16>(crypto, salt, &ikm[..], CEK_INFO)?;
    let nonce = hkdf::derive_array::<12>(crypto, salt, &ikm[..], NONCE_INFO)?;
    Ok(RecordKeys { cek, nonce })
}

/// Encrypt `plaintext` for one subscriber.
///
/// A fresh ephemeral key and salt are drawn from `crypto` on every call, so
/// two calls with the same inputs never share a `(key, nonce)` pair.
pub fn encrypt(
    crypto: &dyn CryptoProvider,
    subscriber_public: &UncompressedPoint,
    subscriber_auth: &[u8; AUTH_SECRET_LEN],
    plaintext: &[u8],
) -> Result<EncryptedPayload, EceError> {
    if plaintext.len() > MAX_PLAINTEXT_LEN {
        return Err(EceError::PayloadTooLarge {
            len: plaintext.len(),
            max: MAX_PLAINTEXT_LEN,
        });
    }

    let server_key = crypto.generate_ephemeral_key()?;
    let shared_secret = crypto
        .ecdh(&server_key, subscriber_public)
        .map_err(|e| match e {
            CryptoError::InvalidPublicKey => EceError::InvalidSubscriberKey,
            other => EceError::Crypto(other),
        })?;

    let salt = crypto.random_salt();
    let keys = derive_record_keys(
        crypto,
        &shared_secret[..],
        subscriber_auth,
        subscriber_public,
        server_key.public(),
        &salt,
    )?;

    let mut padded = Zeroizing::new(Vec::with_capacity(plaintext.len() + 1));
    padded.extend_from_slice(plaintext);
    padded.push(LAST_RECORD_DELIMITER);

    let ciphertext = crypto.aes128gcm_encrypt(&keys.cek, &keys.nonce, &padded)?;

    let server_public = *server_key.public();
    let mut body = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(UNCOMPRESSED_POINT_LEN as u8);
    body.extend_from_slice(server_public.as_bytes());
    body.extend_from_slice(&ciphertext);

    Ok(EncryptedPayload {
        body,
        server_public,
    })
}

/// Decrypt a single-record body as the user agent would.
///
/// `subscriber_key` is the browser's `p256dh` keypair. Returns the plaintext
/// with the record delimiter stripped.
pub fn decrypt(
    crypto: &dyn CryptoProvider,
    subscriber_key: &KeyPair,
    subscriber_auth: &[u8; AUTH_SECRET_LEN],
    body: &[u8],
) -> Result<Vec<u8>, EceError> {
    if body.len() < SALT_LEN + 5 {
        return Err(EceError::Malformed("truncated header"));
    }
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&body[..SALT_LEN]);

    let id_len = usize::from(body[SALT_LEN + 4]);
    let key_start = SALT_LEN + 5;
    if id_len != UNCOMPRESSED_POINT_LEN || body.len() < key_start + id_len + TAG_LEN {
        return Err(EceError::Malformed("unexpected key id"));
    }
    let server_public = UncompressedPoint::from_slice(&body[key_start..key_start + id_len])
        .map_err(|_| EceError::Malformed("key id is not an uncompressed point"))?;
    let ciphertext = &body[key_start + id_len..];

    let shared_secret = crypto.ecdh(subscriber_key, &server_public)?;
    let keys = derive_record_keys(
        crypto,
        &shared_secret[..],
        subscriber_auth,
        subscriber_key.public(),
        &server_public,
        &salt,
    )?;

    let mut padded = crypto
        .aes128gcm_decrypt(&keys.cek, &keys.nonce, ciphertext)
        .map_err(|_| EceError::Authentication)?;

    // Strip zero padding, then the delimiter.
    while padded.last() == Some(&0) {
        padded.pop();
    }
    match padded.pop() {
        Some(LAST_RECORD_DELIMITER) => Ok(padded),
        _ => Err(EceError::Malformed("missing last-record delimiter")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::crypto::SystemCrypto;

    /// Fixes the ephemeral key and salt; everything else is real unless
    /// `reject_open` is set.
    struct PinnedCrypto {
        scalar: [u8; 32],
        salt: [u8; SALT_LEN],
        reject_open: bool,
    }

    impl CryptoProvider for PinnedCrypto {
        fn generate_ephemeral_key(&self) -> Result<KeyPair, CryptoError> {
            KeyPair::from_scalar(&self.scalar)
        }

        fn random_salt(&self) -> [u8; SALT_LEN] {
            self.salt
        }

        fn ecdh(
            &self,
            local: &KeyPair,
            peer: &UncompressedPoint,
        ) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
            SystemCrypto.ecdh(local, peer)
        }

        fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<[u8; 32], CryptoError> {
            SystemCrypto.hmac_sha256(key, data)
        }

        fn aes128gcm_encrypt(
            &self,
            key: &[u8; 16],
            nonce: &[u8; 12],
            plaintext: &[u8],
        ) -> Result<Vec<u8>, CryptoError> {
            SystemCrypto.aes128gcm_encrypt(key, nonce, plaintext)
        }

        fn aes128gcm_decrypt(
            &self,
            key: &[u8; 16],
            nonce: &[u8; 12],
            ciphertext: &[u8],
        ) -> Result<Vec<u8>, CryptoError> {
            if self.reject_open {
                return Err(CryptoError::Aead("rejected".to_string()));
            }
            SystemCrypto.aes128gcm_decrypt(key, nonce, ciphertext)
        }

        fn ecdsa_p256_sign(
            &self,
            private_scalar: &[u8; 32],
            message: &[u8],
        ) -> Result<[u8; 64], CryptoError> {
            SystemCrypto.ecdsa_p256_sign(private_scalar, message)
        }
    }

    // RFC 8291 Appendix A
    const PLAINTEXT: &[u8] = b"When I grow up, I want to be a watermelon";
    const AS_PRIVATE: &str = "yfWPiYE-n46HLnH0KqZOF1fJJU3MYrct3AELtAQ-oRw";
    const UA_PRIVATE: &str = "q1dXpw3UpT5VOmu_cf_v6ih07Aems3njxI-JWgLcM94";
    const UA_PUBLIC: &str =
        "BCVxsr7N_eNgVRqvHtD0zTZsEc6-VV-JvLexhqUzORcxaOzi6-AYWXvTBHm4bjyPjs7Vd8pZGH6SRpkNtoIAiw4";
    const SALT: &str = "DGv6ra1nlYgDCS1FRnbzlw";
    const AUTH: &str = "BTBZMqHH6r4Tts7J_aSIgg";
    const EXPECTED_BODY: &str = concat!(
        "DGv6ra1nlYgDCS1FRnbzlwAAEABBBP4z9KsN6nGRTbVYI_c7VJSPQTBtkgcy27mlmlMoZIIgDll6e3vCYLoc",
        "InmYWAmS6TlzAC8wEqKK6PBru3jl7A_yl95bQpu6cVPTpK4Mqgkf1CXztLVBSt2Ks3oZwbuwXPXLWyouBWLV",
        "WGNWQexSgSxsj_Qulcy4a-fN",
    );

    fn rfc_crypto() -> PinnedCrypto {
        PinnedCrypto {
            scalar: codec::decode_array(AS_PRIVATE).unwrap(),
            salt: codec::decode_array(SALT).unwrap(),
            reject_open: false,
        }
    }

    fn rfc_subscriber() -> (KeyPair, [u8; 16]) {
        let key = KeyPair::from_scalar(&codec::decode_array(UA_PRIVATE).unwrap()).unwrap();
        assert_eq!(key.public().to_base64url(), UA_PUBLIC);
        (key, codec::decode_array(AUTH).unwrap())
    }

    #[test]
    fn test_rfc8291_key_schedule() {
        let crypto = rfc_crypto();
        let (ua, auth) = rfc_subscriber();
        let as_key = crypto.generate_ephemeral_key().unwrap();

        let shared = crypto.ecdh(&as_key, ua.public()).unwrap();
        assert_eq!(
            codec::encode(&shared[..]),
            "kyrL1jIIOHEzg3sM2ZWRHDRB62YACZhhSlknJ672kSs"
        );

        let keys = derive_record_keys(
            &crypto,
            &shared[..],
            &auth,
            ua.public(),
            as_key.public(),
            &crypto.salt,
        )
        .unwrap();
        assert_eq!(codec::encode(&keys.cek[..]), "oIhVW04MRdy2XN9CiKLxTg");
        assert_eq!(codec::encode(&keys.nonce[..]), "4h_95klXJ5E_qnoN");
    }

    #[test]
    fn test_rfc8291_body_is_byte_exact() {
        let crypto = rfc_crypto();
        let (ua, auth) = rfc_subscriber();

        let encrypted = encrypt(&crypto, ua.public(), &auth, PLAINTEXT).unwrap();
        assert_eq!(codec::encode(&encrypted.body), EXPECTED_BODY);
        assert_eq!(
            &encrypted.body[21..HEADER_LEN],
            encrypted.server_public.as_bytes()
        );
    }

    #[test]
    fn test_encrypt_is_deterministic_given_pinned_randomness() {
        let crypto = rfc_crypto();
        let (ua, auth) = rfc_subscriber();

        let a = encrypt(&crypto, ua.public(), &auth, PLAINTEXT).unwrap();
        let b = encrypt(&crypto, ua.public(), &auth, PLAINTEXT).unwrap();
        assert_eq!(a.body, b.body);
    }

    #[test]
    fn test_header_layout() {
        let (ua, auth) = rfc_subscriber();
        let encrypted = encrypt(&SystemCrypto, ua.public(), &auth, b"{}").unwrap();
        let body = &encrypted.body;

        assert_eq!(&body[16..20], &4096u32.to_be_bytes());
        assert_eq!(body[20], 65);
        assert_eq!(body[21], 0x04);
        // "{}" + delimiter + tag
        assert_eq!(body.len(), HEADER_LEN + 2 + 1 + TAG_LEN);
    }

    #[test]
    fn test_round_trip_and_fresh_randomness() {
        let (ua, auth) = rfc_subscriber();
        let payload = br#"{"title":"Mentor request","body":"Sam wants to connect"}"#;

        let first = encrypt(&SystemCrypto, ua.public(), &auth, payload).unwrap();
        let second = encrypt(&SystemCrypto, ua.public(), &auth, payload).unwrap();

        assert_ne!(first.body, second.body);
        assert_ne!(first.server_public, second.server_public);
        assert_ne!(first.body[..SALT_LEN], second.body[..SALT_LEN]);

        for encrypted in [first, second] {
            let plaintext = decrypt(&SystemCrypto, &ua, &auth, &encrypted.body).unwrap();
            assert_eq!(plaintext, payload);
        }
    }

    #[test]
    fn test_decrypt_rejects_wrong_auth_secret() {
        let (ua, auth) = rfc_subscriber();
        let encrypted = encrypt(&SystemCrypto, ua.public(), &auth, b"secret").unwrap();

        let result = decrypt(&SystemCrypto, &ua, &[0u8; 16], &encrypted.body);
        assert_eq!(result.unwrap_err(), EceError::Authentication);
    }

    #[test]
    fn test_decrypt_opens_through_provider() {
        let (ua, auth) = rfc_subscriber();
        let encrypted = encrypt(&rfc_crypto(), ua.public(), &auth, PLAINTEXT).unwrap();

        let plaintext = decrypt(&rfc_crypto(), &ua, &auth, &encrypted.body).unwrap();
        assert_eq!(plaintext, PLAINTEXT);

        let rejecting = PinnedCrypto {
            reject_open: true,
            ..rfc_crypto()
        };
        let result = decrypt(&rejecting, &ua, &auth, &encrypted.body);
        assert_eq!(result.unwrap_err(), EceError::Authentication);
    }

    #[test]
    fn test_decrypt_rejects_truncated_body() {
        let (ua, auth) = rfc_subscriber();
        assert!(matches!(
            decrypt(&SystemCrypto, &ua, &auth, &[0u8; 10]),
            Err(EceError::Malformed(_))
        ));
    }

    #[test]
    fn test_invalid_subscriber_key() {
        let bogus = UncompressedPoint::from_coordinates(&[3u8; 32], &[4u8; 32]);
        let result = encrypt(&SystemCrypto, &bogus, &[0u8; 16], b"{}");
        assert_eq!(result.unwrap_err(), EceError::InvalidSubscriberKey);
    }

    #[test]
    fn test_payload_must_fit_one_record() {
        let (ua, auth) = rfc_subscriber();
        let too_big = vec![b'a'; MAX_PLAINTEXT_LEN + 1];
        assert_eq!(
            encrypt(&SystemCrypto, ua.public(), &auth, &too_big).unwrap_err(),
            EceError::PayloadTooLarge {
                len: 4080,
                max: 4079
            }
        );
        let fits = vec![b'a'; MAX_PLAINTEXT_LEN];
        let encrypted = encrypt(&SystemCrypto, ua.public(), &auth, &fits).unwrap();
        assert_eq!(encrypted.body.len() - HEADER_LEN, RECORD_SIZE as usize);
    }
}
