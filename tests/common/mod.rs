//! Shared fixtures for integration tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use webpush_relay::codec::{self, UncompressedPoint};
use webpush_relay::crypto::{
    CryptoError, CryptoProvider, KeyPair, SystemCrypto, SALT_LEN, SHARED_SECRET_LEN,
    SIGNATURE_LEN,
};
use webpush_relay::notifications::push::{
    InMemorySubscriptionStore, PushSubscription, SubscriptionStore,
};
use webpush_relay::{Config, Invoker, VapidKeys};
use zeroize::Zeroizing;

/// Delegates to [`SystemCrypto`] and counts every primitive call.
#[derive(Default)]
pub struct CountingCrypto {
    calls: AtomicUsize,
}

impl CountingCrypto {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl CryptoProvider for CountingCrypto {
    fn generate_ephemeral_key(&self) -> Result<KeyPair, CryptoError> {
        self.tick();
        SystemCrypto.generate_ephemeral_key()
    }

    fn random_salt(&self) -> [u8; SALT_LEN] {
        self.tick();
        SystemCrypto.random_salt()
    }

    fn ecdh(
        &self,
        local: &KeyPair,
        peer: &UncompressedPoint,
    ) -> Result<Zeroizing<[u8; SHARED_SECRET_LEN]>, CryptoError> {
        self.tick();
        SystemCrypto.ecdh(local, peer)
    }

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<[u8; 32], CryptoError> {
        self.tick();
        SystemCrypto.hmac_sha256(key, data)
    }

    fn aes128gcm_encrypt(
        &self,
        key: &[u8; 16],
        nonce: &[u8; 12],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.tick();
        SystemCrypto.aes128gcm_encrypt(key, nonce, plaintext)
    }

    fn aes128gcm_decrypt(
        &self,
        key: &[u8; 16],
        nonce: &[u8; 12],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.tick();
        SystemCrypto.aes128gcm_decrypt(key, nonce, ciphertext)
    }

    fn ecdsa_p256_sign(
        &self,
        private_scalar: &[u8; 32],
        message: &[u8],
    ) -> Result<[u8; SIGNATURE_LEN], CryptoError> {
        self.tick();
        SystemCrypto.ecdsa_p256_sign(private_scalar, message)
    }
}

/// A browser on the receiving end: its `p256dh` keypair and auth secret.
pub struct Subscriber {
    pub key: KeyPair,
    pub auth: [u8; 16],
}

impl Subscriber {
    pub fn new() -> Self {
        Self {
            key: SystemCrypto.generate_ephemeral_key().unwrap(),
            auth: SystemCrypto.random_salt(),
        }
    }

    pub fn subscription(&self, id: &str, user_id: &str, endpoint: &str) -> PushSubscription {
        PushSubscription {
            id: id.to_string(),
            user_id: user_id.to_string(),
            endpoint: endpoint.to_string(),
            p256dh: self.key.public().to_base64url(),
            auth: codec::encode(&self.auth),
        }
    }
}

/// Config carrying `keys`, everything else default.
pub fn config_with_keys(keys: &VapidKeys) -> Config {
    Config {
        vapid_public_key: Some(keys.public_key_base64url()),
        vapid_private_key: Some(keys.private_key_base64url()),
        vapid_subject: "mailto:ops@example.com".to_string(),
        ..Config::default()
    }
}

/// Invoker over an in-memory store, returned alongside the store.
pub fn invoker(
    config: Config,
    subscriptions: Vec<PushSubscription>,
    crypto: Arc<dyn CryptoProvider>,
) -> (Invoker, Arc<InMemorySubscriptionStore>) {
    let store = Arc::new(InMemorySubscriptionStore::with_subscriptions(subscriptions));
    let invoker = Invoker::new(
        config,
        Arc::clone(&store) as Arc<dyn SubscriptionStore>,
        crypto,
        reqwest::Client::new(),
    );
    (invoker, store)
}
