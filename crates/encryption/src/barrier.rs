//! Opaque byte-oriented sealing/unsealing of key material before it touches storage.
//!
//! This mirrors the crypto primitive the identity stack historically used for
//! encrypting data-encryption-keys at rest (nonce-prepended AES-256-GCM), minus
//! the envelope/KMS indirection: the barrier here holds a single process-wide
//! root key and is not itself tenant-aware.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng},
};
use rand::RngCore;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum BarrierError {
    #[error("ciphertext too short: expected at least {NONCE_LEN} bytes, got {0}")]
    CiphertextTooShort(usize),
    #[error("seal failed: {0}")]
    SealFailed(String),
    #[error("unseal failed: {0}")]
    UnsealFailed(String),
    #[error("invalid root key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),
}

/// The barrier: seals/unseals opaque byte blobs under a tenant-independent root key.
///
/// Every stored JWK passes through this before it reaches the repository, and
/// every JWK read back from storage passes through it in reverse. Implementations
/// make no promises about length preservation or deterministic output.
#[async_trait::async_trait]
pub trait Barrier: Send + Sync {
    async fn encrypt_content(&self, plaintext: Vec<u8>) -> Result<Vec<u8>, BarrierError>;
    async fn decrypt_content(&self, ciphertext: Vec<u8>) -> Result<Vec<u8>, BarrierError>;
}

/// Default `Barrier` backed by AES-256-GCM with a random 96-bit nonce prepended
/// to each ciphertext.
#[derive(Clone, zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
pub struct AesGcmBarrier {
    root_key: [u8; KEY_LEN],
}

impl std::fmt::Debug for AesGcmBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AesGcmBarrier(************)")
    }
}

impl AesGcmBarrier {
    /// Generate a fresh random root key. Intended for tests and local/dev use;
    /// a real deployment supplies a persisted key via `from_bytes`.
    pub fn generate() -> Self {
        let mut root_key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut root_key);
        Self { root_key }
    }

    pub fn from_bytes(key_bytes: &[u8]) -> Result<Self, BarrierError> {
        if key_bytes.len() != KEY_LEN {
            return Err(BarrierError::InvalidKeyLength(key_bytes.len()));
        }
        let mut root_key = [0u8; KEY_LEN];
        root_key.copy_from_slice(key_bytes);
        Ok(Self { root_key })
    }
}

#[async_trait::async_trait]
impl Barrier for AesGcmBarrier {
    async fn encrypt_content(&self, plaintext: Vec<u8>) -> Result<Vec<u8>, BarrierError> {
        let key = aes_gcm::Key::<Aes256Gcm>::from_slice(&self.root_key);
        let cipher = Aes256Gcm::new(key);

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|e| BarrierError::SealFailed(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    async fn decrypt_content(&self, ciphertext: Vec<u8>) -> Result<Vec<u8>, BarrierError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(BarrierError::CiphertextTooShort(ciphertext.len()));
        }

        let key = aes_gcm::Key::<Aes256Gcm>::from_slice(&self.root_key);
        let cipher = Aes256Gcm::new(key);

        let nonce = Nonce::from_slice(&ciphertext[..NONCE_LEN]);
        let body = &ciphertext[NONCE_LEN..];

        cipher
            .decrypt(nonce, body)
            .map_err(|e| BarrierError::UnsealFailed(e.to_string()))
    }
}

#[cfg(all(test, feature = "unit_test"))]
mod unit_test {
    use super::*;

    #[tokio::test]
    async fn roundtrip_preserves_plaintext() {
        let barrier = AesGcmBarrier::generate();
        let plaintext = b"a serialized private jwk".to_vec();

        let ciphertext = barrier.encrypt_content(plaintext.clone()).await.unwrap();
        assert_ne!(ciphertext, plaintext);

        let recovered = barrier.decrypt_content(ciphertext).await.unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[tokio::test]
    async fn ciphertext_is_nondeterministic() {
        let barrier = AesGcmBarrier::generate();
        let plaintext = b"same input twice".to_vec();

        let a = barrier.encrypt_content(plaintext.clone()).await.unwrap();
        let b = barrier.encrypt_content(plaintext).await.unwrap();
        assert_ne!(a, b, "random nonce should make repeated encryptions differ");
    }

    #[tokio::test]
    async fn decrypt_rejects_truncated_ciphertext() {
        let barrier = AesGcmBarrier::generate();
        let err = barrier.decrypt_content(vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, BarrierError::CiphertextTooShort(3)));
    }

    #[tokio::test]
    async fn decrypt_rejects_tampered_ciphertext() {
        let barrier = AesGcmBarrier::generate();
        let mut ciphertext = barrier
            .encrypt_content(b"tamper me".to_vec())
            .await
            .unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;

        let err = barrier.decrypt_content(ciphertext).await.unwrap_err();
        assert!(matches!(err, BarrierError::UnsealFailed(_)));
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        let err = AesGcmBarrier::from_bytes(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, BarrierError::InvalidKeyLength(16)));
    }
}
