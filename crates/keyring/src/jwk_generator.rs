//! External collaborator: produces a fresh `(private jwk, public jwk?, private
//! bytes, public bytes?)` quadruple for a given generation-algorithm tag.
//!
//! The core only depends on the [`JwkGenerator`] trait; [`JosekitJwkGenerator`]
//! is the process's default implementation, backed by `josekit`.

use josekit::jwk::Jwk;
use josekit::jwk::alg::ec::EcCurve;
use josekit::jwk::alg::ed::EdCurve;

use crate::error::KeyringError;

/// Output of a single key-generation call. `public_jwk`/`public_bytes` are
/// absent for symmetric (oct) keys, which have no public half.
pub struct GeneratedJwk {
    pub kid: Option<String>,
    pub private_jwk: Jwk,
    pub public_jwk: Option<Jwk>,
    pub private_bytes: Vec<u8>,
    pub public_bytes: Option<Vec<u8>>,
}

#[async_trait::async_trait]
pub trait JwkGenerator: Send + Sync {
    async fn generate(&self, gen_alg: &str) -> Result<GeneratedJwk, KeyringError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JosekitJwkGenerator;

impl JosekitJwkGenerator {
    pub fn new() -> Self {
        Self
    }

    fn generate_sync(gen_alg: &str) -> Result<GeneratedJwk, KeyringError> {
        let (private_jwk, public_jwk) = match gen_alg {
            "RSA/2048" => Self::generate_rsa(2048)?,
            "RSA/3072" => Self::generate_rsa(3072)?,
            "RSA/4096" => Self::generate_rsa(4096)?,
            "EC/P256" => Self::generate_ec(EcCurve::P256)?,
            "EC/P384" => Self::generate_ec(EcCurve::P384)?,
            "EC/P521" => Self::generate_ec(EcCurve::P521)?,
            "OKP/Ed25519" => Self::generate_ed()?,
            "oct/128" => (Self::generate_oct(16)?, None),
            "oct/192" => (Self::generate_oct(24)?, None),
            "oct/256" => (Self::generate_oct(32)?, None),
            "oct/384" => (Self::generate_oct(48)?, None),
            "oct/512" => (Self::generate_oct(64)?, None),
            other => return Err(KeyringError::UnsupportedAlgorithm(other.to_string())),
        };

        let private_bytes = serde_json::to_vec(&private_jwk)
            .map_err(|e| KeyringError::UnsupportedAlgorithm(e.to_string()))?;
        let public_bytes = match &public_jwk {
            Some(jwk) => Some(
                serde_json::to_vec(jwk)
                    .map_err(|e| KeyringError::UnsupportedAlgorithm(e.to_string()))?,
            ),
            None => None,
        };

        Ok(GeneratedJwk {
            kid: None,
            private_jwk,
            public_jwk,
            private_bytes,
            public_bytes,
        })
    }

    fn generate_rsa(bits: u32) -> Result<(Jwk, Option<Jwk>), KeyringError> {
        let private = Jwk::generate_rsa_key(bits)
            .map_err(|e| KeyringError::UnsupportedAlgorithm(e.to_string()))?;
        let public = private
            .to_public_key()
            .map_err(|e| KeyringError::UnsupportedAlgorithm(e.to_string()))?;
        Ok((private, Some(public)))
    }

    fn generate_ec(curve: EcCurve) -> Result<(Jwk, Option<Jwk>), KeyringError> {
        let private = Jwk::generate_ec_key(curve)
            .map_err(|e| KeyringError::UnsupportedAlgorithm(e.to_string()))?;
        let public = private
            .to_public_key()
            .map_err(|e| KeyringError::UnsupportedAlgorithm(e.to_string()))?;
        Ok((private, Some(public)))
    }

    fn generate_ed() -> Result<(Jwk, Option<Jwk>), KeyringError> {
        let private = Jwk::generate_ed_key(EdCurve::Ed25519)
            .map_err(|e| KeyringError::UnsupportedAlgorithm(e.to_string()))?;
        let public = private
            .to_public_key()
            .map_err(|e| KeyringError::UnsupportedAlgorithm(e.to_string()))?;
        Ok((private, Some(public)))
    }

    fn generate_oct(len: usize) -> Result<Jwk, KeyringError> {
        Jwk::generate_oct_key(len).map_err(|e| KeyringError::UnsupportedAlgorithm(e.to_string()))
    }
}

#[async_trait::async_trait]
impl JwkGenerator for JosekitJwkGenerator {
    async fn generate(&self, gen_alg: &str) -> Result<GeneratedJwk, KeyringError> {
        let gen_alg = gen_alg.to_string();
        tokio::task::spawn_blocking(move || Self::generate_sync(&gen_alg))
            .await
            .map_err(|e| KeyringError::UnsupportedAlgorithm(e.to_string()))?
    }
}
