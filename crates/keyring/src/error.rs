//! Domain error kinds for the keyring service layer.
//!
//! These map 1:1 onto the error-kind table the services are contracted against;
//! transport-level concerns (HTTP status, wire encoding) are deliberately absent.

use shared::error::CommonError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyringError {
    #[error("algorithm `{0}` is not recognized")]
    InvalidAlgorithm(String),

    #[error("key use must be `sig` or `enc`, got `{0}`")]
    InvalidKeyUse(String),

    #[error("resource not found")]
    NotFound,

    #[error("operation not permitted for this key's use")]
    WrongKeyUse,

    #[error("elastic key already has the maximum number of materials")]
    MaxMaterialsReached,

    #[error("material kid does not belong to this elastic jwk")]
    MaterialKeyDoesNotBelongToElasticJwk,

    #[error("elastic jwk has no active material")]
    NoActiveMaterial,

    #[error("material kid does not resolve within the requested elastic jwk")]
    MaterialKidDoesNotBelongToThisElasticJwk,

    #[error("failed to parse JOSE structure: {0}")]
    ParseFailed(String),

    #[error("stored ciphertext is not valid base64: {0}")]
    DecodeFailed(String),

    #[error("barrier rejected ciphertext: {0}")]
    BarrierDecryptFailed(String),

    #[error("algorithm `{0}` is not supported for this operation")]
    UnsupportedAlgorithm(String),

    #[error("no material could verify or decrypt this artifact")]
    NoMatchingKeyFound,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("JWT validation failed: {0}")]
    JwtValidationFailed(String),

    #[error("encryption key not found")]
    EncryptionKeyNotFound,

    #[error("storage error: {0}")]
    StorageError(#[source] CommonError),
}

impl From<CommonError> for KeyringError {
    fn from(value: CommonError) -> Self {
        KeyringError::StorageError(value)
    }
}

impl From<encryption::BarrierError> for KeyringError {
    fn from(value: encryption::BarrierError) -> Self {
        KeyringError::BarrierDecryptFailed(value.to_string())
    }
}

pub type KeyringResult<T> = Result<T, KeyringError>;
