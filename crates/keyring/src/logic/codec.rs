//! Shared helper: unwrap a barrier-sealed, base64-encoded JWK column back
//! into a parsed [`josekit::jwk::Jwk`]. Used by the JWS and JWE services.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use encryption::Barrier;
use josekit::jwk::Jwk;

use crate::error::{KeyringError, KeyringResult};

pub(crate) async fn decrypt_material_bytes(
    ciphertext_b64: &str,
    barrier: &dyn Barrier,
) -> KeyringResult<Jwk> {
    let ciphertext = BASE64
        .decode(ciphertext_b64)
        .map_err(|e| KeyringError::DecodeFailed(e.to_string()))?;
    let plaintext = barrier
        .decrypt_content(ciphertext)
        .await
        .map_err(KeyringError::from)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| KeyringError::ParseFailed(format!("invalid JWK bytes: {e}")))
}
