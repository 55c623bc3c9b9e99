//! Domain entities: elastic/material JWKs, audit log entries, audit config.

use serde::{Deserialize, Serialize};
use shared::primitives::{WrappedChronoDateTime, WrappedUuidV4};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUse {
    Sig,
    Enc,
}

impl KeyUse {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyUse::Sig => "sig",
            KeyUse::Enc => "enc",
        }
    }
}

impl std::str::FromStr for KeyUse {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sig" => Ok(KeyUse::Sig),
            "enc" => Ok(KeyUse::Enc),
            _ => Err(()),
        }
    }
}

pub const DEFAULT_MAX_MATERIALS: i64 = 10;

/// A tenant-owned logical key identity that spans many concrete cryptographic
/// key versions ("materials").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticJwk {
    pub id: WrappedUuidV4,
    pub tenant_id: WrappedUuidV4,
    pub kid: String,
    pub key_type: String,
    pub algorithm: String,
    pub r#use: String,
    pub max_materials: i64,
    pub current_material_count: i64,
    pub created_at: WrappedChronoDateTime,
}

/// One concrete cryptographic key belonging to exactly one [`ElasticJwk`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialJwk {
    pub id: WrappedUuidV4,
    pub elastic_jwk_id: WrappedUuidV4,
    pub material_kid: String,
    /// Base64 of the barrier ciphertext over the serialized private JWK bytes.
    pub private_jwk_jwe: String,
    /// Base64 of the barrier ciphertext over the serialized public JWK bytes
    /// (equal to `private_jwk_jwe` for symmetric keys, which have no public half).
    pub public_jwk_jwe: String,
    pub active: bool,
    pub retired_at: Option<WrappedChronoDateTime>,
    pub barrier_version: i64,
    pub created_at: WrappedChronoDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: WrappedUuidV4,
    pub tenant_id: WrappedUuidV4,
    pub elastic_jwk_id: Option<WrappedUuidV4>,
    pub operation: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub request_id: String,
    pub created_at: WrappedChronoDateTime,
}

/// Absence of a config for an operation implies "audit enabled at 100%".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub tenant_id: WrappedUuidV4,
    pub operation: String,
    pub enabled: bool,
    pub sampling_rate: f64,
}

impl AuditConfig {
    pub fn default_for(tenant_id: WrappedUuidV4, operation: impl Into<String>) -> Self {
        Self {
            tenant_id,
            operation: operation.into(),
            enabled: true,
            sampling_rate: 1.0,
        }
    }
}
