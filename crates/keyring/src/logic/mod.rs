pub mod audit_log;
pub(crate) mod codec;
pub mod elastic_jwk;
pub mod jwe;
pub mod jwks;
pub mod jwt;
pub mod jws;
pub mod material_rotation;
