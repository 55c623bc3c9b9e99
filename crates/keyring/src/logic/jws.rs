//! JWS Service (spec component 4.4): sign/verify raw payloads under an
//! elastic key's active or named material.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD};
use encryption::Barrier;
use josekit::jws::JwsAlgorithm;
use shared::primitives::WrappedUuidV4;

use crate::algorithm::sig_alg_of;
use crate::error::{KeyringError, KeyringResult};
use crate::logic::codec::decrypt_material_bytes;
use crate::repository::{ElasticJwkRepositoryLike, MaterialJwkRepositoryLike};
use crate::types::{ElasticJwk, KeyUse, MaterialJwk};

pub(crate) fn jws_algorithm(alg: &str) -> Option<&'static dyn JwsAlgorithm> {
    match alg {
        "RS256" => Some(&josekit::jws::RS256),
        "RS384" => Some(&josekit::jws::RS384),
        "RS512" => Some(&josekit::jws::RS512),
        "PS256" => Some(&josekit::jws::PS256),
        "PS384" => Some(&josekit::jws::PS384),
        "PS512" => Some(&josekit::jws::PS512),
        "ES256" => Some(&josekit::jws::ES256),
        "ES384" => Some(&josekit::jws::ES384),
        "ES512" => Some(&josekit::jws::ES512),
        "EdDSA" => Some(&josekit::jws::EdDSA),
        "HS256" => Some(&josekit::jws::HS256),
        "HS384" => Some(&josekit::jws::HS384),
        "HS512" => Some(&josekit::jws::HS512),
        _ => None,
    }
}

/// A cheap structural check that `compact` looks like a three-part compact
/// JWS — reject before any crypto is attempted.
pub(crate) fn check_compact_jws_shape(compact: &str) -> KeyringResult<()> {
    let parts: Vec<&str> = compact.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(KeyringError::ParseFailed(
            "compact JWS must have three non-empty dot-separated parts".to_string(),
        ));
    }
    URL_SAFE_NO_PAD
        .decode(parts[0])
        .map_err(|e| KeyringError::ParseFailed(format!("invalid JWS header: {e}")))?;
    Ok(())
}

#[derive(Clone)]
pub struct JwsService<Repo> {
    repo: Repo,
    barrier: Arc<dyn Barrier>,
}

impl<Repo> JwsService<Repo>
where
    Repo: ElasticJwkRepositoryLike + MaterialJwkRepositoryLike + Clone,
{
    pub fn new(repo: Repo, barrier: Arc<dyn Barrier>) -> Self {
        Self { repo, barrier }
    }

    async fn load_elastic_for_sig(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
    ) -> KeyringResult<ElasticJwk> {
        let elastic = self
            .repo
            .get_by_id(elastic_id)
            .await?
            .ok_or(KeyringError::NotFound)?;
        if &elastic.tenant_id != tenant {
            return Err(KeyringError::NotFound);
        }
        if elastic.r#use != KeyUse::Sig.as_str() {
            return Err(KeyringError::WrongKeyUse);
        }
        Ok(elastic)
    }

    async fn sign_with_material(
        &self,
        elastic: &ElasticJwk,
        material: &MaterialJwk,
        payload: &[u8],
    ) -> KeyringResult<String> {
        let private_jwk =
            decrypt_material_bytes(&material.private_jwk_jwe, self.barrier.as_ref()).await?;

        let sig_alg = sig_alg_of(&elastic.algorithm)
            .ok_or_else(|| KeyringError::UnsupportedAlgorithm(elastic.algorithm.clone()))?;
        let algorithm = jws_algorithm(sig_alg)
            .ok_or_else(|| KeyringError::UnsupportedAlgorithm(sig_alg.to_string()))?;

        let signer = algorithm
            .signer_from_jwk(&private_jwk)
            .map_err(|e| KeyringError::ParseFailed(e.to_string()))?;

        let mut header = josekit::jws::JwsHeader::new();
        header.set_key_id(&material.material_kid);
        header.set_algorithm(sig_alg);

        josekit::jws::serialize_compact(payload, &header, signer.as_ref())
            .map_err(|e| KeyringError::ParseFailed(e.to_string()))
    }

    /// `Sign(tenant, elastic_id, payload) -> compact_jws`.
    pub async fn sign(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
        payload: &[u8],
    ) -> KeyringResult<String> {
        let elastic = self.load_elastic_for_sig(tenant, elastic_id).await?;
        let material = self
            .repo
            .get_active_material(elastic_id)
            .await?
            .ok_or(KeyringError::NoActiveMaterial)?;
        self.sign_with_material(&elastic, &material, payload).await
    }

    /// `SignWithKID(tenant, elastic_id, material_kid, payload)`.
    pub async fn sign_with_kid(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
        material_kid: &str,
        payload: &[u8],
    ) -> KeyringResult<String> {
        let elastic = self.load_elastic_for_sig(tenant, elastic_id).await?;
        let material = self
            .repo
            .get_by_material_kid(material_kid)
            .await?
            .ok_or(KeyringError::NotFound)?;
        if &material.elastic_jwk_id != elastic_id {
            return Err(KeyringError::MaterialKeyDoesNotBelongToElasticJwk);
        }
        self.sign_with_material(&elastic, &material, payload).await
    }

    /// `Verify(tenant, elastic_id, compact_jws) -> payload`.
    pub async fn verify(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
        compact_jws: &str,
    ) -> KeyringResult<Vec<u8>> {
        let elastic = self
            .repo
            .get_by_id(elastic_id)
            .await?
            .ok_or(KeyringError::NotFound)?;
        if &elastic.tenant_id != tenant {
            return Err(KeyringError::NotFound);
        }

        check_compact_jws_shape(compact_jws)?;

        let sig_alg = sig_alg_of(&elastic.algorithm)
            .ok_or_else(|| KeyringError::UnsupportedAlgorithm(elastic.algorithm.clone()))?;
        let algorithm = jws_algorithm(sig_alg)
            .ok_or_else(|| KeyringError::UnsupportedAlgorithm(sig_alg.to_string()))?;

        let page = shared::primitives::PageRequest {
            offset: 0,
            limit: 1000,
        };
        let materials = self.repo.list_by_elastic_jwk(elastic_id, &page).await?;

        // Explicit filter pass over (material, Result<payload>) pairs: try every
        // material and only fail once all of them have been exhausted.
        for material in &materials.items {
            let attempt = async {
                let public_jwk =
                    decrypt_material_bytes(&material.public_jwk_jwe, self.barrier.as_ref())
                        .await?;
                let verifier = algorithm
                    .verifier_from_jwk(&public_jwk)
                    .map_err(|e| KeyringError::ParseFailed(e.to_string()))?;
                josekit::jws::deserialize_compact(compact_jws, verifier.as_ref())
                    .map(|(payload, _header)| payload)
                    .map_err(|e| KeyringError::ParseFailed(e.to_string()))
            }
            .await;

            match attempt {
                Ok(payload) => return Ok(payload),
                Err(_) => continue,
            }
        }

        Err(KeyringError::NoMatchingKeyFound)
    }
}

#[cfg(all(test, feature = "unit_test"))]
mod unit_test {
    use super::*;
    use crate::jwk_generator::JosekitJwkGenerator;
    use crate::logic::elastic_jwk::ElasticJwkService;
    use crate::test::fixtures::setup_test_repo;
    use encryption::AesGcmBarrier;

    #[tokio::test]
    async fn sign_then_verify_round_trips() {
        let repo = setup_test_repo().await;
        let barrier: Arc<dyn Barrier> = Arc::new(AesGcmBarrier::generate());
        let generator: Arc<dyn crate::jwk_generator::JwkGenerator> =
            Arc::new(JosekitJwkGenerator::new());

        let elastic_svc = ElasticJwkService::new(repo.clone(), barrier.clone(), generator);
        let jws_svc = JwsService::new(repo, barrier);

        let tenant = WrappedUuidV4::new();
        let (elastic, _) = elastic_svc
            .create_elastic_jwk(&tenant, "RS256", "sig", 10)
            .await
            .unwrap();

        let jws = jws_svc
            .sign(&tenant, &elastic.id, b"payload-bytes")
            .await
            .unwrap();
        let payload = jws_svc.verify(&tenant, &elastic.id, &jws).await.unwrap();
        assert_eq!(payload, b"payload-bytes");
    }

    #[tokio::test]
    async fn verify_rejects_garbage_compact_jws() {
        let repo = setup_test_repo().await;
        let barrier: Arc<dyn Barrier> = Arc::new(AesGcmBarrier::generate());
        let generator: Arc<dyn crate::jwk_generator::JwkGenerator> =
            Arc::new(JosekitJwkGenerator::new());

        let elastic_svc = ElasticJwkService::new(repo.clone(), barrier.clone(), generator);
        let jws_svc = JwsService::new(repo, barrier);

        let tenant = WrappedUuidV4::new();
        let (elastic, _) = elastic_svc
            .create_elastic_jwk(&tenant, "RS256", "sig", 10)
            .await
            .unwrap();

        let err = jws_svc
            .verify(&tenant, &elastic.id, "not-a-jws")
            .await
            .unwrap_err();
        assert!(matches!(err, KeyringError::ParseFailed(_)));
    }
}
