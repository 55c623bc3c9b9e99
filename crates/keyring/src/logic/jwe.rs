//! JWE Service (spec component 4.5): encrypt/decrypt under an elastic key's
//! active or named material, gated on `use=enc`.

use std::sync::Arc;

use encryption::Barrier;
use josekit::jwe::JweAlgorithm;
use shared::primitives::{PageRequest, WrappedUuidV4};

use crate::algorithm::jwe_pair_of;
use crate::error::{KeyringError, KeyringResult};
use crate::logic::codec::decrypt_material_bytes;
use crate::repository::{ElasticJwkRepositoryLike, MaterialJwkRepositoryLike};
use crate::types::{ElasticJwk, KeyUse, MaterialJwk};

fn jwe_algorithm(alg: &str) -> Option<&'static dyn JweAlgorithm> {
    match alg {
        "RSA-OAEP-256" => Some(&josekit::jwe::RSA_OAEP_256),
        "ECDH-ES+A256KW" => Some(&josekit::jwe::ECDH_ES_A256KW),
        "dir" => Some(&josekit::jwe::DIRECT),
        "A128KW" => Some(&josekit::jwe::A128KW),
        "A192KW" => Some(&josekit::jwe::A192KW),
        "A256KW" => Some(&josekit::jwe::A256KW),
        "A128GCMKW" => Some(&josekit::jwe::A128GCMKW),
        "A192GCMKW" => Some(&josekit::jwe::A192GCMKW),
        "A256GCMKW" => Some(&josekit::jwe::A256GCMKW),
        _ => None,
    }
}

#[derive(Clone)]
pub struct JweService<Repo> {
    repo: Repo,
    barrier: Arc<dyn Barrier>,
}

impl<Repo> JweService<Repo>
where
    Repo: ElasticJwkRepositoryLike + MaterialJwkRepositoryLike + Clone,
{
    pub fn new(repo: Repo, barrier: Arc<dyn Barrier>) -> Self {
        Self { repo, barrier }
    }

    async fn load_elastic_for_enc(
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
        if elastic.r#use != KeyUse::Enc.as_str() {
            return Err(KeyringError::WrongKeyUse);
        }
        Ok(elastic)
    }

    async fn encrypt_with_material(
        &self,
        elastic: &ElasticJwk,
        material: &MaterialJwk,
        plaintext: &[u8],
        content_type: Option<&str>,
    ) -> KeyringResult<String> {
        let (key_alg, content_enc) = jwe_pair_of(&elastic.algorithm)
            .ok_or_else(|| KeyringError::UnsupportedAlgorithm(elastic.algorithm.clone()))?;
        let algorithm = jwe_algorithm(key_alg)
            .ok_or_else(|| KeyringError::UnsupportedAlgorithm(key_alg.to_string()))?;

        // Symmetric keys use the private JWK as their own public form.
        let public_jwk =
            decrypt_material_bytes(&material.public_jwk_jwe, self.barrier.as_ref()).await?;

        let encrypter = algorithm
            .encrypter_from_jwk(&public_jwk)
            .map_err(|e| KeyringError::ParseFailed(e.to_string()))?;

        let mut header = josekit::jwe::JweHeader::new();
        header.set_key_id(&material.material_kid);
        header.set_algorithm(key_alg);
        header.set_content_encryption(content_enc);
        if let Some(cty) = content_type {
            header.set_content_type(cty);
        }

        josekit::jwe::serialize_compact(plaintext, &header, encrypter.as_ref())
            .map_err(|e| KeyringError::ParseFailed(e.to_string()))
    }

    /// `Encrypt(tenant, elastic_id, plaintext) -> compact_jwe`.
    pub async fn encrypt(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
        plaintext: &[u8],
    ) -> KeyringResult<String> {
        let elastic = self.load_elastic_for_enc(tenant, elastic_id).await?;
        let material = self
            .repo
            .get_active_material(elastic_id)
            .await?
            .ok_or(KeyringError::NoActiveMaterial)?;
        self.encrypt_with_material(&elastic, &material, plaintext, None)
            .await
    }

    /// `EncryptWithKID`, mirroring `SignWithKID`'s ownership check.
    pub async fn encrypt_with_kid(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
        material_kid: &str,
        plaintext: &[u8],
    ) -> KeyringResult<String> {
        let elastic = self.load_elastic_for_enc(tenant, elastic_id).await?;
        let material = self
            .repo
            .get_by_material_kid(material_kid)
            .await?
            .ok_or(KeyringError::NotFound)?;
        if &material.elastic_jwk_id != elastic_id {
            return Err(KeyringError::MaterialKeyDoesNotBelongToElasticJwk);
        }
        self.encrypt_with_material(&elastic, &material, plaintext, None)
            .await
    }

    /// Used by the JWT service to produce nested signed-then-encrypted JWTs.
    pub(crate) async fn encrypt_with_content_type(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
        plaintext: &[u8],
        content_type: &str,
    ) -> KeyringResult<String> {
        let elastic = self.load_elastic_for_enc(tenant, elastic_id).await?;
        let material = self
            .repo
            .get_active_material(elastic_id)
            .await?
            .ok_or(KeyringError::NoActiveMaterial)?;
        self.encrypt_with_material(&elastic, &material, plaintext, Some(content_type))
            .await
    }

    /// `Decrypt(tenant, elastic_id, compact_jwe) -> plaintext`.
    pub async fn decrypt(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
        compact_jwe: &str,
    ) -> KeyringResult<Vec<u8>> {
        let elastic = self
            .repo
            .get_by_id(elastic_id)
            .await?
            .ok_or(KeyringError::NotFound)?;
        if &elastic.tenant_id != tenant {
            return Err(KeyringError::NotFound);
        }

        let parts: Vec<&str> = compact_jwe.split('.').collect();
        if parts.len() != 5 {
            return Err(KeyringError::ParseFailed(
                "compact JWE must have five dot-separated parts".to_string(),
            ));
        }

        let (key_alg, _content_enc) = jwe_pair_of(&elastic.algorithm)
            .ok_or_else(|| KeyringError::UnsupportedAlgorithm(elastic.algorithm.clone()))?;
        let algorithm = jwe_algorithm(key_alg)
            .ok_or_else(|| KeyringError::UnsupportedAlgorithm(key_alg.to_string()))?;

        let page = PageRequest {
            offset: 0,
            limit: 1000,
        };
        let materials = self.repo.list_by_elastic_jwk(elastic_id, &page).await?;

        for material in &materials.items {
            let attempt = async {
                let private_jwk =
                    decrypt_material_bytes(&material.private_jwk_jwe, self.barrier.as_ref())
                        .await?;
                let decrypter = algorithm
                    .decrypter_from_jwk(&private_jwk)
                    .map_err(|e| KeyringError::ParseFailed(e.to_string()))?;
                josekit::jwe::deserialize_compact(compact_jwe, decrypter.as_ref())
                    .map(|(plaintext, _header)| plaintext)
                    .map_err(|e| KeyringError::ParseFailed(e.to_string()))
            }
            .await;

            match attempt {
                Ok(plaintext) => return Ok(plaintext),
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
    async fn encrypt_then_decrypt_round_trips_symmetric_key() {
        let repo = setup_test_repo().await;
        let barrier: Arc<dyn Barrier> = Arc::new(AesGcmBarrier::generate());
        let generator: Arc<dyn crate::jwk_generator::JwkGenerator> =
            Arc::new(JosekitJwkGenerator::new());

        let elastic_svc = ElasticJwkService::new(repo.clone(), barrier.clone(), generator);
        let jwe_svc = JweService::new(repo, barrier);

        let tenant = WrappedUuidV4::new();
        let (elastic, _) = elastic_svc
            .create_elastic_jwk(&tenant, "oct/256", "enc", 10)
            .await
            .unwrap();

        let jwe = jwe_svc
            .encrypt(&tenant, &elastic.id, b"secret message for symmetric key")
            .await
            .unwrap();
        let plaintext = jwe_svc.decrypt(&tenant, &elastic.id, &jwe).await.unwrap();
        assert_eq!(plaintext, b"secret message for symmetric key");
    }

    #[tokio::test]
    async fn encrypt_rejects_signing_key() {
        let repo = setup_test_repo().await;
        let barrier: Arc<dyn Barrier> = Arc::new(AesGcmBarrier::generate());
        let generator: Arc<dyn crate::jwk_generator::JwkGenerator> =
            Arc::new(JosekitJwkGenerator::new());

        let elastic_svc = ElasticJwkService::new(repo.clone(), barrier.clone(), generator);
        let jwe_svc = JweService::new(repo, barrier);

        let tenant = WrappedUuidV4::new();
        let (elastic, _) = elastic_svc
            .create_elastic_jwk(&tenant, "RS256", "sig", 10)
            .await
            .unwrap();

        let err = jwe_svc
            .encrypt(&tenant, &elastic.id, b"data")
            .await
            .unwrap_err();
        assert!(matches!(err, KeyringError::WrongKeyUse));
    }
}
