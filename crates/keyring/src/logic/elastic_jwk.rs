//! ElasticJWK Service (spec component 4.2): create/get/list/delete long-lived
//! logical keys, cascading material deletion.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use encryption::Barrier;
use shared::primitives::{Page, PageRequest, WrappedChronoDateTime, WrappedUuidV4};
use tracing::warn;

use crate::algorithm::key_type_of;
use crate::error::{KeyringError, KeyringResult};
use crate::jwk_generator::JwkGenerator;
use crate::repository::{ElasticJwkRepositoryLike, MaterialJwkRepositoryLike};
use crate::types::{DEFAULT_MAX_MATERIALS, ElasticJwk, KeyUse, MaterialJwk};

/// Generates a fresh material, seals it behind the barrier, and returns the
/// row ready to persist. Shared between `CreateElasticJWK` and `RotateMaterial`.
pub(crate) async fn create_material_jwk(
    elastic: &ElasticJwk,
    barrier: &dyn Barrier,
    generator: &dyn JwkGenerator,
    gen_alg: &str,
    active: bool,
) -> KeyringResult<MaterialJwk> {
    let material_id = WrappedUuidV4::new();
    let mut generated = generator.generate(gen_alg).await?;
    let material_kid = generated.kid.take().unwrap_or_else(|| material_id.to_string());

    generated.private_jwk.set_key_id(&material_kid);
    if let Some(public_jwk) = generated.public_jwk.as_mut() {
        public_jwk.set_key_id(&material_kid);
    }

    let public_bytes = generated
        .public_bytes
        .unwrap_or_else(|| generated.private_bytes.clone());

    let private_ct = barrier
        .encrypt_content(generated.private_bytes)
        .await
        .map_err(KeyringError::from)?;
    let public_ct = barrier
        .encrypt_content(public_bytes)
        .await
        .map_err(KeyringError::from)?;

    Ok(MaterialJwk {
        id: material_id,
        elastic_jwk_id: elastic.id.clone(),
        material_kid,
        private_jwk_jwe: BASE64.encode(private_ct),
        public_jwk_jwe: BASE64.encode(public_ct),
        active,
        retired_at: None,
        barrier_version: 1,
        created_at: WrappedChronoDateTime::now(),
    })
}

#[derive(Clone)]
pub struct ElasticJwkService<Repo> {
    repo: Repo,
    barrier: Arc<dyn Barrier>,
    generator: Arc<dyn JwkGenerator>,
}

impl<Repo> ElasticJwkService<Repo>
where
    Repo: ElasticJwkRepositoryLike + MaterialJwkRepositoryLike + Clone,
{
    pub fn new(repo: Repo, barrier: Arc<dyn Barrier>, generator: Arc<dyn JwkGenerator>) -> Self {
        Self {
            repo,
            barrier,
            generator,
        }
    }

    pub async fn create_elastic_jwk(
        &self,
        tenant: &WrappedUuidV4,
        algorithm: &str,
        key_use: &str,
        max_materials: i64,
    ) -> KeyringResult<(ElasticJwk, MaterialJwk)> {
        let key_type = key_type_of(algorithm)
            .ok_or_else(|| KeyringError::InvalidAlgorithm(algorithm.to_string()))?;
        let key_use: KeyUse = key_use
            .parse()
            .map_err(|_| KeyringError::InvalidKeyUse(key_use.to_string()))?;

        let max_materials = if max_materials <= 0 {
            DEFAULT_MAX_MATERIALS
        } else {
            max_materials
        };

        let id = WrappedUuidV4::new();
        let elastic = ElasticJwk {
            id: id.clone(),
            tenant_id: tenant.clone(),
            kid: id.to_string(),
            key_type: key_type.as_str().to_string(),
            algorithm: algorithm.to_string(),
            r#use: key_use.as_str().to_string(),
            max_materials,
            current_material_count: 1,
            created_at: WrappedChronoDateTime::now(),
        };

        self.repo.create(&elastic).await?;

        let gen_alg = crate::algorithm::gen_alg_of(algorithm)
            .ok_or_else(|| KeyringError::InvalidAlgorithm(algorithm.to_string()))?;

        match create_material_jwk(&elastic, self.barrier.as_ref(), self.generator.as_ref(), gen_alg, true)
            .await
        {
            Ok(material) => {
                self.repo.create(&material).await?;
                Ok((elastic, material))
            }
            Err(e) => {
                // Best-effort cleanup: the elastic row is orphaned otherwise.
                // The cleanup's own failure is swallowed (see DESIGN.md Open Question 1).
                if let Err(cleanup_err) = self.repo.delete(&elastic.id).await {
                    warn!(
                        elastic_jwk_id = %elastic.id,
                        error = %cleanup_err,
                        "failed to clean up elastic jwk after material creation failure"
                    );
                }
                Err(e)
            }
        }
    }

    pub async fn get_elastic_jwk(
        &self,
        tenant: &WrappedUuidV4,
        id: &WrappedUuidV4,
    ) -> KeyringResult<ElasticJwk> {
        let elastic = self.repo.get_by_id(id).await?.ok_or(KeyringError::NotFound)?;
        if &elastic.tenant_id != tenant {
            return Err(KeyringError::NotFound);
        }
        Ok(elastic)
    }

    pub async fn list_elastic_jwks(
        &self,
        tenant: &WrappedUuidV4,
        page: &PageRequest,
    ) -> KeyringResult<Page<ElasticJwk>> {
        Ok(self.repo.list(tenant, page).await?)
    }

    pub async fn delete_elastic_jwk(
        &self,
        tenant: &WrappedUuidV4,
        id: &WrappedUuidV4,
    ) -> KeyringResult<()> {
        // Ownership check first: tenant mismatch and missing entity are
        // deliberately indistinguishable.
        self.get_elastic_jwk(tenant, id).await?;

        let page = PageRequest {
            offset: 0,
            limit: 100,
        };
        loop {
            let materials = self.repo.list_by_elastic_jwk(id, &page).await?;
            if materials.items.is_empty() {
                break;
            }
            for material in &materials.items {
                self.repo.delete(&material.id).await?;
            }
            if (materials.items.len() as i64) < page.limit {
                break;
            }
        }

        // The elastic row is deleted last so a mid-cascade crash leaves a
        // consistent "row still exists, fewer materials" state.
        self.repo.delete(id).await?;
        Ok(())
    }
}

#[cfg(all(test, feature = "unit_test"))]
mod unit_test {
    use super::*;
    use crate::jwk_generator::JosekitJwkGenerator;
    use crate::test::fixtures::setup_test_repo;
    use encryption::AesGcmBarrier;

    async fn service() -> ElasticJwkService<crate::repository::Repository> {
        let repo = setup_test_repo().await;
        ElasticJwkService::new(
            repo,
            Arc::new(AesGcmBarrier::generate()),
            Arc::new(JosekitJwkGenerator::new()),
        )
    }

    #[tokio::test]
    async fn create_yields_one_active_material() {
        let svc = service().await;
        let tenant = WrappedUuidV4::new();
        let (elastic, material) = svc
            .create_elastic_jwk(&tenant, "RS256", "sig", 10)
            .await
            .unwrap();
        assert_eq!(elastic.current_material_count, 1);
        assert!(material.active);
    }

    #[tokio::test]
    async fn create_rejects_unknown_algorithm() {
        let svc = service().await;
        let tenant = WrappedUuidV4::new();
        let err = svc
            .create_elastic_jwk(&tenant, "bogus", "sig", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyringError::InvalidAlgorithm(_)));
    }

    #[tokio::test]
    async fn create_rejects_invalid_key_use() {
        let svc = service().await;
        let tenant = WrappedUuidV4::new();
        let err = svc
            .create_elastic_jwk(&tenant, "RS256", "sigma", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyringError::InvalidKeyUse(_)));
    }

    #[tokio::test]
    async fn get_cross_tenant_is_not_found() {
        let svc = service().await;
        let tenant_a = WrappedUuidV4::new();
        let tenant_b = WrappedUuidV4::new();
        let (elastic, _) = svc
            .create_elastic_jwk(&tenant_a, "RS256", "sig", 10)
            .await
            .unwrap();

        let err = svc.get_elastic_jwk(&tenant_b, &elastic.id).await.unwrap_err();
        assert!(matches!(err, KeyringError::NotFound));
    }

    #[tokio::test]
    async fn delete_cascades_materials() {
        let svc = service().await;
        let tenant = WrappedUuidV4::new();
        let (elastic, _) = svc
            .create_elastic_jwk(&tenant, "RS256", "sig", 10)
            .await
            .unwrap();

        svc.delete_elastic_jwk(&tenant, &elastic.id).await.unwrap();

        let err = svc.get_elastic_jwk(&tenant, &elastic.id).await.unwrap_err();
        assert!(matches!(err, KeyringError::NotFound));
    }
}
