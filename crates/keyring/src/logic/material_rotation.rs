//! MaterialRotation Service (spec component 4.3): the ACTIVE/INACTIVE/RETIRED
//! state machine for a single elastic key's materials.

use std::sync::Arc;

use encryption::Barrier;
use shared::primitives::{Page, PageRequest, WrappedUuidV4};

use crate::error::{KeyringError, KeyringResult};
use crate::jwk_generator::JwkGenerator;
use crate::logic::elastic_jwk::create_material_jwk;
use crate::repository::{ElasticJwkRepositoryLike, MaterialJwkRepositoryLike};
use crate::types::MaterialJwk;

#[derive(Clone)]
pub struct MaterialRotationService<Repo> {
    repo: Repo,
    barrier: Arc<dyn Barrier>,
    generator: Arc<dyn JwkGenerator>,
}

impl<Repo> MaterialRotationService<Repo>
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

    async fn load_owned_elastic(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
    ) -> KeyringResult<crate::types::ElasticJwk> {
        let elastic = self
            .repo
            .get_by_id(elastic_id)
            .await?
            .ok_or(KeyringError::NotFound)?;
        if &elastic.tenant_id != tenant {
            return Err(KeyringError::NotFound);
        }
        Ok(elastic)
    }

    pub async fn rotate_material(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
    ) -> KeyringResult<MaterialJwk> {
        let elastic = self.load_owned_elastic(tenant, elastic_id).await?;

        let count = self.repo.count_materials(elastic_id).await?;
        if count >= elastic.max_materials {
            return Err(KeyringError::MaxMaterialsReached);
        }

        let gen_alg = crate::algorithm::gen_alg_of(&elastic.algorithm)
            .ok_or_else(|| KeyringError::InvalidAlgorithm(elastic.algorithm.clone()))?;

        let new_material = create_material_jwk(
            &elastic,
            self.barrier.as_ref(),
            self.generator.as_ref(),
            gen_alg,
            true,
        )
        .await?;

        self.repo
            .rotate_material(elastic_id, &new_material)
            .await?;

        // Advisory counter: failure is logged, not propagated.
        if let Err(e) = self.repo.increment_material_count(elastic_id).await {
            tracing::warn!(
                elastic_jwk_id = %elastic_id,
                error = %e,
                "failed to increment advisory material counter after rotation"
            );
        }

        Ok(new_material)
    }

    pub async fn retire_material(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
        material_id: &WrappedUuidV4,
    ) -> KeyringResult<()> {
        self.load_owned_elastic(tenant, elastic_id).await?;

        let material = self
            .repo
            .get_by_id(material_id)
            .await?
            .ok_or(KeyringError::NotFound)?;
        if &material.elastic_jwk_id != elastic_id {
            return Err(KeyringError::MaterialKeyDoesNotBelongToElasticJwk);
        }

        self.repo.retire_material(material_id).await?;
        Ok(())
    }

    pub async fn list_materials(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
        page: &PageRequest,
    ) -> KeyringResult<Page<MaterialJwk>> {
        self.load_owned_elastic(tenant, elastic_id).await?;
        Ok(self.repo.list_by_elastic_jwk(elastic_id, page).await?)
    }

    pub async fn get_active_material(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
    ) -> KeyringResult<MaterialJwk> {
        self.load_owned_elastic(tenant, elastic_id).await?;
        self.repo
            .get_active_material(elastic_id)
            .await?
            .ok_or(KeyringError::NoActiveMaterial)
    }

    pub async fn get_material_by_kid(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
        kid: &str,
    ) -> KeyringResult<MaterialJwk> {
        self.load_owned_elastic(tenant, elastic_id).await?;
        let material = self
            .repo
            .get_by_material_kid(kid)
            .await?
            .ok_or(KeyringError::NotFound)?;
        if &material.elastic_jwk_id != elastic_id {
            return Err(KeyringError::MaterialKeyDoesNotBelongToElasticJwk);
        }
        Ok(material)
    }
}

#[cfg(all(test, feature = "unit_test"))]
mod unit_test {
    use super::*;
    use crate::jwk_generator::JosekitJwkGenerator;
    use crate::logic::elastic_jwk::ElasticJwkService;
    use crate::test::fixtures::setup_test_repo;
    use encryption::AesGcmBarrier;

    async fn services() -> (
        ElasticJwkService<crate::repository::Repository>,
        MaterialRotationService<crate::repository::Repository>,
    ) {
        let repo = setup_test_repo().await;
        let barrier: Arc<dyn Barrier> = Arc::new(AesGcmBarrier::generate());
        let generator: Arc<dyn JwkGenerator> = Arc::new(JosekitJwkGenerator::new());
        (
            ElasticJwkService::new(repo.clone(), barrier.clone(), generator.clone()),
            MaterialRotationService::new(repo, barrier, generator),
        )
    }

    #[tokio::test]
    async fn rotate_makes_newest_material_active() {
        let (elastic_svc, rotation_svc) = services().await;
        let tenant = WrappedUuidV4::new();
        let (elastic, m1) = elastic_svc
            .create_elastic_jwk(&tenant, "RS256", "sig", 5)
            .await
            .unwrap();

        let m2 = rotation_svc
            .rotate_material(&tenant, &elastic.id)
            .await
            .unwrap();

        assert!(m2.active);
        assert_ne!(m1.id, m2.id);

        let active = rotation_svc
            .get_active_material(&tenant, &elastic.id)
            .await
            .unwrap();
        assert_eq!(active.id, m2.id);
    }

    #[tokio::test]
    async fn rotate_enforces_max_materials() {
        let (elastic_svc, rotation_svc) = services().await;
        let tenant = WrappedUuidV4::new();
        let (elastic, _) = elastic_svc
            .create_elastic_jwk(&tenant, "RS256", "sig", 2)
            .await
            .unwrap();

        rotation_svc.rotate_material(&tenant, &elastic.id).await.unwrap();

        let err = rotation_svc
            .rotate_material(&tenant, &elastic.id)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyringError::MaxMaterialsReached));
    }

    #[tokio::test]
    async fn retire_clears_active_flag() {
        let (elastic_svc, rotation_svc) = services().await;
        let tenant = WrappedUuidV4::new();
        let (elastic, m1) = elastic_svc
            .create_elastic_jwk(&tenant, "RS256", "sig", 5)
            .await
            .unwrap();

        rotation_svc
            .retire_material(&tenant, &elastic.id, &m1.id)
            .await
            .unwrap();

        let err = rotation_svc
            .get_active_material(&tenant, &elastic.id)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyringError::NoActiveMaterial));
    }
}
