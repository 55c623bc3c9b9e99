//! JWKS Service (spec component 4.7): publish public JWK sets.

use std::sync::Arc;

use encryption::Barrier;
use josekit::jwk::Jwk;
use shared::primitives::{PageRequest, WrappedUuidV4};

use crate::error::{KeyringError, KeyringResult};
use crate::logic::codec::decrypt_material_bytes;
use crate::repository::{ElasticJwkRepositoryLike, MaterialJwkRepositoryLike};
use crate::types::ElasticJwk;

const LIST_PAGE_SIZE: i64 = 1000;

fn stamp(mut jwk: Jwk, elastic: &ElasticJwk, material_kid: &str) -> Jwk {
    jwk.set_key_id(material_kid);
    jwk.set_key_use(&elastic.r#use);
    jwk.set_algorithm(&elastic.algorithm);
    jwk
}

#[derive(Clone)]
pub struct JwksService<Repo> {
    repo: Repo,
    barrier: Arc<dyn Barrier>,
}

impl<Repo> JwksService<Repo>
where
    Repo: ElasticJwkRepositoryLike + MaterialJwkRepositoryLike + Clone,
{
    pub fn new(repo: Repo, barrier: Arc<dyn Barrier>) -> Self {
        Self { repo, barrier }
    }

    /// `GetJWKS(tenant) -> { keys: [JWK] }`. Corrupted or unreadable
    /// materials are skipped — a broken key becomes a missing key, never a
    /// request-level error.
    pub async fn get_jwks(&self, tenant: &WrappedUuidV4) -> KeyringResult<Vec<Jwk>> {
        let mut keys = Vec::new();
        let mut offset = 0;
        loop {
            let page = PageRequest {
                offset,
                limit: LIST_PAGE_SIZE,
            };
            let elastics = self.repo.list(tenant, &page).await?;
            let item_count = elastics.items.len() as i64;

            for elastic in &elastics.items {
                let material = match self.repo.get_active_material(&elastic.id).await {
                    Ok(Some(m)) => m,
                    _ => continue,
                };
                let attempt =
                    decrypt_material_bytes(&material.public_jwk_jwe, self.barrier.as_ref()).await;
                if let Ok(jwk) = attempt {
                    keys.push(stamp(jwk, elastic, &material.material_kid));
                }
            }

            if item_count < page.limit {
                break;
            }
            offset += item_count;
        }
        Ok(keys)
    }

    /// `GetJWKSForElasticKey(tenant, elastic_id) -> { keys: [JWK] }`. Scoped
    /// to one elastic key and includes every non-retired material, so a
    /// rotated-but-not-retired material still publishes until explicitly
    /// retired.
    pub async fn get_jwks_for_elastic_key(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
    ) -> KeyringResult<Vec<Jwk>> {
        let elastic = self
            .repo
            .get_by_id(elastic_id)
            .await?
            .ok_or(KeyringError::NotFound)?;
        if &elastic.tenant_id != tenant {
            return Err(KeyringError::NotFound);
        }

        let mut keys = Vec::new();
        let mut offset = 0;
        loop {
            let page = PageRequest {
                offset,
                limit: LIST_PAGE_SIZE,
            };
            let materials = self.repo.list_by_elastic_jwk(elastic_id, &page).await?;
            let item_count = materials.items.len() as i64;

            for material in &materials.items {
                if material.retired_at.is_some() {
                    continue;
                }
                let attempt =
                    decrypt_material_bytes(&material.public_jwk_jwe, self.barrier.as_ref()).await;
                if let Ok(jwk) = attempt {
                    keys.push(stamp(jwk, &elastic, &material.material_kid));
                }
            }

            if item_count < page.limit {
                break;
            }
            offset += item_count;
        }
        Ok(keys)
    }

    /// `GetPublicJWK(tenant, kid) -> JWK`. Strict: decode/parse errors
    /// propagate instead of being skipped.
    pub async fn get_public_jwk(
        &self,
        tenant: &WrappedUuidV4,
        material_kid: &str,
    ) -> KeyringResult<Jwk> {
        let material = self
            .repo
            .get_by_material_kid(material_kid)
            .await?
            .ok_or(KeyringError::NotFound)?;
        let elastic = self
            .repo
            .get_by_id(&material.elastic_jwk_id)
            .await?
            .ok_or(KeyringError::NotFound)?;
        if &elastic.tenant_id != tenant {
            return Err(KeyringError::NotFound);
        }

        let jwk = decrypt_material_bytes(&material.public_jwk_jwe, self.barrier.as_ref()).await?;
        Ok(stamp(jwk, &elastic, &material.material_kid))
    }
}

#[cfg(all(test, feature = "unit_test"))]
mod unit_test {
    use super::*;
    use crate::jwk_generator::JosekitJwkGenerator;
    use crate::logic::elastic_jwk::ElasticJwkService;
    use crate::logic::material_rotation::MaterialRotationService;
    use crate::test::fixtures::setup_test_repo;
    use encryption::AesGcmBarrier;

    async fn services() -> (
        ElasticJwkService<crate::repository::Repository>,
        MaterialRotationService<crate::repository::Repository>,
        JwksService<crate::repository::Repository>,
    ) {
        let repo = setup_test_repo().await;
        let barrier: Arc<dyn Barrier> = Arc::new(AesGcmBarrier::generate());
        let generator: Arc<dyn crate::jwk_generator::JwkGenerator> =
            Arc::new(JosekitJwkGenerator::new());
        (
            ElasticJwkService::new(repo.clone(), barrier.clone(), generator.clone()),
            MaterialRotationService::new(repo.clone(), barrier.clone(), generator),
            JwksService::new(repo, barrier),
        )
    }

    #[tokio::test]
    async fn get_jwks_includes_only_active_materials() {
        let (elastic_svc, _rotation_svc, jwks_svc) = services().await;
        let tenant = WrappedUuidV4::new();
        elastic_svc
            .create_elastic_jwk(&tenant, "RS256", "sig", 10)
            .await
            .unwrap();

        let keys = jwks_svc.get_jwks(&tenant).await.unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[tokio::test]
    async fn get_jwks_for_elastic_key_includes_rotated_not_yet_retired_material() {
        let (elastic_svc, rotation_svc, jwks_svc) = services().await;
        let tenant = WrappedUuidV4::new();
        let (elastic, _) = elastic_svc
            .create_elastic_jwk(&tenant, "RS256", "sig", 10)
            .await
            .unwrap();

        rotation_svc
            .rotate_material(&tenant, &elastic.id)
            .await
            .unwrap();

        let keys = jwks_svc
            .get_jwks_for_elastic_key(&tenant, &elastic.id)
            .await
            .unwrap();
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn get_public_jwk_cross_tenant_is_not_found() {
        let (elastic_svc, _rotation_svc, jwks_svc) = services().await;
        let tenant_a = WrappedUuidV4::new();
        let tenant_b = WrappedUuidV4::new();
        let (_, material) = elastic_svc
            .create_elastic_jwk(&tenant_a, "RS256", "sig", 10)
            .await
            .unwrap();

        let err = jwks_svc
            .get_public_jwk(&tenant_b, &material.material_kid)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyringError::NotFound));
    }
}
