//! Top-level facade composing every sub-service behind one handle, the way a
//! caller outside this crate is expected to depend on it.

use std::sync::Arc;

use encryption::Barrier;

use crate::jwk_generator::JwkGenerator;
use crate::logic::audit_log::AuditLogService;
use crate::logic::elastic_jwk::ElasticJwkService;
use crate::logic::jwe::JweService;
use crate::logic::jwks::JwksService;
use crate::logic::jws::JwsService;
use crate::logic::jwt::JwtService;
use crate::logic::material_rotation::MaterialRotationService;
use crate::repository::{
    AuditConfigRepositoryLike, AuditLogRepositoryLike, ElasticJwkRepositoryLike,
    MaterialJwkRepositoryLike,
};

/// Constructor parameters for [`KeyringService`].
pub struct KeyringServiceParams<Repo> {
    pub repository: Repo,
    pub barrier: Arc<dyn Barrier>,
    pub generator: Arc<dyn JwkGenerator>,
}

#[derive(Clone)]
pub struct KeyringService<Repo> {
    pub elastic_jwk: ElasticJwkService<Repo>,
    pub material_rotation: MaterialRotationService<Repo>,
    pub jws: JwsService<Repo>,
    pub jwe: JweService<Repo>,
    pub jwt: JwtService<Repo>,
    pub jwks: JwksService<Repo>,
    pub audit_log: AuditLogService<Repo>,
}

impl<Repo> KeyringService<Repo>
where
    Repo: ElasticJwkRepositoryLike
        + MaterialJwkRepositoryLike
        + AuditLogRepositoryLike
        + AuditConfigRepositoryLike
        + Clone,
{
    pub fn new(params: KeyringServiceParams<Repo>) -> Self {
        let KeyringServiceParams {
            repository,
            barrier,
            generator,
        } = params;

        Self {
            elastic_jwk: ElasticJwkService::new(
                repository.clone(),
                barrier.clone(),
                generator.clone(),
            ),
            material_rotation: MaterialRotationService::new(
                repository.clone(),
                barrier.clone(),
                generator,
            ),
            jws: JwsService::new(repository.clone(), barrier.clone()),
            jwe: JweService::new(repository.clone(), barrier.clone()),
            jwt: JwtService::new(repository.clone(), barrier.clone()),
            jwks: JwksService::new(repository.clone(), barrier),
            audit_log: AuditLogService::new(repository),
        }
    }
}
