mod sqlite;

pub use sqlite::Repository;

use shared::error::CommonError;
use shared::primitives::{Page, PageRequest, WrappedUuidV4};

use crate::types::{AuditConfig, AuditLogEntry, ElasticJwk, MaterialJwk};

/// Tenant scoping is an interface concern of the service layer, not the
/// repository's: every method here takes raw ids. Callers are responsible for
/// verifying ownership before and after invoking these methods.
#[allow(async_fn_in_trait)]
pub trait ElasticJwkRepositoryLike {
    async fn create(&self, params: &ElasticJwk) -> Result<(), CommonError>;

    async fn get_by_id(&self, id: &WrappedUuidV4) -> Result<Option<ElasticJwk>, CommonError>;

    async fn list(
        &self,
        tenant_id: &WrappedUuidV4,
        page: &PageRequest,
    ) -> Result<Page<ElasticJwk>, CommonError>;

    async fn delete(&self, id: &WrappedUuidV4) -> Result<(), CommonError>;

    async fn increment_material_count(&self, id: &WrappedUuidV4) -> Result<(), CommonError>;
}

#[allow(async_fn_in_trait)]
pub trait MaterialJwkRepositoryLike {
    async fn create(&self, params: &MaterialJwk) -> Result<(), CommonError>;

    async fn get_by_id(&self, id: &WrappedUuidV4) -> Result<Option<MaterialJwk>, CommonError>;

    async fn get_by_material_kid(&self, kid: &str) -> Result<Option<MaterialJwk>, CommonError>;

    async fn get_active_material(
        &self,
        elastic_jwk_id: &WrappedUuidV4,
    ) -> Result<Option<MaterialJwk>, CommonError>;

    async fn list_by_elastic_jwk(
        &self,
        elastic_jwk_id: &WrappedUuidV4,
        page: &PageRequest,
    ) -> Result<Page<MaterialJwk>, CommonError>;

    async fn count_materials(&self, elastic_jwk_id: &WrappedUuidV4) -> Result<i64, CommonError>;

    /// Atomically clears `active` on the current active material (if any) and
    /// inserts `new_material` as the new active material.
    async fn rotate_material(
        &self,
        elastic_jwk_id: &WrappedUuidV4,
        new_material: &MaterialJwk,
    ) -> Result<(), CommonError>;

    async fn retire_material(&self, material_id: &WrappedUuidV4) -> Result<(), CommonError>;

    async fn delete(&self, material_id: &WrappedUuidV4) -> Result<(), CommonError>;
}

#[allow(async_fn_in_trait)]
pub trait AuditLogRepositoryLike {
    async fn create(&self, entry: &AuditLogEntry) -> Result<(), CommonError>;

    async fn list(
        &self,
        tenant_id: &WrappedUuidV4,
        page: &PageRequest,
    ) -> Result<Page<AuditLogEntry>, CommonError>;

    async fn list_by_elastic_jwk(
        &self,
        elastic_jwk_id: &WrappedUuidV4,
        page: &PageRequest,
    ) -> Result<Page<AuditLogEntry>, CommonError>;

    async fn list_by_operation(
        &self,
        tenant_id: &WrappedUuidV4,
        operation: &str,
        page: &PageRequest,
    ) -> Result<Page<AuditLogEntry>, CommonError>;

    async fn delete_older_than(
        &self,
        tenant_id: &WrappedUuidV4,
        days: i64,
    ) -> Result<u64, CommonError>;
}

#[allow(async_fn_in_trait)]
pub trait AuditConfigRepositoryLike {
    async fn should_audit(
        &self,
        tenant_id: &WrappedUuidV4,
        operation: &str,
    ) -> Result<AuditConfig, CommonError>;

    async fn get_all_for_tenant(
        &self,
        tenant_id: &WrappedUuidV4,
    ) -> Result<Vec<AuditConfig>, CommonError>;

    async fn upsert(&self, cfg: &AuditConfig) -> Result<(), CommonError>;
}
