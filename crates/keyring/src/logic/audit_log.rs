//! AuditLog Service (spec component 4.8): record operations, with
//! configurable per-operation sampling, and paginated retrieval/cleanup.

use rand::Rng;
use shared::primitives::{Page, PageRequest, WrappedChronoDateTime, WrappedUuidV4};
use tracing::warn;

use crate::error::KeyringResult;
use crate::repository::{AuditConfigRepositoryLike, AuditLogRepositoryLike, ElasticJwkRepositoryLike};
use crate::types::{AuditConfig, AuditLogEntry};

#[derive(Clone)]
pub struct AuditLogService<Repo> {
    repo: Repo,
}

impl<Repo> AuditLogService<Repo>
where
    Repo: AuditLogRepositoryLike + AuditConfigRepositoryLike + ElasticJwkRepositoryLike,
{
    pub fn new(repo: Repo) -> Self {
        Self { repo }
    }

    fn should_write(cfg: &AuditConfig) -> bool {
        if !cfg.enabled {
            return false;
        }
        if cfg.sampling_rate >= 1.0 {
            return true;
        }
        if cfg.sampling_rate <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_bool(cfg.sampling_rate)
    }

    /// `LogOperation(tenant, elastic_id?, operation, request_id, success, error?)`.
    ///
    /// Never propagates its own errors to the instrumented caller (spec
    /// "Propagation policy"): a config-fetch failure fails open on writing
    /// (defaults to "audit everything") but fail-closed on visibility, since
    /// the default config is also what `GetAuditConfig` returns.
    pub async fn log_operation(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: Option<&WrappedUuidV4>,
        operation: &str,
        request_id: &str,
        success: bool,
        error: Option<&str>,
    ) -> KeyringResult<()> {
        let cfg = match self.repo.should_audit(tenant, operation).await {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(
                    tenant_id = %tenant,
                    operation,
                    error = %e,
                    "failed to fetch audit config, defaulting to audit-everything"
                );
                AuditConfig::default_for(tenant.clone(), operation)
            }
        };

        if !Self::should_write(&cfg) {
            return Ok(());
        }

        let entry = AuditLogEntry {
            id: WrappedUuidV4::new(),
            tenant_id: tenant.clone(),
            elastic_jwk_id: elastic_id.cloned(),
            operation: operation.to_string(),
            success,
            error_message: error.map(str::to_string),
            request_id: request_id.to_string(),
            created_at: WrappedChronoDateTime::now(),
        };

        if let Err(e) = self.repo.create(&entry).await {
            warn!(tenant_id = %tenant, operation, error = %e, "failed to write audit log entry");
        }
        Ok(())
    }

    pub async fn list_audit_logs(
        &self,
        tenant: &WrappedUuidV4,
        page: &PageRequest,
    ) -> KeyringResult<Page<AuditLogEntry>> {
        Ok(self.repo.list(tenant, page).await?)
    }

    pub async fn list_audit_logs_by_elastic_jwk(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
        page: &PageRequest,
    ) -> KeyringResult<Page<AuditLogEntry>> {
        let elastic = self
            .repo
            .get_by_id(elastic_id)
            .await?
            .ok_or(crate::error::KeyringError::NotFound)?;
        if &elastic.tenant_id != tenant {
            return Err(crate::error::KeyringError::NotFound);
        }
        Ok(self.repo.list_by_elastic_jwk(elastic_id, page).await?)
    }

    pub async fn list_audit_logs_by_operation(
        &self,
        tenant: &WrappedUuidV4,
        operation: &str,
        page: &PageRequest,
    ) -> KeyringResult<Page<AuditLogEntry>> {
        Ok(self.repo.list_by_operation(tenant, operation, page).await?)
    }

    /// `GetAuditConfig(tenant)`. Returns the first config for the tenant, or
    /// a default that audits every operation at 100% sampling.
    pub async fn get_audit_config(&self, tenant: &WrappedUuidV4) -> KeyringResult<AuditConfig> {
        let configs = self.repo.get_all_for_tenant(tenant).await?;
        Ok(configs
            .into_iter()
            .next()
            .unwrap_or_else(|| AuditConfig::default_for(tenant.clone(), "*")))
    }

    /// `UpdateAuditConfig(tenant, cfg)`. Stamps `tenant` onto the config and
    /// upserts it keyed by `(tenant, operation)`.
    pub async fn update_audit_config(
        &self,
        tenant: &WrappedUuidV4,
        mut cfg: AuditConfig,
    ) -> KeyringResult<()> {
        cfg.tenant_id = tenant.clone();
        self.repo.upsert(&cfg).await?;
        Ok(())
    }

    pub async fn cleanup_old_logs(
        &self,
        tenant: &WrappedUuidV4,
        days: i64,
    ) -> KeyringResult<u64> {
        Ok(self.repo.delete_older_than(tenant, days).await?)
    }
}

#[cfg(all(test, feature = "unit_test"))]
mod unit_test {
    use super::*;
    use crate::test::fixtures::setup_test_repo;

    #[tokio::test]
    async fn log_operation_respects_disabled_config() {
        let repo = setup_test_repo().await;
        let svc = AuditLogService::new(repo);
        let tenant = WrappedUuidV4::new();

        svc.update_audit_config(
            &tenant,
            AuditConfig {
                tenant_id: tenant.clone(),
                operation: "sign".to_string(),
                enabled: false,
                sampling_rate: 0.0,
            },
        )
        .await
        .unwrap();

        svc.log_operation(&tenant, None, "sign", "req-1", true, None)
            .await
            .unwrap();

        let page = PageRequest {
            offset: 0,
            limit: 10,
        };
        let logs = svc.list_audit_logs(&tenant, &page).await.unwrap();
        assert_eq!(logs.items.len(), 0);
    }

    #[tokio::test]
    async fn log_operation_writes_when_sampling_rate_is_one() {
        let repo = setup_test_repo().await;
        let svc = AuditLogService::new(repo);
        let tenant = WrappedUuidV4::new();

        svc.update_audit_config(
            &tenant,
            AuditConfig {
                tenant_id: tenant.clone(),
                operation: "sign".to_string(),
                enabled: true,
                sampling_rate: 1.0,
            },
        )
        .await
        .unwrap();

        svc.log_operation(&tenant, None, "sign", "req-1", true, None)
            .await
            .unwrap();

        let page = PageRequest {
            offset: 0,
            limit: 10,
        };
        let logs = svc.list_audit_logs(&tenant, &page).await.unwrap();
        assert_eq!(logs.items.len(), 1);
    }

    #[tokio::test]
    async fn get_audit_config_defaults_when_absent() {
        let repo = setup_test_repo().await;
        let svc = AuditLogService::new(repo);
        let tenant = WrappedUuidV4::new();

        let cfg = svc.get_audit_config(&tenant).await.unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.sampling_rate, 1.0);
    }

    #[tokio::test]
    async fn list_by_operation_filters_correctly() {
        let repo = setup_test_repo().await;
        let svc = AuditLogService::new(repo);
        let tenant = WrappedUuidV4::new();

        svc.log_operation(&tenant, None, "sign", "req-1", true, None)
            .await
            .unwrap();
        svc.log_operation(&tenant, None, "encrypt", "req-2", true, None)
            .await
            .unwrap();

        let page = PageRequest {
            offset: 0,
            limit: 10,
        };
        let signs = svc
            .list_audit_logs_by_operation(&tenant, "sign", &page)
            .await
            .unwrap();
        assert_eq!(signs.items.len(), 1);
        assert_eq!(signs.items[0].operation, "sign");
    }
}
