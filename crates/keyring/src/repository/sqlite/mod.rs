use anyhow::Context;
use libsql::params;
use shared::error::CommonError;
use shared::primitives::{
    Page, PageRequest, SqlMigrationLoader, WrappedChronoDateTime, WrappedUuidV4,
};
use shared_macros::load_sql_migrations;
use std::collections::BTreeMap;

use crate::repository::{
    AuditConfigRepositoryLike, AuditLogRepositoryLike, ElasticJwkRepositoryLike,
    MaterialJwkRepositoryLike,
};
use crate::types::{AuditConfig, AuditLogEntry, ElasticJwk, MaterialJwk};

#[derive(Clone)]
pub struct Repository {
    conn: shared::libsql::Connection,
}

impl Repository {
    pub fn new(conn: shared::libsql::Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &shared::libsql::Connection {
        &self.conn
    }
}

impl SqlMigrationLoader for Repository {
    fn load_sql_migrations() -> BTreeMap<&'static str, BTreeMap<&'static str, &'static str>> {
        load_sql_migrations!("migrations")
    }
}

fn repo_err(context: &str, e: impl std::fmt::Display + Into<anyhow::Error>) -> CommonError {
    let source: anyhow::Error = e.into();
    CommonError::Repository {
        msg: format!("{context}: {source}"),
        source: Some(source),
    }
}

fn elastic_jwk_from_row(row: &libsql::Row) -> Result<ElasticJwk, CommonError> {
    Ok(ElasticJwk {
        id: WrappedUuidV4::try_from(row.get::<String>(0).map_err(anyhow::Error::from)?)
            .map_err(|e| repo_err("invalid id", e))?,
        tenant_id: WrappedUuidV4::try_from(row.get::<String>(1).map_err(anyhow::Error::from)?)
            .map_err(|e| repo_err("invalid tenant_id", e))?,
        kid: row.get::<String>(2).map_err(anyhow::Error::from)?,
        key_type: row.get::<String>(3).map_err(anyhow::Error::from)?,
        algorithm: row.get::<String>(4).map_err(anyhow::Error::from)?,
        r#use: row.get::<String>(5).map_err(anyhow::Error::from)?,
        max_materials: row.get::<i64>(6).map_err(anyhow::Error::from)?,
        current_material_count: row.get::<i64>(7).map_err(anyhow::Error::from)?,
        created_at: WrappedChronoDateTime::try_from(
            row.get::<String>(8).map_err(anyhow::Error::from)?,
        )
        .map_err(|e| repo_err("invalid created_at", e))?,
    })
}

fn material_jwk_from_row(row: &libsql::Row) -> Result<MaterialJwk, CommonError> {
    let retired_at = row
        .get::<Option<String>>(6)
        .map_err(anyhow::Error::from)?
        .map(WrappedChronoDateTime::try_from)
        .transpose()
        .map_err(|e| repo_err("invalid retired_at", e))?;

    Ok(MaterialJwk {
        id: WrappedUuidV4::try_from(row.get::<String>(0).map_err(anyhow::Error::from)?)
            .map_err(|e| repo_err("invalid id", e))?,
        elastic_jwk_id: WrappedUuidV4::try_from(
            row.get::<String>(1).map_err(anyhow::Error::from)?,
        )
        .map_err(|e| repo_err("invalid elastic_jwk_id", e))?,
        material_kid: row.get::<String>(2).map_err(anyhow::Error::from)?,
        private_jwk_jwe: row.get::<String>(3).map_err(anyhow::Error::from)?,
        public_jwk_jwe: row.get::<String>(4).map_err(anyhow::Error::from)?,
        active: row.get::<i64>(5).map_err(anyhow::Error::from)? != 0,
        retired_at,
        barrier_version: row.get::<i64>(7).map_err(anyhow::Error::from)?,
        created_at: WrappedChronoDateTime::try_from(
            row.get::<String>(8).map_err(anyhow::Error::from)?,
        )
        .map_err(|e| repo_err("invalid created_at", e))?,
    })
}

fn audit_log_entry_from_row(row: &libsql::Row) -> Result<AuditLogEntry, CommonError> {
    let elastic_jwk_id = row
        .get::<Option<String>>(2)
        .map_err(anyhow::Error::from)?
        .map(WrappedUuidV4::try_from)
        .transpose()
        .map_err(|e| repo_err("invalid elastic_jwk_id", e))?;

    Ok(AuditLogEntry {
        id: WrappedUuidV4::try_from(row.get::<String>(0).map_err(anyhow::Error::from)?)
            .map_err(|e| repo_err("invalid id", e))?,
        tenant_id: WrappedUuidV4::try_from(row.get::<String>(1).map_err(anyhow::Error::from)?)
            .map_err(|e| repo_err("invalid tenant_id", e))?,
        elastic_jwk_id,
        operation: row.get::<String>(3).map_err(anyhow::Error::from)?,
        success: row.get::<i64>(4).map_err(anyhow::Error::from)? != 0,
        error_message: row.get::<Option<String>>(5).map_err(anyhow::Error::from)?,
        request_id: row.get::<String>(6).map_err(anyhow::Error::from)?,
        created_at: WrappedChronoDateTime::try_from(
            row.get::<String>(7).map_err(anyhow::Error::from)?,
        )
        .map_err(|e| repo_err("invalid created_at", e))?,
    })
}

fn audit_config_from_row(row: &libsql::Row) -> Result<AuditConfig, CommonError> {
    Ok(AuditConfig {
        tenant_id: WrappedUuidV4::try_from(row.get::<String>(0).map_err(anyhow::Error::from)?)
            .map_err(|e| repo_err("invalid tenant_id", e))?,
        operation: row.get::<String>(1).map_err(anyhow::Error::from)?,
        enabled: row.get::<i64>(2).map_err(anyhow::Error::from)? != 0,
        sampling_rate: row.get::<f64>(3).map_err(anyhow::Error::from)?,
    })
}

impl ElasticJwkRepositoryLike for Repository {
    async fn create(&self, params: &ElasticJwk) -> Result<(), CommonError> {
        self.conn
            .execute(
                "INSERT INTO elastic_jwks (id, tenant_id, kid, key_type, algorithm, use, max_materials, current_material_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    params.id.to_string(),
                    params.tenant_id.to_string(),
                    params.kid.clone(),
                    params.key_type.clone(),
                    params.algorithm.clone(),
                    params.r#use.clone(),
                    params.max_materials,
                    params.current_material_count,
                    params.created_at.to_string(),
                ],
            )
            .await
            .context("failed to create elastic jwk")
            .map_err(|e| repo_err("create elastic jwk", e))?;
        Ok(())
    }

    async fn get_by_id(&self, id: &WrappedUuidV4) -> Result<Option<ElasticJwk>, CommonError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, tenant_id, kid, key_type, algorithm, use, max_materials, current_material_count, created_at
                 FROM elastic_jwks WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| repo_err("get elastic jwk by id", e))?;

        match rows
            .next()
            .await
            .map_err(|e| repo_err("get elastic jwk by id", e))?
        {
            Some(row) => Ok(Some(elastic_jwk_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        tenant_id: &WrappedUuidV4,
        page: &PageRequest,
    ) -> Result<Page<ElasticJwk>, CommonError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, tenant_id, kid, key_type, algorithm, use, max_materials, current_material_count, created_at
                 FROM elastic_jwks WHERE tenant_id = ?1 ORDER BY created_at ASC LIMIT ?2 OFFSET ?3",
                params![tenant_id.to_string(), page.limit, page.offset],
            )
            .await
            .map_err(|e| repo_err("list elastic jwks", e))?;

        let mut items = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| repo_err("list elastic jwks", e))?
        {
            items.push(elastic_jwk_from_row(&row)?);
        }

        let total = self.count_elastic_jwks(tenant_id).await?;
        Ok(Page::new(items, total))
    }

    async fn delete(&self, id: &WrappedUuidV4) -> Result<(), CommonError> {
        self.conn
            .execute(
                "DELETE FROM elastic_jwks WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| repo_err("delete elastic jwk", e))?;
        Ok(())
    }

    async fn increment_material_count(&self, id: &WrappedUuidV4) -> Result<(), CommonError> {
        self.conn
            .execute(
                "UPDATE elastic_jwks SET current_material_count = current_material_count + 1 WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| repo_err("increment material count", e))?;
        Ok(())
    }
}

impl Repository {
    async fn count_elastic_jwks(&self, tenant_id: &WrappedUuidV4) -> Result<i64, CommonError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM elastic_jwks WHERE tenant_id = ?1",
                params![tenant_id.to_string()],
            )
            .await
            .map_err(|e| repo_err("count elastic jwks", e))?;
        let row = rows
            .next()
            .await
            .map_err(|e| repo_err("count elastic jwks", e))?
            .expect("COUNT(*) always returns exactly one row");
        row.get::<i64>(0)
            .map_err(|e| repo_err("count elastic jwks", anyhow::Error::from(e)))
    }

    async fn count_materials_for(&self, elastic_jwk_id: &WrappedUuidV4) -> Result<i64, CommonError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM material_jwks WHERE elastic_jwk_id = ?1",
                params![elastic_jwk_id.to_string()],
            )
            .await
            .map_err(|e| repo_err("count materials", e))?;
        let row = rows
            .next()
            .await
            .map_err(|e| repo_err("count materials", e))?
            .expect("COUNT(*) always returns exactly one row");
        row.get::<i64>(0)
            .map_err(|e| repo_err("count materials", anyhow::Error::from(e)))
    }
}

impl MaterialJwkRepositoryLike for Repository {
    async fn create(&self, params: &MaterialJwk) -> Result<(), CommonError> {
        self.conn
            .execute(
                "INSERT INTO material_jwks (id, elastic_jwk_id, material_kid, private_jwk_jwe, public_jwk_jwe, active, retired_at, barrier_version, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    params.id.to_string(),
                    params.elastic_jwk_id.to_string(),
                    params.material_kid.clone(),
                    params.private_jwk_jwe.clone(),
                    params.public_jwk_jwe.clone(),
                    params.active as i64,
                    params.retired_at.as_ref().map(|t| t.to_string()),
                    params.barrier_version,
                    params.created_at.to_string(),
                ],
            )
            .await
            .map_err(|e| repo_err("create material jwk", e))?;
        Ok(())
    }

    async fn get_by_id(&self, id: &WrappedUuidV4) -> Result<Option<MaterialJwk>, CommonError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, elastic_jwk_id, material_kid, private_jwk_jwe, public_jwk_jwe, active, retired_at, barrier_version, created_at
                 FROM material_jwks WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| repo_err("get material by id", e))?;

        match rows
            .next()
            .await
            .map_err(|e| repo_err("get material by id", e))?
        {
            Some(row) => Ok(Some(material_jwk_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_by_material_kid(&self, kid: &str) -> Result<Option<MaterialJwk>, CommonError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, elastic_jwk_id, material_kid, private_jwk_jwe, public_jwk_jwe, active, retired_at, barrier_version, created_at
                 FROM material_jwks WHERE material_kid = ?1",
                params![kid.to_string()],
            )
            .await
            .map_err(|e| repo_err("get material by kid", e))?;

        match rows
            .next()
            .await
            .map_err(|e| repo_err("get material by kid", e))?
        {
            Some(row) => Ok(Some(material_jwk_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_active_material(
        &self,
        elastic_jwk_id: &WrappedUuidV4,
    ) -> Result<Option<MaterialJwk>, CommonError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, elastic_jwk_id, material_kid, private_jwk_jwe, public_jwk_jwe, active, retired_at, barrier_version, created_at
                 FROM material_jwks WHERE elastic_jwk_id = ?1 AND active = 1",
                params![elastic_jwk_id.to_string()],
            )
            .await
            .map_err(|e| repo_err("get active material", e))?;

        match rows
            .next()
            .await
            .map_err(|e| repo_err("get active material", e))?
        {
            Some(row) => Ok(Some(material_jwk_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_by_elastic_jwk(
        &self,
        elastic_jwk_id: &WrappedUuidV4,
        page: &PageRequest,
    ) -> Result<Page<MaterialJwk>, CommonError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, elastic_jwk_id, material_kid, private_jwk_jwe, public_jwk_jwe, active, retired_at, barrier_version, created_at
                 FROM material_jwks WHERE elastic_jwk_id = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                params![elastic_jwk_id.to_string(), page.limit, page.offset],
            )
            .await
            .map_err(|e| repo_err("list materials", e))?;

        let mut items = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| repo_err("list materials", e))?
        {
            items.push(material_jwk_from_row(&row)?);
        }

        let total = self.count_materials_for(elastic_jwk_id).await?;
        Ok(Page::new(items, total))
    }

    async fn count_materials(&self, elastic_jwk_id: &WrappedUuidV4) -> Result<i64, CommonError> {
        self.count_materials_for(elastic_jwk_id).await
    }

    async fn rotate_material(
        &self,
        elastic_jwk_id: &WrappedUuidV4,
        new_material: &MaterialJwk,
    ) -> Result<(), CommonError> {
        self.conn
            .execute_transactional_batch(&format!(
                "UPDATE material_jwks SET active = 0 WHERE elastic_jwk_id = '{elastic}' AND active = 1;
                 INSERT INTO material_jwks (id, elastic_jwk_id, material_kid, private_jwk_jwe, public_jwk_jwe, active, retired_at, barrier_version, created_at)
                 VALUES ('{id}', '{elastic}', '{kid}', '{private}', '{public}', 1, NULL, {barrier_version}, '{created_at}');",
                elastic = elastic_jwk_id.to_string(),
                id = new_material.id,
                kid = new_material.material_kid,
                private = new_material.private_jwk_jwe,
                public = new_material.public_jwk_jwe,
                barrier_version = new_material.barrier_version,
                created_at = new_material.created_at.to_string(),
            ))
            .await
            .map_err(|e| repo_err("rotate material", e))?;
        Ok(())
    }

    async fn retire_material(&self, material_id: &WrappedUuidV4) -> Result<(), CommonError> {
        self.conn
            .execute(
                "UPDATE material_jwks SET active = 0, retired_at = ?2 WHERE id = ?1",
                params![
                    material_id.to_string(),
                    WrappedChronoDateTime::now().to_string()
                ],
            )
            .await
            .map_err(|e| repo_err("retire material", e))?;
        Ok(())
    }

    async fn delete(&self, material_id: &WrappedUuidV4) -> Result<(), CommonError> {
        self.conn
            .execute(
                "DELETE FROM material_jwks WHERE id = ?1",
                params![material_id.to_string()],
            )
            .await
            .map_err(|e| repo_err("delete material", e))?;
        Ok(())
    }
}

impl AuditLogRepositoryLike for Repository {
    async fn create(&self, entry: &AuditLogEntry) -> Result<(), CommonError> {
        self.conn
            .execute(
                "INSERT INTO audit_log_entries (id, tenant_id, elastic_jwk_id, operation, success, error_message, request_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.id.to_string(),
                    entry.tenant_id.to_string(),
                    entry.elastic_jwk_id.as_ref().map(|id| id.to_string()),
                    entry.operation.clone(),
                    entry.success as i64,
                    entry.error_message.clone(),
                    entry.request_id.clone(),
                    entry.created_at.to_string(),
                ],
            )
            .await
            .map_err(|e| repo_err("create audit log entry", e))?;
        Ok(())
    }

    async fn list(
        &self,
        tenant_id: &WrappedUuidV4,
        page: &PageRequest,
    ) -> Result<Page<AuditLogEntry>, CommonError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, tenant_id, elastic_jwk_id, operation, success, error_message, request_id, created_at
                 FROM audit_log_entries WHERE tenant_id = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                params![tenant_id.to_string(), page.limit, page.offset],
            )
            .await
            .map_err(|e| repo_err("list audit logs", e))?;

        let mut items = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| repo_err("list audit logs", e))?
        {
            items.push(audit_log_entry_from_row(&row)?);
        }

        let total = self.count_audit_logs(tenant_id, None).await?;
        Ok(Page::new(items, total))
    }

    async fn list_by_elastic_jwk(
        &self,
        elastic_jwk_id: &WrappedUuidV4,
        page: &PageRequest,
    ) -> Result<Page<AuditLogEntry>, CommonError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, tenant_id, elastic_jwk_id, operation, success, error_message, request_id, created_at
                 FROM audit_log_entries WHERE elastic_jwk_id = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                params![elastic_jwk_id.to_string(), page.limit, page.offset],
            )
            .await
            .map_err(|e| repo_err("list audit logs by elastic jwk", e))?;

        let mut items = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| repo_err("list audit logs by elastic jwk", e))?
        {
            items.push(audit_log_entry_from_row(&row)?);
        }

        let mut count_rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM audit_log_entries WHERE elastic_jwk_id = ?1",
                params![elastic_jwk_id.to_string()],
            )
            .await
            .map_err(|e| repo_err("count audit logs by elastic jwk", e))?;
        let total = count_rows
            .next()
            .await
            .map_err(|e| repo_err("count audit logs by elastic jwk", e))?
            .expect("COUNT(*) always returns exactly one row")
            .get::<i64>(0)
            .map_err(|e| repo_err("count audit logs by elastic jwk", anyhow::Error::from(e)))?;

        Ok(Page::new(items, total))
    }

    async fn list_by_operation(
        &self,
        tenant_id: &WrappedUuidV4,
        operation: &str,
        page: &PageRequest,
    ) -> Result<Page<AuditLogEntry>, CommonError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, tenant_id, elastic_jwk_id, operation, success, error_message, request_id, created_at
                 FROM audit_log_entries WHERE tenant_id = ?1 AND operation = ?2 ORDER BY created_at DESC LIMIT ?3 OFFSET ?4",
                params![tenant_id.to_string(), operation.to_string(), page.limit, page.offset],
            )
            .await
            .map_err(|e| repo_err("list audit logs by operation", e))?;

        let mut items = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| repo_err("list audit logs by operation", e))?
        {
            items.push(audit_log_entry_from_row(&row)?);
        }

        let total = self.count_audit_logs(tenant_id, Some(operation)).await?;
        Ok(Page::new(items, total))
    }

    async fn delete_older_than(
        &self,
        tenant_id: &WrappedUuidV4,
        days: i64,
    ) -> Result<u64, CommonError> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
        let cutoff = WrappedChronoDateTime::new(cutoff);

        self.conn
            .execute(
                "DELETE FROM audit_log_entries WHERE tenant_id = ?1 AND created_at < ?2",
                params![tenant_id.to_string(), cutoff.to_string()],
            )
            .await
            .map_err(|e| repo_err("cleanup audit logs", e))
    }
}

impl Repository {
    async fn count_audit_logs(
        &self,
        tenant_id: &WrappedUuidV4,
        operation: Option<&str>,
    ) -> Result<i64, CommonError> {
        let mut rows = match operation {
            Some(op) => {
                self.conn
                    .query(
                        "SELECT COUNT(*) FROM audit_log_entries WHERE tenant_id = ?1 AND operation = ?2",
                        params![tenant_id.to_string(), op.to_string()],
                    )
                    .await
            }
            None => {
                self.conn
                    .query(
                        "SELECT COUNT(*) FROM audit_log_entries WHERE tenant_id = ?1",
                        params![tenant_id.to_string()],
                    )
                    .await
            }
        }
        .map_err(|e| repo_err("count audit logs", e))?;

        let row = rows
            .next()
            .await
            .map_err(|e| repo_err("count audit logs", e))?
            .expect("COUNT(*) always returns exactly one row");
        row.get::<i64>(0)
            .map_err(|e| repo_err("count audit logs", anyhow::Error::from(e)))
    }
}

impl AuditConfigRepositoryLike for Repository {
    async fn should_audit(
        &self,
        tenant_id: &WrappedUuidV4,
        operation: &str,
    ) -> Result<AuditConfig, CommonError> {
        let mut rows = self
            .conn
            .query(
                "SELECT tenant_id, operation, enabled, sampling_rate FROM audit_configs WHERE tenant_id = ?1 AND operation = ?2",
                params![tenant_id.to_string(), operation.to_string()],
            )
            .await
            .map_err(|e| repo_err("load audit config", e))?;

        match rows
            .next()
            .await
            .map_err(|e| repo_err("load audit config", e))?
        {
            Some(row) => audit_config_from_row(&row),
            // Absence implies "audit enabled at 100%".
            None => Ok(AuditConfig::default_for(tenant_id.clone(), operation)),
        }
    }

    async fn get_all_for_tenant(
        &self,
        tenant_id: &WrappedUuidV4,
    ) -> Result<Vec<AuditConfig>, CommonError> {
        let mut rows = self
            .conn
            .query(
                "SELECT tenant_id, operation, enabled, sampling_rate FROM audit_configs WHERE tenant_id = ?1",
                params![tenant_id.to_string()],
            )
            .await
            .map_err(|e| repo_err("list audit configs", e))?;

        let mut items = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| repo_err("list audit configs", e))?
        {
            items.push(audit_config_from_row(&row)?);
        }
        Ok(items)
    }

    async fn upsert(&self, cfg: &AuditConfig) -> Result<(), CommonError> {
        self.conn
            .execute(
                "INSERT INTO audit_configs (tenant_id, operation, enabled, sampling_rate)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(tenant_id, operation) DO UPDATE SET enabled = excluded.enabled, sampling_rate = excluded.sampling_rate",
                params![
                    cfg.tenant_id.to_string(),
                    cfg.operation.clone(),
                    cfg.enabled as i64,
                    cfg.sampling_rate,
                ],
            )
            .await
            .map_err(|e| repo_err("upsert audit config", e))?;
        Ok(())
    }
}

