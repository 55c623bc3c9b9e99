//! Common test fixtures for unit and integration tests.

use shared::primitives::SqlMigrationLoader;
use shared::test_utils::repository::setup_in_memory_database;

use crate::repository::Repository;

/// Spin up a fresh in-memory SQLite-compatible database with the keyring
/// migrations applied and return a ready-to-use [`Repository`].
///
/// The returned `Repository` holds its own connection independent of the
/// `libsql::Database` handle, which is dropped here — the in-memory database
/// lives as long as that connection does.
pub async fn setup_test_repo() -> Repository {
    shared::setup_test!();

    let (_db, conn) = setup_in_memory_database(vec![Repository::load_sql_migrations()])
        .await
        .expect("failed to set up in-memory keyring database");
    Repository::new(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ElasticJwkRepositoryLike;
    use shared::primitives::PageRequest;
    use shared::primitives::WrappedUuidV4;

    #[tokio::test]
    async fn setup_test_repo_yields_usable_empty_repository() {
        let repo = setup_test_repo().await;
        let tenant = WrappedUuidV4::new();
        let page = PageRequest {
            offset: 0,
            limit: 10,
        };
        let listed = repo.list(&tenant, &page).await.unwrap();
        assert!(listed.items.is_empty());
    }
}
