//! Shared tests for InboundRepo implementations

use crate::{
    db::{error::DbError, repos::InboundRepo},
    models::CreateInbound,
};

fn create_inbound_input(tag: &str, port: i32) -> CreateInbound {
    CreateInbound {
        tag: tag.to_string(),
        protocol: "vless".to_string(),
        port,
    }
}

// ============================================================================
// Shared Test Functions
// ============================================================================

pub async fn test_create_inbound(repo: &dyn InboundRepo) {
    let inbound = repo
        .create(create_inbound_input("inbound-443", 443))
        .await
        .expect("Failed to create inbound");

    assert_eq!(inbound.tag, "inbound-443");
    assert_eq!(inbound.protocol, "vless");
    assert_eq!(inbound.port, 443);
    assert!(inbound.enabled);
}

pub async fn test_create_duplicate_tag_fails(repo: &dyn InboundRepo) {
    repo.create(create_inbound_input("dup", 443))
        .await
        .expect("Failed to create first inbound");

    let result = repo.create(create_inbound_input("dup", 8443)).await;
    assert!(matches!(result, Err(DbError::Conflict(_))));
}

pub async fn test_get_by_id(repo: &dyn InboundRepo) {
    let created = repo
        .create(create_inbound_input("get-me", 443))
        .await
        .expect("Failed to create inbound");

    let fetched = repo
        .get_by_id(created.id)
        .await
        .expect("Failed to get inbound")
        .expect("Inbound should exist");
    assert_eq!(fetched, created);

    let missing = repo
        .get_by_id(created.id + 1000)
        .await
        .expect("Query should succeed");
    assert!(missing.is_none());
}

pub async fn test_list_ordered_by_id(repo: &dyn InboundRepo) {
    let first = repo.create(create_inbound_input("a", 1)).await.unwrap();
    let second = repo.create(create_inbound_input("b", 2)).await.unwrap();

    let inbounds = repo.list().await.expect("Failed to list inbounds");
    let ids: Vec<i64> = inbounds.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
}

// ============================================================================
// SQLite Tests
// ============================================================================

#[cfg(feature = "database-sqlite")]
mod sqlite_tests {
    use crate::db::{
        sqlite::SqliteInboundRepo,
        tests::harness::{create_sqlite_pool, run_sqlite_migrations},
    };

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let pool = create_sqlite_pool().await;
                run_sqlite_migrations(&pool).await;
                let repo = SqliteInboundRepo::new(pool);
                super::$name(&repo).await;
            }
        };
    }

    sqlite_test!(test_create_inbound);
    sqlite_test!(test_create_duplicate_tag_fails);
    sqlite_test!(test_get_by_id);
    sqlite_test!(test_list_ordered_by_id);
}

// ============================================================================
// PostgreSQL Tests - Require Docker, run with `cargo test -- --ignored`
// ============================================================================

#[cfg(all(test, feature = "database-postgres"))]
mod postgres_tests {
    use crate::db::{
        postgres::PostgresInboundRepo,
        tests::harness::postgres::{create_isolated_postgres_pool, run_postgres_migrations},
    };

    macro_rules! postgres_test {
        ($name:ident) => {
            #[tokio::test]
            #[ignore = "Requires Docker - run with `cargo test -- --ignored`"]
            async fn $name() {
                let pool = create_isolated_postgres_pool().await;
                run_postgres_migrations(&pool).await;
                let repo = PostgresInboundRepo::new(pool, None);
                super::$name(&repo).await;
            }
        };
    }

    postgres_test!(test_create_inbound);
    postgres_test!(test_create_duplicate_tag_fails);
    postgres_test!(test_get_by_id);
    postgres_test!(test_list_ordered_by_id);
}
