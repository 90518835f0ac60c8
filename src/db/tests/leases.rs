//! Shared tests for JobLeaseRepo implementations

use crate::db::repos::JobLeaseRepo;

const LEASE: &str = "auto_delete";
const NOW: i64 = 1_750_000_000_000;

pub async fn test_acquire_free_lease(repo: &dyn JobLeaseRepo) {
    let acquired = repo
        .try_acquire(LEASE, "host-a", NOW, NOW + 60_000)
        .await
        .expect("Acquire should succeed");
    assert!(acquired);
}

pub async fn test_live_lease_blocks_other_holder(repo: &dyn JobLeaseRepo) {
    assert!(repo.try_acquire(LEASE, "host-a", NOW, NOW + 60_000).await.unwrap());

    let acquired = repo
        .try_acquire(LEASE, "host-b", NOW + 1_000, NOW + 61_000)
        .await
        .expect("Contended acquire should not error");
    assert!(!acquired);
}

pub async fn test_holder_can_renew(repo: &dyn JobLeaseRepo) {
    assert!(repo.try_acquire(LEASE, "host-a", NOW, NOW + 60_000).await.unwrap());
    assert!(
        repo.try_acquire(LEASE, "host-a", NOW + 30_000, NOW + 90_000)
            .await
            .unwrap()
    );

    // The renewed expiry still blocks others past the original one
    assert!(
        !repo
            .try_acquire(LEASE, "host-b", NOW + 70_000, NOW + 130_000)
            .await
            .unwrap()
    );
}

pub async fn test_expired_lease_is_taken_over(repo: &dyn JobLeaseRepo) {
    assert!(repo.try_acquire(LEASE, "host-a", NOW, NOW + 60_000).await.unwrap());
    assert!(
        repo.try_acquire(LEASE, "host-b", NOW + 60_000, NOW + 120_000)
            .await
            .unwrap()
    );

    // The previous holder lost it
    assert!(
        !repo
            .try_acquire(LEASE, "host-a", NOW + 61_000, NOW + 121_000)
            .await
            .unwrap()
    );
}

pub async fn test_release_by_other_holder_is_ignored(repo: &dyn JobLeaseRepo) {
    assert!(repo.try_acquire(LEASE, "host-a", NOW, NOW + 60_000).await.unwrap());
    repo.release(LEASE, "host-b").await.expect("Release should succeed");

    assert!(
        !repo
            .try_acquire(LEASE, "host-b", NOW + 1_000, NOW + 61_000)
            .await
            .unwrap()
    );
}

pub async fn test_release_frees_lease(repo: &dyn JobLeaseRepo) {
    assert!(repo.try_acquire(LEASE, "host-a", NOW, NOW + 60_000).await.unwrap());
    repo.release(LEASE, "host-a").await.expect("Release should succeed");

    assert!(
        repo.try_acquire(LEASE, "host-b", NOW + 1_000, NOW + 61_000)
            .await
            .unwrap()
    );
}

pub async fn test_leases_are_independent_by_name(repo: &dyn JobLeaseRepo) {
    assert!(repo.try_acquire(LEASE, "host-a", NOW, NOW + 60_000).await.unwrap());
    assert!(
        repo.try_acquire("other_job", "host-b", NOW, NOW + 60_000)
            .await
            .unwrap()
    );
}

// ============================================================================
// SQLite Tests
// ============================================================================

#[cfg(feature = "database-sqlite")]
mod sqlite_tests {
    use crate::db::{
        sqlite::SqliteJobLeaseRepo,
        tests::harness::{create_sqlite_pool, run_sqlite_migrations},
    };

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let pool = create_sqlite_pool().await;
                run_sqlite_migrations(&pool).await;
                let repo = SqliteJobLeaseRepo::new(pool);
                super::$name(&repo).await;
            }
        };
    }

    sqlite_test!(test_acquire_free_lease);
    sqlite_test!(test_live_lease_blocks_other_holder);
    sqlite_test!(test_holder_can_renew);
    sqlite_test!(test_expired_lease_is_taken_over);
    sqlite_test!(test_release_by_other_holder_is_ignored);
    sqlite_test!(test_release_frees_lease);
    sqlite_test!(test_leases_are_independent_by_name);
}

// ============================================================================
// PostgreSQL Tests - Require Docker, run with `cargo test -- --ignored`
// ============================================================================

#[cfg(all(test, feature = "database-postgres"))]
mod postgres_tests {
    use crate::db::{
        postgres::PostgresJobLeaseRepo,
        tests::harness::postgres::{create_isolated_postgres_pool, run_postgres_migrations},
    };

    macro_rules! postgres_test {
        ($name:ident) => {
            #[tokio::test]
            #[ignore = "Requires Docker - run with `cargo test -- --ignored`"]
            async fn $name() {
                let pool = create_isolated_postgres_pool().await;
                run_postgres_migrations(&pool).await;
                let repo = PostgresJobLeaseRepo::new(pool);
                super::$name(&repo).await;
            }
        };
    }

    postgres_test!(test_acquire_free_lease);
    postgres_test!(test_live_lease_blocks_other_holder);
    postgres_test!(test_holder_can_renew);
    postgres_test!(test_expired_lease_is_taken_over);
    postgres_test!(test_release_by_other_holder_is_ignored);
    postgres_test!(test_release_frees_lease);
    postgres_test!(test_leases_are_independent_by_name);
}
