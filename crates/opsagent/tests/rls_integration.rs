// Live-database checks of the execution context. These require a Postgres
// with the RLS contract applied (app.current_user_id session variable and
// the app_user role) reachable via OA_DATABASE_URL; run with --ignored.

use sqlx::postgres::PgPoolOptions;
use sqlx::Row;

async fn test_pool() -> Option<sqlx::PgPool> {
    let url = std::env::var("OA_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()?;
    // A single connection so every statement observes the same session.
    PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .ok()
}

#[tokio::test]
#[ignore] // requires a database with the RLS contract applied
async fn privilege_restored_after_success() {
    let Some(pool) = test_pool().await else {
        eprintln!("OA_DATABASE_URL not set, skipping");
        return;
    };

    let rows = opsagent::rls::execute_scoped(
        &pool,
        "00000000-0000-0000-0000-000000000001",
        "SELECT 1 AS one",
    )
    .await
    .expect("scoped execution should succeed");
    assert_eq!(rows.len(), 1);

    // The single pooled connection must be back at the administrative
    // role with the identity cleared.
    let row = sqlx::query("SELECT current_setting('app.current_user_id', true) AS uid")
        .fetch_one(&pool)
        .await
        .expect("session probe");
    let uid: Option<String> = row.try_get("uid").ok();
    assert!(uid.unwrap_or_default().is_empty(), "identity must be cleared");

    let row = sqlx::query("SELECT current_user::text AS who")
        .fetch_one(&pool)
        .await
        .expect("role probe");
    let who: String = row.try_get("who").expect("current_user");
    assert_ne!(who, opsagent::rls::RESTRICTED_ROLE, "role must be restored");
}

#[tokio::test]
#[ignore] // requires a database with the RLS contract applied
async fn privilege_restored_after_query_error() {
    let Some(pool) = test_pool().await else {
        eprintln!("OA_DATABASE_URL not set, skipping");
        return;
    };

    let result = opsagent::rls::execute_scoped(
        &pool,
        "00000000-0000-0000-0000-000000000001",
        "SELECT no_such_column FROM no_such_table",
    )
    .await;
    assert!(result.is_err(), "broken query must surface an error");

    let row = sqlx::query("SELECT current_user::text AS who")
        .fetch_one(&pool)
        .await
        .expect("role probe");
    let who: String = row.try_get("who").expect("current_user");
    assert_ne!(
        who,
        opsagent::rls::RESTRICTED_ROLE,
        "role must be restored even after a failed query"
    );
}

#[tokio::test]
#[ignore] // requires a database with the RLS contract applied
async fn rows_are_scoped_to_the_bound_caller() {
    let Some(pool) = test_pool().await else {
        eprintln!("OA_DATABASE_URL not set, skipping");
        return;
    };

    // An unknown caller must see no rows at all under the policies.
    let rows = opsagent::rls::execute_scoped(
        &pool,
        "00000000-0000-0000-0000-00000000dead",
        "SELECT id FROM orders",
    )
    .await
    .expect("scoped execution should succeed");
    assert!(rows.is_empty(), "unknown caller must not see any orders");
}
