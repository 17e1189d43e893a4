//! PostgreSQL integration tests.
//!
//! Skipped unless DATABASE_URL points at a Postgres server.

use db_gate::config::{Config, DatabaseConfig, GatewayConfig};
use db_gate::db::Value;
use db_gate::{ErrorKind, SqlGateway};
use sqlx::postgres::PgPoolOptions;

/// Helper to get the Postgres test URL from the environment.
fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL")
        .ok()
        .filter(|url| url.starts_with("postgres"))
}

/// Helper to create a gateway over the test database.
async fn get_test_gateway(tables: &[&str]) -> Option<SqlGateway> {
    let url = get_test_database_url()?;
    let config = Config {
        database: DatabaseConfig::from_url(url),
        gateway: GatewayConfig::with_tables(tables.iter().copied()),
    };
    SqlGateway::connect(&config).await.ok()
}

#[tokio::test]
async fn test_select_is_bounded() {
    let Some(gateway) = get_test_gateway(&["pg_class"]).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = gateway
        .execute("SELECT n FROM generate_series(1, 500) AS n")
        .await
        .unwrap();
    assert_eq!(result.columns(), ["n"]);
    assert_eq!(result.row_count(), 200);

    let counted = gateway
        .execute("SELECT count(*) AS c FROM generate_series(1, 500)")
        .await
        .unwrap();
    assert_eq!(counted.rows()[0][0], Value::Int(500));

    gateway.close().await.unwrap();
}

#[tokio::test]
async fn test_write_denied() {
    let Some(gateway) = get_test_gateway(&["pg_class"]).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = gateway
        .execute("CREATE TABLE db_gate_should_not_exist (id int)")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteOperationForbidden);

    gateway.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_relation_is_failure() {
    let Some(gateway) = get_test_gateway(&["pg_class"]).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = gateway
        .execute("SELECT * FROM db_gate_nosuch_relation")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionFailure);
    assert!(err.to_string().contains("does not exist"), "got: {}", err);

    gateway.close().await.unwrap();
}

#[tokio::test]
async fn test_describe_schema() {
    let Some(url) = get_test_database_url() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let table = format!("db_gate_schema_{}", std::process::id());
    let admin = PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .unwrap();
    sqlx::raw_sql(&format!(
        "CREATE TABLE {table} (id serial PRIMARY KEY, label text NOT NULL);
         INSERT INTO {table} (label) VALUES ('first'), ('second');"
    ))
    .execute(&admin)
    .await
    .unwrap();

    let described = match get_test_gateway(&[table.as_str()]).await {
        Some(gateway) => {
            let description = gateway.describe_schema().await;
            gateway.close().await.unwrap();
            description
        }
        None => Err(db_gate::error::GateError::connection("gateway unavailable")),
    };

    sqlx::raw_sql(&format!("DROP TABLE {table}"))
        .execute(&admin)
        .await
        .unwrap();
    admin.close().await;

    let description = described.unwrap();
    assert!(description.contains(&format!("Table: {table}\n")));
    assert!(description.contains("  - label: text (NOT NULL)\n"));
    assert!(description.contains(&format!("  2 rows from {table}:\n")));
}
