//! Schema description integration tests.

use super::common::{seed_shop_database, shop_config, shop_gateway};
use db_gate::config::GatewayConfig;
use db_gate::db::DatabaseBackend;
use db_gate::error::GateError;
use db_gate::gateway::tool;
use db_gate::SqlGateway;
use tempfile::TempDir;

#[tokio::test]
async fn test_describe_schema_lists_allowlist_in_order() {
    let (_dir, gateway) = shop_gateway().await;

    let description = gateway.describe_schema().await.unwrap();

    let positions: Vec<usize> = gateway
        .allowlist()
        .iter()
        .map(|t| {
            description
                .find(&format!("Table: {t}\n"))
                .unwrap_or_else(|| panic!("missing table {t}"))
        })
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    assert!(!description.contains("audit_log"));
}

#[tokio::test]
async fn test_describe_schema_columns_and_keys() {
    let (_dir, gateway) = shop_gateway().await;

    let description = gateway.describe_schema().await.unwrap();

    assert!(description.contains("  - id: INTEGER (PK, NOT NULL)\n"));
    assert!(description.contains("  - name: TEXT (NOT NULL)\n"));
    assert!(description.contains("  - email: TEXT\n"));
    assert!(description.contains("  - country: TEXT (DEFAULT 'US')\n"));
    assert!(description.contains("Foreign Keys:\n"));
    assert!(description.contains("  - orders.customer_id -> customers.id\n"));
    assert!(description.contains("  - refunds.payment_id -> payments.id\n"));
}

#[tokio::test]
async fn test_describe_schema_includes_sample_rows() {
    let (_dir, gateway) = shop_gateway().await;

    let description = gateway.describe_schema().await.unwrap();

    assert!(description.contains("  3 rows from customers:\n    id | name | email | country\n"));
    assert!(description.contains("    1 | Customer 1 | c1@example.com | US\n"));
    assert!(description.contains("  1 rows from refunds:\n"));
}

#[tokio::test]
async fn test_describe_schema_without_samples() {
    let dir = TempDir::new().unwrap();
    let url = seed_shop_database(dir.path()).await;
    let mut config = shop_config(&url);
    config.gateway.sample_rows = 0;

    let gateway = SqlGateway::connect(&config).await.unwrap();
    let description = gateway.describe_schema().await.unwrap();

    assert!(description.contains("Table: customers\n"));
    assert!(!description.contains("rows from"));
}

#[tokio::test]
async fn test_describe_schema_missing_table() {
    let dir = TempDir::new().unwrap();
    let url = seed_shop_database(dir.path()).await;
    let mut config = shop_config(&url);
    config.gateway = GatewayConfig::with_tables(["customers", "invoices"]);

    let gateway = SqlGateway::connect(&config).await.unwrap();
    let err = gateway.describe_schema().await.unwrap_err();

    assert!(matches!(err, GateError::Schema(_)));
    assert!(err.to_string().contains("invoices"));
}

#[tokio::test]
async fn test_system_prompt_embeds_description() {
    let (_dir, gateway) = shop_gateway().await;

    let description = gateway.describe_schema().await.unwrap();
    let prompt = tool::system_prompt(gateway.backend(), &description);

    assert_eq!(gateway.backend(), DatabaseBackend::Sqlite);
    assert!(prompt.starts_with(
        "You are a careful analytics engineer for SQLite. Use only these tables.\n\nDatabase Schema:\n"
    ));
}
