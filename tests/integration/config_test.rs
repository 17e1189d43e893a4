//! Startup configuration integration tests.

use super::common::{seed_shop_database, shop_config, SHOP_TABLES};
use db_gate::config::{Config, DatabaseConfig};
use db_gate::error::GateError;
use db_gate::SqlGateway;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

#[tokio::test]
async fn test_gateway_from_config_file() {
    let dir = TempDir::new().unwrap();
    let url = seed_shop_database(dir.path()).await;

    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[database]
url = "{url}"
max_connections = 2

[gateway]
tables = ["products"]
default_row_limit = 1
"#
    )
    .unwrap();

    let config = Config::load_from_file(file.path()).unwrap();
    let gateway = SqlGateway::connect(&config).await.unwrap();

    let result = gateway.execute("SELECT * FROM products").await.unwrap();
    assert_eq!(result.row_count(), 1);
    assert_eq!(gateway.allowlist(), ["products"]);
}

#[tokio::test]
async fn test_default_allowlist_covers_shop_tables() {
    let dir = TempDir::new().unwrap();
    let url = seed_shop_database(dir.path()).await;

    let mut config = Config::load_from_file(&dir.path().join("absent.toml")).unwrap();
    config.database = DatabaseConfig::from_url(url);

    let gateway = SqlGateway::connect(&config).await.unwrap();
    assert_eq!(gateway.allowlist(), SHOP_TABLES);
    assert!(gateway.describe_schema().await.is_ok());
}

#[tokio::test]
async fn test_invalid_pattern_fails_before_connecting() {
    let mut config = shop_config("sqlite:/nonexistent/dir/shop.db");
    config.gateway.aggregate_patterns = vec![r"\bcount\(".to_string(), "(unclosed".to_string()];

    let err = SqlGateway::connect(&config).await.err().unwrap();
    assert!(matches!(err, GateError::Config(_)));
}

#[tokio::test]
async fn test_empty_allowlist_is_config_error() {
    let mut config = shop_config("sqlite::memory:");
    config.gateway.tables.clear();

    let err = SqlGateway::connect(&config).await.err().unwrap();
    assert!(matches!(err, GateError::Config(_)));
}

#[tokio::test]
async fn test_unreachable_database_is_connection_error() {
    let config = shop_config("sqlite:/nonexistent/dir/shop.db");

    let err = SqlGateway::connect(&config).await.err().unwrap();
    assert!(matches!(err, GateError::Connection(_)));
}

#[tokio::test]
async fn test_unsupported_scheme_is_config_error() {
    let config = shop_config("mysql://localhost/shop");

    let err = SqlGateway::connect(&config).await.err().unwrap();
    assert!(matches!(err, GateError::Config(_)));
}
