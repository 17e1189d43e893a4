//! Shared fixtures: a temp-file SQLite shop database seeded per test.

use db_gate::config::{Config, DatabaseConfig, GatewayConfig};
use db_gate::SqlGateway;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use tempfile::TempDir;

/// Number of rows seeded into `customers`, above the default row bound.
pub const CUSTOMER_COUNT: i64 = 250;

pub const SHOP_TABLES: [&str; 6] = [
    "customers",
    "orders",
    "order_items",
    "products",
    "refunds",
    "payments",
];

const SEED_SQL: &str = r#"
CREATE TABLE customers (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT,
    country TEXT DEFAULT 'US'
);
CREATE TABLE products (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    price REAL NOT NULL
);
CREATE TABLE orders (
    id INTEGER PRIMARY KEY,
    customer_id INTEGER NOT NULL REFERENCES customers(id),
    status TEXT NOT NULL,
    created_at TEXT
);
CREATE TABLE order_items (
    order_id INTEGER NOT NULL REFERENCES orders(id),
    product_id INTEGER NOT NULL REFERENCES products(id),
    quantity INTEGER NOT NULL,
    PRIMARY KEY (order_id, product_id)
);
CREATE TABLE payments (
    id INTEGER PRIMARY KEY,
    order_id INTEGER NOT NULL REFERENCES orders(id),
    amount REAL NOT NULL
);
CREATE TABLE refunds (
    id INTEGER PRIMARY KEY,
    payment_id INTEGER NOT NULL REFERENCES payments(id),
    amount REAL NOT NULL,
    reason TEXT
);
CREATE TABLE audit_log (id INTEGER PRIMARY KEY, note TEXT);

WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 250)
INSERT INTO customers (id, name, email) SELECT n, 'Customer ' || n, 'c' || n || '@example.com' FROM seq;

INSERT INTO products VALUES (1, 'Widget', 9.99), (2, 'Gadget', 24.5);
INSERT INTO orders VALUES
    (1, 1, 'paid', '2024-01-02'),
    (2, 1, 'refunded', '2024-01-05'),
    (3, 2, 'pending', NULL);
INSERT INTO order_items VALUES (1, 1, 3), (1, 2, 1), (2, 2, 2), (3, 1, 1);
INSERT INTO payments VALUES (1, 1, 54.47), (2, 2, 49.0);
INSERT INTO refunds VALUES (1, 2, 49.0, 'damaged');
"#;

/// Creates and seeds `shop.db` inside `dir`, returning its `sqlite:` URL.
pub async fn seed_shop_database(dir: &Path) -> String {
    let path = dir.join("shop.db");
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    sqlx::raw_sql(SEED_SQL).execute(&pool).await.unwrap();
    pool.close().await;

    format!("sqlite:{}", path.display())
}

/// Config for the seeded database with the full shop allowlist.
pub fn shop_config(url: &str) -> Config {
    Config {
        database: DatabaseConfig::from_url(url),
        gateway: GatewayConfig::with_tables(SHOP_TABLES),
    }
}

/// A gateway over a freshly seeded database. Keep the `TempDir` alive for
/// as long as the gateway is used.
pub async fn shop_gateway() -> (TempDir, SqlGateway) {
    let dir = TempDir::new().unwrap();
    let url = seed_shop_database(dir.path()).await;
    let gateway = SqlGateway::connect(&shop_config(&url)).await.unwrap();
    (dir, gateway)
}
