//! Integration tests for db-gate.
//!
//! SQLite tests run against a temp-file database seeded per test.
//! PostgreSQL tests need DATABASE_URL pointing at a Postgres server.

pub mod common;
pub mod config_test;
pub mod gateway_test;
pub mod postgres_test;
pub mod schema_test;
