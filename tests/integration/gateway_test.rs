//! End-to-end gateway tests against a seeded SQLite database.

use super::common::{shop_gateway, CUSTOMER_COUNT};
use db_gate::db::Value;
use db_gate::gateway::tool::{self, ToolOutput};
use db_gate::{CandidateStatement, ErrorKind};
use pretty_assertions::assert_eq;

async fn customer_count(gateway: &db_gate::SqlGateway) -> i64 {
    let result = gateway
        .execute("SELECT COUNT(*) AS n FROM customers")
        .await
        .unwrap();
    match result.rows()[0][0] {
        Value::Int(n) => n,
        ref other => panic!("Expected Int count, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unbounded_select_is_capped() {
    let (_dir, gateway) = shop_gateway().await;

    let result = gateway.execute("SELECT * FROM customers").await.unwrap();

    assert_eq!(result.columns(), ["id", "name", "email", "country"]);
    assert_eq!(result.row_count(), 200);
    assert!(CUSTOMER_COUNT > 200);
}

#[tokio::test]
async fn test_bound_survives_comments_and_literals() {
    let (_dir, gateway) = shop_gateway().await;

    for sql in [
        "SELECT * FROM customers -- all of them",
        "SELECT * FROM customers WHERE name <> 'limit 5'",
        "SELECT * FROM customers /* limit 10 */",
        "SELECT * FROM customers\n-- no limit 1 please",
    ] {
        let result = gateway.execute(sql).await.unwrap();
        assert_eq!(result.row_count(), 200, "SQL: '{}'", sql);
    }
}

#[tokio::test]
async fn test_explicit_limit_is_respected() {
    let (_dir, gateway) = shop_gateway().await;

    let result = gateway
        .execute("select id from customers order by id limit 5")
        .await
        .unwrap();

    assert_eq!(result.row_count(), 5);
    assert_eq!(result.rows()[4][0], Value::Int(5));
}

#[tokio::test]
async fn test_aggregate_runs_unbounded() {
    let (_dir, gateway) = shop_gateway().await;

    let result = gateway.execute("SELECT COUNT(*) FROM orders;").await.unwrap();
    assert_eq!(result.row_count(), 1);
    assert_eq!(result.rows()[0][0], Value::Int(3));

    let grouped = gateway
        .execute("SELECT status, COUNT(*) AS n FROM orders GROUP BY status ORDER BY status")
        .await
        .unwrap();
    assert_eq!(grouped.columns(), ["status", "n"]);
    assert_eq!(grouped.row_count(), 3);
}

#[tokio::test]
async fn test_write_is_denied_and_data_untouched() {
    let (_dir, gateway) = shop_gateway().await;

    let err = gateway
        .execute("DELETE FROM customers WHERE id=1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteOperationForbidden);

    let err = gateway
        .execute("SELECT * FROM customers; DROP TABLE customers")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteOperationForbidden);

    assert_eq!(customer_count(&gateway).await, CUSTOMER_COUNT);
}

#[tokio::test]
async fn test_non_select_is_denied() {
    let (_dir, gateway) = shop_gateway().await;

    for sql in [
        "PRAGMA table_info(customers)",
        "EXPLAIN SELECT 1",
        "WITH t AS (SELECT 1) SELECT * FROM t",
        "   ",
    ] {
        let err = gateway.execute(sql).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonSelectForbidden, "SQL: '{}'", sql);
    }
}

#[tokio::test]
async fn test_multiple_statements_denied() {
    let (_dir, gateway) = shop_gateway().await;

    let err = gateway
        .execute("SELECT 1; SELECT 2")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MultipleStatementsForbidden);
    assert_eq!(err.to_string(), "multiple statements are not allowed.");
}

#[tokio::test]
async fn test_unknown_table_is_execution_failure() {
    let (_dir, gateway) = shop_gateway().await;

    let err = gateway.execute("SELECT * FROM nosuch").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExecutionFailure);
    assert!(
        err.to_string().contains("no such table"),
        "unexpected message: {}",
        err
    );
}

#[tokio::test]
async fn test_empty_result_keeps_columns() {
    let (_dir, gateway) = shop_gateway().await;

    let result = gateway
        .execute("SELECT id, name FROM customers WHERE id < 0")
        .await
        .unwrap();

    assert_eq!(result.columns(), ["id", "name"]);
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_repeated_execution_is_idempotent() {
    let (_dir, gateway) = shop_gateway().await;
    let sql = "SELECT o.id, c.name FROM orders o JOIN customers c ON c.id = o.customer_id ORDER BY o.id";

    let first = gateway.execute(sql).await.unwrap();
    let second = gateway.execute(sql).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.rows()[0], vec![Value::Int(1), Value::from("Customer 1")]);
}

#[tokio::test]
async fn test_concurrent_calls_are_independent() {
    let (_dir, gateway) = shop_gateway().await;

    let calls = (1..=12).map(|i| {
        let sql = if i % 3 == 0 {
            format!("DELETE FROM customers WHERE id = {i}")
        } else {
            format!("SELECT id FROM customers WHERE id = {i}")
        };
        gateway.execute(CandidateStatement::new(sql).with_origin(format!("agent-{i}")))
    });
    let outcomes = futures::future::join_all(calls).await;

    for (i, outcome) in (1..=12).zip(outcomes) {
        if i % 3 == 0 {
            assert_eq!(
                outcome.unwrap_err().kind(),
                ErrorKind::WriteOperationForbidden
            );
        } else {
            let result = outcome.unwrap();
            assert_eq!(result.rows(), [vec![Value::Int(i)]]);
        }
    }
    assert_eq!(customer_count(&gateway).await, CUSTOMER_COUNT);
}

#[tokio::test]
async fn test_tool_invocation_end_to_end() {
    let (_dir, gateway) = shop_gateway().await;

    let output = tool::invoke(
        &gateway,
        "execute_sql",
        &serde_json::json!({"sql": "SELECT id, name FROM products ORDER BY id"}),
    )
    .await;
    assert_eq!(
        output.to_json(),
        serde_json::json!({
            "columns": ["id", "name"],
            "rows": [[1, "Widget"], [2, "Gadget"]]
        })
    );

    let denied = tool::invoke(
        &gateway,
        "execute_sql",
        &serde_json::json!({"sql": "DROP TABLE products"}),
    )
    .await;
    assert_eq!(
        denied,
        ToolOutput::Error("ERROR: write operations are not allowed.".to_string())
    );
}
