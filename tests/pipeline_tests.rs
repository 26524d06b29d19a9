//! End-to-end pipeline tests
//!
//! Drive the coordinator directly over a temporary SQLite database with
//! the AI service disabled, so every path is deterministic.

use std::time::Duration;

use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

use orderflow::config::ServiceConfig;
use orderflow::db::{catalog, errors as error_db, orders, rows};
use orderflow::models::{
    ErrorLevel, ErrorStatus, ErrorType, IngestionTask, MatchType, TaskStatus,
};
use orderflow::services::coordinator::TaskCoordinator;

async fn setup() -> (TaskCoordinator, SqlitePool, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pool = orderflow::db::init_database_pool(&dir.path().join("test.db"))
        .await
        .unwrap();

    catalog::insert_product(&pool, "SKU-100", "Widget", Some("L"), Some("box"), Some(10.5))
        .await
        .unwrap();
    catalog::insert_product(&pool, "SKU-200", "Widget Pro Max", None, None, Some(99.0))
        .await
        .unwrap();
    catalog::insert_customer(
        &pool,
        "C-1",
        "Acme",
        Some("Wang"),
        Some("13800138000"),
        Some("Beijing"),
    )
    .await
    .unwrap();

    let coordinator = TaskCoordinator::new(pool.clone(), ServiceConfig::default());
    (coordinator, pool, dir)
}

async fn wait_for_terminal(coordinator: &TaskCoordinator, task_id: Uuid) -> IngestionTask {
    for _ in 0..500 {
        let (task, _) = coordinator.progress(task_id).await.unwrap();
        if task.status.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Task {} did not reach a terminal state", task_id);
}

const HEADERS: &str = "客户名称,联系电话,收货地址,区县,商品编码,商品名称,数量,单价";

fn csv(rows: &[&str]) -> Vec<u8> {
    let mut out = String::from(HEADERS);
    out.push('\n');
    for row in rows {
        out.push_str(row);
        out.push('\n');
    }
    out.into_bytes()
}

async fn submit(coordinator: &TaskCoordinator, body: Vec<u8>) -> IngestionTask {
    let task = coordinator
        .submit(body, "orders.csv".into(), "OP1".into(), "EXCEL".into(), None)
        .await
        .unwrap();
    wait_for_terminal(coordinator, task.task_id).await
}

#[tokio::test]
async fn valid_row_materializes_an_order() {
    let (coordinator, pool, _dir) = setup().await;
    let body = csv(&["Acme,13800138000,望京街1号,朝阳区,SKU-100,,5,10.5"]);
    let task = submit(&coordinator, body).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.total_rows, 1);
    assert_eq!(task.success_rows, 1);
    assert_eq!(task.failed_rows, 0);

    let numbers = orders::order_numbers_for_task(&pool, task.task_id).await.unwrap();
    assert_eq!(numbers.len(), 1);
    assert!(numbers[0].starts_with("OP1EXCEL"));
    assert!(numbers[0].ends_with("0001"));

    let total: f64 = sqlx::query_scalar("SELECT total_amount FROM orders WHERE order_number = ?")
        .bind(&numbers[0])
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!((total - 52.5).abs() < 1e-9);

    let details = rows::list_row_results(&pool, task.task_id).await.unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].outcome, "SUCCESS");
    assert_eq!(details[0].confidence, 1.0);
    assert_eq!(details[0].order_number.as_deref(), Some(numbers[0].as_str()));

    // Match details survive the round trip to the result endpoint
    let product = details[0].product_match.as_ref().unwrap();
    assert!(product.matched);
    assert_eq!(product.entity_key.as_deref(), Some("SKU-100"));
    assert_eq!(product.match_type, MatchType::Exact);
    let customer = details[0].customer_match.as_ref().unwrap();
    assert!(customer.matched);
    assert_eq!(customer.entity_key.as_deref(), Some("C-1"));
}

#[tokio::test]
async fn missing_price_falls_back_to_catalog_price() {
    let (coordinator, pool, _dir) = setup().await;
    let body = csv(&["Acme,13800138000,望京街1号,朝阳区,SKU-100,,4,"]);
    let task = submit(&coordinator, body).await;

    assert_eq!(task.success_rows, 1);

    let numbers = orders::order_numbers_for_task(&pool, task.task_id).await.unwrap();
    let total: f64 = sqlx::query_scalar("SELECT total_amount FROM orders WHERE order_number = ?")
        .bind(&numbers[0])
        .fetch_one(&pool)
        .await
        .unwrap();
    // 4 * catalog price 10.5
    assert!((total - 42.0).abs() < 1e-9);
}

#[tokio::test]
async fn missing_quantity_fails_validation() {
    let (coordinator, pool, _dir) = setup().await;
    let body = csv(&["Acme,13800138000,望京街1号,朝阳区,SKU-100,,,10.5"]);
    let task = submit(&coordinator, body).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.failed_rows, 1);
    assert_eq!(task.success_rows, 0);

    let errors = error_db::list_errors(&pool, task.task_id, None).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_type, ErrorType::ValidationError);
    assert!(errors[0].message.contains("quantity"));
    assert_eq!(errors[0].status, ErrorStatus::Pending);
}

#[tokio::test]
async fn unparseable_quantity_is_a_validation_failure() {
    let (coordinator, pool, _dir) = setup().await;
    let body = csv(&["Acme,13800138000,望京街1号,朝阳区,SKU-100,,abc,10.5"]);
    let task = submit(&coordinator, body).await;

    assert_eq!(task.failed_rows, 1);
    let errors = error_db::list_errors(&pool, task.task_id, None).await.unwrap();
    assert_eq!(errors[0].error_type, ErrorType::ValidationError);
}

#[tokio::test]
async fn exact_product_name_matches_without_ai() {
    let (coordinator, pool, _dir) = setup().await;
    let body = csv(&["Acme,13800138000,望京街1号,朝阳区,,Widget Pro Max,2,99"]);
    let task = submit(&coordinator, body).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.success_rows, 1);

    let details = rows::list_row_results(&pool, task.task_id).await.unwrap();
    assert_eq!(details[0].confidence, 1.0);
}

#[tokio::test]
async fn inexact_product_name_without_ai_is_unmatched() {
    let (coordinator, pool, _dir) = setup().await;
    // Product resolution is AI-or-nothing past exact matching; with the
    // AI disabled a near-miss name is rejected, not fuzzy-matched.
    let body = csv(&["Acme,13800138000,望京街1号,朝阳区,,Widget Pro,2,99"]);
    let task = submit(&coordinator, body).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.failed_rows, 1);
    assert_eq!(task.manual_rows, 0);

    let errors = error_db::list_errors(&pool, task.task_id, None).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_type, ErrorType::ProductNotFound);
    assert_eq!(errors[0].level, ErrorLevel::Error);
}

#[tokio::test]
async fn counters_always_balance() {
    let (coordinator, _pool, _dir) = setup().await;
    let body = csv(&[
        "Acme,13800138000,望京街1号,朝阳区,SKU-100,,5,10.5",
        "Acme,13800138000,望京街1号,朝阳区,,Widget Pro,2,99",
        "Acme,13800138000,望京街1号,朝阳区,SKU-100,,,10.5",
        "Acme,13800138000,望京街1号,朝阳区,,没有这个产品,1,1",
    ]);
    let task = submit(&coordinator, body).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.total_rows, 4);
    assert_eq!(
        task.processed_rows,
        task.success_rows + task.failed_rows + task.manual_rows
    );
    assert_eq!(task.processed_rows, 4);
    assert_eq!(task.success_rows, 1);
    assert_eq!(task.manual_rows, 0);
    assert_eq!(task.failed_rows, 3);
}

#[tokio::test]
async fn unreadable_file_fails_the_task() {
    let (coordinator, pool, _dir) = setup().await;
    let task = coordinator
        .submit(
            b"definitely not a workbook".to_vec(),
            "orders.xlsx".into(),
            "OP1".into(),
            "EXCEL".into(),
            None,
        )
        .await
        .unwrap();
    let task = wait_for_terminal(&coordinator, task.task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error_message.is_some());

    let errors = error_db::list_errors(&pool, task.task_id, None).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_type, ErrorType::TaskError);
}

#[tokio::test]
async fn empty_upload_is_rejected_synchronously() {
    let (coordinator, _pool, _dir) = setup().await;
    let err = coordinator
        .submit(Vec::new(), "orders.csv".into(), "OP1".into(), "EXCEL".into(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, orderflow::Error::InvalidInput(_)));
}

#[tokio::test]
async fn invalid_min_confidence_is_rejected() {
    let (coordinator, _pool, _dir) = setup().await;
    let err = coordinator
        .submit(
            csv(&["Acme,13800138000,a,b,SKU-100,,1,1"]),
            "orders.csv".into(),
            "OP1".into(),
            "EXCEL".into(),
            Some(1.5),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, orderflow::Error::InvalidInput(_)));
}

#[tokio::test]
async fn error_records_resolve_once() {
    let (coordinator, pool, _dir) = setup().await;
    let body = csv(&["Acme,13800138000,望京街1号,朝阳区,SKU-100,,,10.5"]);
    let task = submit(&coordinator, body).await;

    let errors = error_db::list_errors(&pool, task.task_id, None).await.unwrap();
    let id = errors[0].id;

    let updated = error_db::resolve_error(&pool, id, ErrorStatus::Processed, "admin")
        .await
        .unwrap();
    assert!(updated);

    // Already resolved; the second transition is refused
    let updated = error_db::resolve_error(&pool, id, ErrorStatus::Ignored, "admin")
        .await
        .unwrap();
    assert!(!updated);

    let errors = error_db::list_errors(&pool, task.task_id, Some(ErrorStatus::Processed))
        .await
        .unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].resolved_by.as_deref(), Some("admin"));
    assert!(errors[0].resolved_at.is_some());
}

#[tokio::test]
async fn cancellation_reaches_a_consistent_terminal_state() {
    let (coordinator, _pool, _dir) = setup().await;

    let rows: Vec<String> = (0..2000)
        .map(|i| format!("Acme,13800138000,望京街1号,朝阳区,SKU-100,,{},10.5", i + 1))
        .collect();
    let refs: Vec<&str> = rows.iter().map(|s| s.as_str()).collect();
    let body = csv(&refs);

    let task = coordinator
        .submit(body, "orders.csv".into(), "OP1".into(), "EXCEL".into(), None)
        .await
        .unwrap();
    coordinator.cancel(task.task_id).await.unwrap();

    let task = wait_for_terminal(&coordinator, task.task_id).await;
    assert!(matches!(
        task.status,
        TaskStatus::Cancelled | TaskStatus::Completed
    ));
    // Queued rows never start after cancellation, so counters stay
    // consistent with whatever did run.
    assert_eq!(
        task.processed_rows,
        task.success_rows + task.failed_rows + task.manual_rows
    );
    assert!(task.processed_rows <= task.total_rows);
    if task.status == TaskStatus::Cancelled {
        assert!(task.processed_rows < task.total_rows);
    }
}

#[tokio::test]
async fn huge_page_number_is_an_empty_page() {
    let (coordinator, pool, _dir) = setup().await;
    let body = csv(&["Acme,13800138000,望京街1号,朝阳区,SKU-100,,5,10.5"]);
    submit(&coordinator, body).await;

    let (tasks, total) = orderflow::db::tasks::list_tasks(&pool, u32::MAX, 20, None)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn soft_deleted_task_disappears_from_reads() {
    let (coordinator, pool, _dir) = setup().await;
    let body = csv(&["Acme,13800138000,望京街1号,朝阳区,SKU-100,,5,10.5"]);
    let task = submit(&coordinator, body).await;

    let deleted = orderflow::db::tasks::soft_delete_task(&pool, task.task_id)
        .await
        .unwrap();
    assert!(deleted);

    let loaded = orderflow::db::tasks::load_task(&pool, task.task_id).await.unwrap();
    assert!(loaded.is_none());

    // Second delete is a no-op
    let deleted = orderflow::db::tasks::soft_delete_task(&pool, task.task_id)
        .await
        .unwrap();
    assert!(!deleted);
}
