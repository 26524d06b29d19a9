//! HTTP API tests
//!
//! Exercise the router with tower::oneshot against a temporary
//! database; no network listener involved.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use orderflow::config::ServiceConfig;
use orderflow::db::catalog;
use orderflow::{build_router, AppState};

async fn test_app() -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pool = orderflow::db::init_database_pool(&dir.path().join("test.db"))
        .await
        .unwrap();
    catalog::insert_product(&pool, "SKU-100", "Widget", None, Some("box"), Some(10.0))
        .await
        .unwrap();
    catalog::insert_customer(&pool, "C-1", "Acme", None, Some("13800138000"), None)
        .await
        .unwrap();

    let state = AppState::new(pool, ServiceConfig::default());
    (build_router(state), dir)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

const BOUNDARY: &str = "orderflow-test-boundary";

fn multipart_upload(csv: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"orders.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         {csv}\r\n\
         --{b}\r\n\
         Content-Disposition: form-data; name=\"operator\"\r\n\r\n\
         OP1\r\n\
         --{b}\r\n\
         Content-Disposition: form-data; name=\"channel\"\r\n\r\n\
         EXCEL\r\n\
         --{b}--\r\n",
        b = BOUNDARY,
    );
    Request::builder()
        .method("POST")
        .uri("/api/tasks")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

const CSV: &str = "客户名称,联系电话,收货地址,区县,商品编码,数量,单价\n\
                   Acme,13800138000,望京街1号,朝阳区,SKU-100,5,10";

async fn wait_for_completion(app: &Router, task_id: &str) -> Value {
    for _ in 0..500 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/tasks/{}", task_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let status = json["status"].as_str().unwrap().to_string();
        if status != "PENDING" && status != "PROCESSING" {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Task {} did not complete", task_id);
}

#[tokio::test]
async fn health_reports_module_and_version() {
    let (app, _dir) = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "orderflow");
}

#[tokio::test]
async fn upload_poll_and_fetch_result() {
    let (app, _dir) = test_app().await;

    let response = app.clone().oneshot(multipart_upload(CSV)).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    let task_id = json["taskId"].as_str().unwrap().to_string();
    assert_eq!(json["status"], "PENDING");

    let task = wait_for_completion(&app, &task_id).await;
    assert_eq!(task["status"], "COMPLETED");
    assert_eq!(task["progress"]["total"], 1);
    assert_eq!(task["progress"]["success"], 1);
    assert_eq!(task["progress"]["percentage"], 100.0);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/tasks/{}/result", task_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["rows"].as_array().unwrap().len(), 1);
    assert_eq!(json["rows"][0]["outcome"], "SUCCESS");
    assert_eq!(json["orderNumbers"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn upload_without_file_part_is_rejected() {
    let (app, _dir) = test_app().await;
    let body = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"operator\"\r\n\r\n\
         OP1\r\n\
         --{b}--\r\n",
        b = BOUNDARY,
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/tasks")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn unknown_task_is_404() {
    let (app, _dir) = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/tasks/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn cancel_after_completion_is_conflict() {
    let (app, _dir) = test_app().await;

    let response = app.clone().oneshot(multipart_upload(CSV)).await.unwrap();
    let json = body_json(response).await;
    let task_id = json["taskId"].as_str().unwrap().to_string();
    wait_for_completion(&app, &task_id).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/tasks/{}/cancel", task_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn task_list_and_statistics() {
    let (app, _dir) = test_app().await;

    let response = app.clone().oneshot(multipart_upload(CSV)).await.unwrap();
    let json = body_json(response).await;
    let task_id = json["taskId"].as_str().unwrap().to_string();
    wait_for_completion(&app, &task_id).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/tasks?page=1&pageSize=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["tasks"][0]["taskId"], task_id);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/tasks/statistics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total_tasks"], 1);
    assert_eq!(json["completed_tasks"], 1);
    assert_eq!(json["success_rows"], 1);
}

#[tokio::test]
async fn bad_status_filter_is_rejected() {
    let (app, _dir) = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/tasks?status=BOGUS")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn error_listing_and_resolution_over_http() {
    let (app, _dir) = test_app().await;

    // Row with no quantity fails validation and leaves an error record
    let bad_csv = "客户名称,联系电话,收货地址,区县,商品编码,数量,单价\n\
                   Acme,13800138000,望京街1号,朝阳区,SKU-100,,10";
    let response = app.clone().oneshot(multipart_upload(bad_csv)).await.unwrap();
    let json = body_json(response).await;
    let task_id = json["taskId"].as_str().unwrap().to_string();
    let task = wait_for_completion(&app, &task_id).await;
    assert_eq!(task["progress"]["failed"], 1);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/tasks/{}/errors", task_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total"], 1);
    let error_id = json["errors"][0]["id"].as_i64().unwrap();
    assert_eq!(json["errors"][0]["error_type"], "VALIDATION_ERROR");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/errors/{}/resolve", error_id))
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"operator": "admin"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "PROCESSED");

    // A second resolve on the same record conflicts
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/errors/{}/ignore", error_id))
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"operator": "admin"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
