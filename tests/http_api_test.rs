//! HTTP API 集成测试

mod common;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use common::*;
use mqlserver::service::http::handlers::AppState;
use mqlserver::service::http::routes;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

fn spec_json() -> Value {
    json!({
        "model_key": {
            "organization": "acme",
            "repo": "metrics",
            "branch": "main",
            "commit": "abc123"
        },
        "metrics": ["revenue"],
        "group_by": ["country"]
    })
}

macro_rules! app {
    ($engine:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(Arc::new(AppState {
                    engine: $engine.clone(),
                })))
                .configure(routes::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_submit_poll_and_fetch_result() {
    let t = engine();
    let app = app!(t.engine);

    let req = test::TestRequest::post()
        .uri("/api/queries")
        .set_json(spec_json())
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], json!(true));
    let query_id = body["data"]["query_id"].as_str().unwrap().to_string();

    let mut status = String::new();
    for _ in 0..200 {
        let req = test::TestRequest::get()
            .uri(&format!("/api/queries/{}/status", query_id))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        status = body["data"]["status"].as_str().unwrap().to_string();
        if status == "SUCCESSFUL" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(status, "SUCCESSFUL");

    let req = test::TestRequest::get()
        .uri(&format!("/api/queries/{}/result", query_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let series = body["data"].as_array().unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series[0]["metric_name"], json!("revenue"));
    assert_eq!(series[0]["data"][0], json!({"type": "scalar", "y": 1.0}));

    let req = test::TestRequest::get()
        .uri(&format!("/api/queries/{}/logs?from_line=0&max_lines=1", query_id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let logs = body["data"]["logs"].as_str().unwrap();
    assert_eq!(logs.lines().count(), 1);
    assert!(logs.contains("Query submitted"));
}

#[actix_web::test]
async fn test_invalid_spec_is_bad_request() {
    let t = engine();
    let app = app!(t.engine);

    let mut spec = spec_json();
    spec["metrics"] = json!([]);
    let req = test::TestRequest::post()
        .uri("/api/queries")
        .set_json(spec)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_unknown_query_is_not_found() {
    let t = engine();
    let app = app!(t.engine);

    for path in ["status", "result", "logs"] {
        let req = test::TestRequest::get()
            .uri(&format!("/api/queries/mql_missing/{}", path))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", path);
    }
}

#[actix_web::test]
async fn test_result_not_ready_is_accepted_with_status() {
    let gate = Arc::new(Semaphore::new(0));
    let t = engine_with(test_config(), FakeBackend::gated(gate.clone()));
    let app = app!(t.engine);

    let id = t.engine.submit_query(spec()).unwrap();
    let req = test::TestRequest::get()
        .uri(&format!("/api/queries/{}/result", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], json!(false));
    assert!(body["error"]["query_status"].is_string());

    gate.add_permits(1);
    wait_terminal(&t.engine, &id).await;
}

#[actix_web::test]
async fn test_tabular_bad_orient_is_bad_request() {
    let t = engine();
    let app = app!(t.engine);

    let id = t.engine.submit_query(spec()).unwrap();
    wait_terminal(&t.engine, &id).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/queries/{}/result/tabular?orient=sideways", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri(&format!("/api/queries/{}/result/tabular?orient=split", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["data"]["data"].is_string());
    assert!(body["data"]["next_cursor"].is_null());
}

#[actix_web::test]
async fn test_drop_cache_token_handling() {
    let t = engine();
    let app = app!(t.engine);

    let id = t.engine.submit_query(spec()).unwrap();
    wait_terminal(&t.engine, &id).await;

    let req = test::TestRequest::post()
        .uri("/api/cache/drop")
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri("/api/cache/drop")
        .set_json(json!({ "confirmation_token": DROP_TOKEN }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["removed"], json!(1));
}

#[actix_web::test]
async fn test_materialize_endpoint() {
    let t = engine();
    let app = app!(t.engine);

    let req = test::TestRequest::post()
        .uri("/api/materialize")
        .set_json(json!({ "spec": spec_json(), "as_table": "reports.daily" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"], json!({"schema": "reports", "table": "daily"}));
    assert!(t.tables.path().join("reports").join("daily.parquet").exists());

    let req = test::TestRequest::post()
        .uri("/api/materialize")
        .set_json(json!({ "spec": spec_json(), "as_table": "bad name" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_list_queries_endpoint() {
    let t = engine();
    let app = app!(t.engine);

    let a = t.engine.submit_query(spec()).unwrap();
    let b = t.engine.submit_query(spec()).unwrap();
    wait_terminal(&t.engine, &a).await;
    wait_terminal(&t.engine, &b).await;

    let req = test::TestRequest::get()
        .uri("/api/queries?limit=1")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], json!(b.as_str()));

    let req = test::TestRequest::get()
        .uri("/api/queries?active_only=true")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn test_health_and_metrics() {
    let t = engine();
    let app = app!(t.engine);

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 4);
    assert!(items.iter().all(|i| i["status"] == json!("HEALTHY")));

    t.engine.shutdown();
    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
