use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use axum_inventory_api::{
    config::AppConfig, models::Role, routes::build_app, services::auth_service::issue_token,
    state::AppState,
};

const SECRET: &str = "surface-test-secret";

// Authorization is decided before any query runs, so a disconnected pool is enough.
fn app() -> Router {
    let config = AppConfig::new("postgres://unused", SECRET);
    build_app(AppState::new(DatabaseConnection::default(), config))
}

fn bearer(role: Role) -> String {
    let config = AppConfig::new("postgres://unused", SECRET);
    let token = issue_token(&config, Uuid::new_v4(), role).expect("token");
    format!("Bearer {token}")
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn health_is_public_and_tagged_with_request_id() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = json_body(response).await;
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn missing_token_is_401_with_error_envelope() {
    let response = app()
        .oneshot(Request::get("/api/cart").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["data"]["code"], "unauthorized");
    assert_eq!(body["data"]["retryable"], false);
}

#[tokio::test]
async fn forged_token_is_rejected() {
    let config = AppConfig::new("postgres://unused", "some-other-secret");
    let token = issue_token(&config, Uuid::new_v4(), Role::Admin).unwrap();

    let response = app()
        .oneshot(
            Request::get("/api/admin/orders")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn customers_cannot_manage_the_catalog() {
    let payload = json!({
        "name": "Contraband",
        "stock": 1,
        "cost_price": "1.00",
        "selling_price": "2.00"
    });

    let response = app()
        .oneshot(
            Request::post("/api/products")
                .header(header::AUTHORIZATION, bearer(Role::Customer))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["data"]["code"], "forbidden");
}

#[tokio::test]
async fn customers_cannot_reach_admin_routes() {
    for (method, uri) in [
        ("GET", "/api/admin/orders".to_string()),
        ("GET", "/api/admin/inventory/low-stock".to_string()),
        ("PUT", format!("/api/admin/orders/{}/cancel", Uuid::new_v4())),
    ] {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(&uri)
                    .header(header::AUTHORIZATION, bearer(Role::Customer))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{method} {uri}");
    }
}

#[tokio::test]
async fn unknown_routes_use_the_error_envelope() {
    let response = app()
        .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Route not found");
    assert_eq!(body["data"]["code"], "not_found");
    assert_eq!(body["data"]["retryable"], false);
}
