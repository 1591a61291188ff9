use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::catalog::{CreateSupplierRequest, SupplierList, UpdateSupplierRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Supplier,
    response::ApiResponse,
    routes::params::SearchQuery,
    services::supplier_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_suppliers).post(create_supplier))
        .route(
            "/{id}",
            get(get_supplier).put(update_supplier).delete(delete_supplier),
        )
}

#[utoipa::path(
    get,
    path = "/api/suppliers",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("q" = Option<String>, Query, description = "Search by name or contact email")
    ),
    responses(
        (status = 200, description = "List suppliers", body = ApiResponse<SupplierList>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Suppliers"
)]
pub async fn list_suppliers(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<ApiResponse<SupplierList>>> {
    let resp = supplier_service::list_suppliers(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/suppliers/{id}",
    params(
        ("id" = Uuid, Path, description = "Supplier ID")
    ),
    responses(
        (status = 200, description = "Get supplier", body = ApiResponse<Supplier>),
        (status = 404, description = "Supplier not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Suppliers"
)]
pub async fn get_supplier(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Supplier>>> {
    let resp = supplier_service::get_supplier(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/suppliers",
    request_body = CreateSupplierRequest,
    responses(
        (status = 201, description = "Create supplier", body = ApiResponse<Supplier>),
        (status = 400, description = "Name is required"),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Suppliers"
)]
pub async fn create_supplier(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateSupplierRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Supplier>>)> {
    let resp = supplier_service::create_supplier(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/suppliers/{id}",
    params(
        ("id" = Uuid, Path, description = "Supplier ID")
    ),
    request_body = UpdateSupplierRequest,
    responses(
        (status = 200, description = "Updated supplier", body = ApiResponse<Supplier>),
        (status = 404, description = "Supplier not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Suppliers"
)]
pub async fn update_supplier(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSupplierRequest>,
) -> AppResult<Json<ApiResponse<Supplier>>> {
    let resp = supplier_service::update_supplier(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/suppliers/{id}",
    params(
        ("id" = Uuid, Path, description = "Supplier ID")
    ),
    responses(
        (status = 200, description = "Deleted supplier", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Supplier not found"),
        (status = 409, description = "Supplier still has products"),
    ),
    security(("bearer_auth" = [])),
    tag = "Suppliers"
)]
pub async fn delete_supplier(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = supplier_service::delete_supplier(&state, &user, id).await?;
    Ok(Json(resp))
}
