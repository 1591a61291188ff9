use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use uuid::Uuid;

use crate::{
    audit,
    dto::catalog::{CreateSupplierRequest, SupplierList, UpdateSupplierRequest},
    entity::{
        products::{Column as ProdCol, Entity as Products},
        suppliers::{ActiveModel as SupplierActive, Column as SupplierCol, Entity as Suppliers},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Supplier,
    policy::{Capability, authorize},
    response::{ApiResponse, Meta},
    routes::params::SearchQuery,
    state::AppState,
};

pub async fn list_suppliers(
    state: &AppState,
    user: &AuthUser,
    query: SearchQuery,
) -> AppResult<ApiResponse<SupplierList>> {
    authorize(user, Capability::ManageSuppliers)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut finder = Suppliers::find();
    if let Some(search) = query.q.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        finder = finder.filter(
            Condition::any()
                .add(Expr::col(SupplierCol::Name).ilike(pattern.clone()))
                .add(Expr::col(SupplierCol::ContactEmail).ilike(pattern)),
        );
    }
    let finder = finder.order_by_asc(SupplierCol::Name);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Supplier::from)
        .collect();

    Ok(ApiResponse::success(
        "Suppliers",
        SupplierList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_supplier(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Supplier>> {
    authorize(user, Capability::ManageSuppliers)?;
    let supplier = Suppliers::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Supplier"))?;
    Ok(ApiResponse::success("Supplier", Supplier::from(supplier), None))
}

pub async fn create_supplier(
    state: &AppState,
    user: &AuthUser,
    payload: CreateSupplierRequest,
) -> AppResult<ApiResponse<Supplier>> {
    authorize(user, Capability::ManageSuppliers)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name must not be empty".into()));
    }

    let supplier = SupplierActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        contact_email: Set(non_blank(payload.contact_email)),
        contact_phone: Set(non_blank(payload.contact_phone)),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "supplier_create",
        "suppliers",
        serde_json::json!({ "supplier_id": supplier.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Supplier created",
        Supplier::from(supplier),
        Some(Meta::empty()),
    ))
}

pub async fn update_supplier(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateSupplierRequest,
) -> AppResult<ApiResponse<Supplier>> {
    authorize(user, Capability::ManageSuppliers)?;
    let existing = Suppliers::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Supplier"))?;

    let mut active: SupplierActive = existing.into();
    if let Some(name) = payload.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("name must not be empty".into()));
        }
        active.name = Set(name.to_string());
    }
    if payload.contact_email.is_some() {
        active.contact_email = Set(non_blank(payload.contact_email));
    }
    if payload.contact_phone.is_some() {
        active.contact_phone = Set(non_blank(payload.contact_phone));
    }
    let supplier = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "supplier_update",
        "suppliers",
        serde_json::json!({ "supplier_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        Supplier::from(supplier),
        Some(Meta::empty()),
    ))
}

pub async fn delete_supplier(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    authorize(user, Capability::ManageSuppliers)?;

    let in_use = Products::find()
        .filter(ProdCol::SupplierId.eq(id))
        .count(&state.orm)
        .await?;
    if in_use > 0 {
        return Err(AppError::ReferentialConflict(format!(
            "Supplier is used by {in_use} product(s)"
        )));
    }

    let result = Suppliers::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Supplier"));
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "supplier_delete",
        "suppliers",
        serde_json::json!({ "supplier_id": id }),
    )
    .await;

    Ok(ApiResponse::message("Deleted"))
}

/// Blank contact fields are stored as NULL.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
