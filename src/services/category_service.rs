use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use uuid::Uuid;

use crate::{
    audit,
    dto::catalog::{CategoryList, CategoryRequest},
    entity::{
        categories::{ActiveModel as CategoryActive, Column as CategoryCol, Entity as Categories},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Category,
    policy::{Capability, authorize},
    response::{ApiResponse, Meta},
    routes::params::SearchQuery,
    state::AppState,
};

pub async fn list_categories(
    state: &AppState,
    user: &AuthUser,
    query: SearchQuery,
) -> AppResult<ApiResponse<CategoryList>> {
    authorize(user, Capability::BrowseCatalog)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut finder = Categories::find();
    if let Some(search) = query.q.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        finder = finder.filter(Expr::col(CategoryCol::Name).ilike(format!("%{}%", search)));
    }
    let finder = finder.order_by_asc(CategoryCol::Name);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Category::from)
        .collect();

    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    authorize(user, Capability::ManageCatalog)?;
    let name = category_name(&payload.name)?;
    ensure_name_free(state, &name, None).await?;

    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "category_create",
        "categories",
        serde_json::json!({ "category_id": category.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Category created",
        Category::from(category),
        Some(Meta::empty()),
    ))
}

pub async fn rename_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: CategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    authorize(user, Capability::ManageCatalog)?;
    let name = category_name(&payload.name)?;

    let existing = Categories::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Category"))?;
    ensure_name_free(state, &name, Some(id)).await?;

    let mut active: CategoryActive = existing.into();
    active.name = Set(name);
    let category = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "category_update",
        "categories",
        serde_json::json!({ "category_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        Category::from(category),
        Some(Meta::empty()),
    ))
}

pub async fn delete_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    authorize(user, Capability::ManageCatalog)?;

    let in_use = Products::find()
        .filter(ProdCol::CategoryId.eq(id))
        .count(&state.orm)
        .await?;
    if in_use > 0 {
        return Err(AppError::ReferentialConflict(format!(
            "Category is used by {in_use} product(s)"
        )));
    }

    let result = Categories::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Category"));
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "category_delete",
        "categories",
        serde_json::json!({ "category_id": id }),
    )
    .await;

    Ok(ApiResponse::message("Deleted"))
}

fn category_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name must not be empty".into()));
    }
    Ok(name.to_string())
}

async fn ensure_name_free(state: &AppState, name: &str, except: Option<Uuid>) -> AppResult<()> {
    let mut finder = Categories::find().filter(CategoryCol::Name.eq(name));
    if let Some(id) = except {
        finder = finder.filter(CategoryCol::Id.ne(id));
    }
    if finder.one(&state.orm).await?.is_some() {
        return Err(AppError::Conflict(format!("Category '{name}' already exists")));
    }
    Ok(())
}
