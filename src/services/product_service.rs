use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::sea_query::{Expr, LockType};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    audit,
    dto::products::{CreateProductRequest, ProductDetail, ProductList, UpdateProductRequest},
    entity::{
        categories::Entity as Categories,
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
        suppliers::Entity as Suppliers,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Product,
    policy::{Capability, authorize},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    services,
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    user: &AuthUser,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    authorize(user, Capability::BrowseCatalog)?;
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(category_id) = query.category_id {
        condition = condition.add(Column::CategoryId.eq(category_id));
    }

    if let Some(supplier_id) = query.supplier_id {
        condition = condition.add(Column::SupplierId.eq(supplier_id));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::SellingPrice.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::SellingPrice.lte(max_price));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::SellingPrice,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    let data = ProductList { items };
    Ok(ApiResponse::success("Products", data, Some(meta)))
}

pub async fn get_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<ProductDetail>> {
    authorize(user, Capability::BrowseCatalog)?;
    let (product, category) = Products::find_by_id(id)
        .find_also_related(Categories)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Product"))?;

    let supplier = match product.supplier_id {
        Some(supplier_id) => Suppliers::find_by_id(supplier_id).one(&state.orm).await?,
        None => None,
    };

    let detail = ProductDetail {
        product: Product::from(product),
        category_name: category.map(|c| c.name),
        supplier_name: supplier.map(|s| s.name),
    };
    Ok(ApiResponse::success("Product", detail, None))
}

#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id))]
pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    authorize(user, Capability::ManageCatalog)?;
    let name = validate_name(&payload.name)?;
    validate_stock(payload.stock)?;
    validate_price("cost_price", payload.cost_price)?;
    validate_price("selling_price", payload.selling_price)?;
    ensure_references(&state.orm, payload.category_id, payload.supplier_id).await?;

    let active = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        description: Set(payload.description),
        category_id: Set(payload.category_id),
        supplier_id: Set(payload.supplier_id),
        stock: Set(payload.stock),
        cost_price: Set(payload.cost_price),
        selling_price: Set(payload.selling_price),
        created_at: NotSet,
        updated_at: NotSet,
    };
    let product = active.insert(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

/// Partial update. The row is locked for the duration so a `stock` edit
/// cannot interleave with a checkout reading the same product.
#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id, product_id = %id))]
pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    authorize(user, Capability::ManageCatalog)?;

    let txn = state.orm.begin().await?;
    let outcome = update_in(&txn, id, payload).await;
    let product = services::finish(txn, outcome).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

async fn update_in(
    txn: &DatabaseTransaction,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ProductModel> {
    let existing = lock_product(txn, id).await?;
    ensure_references(txn, payload.category_id, payload.supplier_id).await?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(validate_name(&name)?);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(category_id) = payload.category_id {
        active.category_id = Set(Some(category_id));
    }
    if let Some(supplier_id) = payload.supplier_id {
        active.supplier_id = Set(Some(supplier_id));
    }
    if let Some(stock) = payload.stock {
        validate_stock(stock)?;
        active.stock = Set(stock);
    }
    if let Some(cost_price) = payload.cost_price {
        validate_price("cost_price", cost_price)?;
        active.cost_price = Set(cost_price);
    }
    if let Some(selling_price) = payload.selling_price {
        validate_price("selling_price", selling_price)?;
        active.selling_price = Set(selling_price);
    }
    active.updated_at = Set(Utc::now().into());

    Ok(active.update(txn).await?)
}

/// Products that appear on any order are kept for the ledger's sake.
#[tracing::instrument(skip(state), fields(user_id = %user.user_id, product_id = %id))]
pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    authorize(user, Capability::ManageCatalog)?;

    let referenced = OrderItems::find()
        .filter(OrderItemCol::ProductId.eq(id))
        .count(&state.orm)
        .await?;
    if referenced > 0 {
        return Err(AppError::ReferentialConflict(
            "Product is referenced by existing orders; set its stock to 0 instead".into(),
        ));
    }

    // The RESTRICT foreign key still catches an order placed after the check.
    let result = Products::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Product"));
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::message("Deleted"))
}

pub(crate) async fn lock_product(txn: &DatabaseTransaction, id: Uuid) -> AppResult<ProductModel> {
    Products::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or(AppError::NotFound("Product"))
}

async fn ensure_references<C: ConnectionTrait>(
    conn: &C,
    category_id: Option<Uuid>,
    supplier_id: Option<Uuid>,
) -> AppResult<()> {
    if let Some(category_id) = category_id {
        if Categories::find_by_id(category_id).one(conn).await?.is_none() {
            return Err(AppError::NotFound("Category"));
        }
    }
    if let Some(supplier_id) = supplier_id {
        if Suppliers::find_by_id(supplier_id).one(conn).await?.is_none() {
            return Err(AppError::NotFound("Supplier"));
        }
    }
    Ok(())
}

fn validate_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name must not be empty".into()));
    }
    Ok(name.to_string())
}

fn validate_stock(stock: i32) -> AppResult<()> {
    if stock < 0 {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }
    Ok(())
}

/// Prices are stored as NUMERIC(12,2).
// 999_999_999_999 at scale 2 (= 9_999_999_999.99); split into 32-bit lo/mid words for const construction.
const MAX_PRICE: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

fn validate_price(field: &str, price: Decimal) -> AppResult<()> {
    if price < Decimal::ZERO {
        return Err(AppError::BadRequest(format!("{field} must not be negative")));
    }
    if price.normalize().scale() > 2 {
        return Err(AppError::BadRequest(format!(
            "{field} must have at most 2 decimal places"
        )));
    }
    if price > MAX_PRICE {
        return Err(AppError::BadRequest(format!("{field} must not exceed {MAX_PRICE}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn names_are_trimmed_and_required() {
        assert_eq!(validate_name("  Mug ").unwrap(), "Mug");
        assert!(matches!(validate_name("   "), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn negative_stock_and_prices_are_rejected() {
        assert!(validate_stock(0).is_ok());
        assert!(validate_stock(-1).is_err());
        assert!(validate_price("selling_price", dec!(0.00)).is_ok());
        assert!(validate_price("selling_price", dec!(10.00)).is_ok());
        assert!(validate_price("cost_price", dec!(-0.01)).is_err());
    }

    #[test]
    fn prices_must_fit_two_decimal_storage() {
        assert!(validate_price("selling_price", dec!(1.50)).is_ok());
        assert!(validate_price("selling_price", dec!(1.500)).is_ok());
        assert!(matches!(
            validate_price("selling_price", dec!(1.005)),
            Err(AppError::BadRequest(_))
        ));
        assert!(validate_price("selling_price", dec!(9999999999.99)).is_ok());
        assert!(matches!(
            validate_price("cost_price", dec!(10000000000.00)),
            Err(AppError::BadRequest(_))
        ));
    }
}
