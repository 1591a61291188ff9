use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        orders::{OrderList, OrderWithItems},
        products::{InventoryAdjustRequest, ProductList},
    },
    entity::{
        orders::Column as OrderCol,
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Product,
    policy::{Capability, authorize},
    response::{ApiResponse, Meta},
    routes::params::{LowStockQuery, OrderListQuery},
    services::{self, order_service, product_service},
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    authorize(user, Capability::ViewAllOrders)?;
    let mut condition = Condition::all();
    if let Some(owner) = query.user_id {
        condition = condition.add(OrderCol::UserId.eq(owner));
    }
    order_service::list_matching(state, condition, query).await
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    authorize(user, Capability::ViewAllOrders)?;
    order_service::get_order(state, user, id).await
}

/// Same transition and stock restoration as the owner's cancel.
pub async fn cancel_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    authorize(user, Capability::ViewAllOrders)?;
    order_service::cancel_order(state, user, id).await
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    authorize(user, Capability::ManageInventory)?;
    let threshold = query.threshold.unwrap_or(state.config.low_stock_threshold);
    let (page, limit, offset) = query.pagination().normalize();

    let finder = Products::find()
        .filter(ProdCol::Stock.lt(threshold))
        .order_by_asc(ProdCol::Stock)
        .order_by_asc(ProdCol::Name);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    let data = ProductList { items };
    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Low stock", data, Some(meta)))
}

#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id, product_id = %id, delta = payload.delta))]
pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    authorize(user, Capability::ManageInventory)?;
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let txn = state.orm.begin().await?;
    let outcome = adjust_in(&txn, id, payload.delta).await;
    let updated = services::finish(txn, outcome).await?;

    tracing::info!(stock = updated.stock, "inventory adjusted");
    audit::record(
        &state.orm,
        Some(user.user_id),
        "inventory_adjust",
        "products",
        serde_json::json!({ "product_id": updated.id, "delta": payload.delta, "stock": updated.stock }),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        Product::from(updated),
        Some(Meta::empty()),
    ))
}

async fn adjust_in(txn: &DatabaseTransaction, id: Uuid, delta: i32) -> AppResult<ProductModel> {
    let product = product_service::lock_product(txn, id).await?;
    let new_stock = apply_delta(product.stock, delta)?;

    let mut active: ProductActive = product.into();
    active.stock = Set(new_stock);
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(txn).await?)
}

fn apply_delta(stock: i32, delta: i32) -> AppResult<i32> {
    match stock.checked_add(delta) {
        Some(next) if next >= 0 => Ok(next),
        Some(_) => Err(AppError::BadRequest("stock cannot be negative".into())),
        None => Err(AppError::BadRequest("stock adjustment out of range".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_may_not_drive_stock_negative() {
        assert_eq!(apply_delta(5, -5).unwrap(), 0);
        assert_eq!(apply_delta(5, 3).unwrap(), 8);
        assert!(matches!(apply_delta(2, -3), Err(AppError::BadRequest(_))));
        assert!(apply_delta(i32::MAX, 1).is_err());
    }
}
