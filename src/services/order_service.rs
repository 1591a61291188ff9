use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::{Expr, LockType};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{OrderList, OrderWithItems},
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus},
    policy::{Capability, authorize},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services,
    state::AppState,
};

pub async fn list_my_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let owner = user.user_id;
    authorize(user, Capability::ViewOrder { owner })?;
    let condition = Condition::all().add(OrderCol::UserId.eq(owner));
    list_matching(state, condition, query).await
}

/// Shared by the customer and admin listings; the caller decides the scope.
pub(crate) async fn list_matching(
    state: &AppState,
    mut condition: Condition,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Order"))?;
    authorize(user, Capability::ViewOrder { owner: order.user_id })?;

    let items = load_items(&state.orm, order.id).await?;

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: Order::from(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id))]
pub async fn pay_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;
    let outcome = pay_in(&txn, user, id).await;
    let paid = services::finish(txn, outcome).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "order_paid",
        "orders",
        serde_json::json!({ "order_id": paid.order.id }),
    )
    .await;

    Ok(ApiResponse::success("Payment recorded", paid, Some(Meta::empty())))
}

async fn pay_in(txn: &DatabaseTransaction, user: &AuthUser, id: Uuid) -> AppResult<OrderWithItems> {
    let order = lock_order(txn, id).await?;
    authorize(user, Capability::PayOrder { owner: order.user_id })?;
    let next = next_status(&order, OrderStatus::Paid)?;

    let now = Utc::now();
    let mut active: OrderActive = order.into();
    active.status = Set(next);
    active.paid_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    let order = active.update(txn).await?;

    let items = load_items(txn, order.id).await?;
    Ok(OrderWithItems {
        order: Order::from(order),
        items,
    })
}

/// Cancels a pending order and returns its quantities to stock in the same
/// transaction.
#[tracing::instrument(skip(state), fields(user_id = %user.user_id))]
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;
    let outcome = cancel_in(&txn, user, id).await;
    let cancelled = services::finish(txn, outcome).await?;

    tracing::info!(order_id = %id, "order cancelled, stock restored");
    audit::record(
        &state.orm,
        Some(user.user_id),
        "order_cancelled",
        "orders",
        serde_json::json!({ "order_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Order cancelled", cancelled, Some(Meta::empty())))
}

async fn cancel_in(
    txn: &DatabaseTransaction,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<OrderWithItems> {
    let order = lock_order(txn, id).await?;
    authorize(user, Capability::CancelOrder { owner: order.user_id })?;
    let next = next_status(&order, OrderStatus::Cancelled)?;

    let items = load_items(txn, order.id).await?;
    let mut restock: Vec<(Uuid, i32)> = items.iter().map(|i| (i.product_id, i.quantity)).collect();
    // Same product order as checkout takes its locks in.
    restock.sort_by_key(|(product_id, _)| *product_id);
    for (product_id, quantity) in restock {
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(quantity))
            .col_expr(ProdCol::UpdatedAt, Expr::cust("CURRENT_TIMESTAMP"))
            .filter(ProdCol::Id.eq(product_id))
            .exec(txn)
            .await?;
    }

    let now = Utc::now();
    let mut active: OrderActive = order.into();
    active.status = Set(next);
    active.cancelled_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    let order = active.update(txn).await?;

    Ok(OrderWithItems {
        order: Order::from(order),
        items,
    })
}

async fn lock_order(txn: &DatabaseTransaction, id: Uuid) -> AppResult<OrderModel> {
    Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or(AppError::NotFound("Order"))
}

fn next_status(order: &OrderModel, target: OrderStatus) -> AppResult<OrderStatus> {
    order
        .status
        .transition_to(target)
        .ok_or(AppError::InvalidTransition {
            from: order.status,
            to: target,
        })
}

pub(crate) async fn load_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> AppResult<Vec<OrderItem>> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .order_by_asc(OrderItemCol::ProductId)
        .all(conn)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect();
    Ok(items)
}
