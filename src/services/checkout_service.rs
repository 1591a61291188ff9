//! Cart to order conversion.
//!
//! The whole placement runs in one transaction:
//!
//! 1. set a local `lock_timeout`, then select the caller's cart lines joined
//!    with their products `FOR UPDATE`, ordered by product id;
//! 2. validate every line against the locked stock and price it;
//! 3. insert the order header and one snapshot item per line;
//! 4. decrement stock (conditionally, `stock >= quantity`);
//! 5. clear the cart and commit.
//!
//! Any business-rule failure rolls back before the error is returned, so the
//! cart, the catalog and the ledger are never observed half-updated. Row locks
//! on the products serialize competing checkouts for the same product; the
//! second one re-reads the stock the first one left behind.

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    FromQueryResult, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::CheckoutResponse,
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        order_items::ActiveModel as OrderItemActive,
        orders::ActiveModel as OrderActive,
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus},
    policy::{Capability, authorize},
    response::{ApiResponse, Meta},
    services::{self, cart_service},
    state::AppState,
};

/// Cart line joined with the product row as seen under the lock.
#[derive(Debug, Clone, FromQueryResult)]
pub(crate) struct LockedCartLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub product_name: String,
    pub selling_price: Decimal,
    pub stock: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlannedLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CheckoutPlan {
    pub total_amount: Decimal,
    pub lines: Vec<PlannedLine>,
}

/// Validates locked cart lines and freezes their prices. Fails on the first
/// line that cannot be served in full; no partial orders.
pub(crate) fn plan_checkout(lines: &[LockedCartLine]) -> AppResult<CheckoutPlan> {
    if lines.is_empty() {
        return Err(AppError::EmptyCart);
    }

    let mut total_amount = Decimal::ZERO;
    let mut planned = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity <= 0 {
            return Err(AppError::InvalidQuantity);
        }
        if line.quantity > line.stock {
            return Err(AppError::InsufficientStock {
                product_id: line.product_id,
            });
        }
        total_amount += line.selling_price * Decimal::from(line.quantity);
        planned.push(PlannedLine {
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            unit_price: line.selling_price,
            quantity: line.quantity,
        });
    }

    Ok(CheckoutPlan {
        total_amount,
        lines: planned,
    })
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id))]
pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    authorize(user, Capability::PlaceOrder)?;

    let txn = state.orm.begin().await?;
    let outcome = place_order_in(&txn, user.user_id, state.config.checkout_lock_timeout_ms).await;
    let (order, items) = match services::finish(txn, outcome).await {
        Ok(placed) => placed,
        Err(err) => {
            match &err {
                AppError::Transient(_) => tracing::warn!(error = %err, "checkout aborted"),
                _ => tracing::info!(error = %err, "checkout rejected"),
            }
            return Err(err);
        }
    };

    tracing::info!(order_id = %order.id, total = %order.total_amount, lines = items.len(), "order placed");

    audit::record(
        &state.orm,
        Some(user.user_id),
        "checkout",
        "orders",
        serde_json::json!({ "order_id": order.id, "total_amount": order.total_amount }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order placed successfully",
        CheckoutResponse {
            order_id: order.id,
            order,
            items,
        },
        Some(Meta::empty()),
    ))
}

async fn place_order_in(
    txn: &DatabaseTransaction,
    user_id: Uuid,
    lock_timeout_ms: u64,
) -> AppResult<(Order, Vec<OrderItem>)> {
    // Bounded wait: a lock timeout surfaces as a retryable error.
    txn.execute_unprepared(&format!("SET LOCAL lock_timeout = '{lock_timeout_ms}ms'"))
        .await?;

    let locked = lock_cart_lines(txn, user_id).await?;
    let plan = plan_checkout(&locked)?;

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        status: Set(OrderStatus::PendingPayment),
        total_amount: Set(plan.total_amount),
        paid_at: Set(None),
        cancelled_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(txn)
    .await?;

    let mut items = Vec::with_capacity(plan.lines.len());
    for line in &plan.lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            product_name: Set(line.product_name.clone()),
            price_snapshot: Set(line.unit_price),
            quantity: Set(line.quantity),
            created_at: NotSet,
        }
        .insert(txn)
        .await?;
        items.push(OrderItem::from(item));
    }

    for line in &plan.lines {
        decrement_stock(txn, line.product_id, line.quantity).await?;
    }

    cart_service::clear_for_user(txn, user_id).await?;

    Ok((Order::from(order), items))
}

/// Locks the cart rows and their product rows. Ordering by product id keeps
/// the lock acquisition order identical across concurrent checkouts.
async fn lock_cart_lines<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> AppResult<Vec<LockedCartLine>> {
    let rows = CartItems::find()
        .select_only()
        .column(CartCol::ProductId)
        .column(CartCol::Quantity)
        .column_as(ProdCol::Name, "product_name")
        .column(ProdCol::SellingPrice)
        .column(ProdCol::Stock)
        .inner_join(Products)
        .filter(CartCol::UserId.eq(user_id))
        .order_by_asc(CartCol::ProductId)
        .lock(LockType::Update)
        .into_model::<LockedCartLine>()
        .all(conn)
        .await?;
    Ok(rows)
}

/// `stock >= quantity` is re-asserted by the update itself; zero rows means
/// the row changed underneath us and the whole checkout must abort.
async fn decrement_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> AppResult<()> {
    let result = Products::update_many()
        .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(quantity))
        .col_expr(ProdCol::UpdatedAt, Expr::cust("CURRENT_TIMESTAMP"))
        .filter(ProdCol::Id.eq(product_id))
        .filter(ProdCol::Stock.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected != 1 {
        return Err(AppError::InsufficientStock { product_id });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(price: Decimal, stock: i32, quantity: i32) -> LockedCartLine {
        LockedCartLine {
            product_id: Uuid::new_v4(),
            quantity,
            product_name: "Widget".into(),
            selling_price: price,
            stock,
        }
    }

    #[test]
    fn empty_cart_is_rejected() {
        assert!(matches!(plan_checkout(&[]), Err(AppError::EmptyCart)));
    }

    #[test]
    fn total_is_quantity_times_current_price() {
        let plan = plan_checkout(&[line(dec!(10.00), 3, 2)]).unwrap();
        assert_eq!(plan.total_amount, dec!(20.00));
        assert_eq!(plan.lines.len(), 1);
        assert_eq!(plan.lines[0].unit_price, dec!(10.00));
        assert_eq!(plan.lines[0].quantity, 2);
    }

    #[test]
    fn totals_sum_across_lines() {
        let plan = plan_checkout(&[line(dec!(10.00), 3, 2), line(dec!(2.50), 10, 3)]).unwrap();
        assert_eq!(plan.total_amount, dec!(27.50));
    }

    #[test]
    fn one_short_line_fails_the_whole_cart() {
        let ok = line(dec!(1.00), 10, 1);
        let short = line(dec!(5.00), 4, 5);
        let short_id = short.product_id;

        match plan_checkout(&[ok, short]) {
            Err(AppError::InsufficientStock { product_id }) => assert_eq!(product_id, short_id),
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn exact_stock_is_enough() {
        let plan = plan_checkout(&[line(dec!(3.00), 5, 5)]).unwrap();
        assert_eq!(plan.total_amount, dec!(15.00));
    }

    #[test]
    fn snapshot_keeps_name_and_price_seen_under_lock() {
        let mut locked = line(dec!(9.99), 1, 1);
        locked.product_name = "Ferris Mug".into();
        let plan = plan_checkout(std::slice::from_ref(&locked)).unwrap();
        assert_eq!(
            plan.lines[0],
            PlannedLine {
                product_id: locked.product_id,
                product_name: "Ferris Mug".into(),
                unit_price: dec!(9.99),
                quantity: 1,
            }
        );
    }
}
