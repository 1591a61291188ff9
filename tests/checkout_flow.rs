mod common;

use rust_decimal_macros::dec;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};

use axum_inventory_api::{
    dto::cart::{AddToCartRequest, SetQuantityRequest},
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        orders::{Column as OrderCol, Entity as Orders},
        products::{ActiveModel as ProductActive, Entity as Products},
    },
    error::AppError,
    models::{OrderStatus, Role},
    services::{cart_service, checkout_service, order_service},
};

use common::{add_to_cart, create_product, create_user, stock_of, test_state, test_state_with};

#[tokio::test]
async fn checkout_freezes_total_decrements_stock_and_clears_cart() -> anyhow::Result<()> {
    let Some(state) = test_state().await else {
        return Ok(());
    };
    let user = create_user(&state, Role::Customer).await;
    let product = create_product(&state, dec!(10.00), 3).await;
    add_to_cart(&state, &user, product.id, 2).await;

    let placed = checkout_service::place_order(&state, &user)
        .await?
        .data
        .expect("checkout data");

    assert_eq!(placed.order_id, placed.order.id);
    assert_eq!(placed.order.total_amount, dec!(20.00));
    assert_eq!(placed.order.status, OrderStatus::PendingPayment);
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].price_snapshot, dec!(10.00));
    assert_eq!(placed.items[0].product_name, product.name);
    assert_eq!(placed.items[0].quantity, 2);

    assert_eq!(stock_of(&state, product.id).await, 1);
    let cart = cart_service::list_for_user(&state, &user).await?.data.expect("cart");
    assert!(cart.items.is_empty());
    Ok(())
}

#[tokio::test]
async fn empty_cart_cannot_be_checked_out() -> anyhow::Result<()> {
    let Some(state) = test_state().await else {
        return Ok(());
    };
    let user = create_user(&state, Role::Customer).await;

    let err = checkout_service::place_order(&state, &user).await.unwrap_err();
    assert!(matches!(err, AppError::EmptyCart));

    let orders = Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .count(&state.orm)
        .await?;
    assert_eq!(orders, 0);
    Ok(())
}

#[tokio::test]
async fn one_short_line_leaves_everything_untouched() -> anyhow::Result<()> {
    let Some(state) = test_state().await else {
        return Ok(());
    };
    let user = create_user(&state, Role::Customer).await;
    let plenty = create_product(&state, dec!(1.00), 10).await;
    let scarce = create_product(&state, dec!(5.00), 1).await;
    add_to_cart(&state, &user, plenty.id, 3).await;
    add_to_cart(&state, &user, scarce.id, 2).await;

    match checkout_service::place_order(&state, &user).await {
        Err(AppError::InsufficientStock { product_id }) => assert_eq!(product_id, scarce.id),
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    assert_eq!(stock_of(&state, plenty.id).await, 10);
    assert_eq!(stock_of(&state, scarce.id).await, 1);
    let orders = Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .count(&state.orm)
        .await?;
    assert_eq!(orders, 0);
    let cart_lines = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .count(&state.orm)
        .await?;
    assert_eq!(cart_lines, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_checkouts_never_oversell() -> anyhow::Result<()> {
    let Some(state) = test_state().await else {
        return Ok(());
    };
    let product = create_product(&state, dec!(4.00), 5).await;
    let alice = create_user(&state, Role::Customer).await;
    let bob = create_user(&state, Role::Customer).await;
    add_to_cart(&state, &alice, product.id, 5).await;
    add_to_cart(&state, &bob, product.id, 5).await;

    let tasks = [alice, bob].map(|user| {
        let state = state.clone();
        tokio::spawn(async move { checkout_service::place_order(&state, &user).await })
    });

    let mut placed = 0;
    let mut short = 0;
    for task in tasks {
        match task.await? {
            Ok(_) => placed += 1,
            Err(AppError::InsufficientStock { product_id }) => {
                assert_eq!(product_id, product.id);
                short += 1;
            }
            Err(other) => panic!("unexpected checkout failure: {other:?}"),
        }
    }

    assert_eq!((placed, short), (1, 1));
    assert_eq!(stock_of(&state, product.id).await, 0);
    Ok(())
}

#[tokio::test]
async fn price_changes_do_not_rewrite_history() -> anyhow::Result<()> {
    let Some(state) = test_state().await else {
        return Ok(());
    };
    let user = create_user(&state, Role::Customer).await;
    let product = create_product(&state, dec!(7.25), 4).await;
    add_to_cart(&state, &user, product.id, 1).await;
    let placed = checkout_service::place_order(&state, &user).await?.data.expect("order");

    let mut active: ProductActive = Products::find_by_id(product.id)
        .one(&state.orm)
        .await?
        .expect("product")
        .into();
    active.selling_price = Set(dec!(99.99));
    active.name = Set("Renamed".into());
    active.update(&state.orm).await?;

    let fetched = order_service::get_order(&state, &user, placed.order_id)
        .await?
        .data
        .expect("order");
    assert_eq!(fetched.items[0].price_snapshot, dec!(7.25));
    assert_eq!(fetched.items[0].product_name, product.name);
    assert_eq!(fetched.order.total_amount, dec!(7.25));
    Ok(())
}

#[tokio::test]
async fn cancelled_orders_cannot_be_paid_and_return_stock() -> anyhow::Result<()> {
    let Some(state) = test_state().await else {
        return Ok(());
    };
    let user = create_user(&state, Role::Customer).await;
    let product = create_product(&state, dec!(2.00), 6).await;
    add_to_cart(&state, &user, product.id, 4).await;
    let placed = checkout_service::place_order(&state, &user).await?.data.expect("order");
    assert_eq!(stock_of(&state, product.id).await, 2);

    let cancelled = order_service::cancel_order(&state, &user, placed.order_id)
        .await?
        .data
        .expect("order");
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert!(cancelled.order.cancelled_at.is_some());
    assert_eq!(stock_of(&state, product.id).await, 6);

    let err = order_service::pay_order(&state, &user, placed.order_id).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidTransition {
            from: OrderStatus::Cancelled,
            to: OrderStatus::Paid
        }
    ));

    // A second cancel must not restock twice.
    assert!(order_service::cancel_order(&state, &user, placed.order_id).await.is_err());
    assert_eq!(stock_of(&state, product.id).await, 6);

    let order = Orders::find_by_id(placed.order_id).one(&state.orm).await?.expect("order");
    assert_eq!(order.status, OrderStatus::Cancelled);
    Ok(())
}

#[tokio::test]
async fn paying_is_owner_only_and_final() -> anyhow::Result<()> {
    let Some(state) = test_state().await else {
        return Ok(());
    };
    let owner = create_user(&state, Role::Customer).await;
    let stranger = create_user(&state, Role::Customer).await;
    let product = create_product(&state, dec!(3.00), 2).await;
    add_to_cart(&state, &owner, product.id, 1).await;
    let placed = checkout_service::place_order(&state, &owner).await?.data.expect("order");

    let err = order_service::pay_order(&state, &stranger, placed.order_id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let paid = order_service::pay_order(&state, &owner, placed.order_id)
        .await?
        .data
        .expect("order");
    assert_eq!(paid.order.status, OrderStatus::Paid);
    assert!(paid.order.paid_at.is_some());

    let err = order_service::cancel_order(&state, &owner, placed.order_id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));
    assert_eq!(stock_of(&state, product.id).await, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocked_stock_rows_fail_fast_as_transient() -> anyhow::Result<()> {
    let Some(state) = test_state_with(|config| config.checkout_lock_timeout_ms = 200).await else {
        return Ok(());
    };
    let user = create_user(&state, Role::Customer).await;
    let product = create_product(&state, dec!(1.50), 5).await;
    add_to_cart(&state, &user, product.id, 1).await;

    let holder = state.orm.begin().await?;
    Products::find_by_id(product.id)
        .lock(LockType::Update)
        .one(&holder)
        .await?;

    let err = checkout_service::place_order(&state, &user).await.unwrap_err();
    holder.rollback().await?;

    assert!(matches!(err, AppError::Transient(_)), "got {err:?}");
    assert!(err.is_retryable());
    assert_eq!(stock_of(&state, product.id).await, 5);

    // Once the lock is gone the same cart goes through.
    let placed = checkout_service::place_order(&state, &user).await?;
    assert!(placed.data.is_some());
    assert_eq!(stock_of(&state, product.id).await, 4);
    Ok(())
}

#[tokio::test]
async fn cart_adds_accumulate_and_removal_is_idempotent() -> anyhow::Result<()> {
    let Some(state) = test_state().await else {
        return Ok(());
    };
    let user = create_user(&state, Role::Customer).await;
    let product = create_product(&state, dec!(2.50), 10).await;

    add_to_cart(&state, &user, product.id, 2).await;
    add_to_cart(&state, &user, product.id, 3).await;
    let cart = cart_service::list_for_user(&state, &user).await?.data.expect("cart");
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 5);
    assert_eq!(cart.subtotal, dec!(12.50));

    cart_service::remove_item(&state, &user, product.id).await?;
    cart_service::remove_item(&state, &user, product.id).await?;
    let cart = cart_service::list_for_user(&state, &user).await?.data.expect("cart");
    assert!(cart.items.is_empty());

    let err = cart_service::add_item(
        &state,
        &user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 0,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidQuantity));
    Ok(())
}

#[tokio::test]
async fn setting_quantity_to_zero_removes_the_line() -> anyhow::Result<()> {
    let Some(state) = test_state().await else {
        return Ok(());
    };
    let user = create_user(&state, Role::Customer).await;
    let product = create_product(&state, dec!(1.00), 10).await;
    add_to_cart(&state, &user, product.id, 4).await;

    let updated =
        cart_service::set_quantity(&state, &user, product.id, SetQuantityRequest { quantity: 7 })
            .await?
            .data
            .expect("line");
    assert_eq!(updated.quantity, 7);

    cart_service::set_quantity(&state, &user, product.id, SetQuantityRequest { quantity: 0 }).await?;
    let lines = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .count(&state.orm)
        .await?;
    assert_eq!(lines, 0);
    Ok(())
}

#[tokio::test]
async fn accumulated_quantity_past_i32_is_a_quantity_error() -> anyhow::Result<()> {
    let Some(state) = test_state().await else {
        return Ok(());
    };
    let user = create_user(&state, Role::Customer).await;
    let product = create_product(&state, dec!(1.00), 10).await;
    add_to_cart(&state, &user, product.id, i32::MAX).await;

    let err = cart_service::add_item(
        &state,
        &user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 1,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidQuantity), "got {err:?}");
    assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);

    let cart = cart_service::list_for_user(&state, &user).await?.data.expect("cart");
    assert_eq!(cart.items[0].quantity, i32::MAX);
    Ok(())
}
