mod common;

use rust_decimal_macros::dec;

use axum_inventory_api::{
    dto::{
        catalog::{CategoryRequest, CreateSupplierRequest},
        products::{CreateProductRequest, InventoryAdjustRequest, UpdateProductRequest},
    },
    error::AppError,
    models::{OrderStatus, Role},
    routes::params::{LowStockQuery, OrderListQuery},
    services::{admin_service, category_service, checkout_service, product_service, supplier_service},
};

use common::{add_to_cart, create_product, create_user, stock_of, test_state};

#[tokio::test]
async fn ordered_products_cannot_be_deleted() -> anyhow::Result<()> {
    let Some(state) = test_state().await else {
        return Ok(());
    };
    let admin = create_user(&state, Role::Admin).await;
    let customer = create_user(&state, Role::Customer).await;
    let product = create_product(&state, dec!(5.00), 3).await;
    add_to_cart(&state, &customer, product.id, 1).await;
    checkout_service::place_order(&state, &customer).await?;

    let err = product_service::delete_product(&state, &admin, product.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ReferentialConflict(_)));
    assert_eq!(stock_of(&state, product.id).await, 2);

    let unsold = create_product(&state, dec!(1.00), 1).await;
    product_service::delete_product(&state, &admin, unsold.id).await?;
    let err = product_service::delete_product(&state, &admin, unsold.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound("Product")));
    Ok(())
}

#[tokio::test]
async fn categories_and_suppliers_in_use_are_kept() -> anyhow::Result<()> {
    let Some(state) = test_state().await else {
        return Ok(());
    };
    let admin = create_user(&state, Role::Admin).await;

    let category = category_service::create_category(
        &state,
        &admin,
        CategoryRequest {
            name: format!("Gadgets {}", uuid::Uuid::new_v4()),
        },
    )
    .await?
    .data
    .expect("category");
    let supplier = supplier_service::create_supplier(
        &state,
        &admin,
        CreateSupplierRequest {
            name: "Acme".into(),
            contact_email: Some("sales@acme.test".into()),
            contact_phone: None,
        },
    )
    .await?
    .data
    .expect("supplier");

    let product = product_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            name: "Gizmo".into(),
            description: None,
            category_id: Some(category.id),
            supplier_id: Some(supplier.id),
            stock: 4,
            cost_price: dec!(1.00),
            selling_price: dec!(2.00),
        },
    )
    .await?
    .data
    .expect("product");

    let detail = product_service::get_product(&state, &admin, product.id)
        .await?
        .data
        .expect("detail");
    assert_eq!(detail.category_name.as_deref(), Some(category.name.as_str()));
    assert_eq!(detail.supplier_name.as_deref(), Some("Acme"));

    let err = category_service::delete_category(&state, &admin, category.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ReferentialConflict(_)));
    let err = supplier_service::delete_supplier(&state, &admin, supplier.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ReferentialConflict(_)));

    product_service::delete_product(&state, &admin, product.id).await?;
    category_service::delete_category(&state, &admin, category.id).await?;
    supplier_service::delete_supplier(&state, &admin, supplier.id).await?;
    Ok(())
}

#[tokio::test]
async fn duplicate_category_names_conflict() -> anyhow::Result<()> {
    let Some(state) = test_state().await else {
        return Ok(());
    };
    let admin = create_user(&state, Role::Admin).await;
    let name = format!("Tools {}", uuid::Uuid::new_v4());

    category_service::create_category(&state, &admin, CategoryRequest { name: name.clone() }).await?;
    let err = category_service::create_category(&state, &admin, CategoryRequest { name })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    Ok(())
}

#[tokio::test]
async fn product_validation_rejects_bad_input() -> anyhow::Result<()> {
    let Some(state) = test_state().await else {
        return Ok(());
    };
    let admin = create_user(&state, Role::Admin).await;
    let customer = create_user(&state, Role::Customer).await;

    let request = || CreateProductRequest {
        name: "Valid".into(),
        description: None,
        category_id: None,
        supplier_id: None,
        stock: 1,
        cost_price: dec!(1.00),
        selling_price: dec!(2.00),
    };

    let err = product_service::create_product(&state, &customer, request())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let err = product_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            stock: -1,
            ..request()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = product_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            category_id: Some(uuid::Uuid::new_v4()),
            ..request()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound("Category")));

    let product = create_product(&state, dec!(2.00), 5).await;
    let err = product_service::update_product(
        &state,
        &admin,
        product.id,
        UpdateProductRequest {
            selling_price: Some(dec!(-1.00)),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    Ok(())
}

#[tokio::test]
async fn inventory_adjustments_and_low_stock() -> anyhow::Result<()> {
    let Some(state) = test_state().await else {
        return Ok(());
    };
    let admin = create_user(&state, Role::Admin).await;
    let product = create_product(&state, dec!(9.00), 3).await;

    let err = admin_service::adjust_inventory(&state, &admin, product.id, InventoryAdjustRequest { delta: -4 })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(stock_of(&state, product.id).await, 3);

    let adjusted = admin_service::adjust_inventory(&state, &admin, product.id, InventoryAdjustRequest { delta: -2 })
        .await?
        .data
        .expect("product");
    assert_eq!(adjusted.stock, 1);

    let low = admin_service::list_low_stock(
        &state,
        &admin,
        LowStockQuery {
            threshold: Some(2),
            per_page: Some(100),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("low stock");
    assert!(low.items.iter().all(|p| p.stock < 2));
    Ok(())
}

#[tokio::test]
async fn admins_see_and_cancel_any_order() -> anyhow::Result<()> {
    let Some(state) = test_state().await else {
        return Ok(());
    };
    let admin = create_user(&state, Role::Admin).await;
    let customer = create_user(&state, Role::Customer).await;
    let product = create_product(&state, dec!(6.00), 2).await;
    add_to_cart(&state, &customer, product.id, 2).await;
    let placed = checkout_service::place_order(&state, &customer).await?.data.expect("order");

    let listed = admin_service::list_all_orders(
        &state,
        &admin,
        OrderListQuery {
            user_id: Some(customer.user_id),
            status: Some(OrderStatus::PendingPayment),
            ..Default::default()
        },
    )
    .await?;
    let orders = listed.data.expect("orders").items;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, placed.order_id);
    assert_eq!(listed.meta.and_then(|m| m.total), Some(1));

    let err = admin_service::list_all_orders(&state, &customer, OrderListQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let cancelled = admin_service::cancel_order_admin(&state, &admin, placed.order_id)
        .await?
        .data
        .expect("order");
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert_eq!(stock_of(&state, product.id).await, 2);
    Ok(())
}
