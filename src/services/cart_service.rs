use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, FromQueryResult, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, OnConflict};
use uuid::Uuid;

use crate::{
    audit,
    dto::cart::{AddToCartRequest, CartItemDto, CartLine, CartView, SetQuantityRequest},
    entity::{
        cart_items::{ActiveModel as CartActive, Column as CartCol, Entity as CartItems},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult, is_out_of_range},
    middleware::auth::AuthUser,
    policy::{Capability, authorize},
    response::{ApiResponse, Meta},
    state::AppState,
};

#[derive(Debug, FromQueryResult)]
struct CartWithProductRow {
    id: Uuid,
    product_id: Uuid,
    quantity: i32,
    product_name: String,
    selling_price: Decimal,
    stock: i32,
}

pub async fn list_for_user(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    authorize(user, Capability::UseCart)?;

    let rows = CartItems::find()
        .select_only()
        .column(CartCol::Id)
        .column(CartCol::ProductId)
        .column(CartCol::Quantity)
        .column_as(ProdCol::Name, "product_name")
        .column(ProdCol::SellingPrice)
        .column(ProdCol::Stock)
        .inner_join(Products)
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_asc(CartCol::CreatedAt)
        .into_model::<CartWithProductRow>()
        .all(&state.orm)
        .await?;

    let items: Vec<CartLine> = rows
        .into_iter()
        .map(|row| CartLine {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            unit_price: row.selling_price,
            stock: row.stock,
            quantity: row.quantity,
            line_total: row.selling_price * Decimal::from(row.quantity),
        })
        .collect();
    let subtotal = items.iter().map(|line| line.line_total).sum();
    let total = items.len() as i64;

    Ok(ApiResponse::success(
        "OK",
        CartView { items, subtotal },
        Some(Meta::total(total)),
    ))
}

/// Adds `quantity` to the caller's line for the product, creating the line on first add.
#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id, product_id = %payload.product_id))]
pub async fn add_item(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItemDto>> {
    authorize(user, Capability::UseCart)?;
    if payload.quantity <= 0 {
        return Err(AppError::InvalidQuantity);
    }

    if Products::find_by_id(payload.product_id)
        .one(&state.orm)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("Product"));
    }

    // Single upsert so concurrent adds for the same product both count.
    let line = CartItems::insert(CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        product_id: Set(payload.product_id),
        quantity: Set(payload.quantity),
        created_at: NotSet,
    })
    .on_conflict(
        OnConflict::columns([CartCol::UserId, CartCol::ProductId])
            .value(
                CartCol::Quantity,
                Expr::col((CartItems, CartCol::Quantity)).add(payload.quantity),
            )
            .to_owned(),
    )
    .exec_with_returning(&state.orm)
    .await
    .map_err(|err| {
        if is_out_of_range(&err) {
            AppError::InvalidQuantity
        } else {
            AppError::from(err)
        }
    })?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_add",
        "cart_items",
        serde_json::json!({ "product_id": payload.product_id, "quantity": payload.quantity }),
    )
    .await;

    Ok(ApiResponse::success(
        "Added to cart",
        CartItemDto {
            id: line.id,
            product_id: line.product_id,
            quantity: line.quantity,
        },
        None,
    ))
}

/// Overwrites the line's quantity; zero or less removes the line.
#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id, %product_id))]
pub async fn set_quantity(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: SetQuantityRequest,
) -> AppResult<ApiResponse<CartItemDto>> {
    authorize(user, Capability::UseCart)?;
    if payload.quantity <= 0 {
        delete_line(&state.orm, user.user_id, product_id).await?;
        return Ok(ApiResponse::message("Removed from cart"));
    }

    let updated = CartItems::update_many()
        .col_expr(CartCol::Quantity, Expr::value(payload.quantity))
        .filter(CartCol::UserId.eq(user.user_id))
        .filter(CartCol::ProductId.eq(product_id))
        .exec_with_returning(&state.orm)
        .await?;
    let line = updated
        .into_iter()
        .next()
        .ok_or(AppError::NotFound("Cart item"))?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_update",
        "cart_items",
        serde_json::json!({ "product_id": product_id, "quantity": payload.quantity }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        CartItemDto {
            id: line.id,
            product_id: line.product_id,
            quantity: line.quantity,
        },
        Some(Meta::empty()),
    ))
}

/// Removing a line that is not there is not an error.
pub async fn remove_item(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    authorize(user, Capability::UseCart)?;
    let removed = delete_line(&state.orm, user.user_id, product_id).await?;

    if removed > 0 {
        audit::record(
            &state.orm,
            Some(user.user_id),
            "cart_remove",
            "cart_items",
            serde_json::json!({ "product_id": product_id }),
        )
        .await;
    }

    Ok(ApiResponse::message("Removed from cart"))
}

/// Deletes every line the user has. Runs inside the checkout transaction.
pub async fn clear_for_user<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<u64, DbErr> {
    let result = CartItems::delete_many()
        .filter(CartCol::UserId.eq(user_id))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

async fn delete_line<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    product_id: Uuid,
) -> Result<u64, DbErr> {
    let result = CartItems::delete_many()
        .filter(CartCol::UserId.eq(user_id))
        .filter(CartCol::ProductId.eq(product_id))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}
