#![allow(dead_code)]

use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tokio::sync::OnceCell;
use uuid::Uuid;

use axum_inventory_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    dto::cart::AddToCartRequest,
    entity::{
        products::{ActiveModel as ProductActive, Entity as Products, Model as ProductModel},
        users::ActiveModel as UserActive,
    },
    middleware::auth::AuthUser,
    models::Role,
    services::cart_service,
    state::AppState,
};

static MIGRATED: OnceCell<()> = OnceCell::const_new();

fn database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
}

/// State backed by the test database, or `None` (with a note) when no
/// database is configured. Tests never truncate: every fixture is unique.
pub async fn test_state() -> Option<AppState> {
    test_state_with(|_| {}).await
}

pub async fn test_state_with(tweak: impl FnOnce(&mut AppConfig)) -> Option<AppState> {
    let Some(url) = database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests.");
        return None;
    };

    let mut config = AppConfig::new(url, "integration-test-secret");
    tweak(&mut config);
    let orm = create_orm_conn(&config).await.expect("connect to test database");

    MIGRATED
        .get_or_try_init(|| async { run_migrations(&orm).await })
        .await
        .expect("apply migrations");

    Some(AppState::new(orm, config))
}

pub async fn create_user(state: &AppState, role: Role) -> AuthUser {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(format!("{}-{}@test.local", role, Uuid::new_v4())),
        password_hash: Set("not-a-real-hash".into()),
        first_name: Set("Test".into()),
        last_name: Set(role.to_string()),
        phone: Set(None),
        role: Set(role),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .expect("insert user");

    AuthUser {
        user_id: user.id,
        role,
    }
}

pub async fn create_product(state: &AppState, selling_price: Decimal, stock: i32) -> ProductModel {
    ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(format!("Widget {}", Uuid::new_v4())),
        description: Set(None),
        category_id: Set(None),
        supplier_id: Set(None),
        stock: Set(stock),
        cost_price: Set(Decimal::ZERO),
        selling_price: Set(selling_price),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .expect("insert product")
}

pub async fn add_to_cart(state: &AppState, user: &AuthUser, product_id: Uuid, quantity: i32) {
    cart_service::add_item(
        state,
        user,
        AddToCartRequest {
            product_id,
            quantity,
        },
    )
    .await
    .expect("add to cart");
}

pub async fn stock_of(state: &AppState, product_id: Uuid) -> i32 {
    Products::find_by_id(product_id)
        .one(&state.orm)
        .await
        .expect("load product")
        .expect("product exists")
        .stock
}
