use axum_inventory_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{
        categories::{ActiveModel as CategoryActive, Column as CategoryCol, Entity as Categories},
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
        suppliers::{ActiveModel as SupplierActive, Column as SupplierCol, Entity as Suppliers},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    },
    models::Role,
    services::auth_service::hash_password,
};
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,axum_inventory_api=debug".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    let orm = create_orm_conn(&config).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&orm, "admin@inventory.com", "admin123", "Admin", Role::Admin).await?;
    let user_id = ensure_user(&orm, "lily@example.com", "lily123", "Lily", Role::Customer).await?;

    let apparel = ensure_category(&orm, "Apparel").await?;
    let kitchen = ensure_category(&orm, "Kitchen").await?;
    let books = ensure_category(&orm, "Books").await?;

    let crabworks = ensure_supplier(&orm, "Crabworks Ltd", "sales@crabworks.example").await?;
    let printhouse = ensure_supplier(&orm, "Printhouse", "orders@printhouse.example").await?;

    let products = [
        ("Axum Hoodie", "Warm hoodie for Rustaceans", apparel, crabworks, 50, 2200, 3500),
        ("Ferris Mug", "Coffee tastes better with Ferris", kitchen, crabworks, 100, 450, 1200),
        ("Rust Sticker Pack", "Decorate your laptop", apparel, printhouse, 8, 80, 300),
        ("E-book: Async Rust", "Learn async Rust patterns", books, printhouse, 75, 500, 2500),
    ];
    for (name, description, category_id, supplier_id, stock, cost_cents, price_cents) in products {
        ensure_product(
            &orm,
            name,
            description,
            category_id,
            supplier_id,
            stock,
            Decimal::new(cost_cents, 2),
            Decimal::new(price_cents, 2),
        )
        .await?;
    }

    tracing::info!(%admin_id, %user_id, "seed completed");
    Ok(())
}

async fn ensure_user(
    orm: &DatabaseConnection,
    email: &str,
    password: &str,
    first_name: &str,
    role: Role,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(orm)
        .await?
    {
        return Ok(existing.id);
    }

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set(hash_password(password)?),
        first_name: Set(first_name.to_string()),
        last_name: Set(String::new()),
        phone: Set(None),
        role: Set(role),
        created_at: NotSet,
    }
    .insert(orm)
    .await?;

    tracing::info!(email, %role, "user created");
    Ok(user.id)
}

async fn ensure_category(orm: &DatabaseConnection, name: &str) -> anyhow::Result<Uuid> {
    if let Some(existing) = Categories::find()
        .filter(CategoryCol::Name.eq(name))
        .one(orm)
        .await?
    {
        return Ok(existing.id);
    }

    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        created_at: NotSet,
    }
    .insert(orm)
    .await?;
    Ok(category.id)
}

async fn ensure_supplier(orm: &DatabaseConnection, name: &str, email: &str) -> anyhow::Result<Uuid> {
    if let Some(existing) = Suppliers::find()
        .filter(SupplierCol::Name.eq(name))
        .one(orm)
        .await?
    {
        return Ok(existing.id);
    }

    let supplier = SupplierActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        contact_email: Set(Some(email.to_string())),
        contact_phone: Set(None),
        created_at: NotSet,
    }
    .insert(orm)
    .await?;
    Ok(supplier.id)
}

#[allow(clippy::too_many_arguments)]
async fn ensure_product(
    orm: &DatabaseConnection,
    name: &str,
    description: &str,
    category_id: Uuid,
    supplier_id: Uuid,
    stock: i32,
    cost_price: Decimal,
    selling_price: Decimal,
) -> anyhow::Result<()> {
    let exists = Products::find()
        .filter(ProdCol::Name.eq(name))
        .one(orm)
        .await?
        .is_some();
    if exists {
        return Ok(());
    }

    ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(Some(description.to_string())),
        category_id: Set(Some(category_id)),
        supplier_id: Set(Some(supplier_id)),
        stock: Set(stock),
        cost_price: Set(cost_price),
        selling_price: Set(selling_price),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(orm)
    .await?;

    tracing::info!(name, stock, "product created");
    Ok(())
}
