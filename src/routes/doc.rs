use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{AddToCartRequest, CartItemDto, CartLine, CartView, SetQuantityRequest},
        catalog::{
            CategoryList, CategoryRequest, CreateSupplierRequest, SupplierList,
            UpdateSupplierRequest,
        },
        orders::{CheckoutResponse, OrderList, OrderWithItems},
        products::{
            CreateProductRequest, InventoryAdjustRequest, ProductDetail, ProductList,
            UpdateProductRequest,
        },
        profile::{ChangePasswordRequest, UpdateProfileRequest},
    },
    models::{Category, Order, OrderItem, OrderStatus, Product, Role, Supplier, User},
    response::{ApiResponse, Meta},
    routes::{
        admin, auth, cart, categories, health, orders, params, products as product_routes,
        profile, suppliers,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        profile::get_profile,
        profile::update_profile,
        profile::change_password,
        product_routes::list_products,
        product_routes::create_product,
        product_routes::get_product,
        product_routes::update_product,
        product_routes::delete_product,
        categories::list_categories,
        categories::create_category,
        categories::rename_category,
        categories::delete_category,
        suppliers::list_suppliers,
        suppliers::get_supplier,
        suppliers::create_supplier,
        suppliers::update_supplier,
        suppliers::delete_supplier,
        cart::cart_list,
        cart::add_to_cart,
        cart::set_quantity,
        cart::remove_from_cart,
        orders::list_orders,
        orders::checkout,
        orders::get_order,
        orders::pay_order,
        orders::cancel_order,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::cancel_order_admin,
        admin::list_low_stock,
        admin::adjust_inventory
    ),
    components(
        schemas(
            User,
            Role,
            Category,
            Supplier,
            Product,
            Order,
            OrderStatus,
            OrderItem,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            UpdateProfileRequest,
            ChangePasswordRequest,
            CreateProductRequest,
            UpdateProductRequest,
            InventoryAdjustRequest,
            ProductDetail,
            ProductList,
            CategoryRequest,
            CategoryList,
            CreateSupplierRequest,
            UpdateSupplierRequest,
            SupplierList,
            AddToCartRequest,
            SetQuantityRequest,
            CartLine,
            CartView,
            CartItemDto,
            CheckoutResponse,
            OrderList,
            OrderWithItems,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::SearchQuery,
            params::LowStockQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CheckoutResponse>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration and login"),
        (name = "Profile", description = "Current user's profile"),
        (name = "Products", description = "Product catalog"),
        (name = "Categories", description = "Product categories"),
        (name = "Suppliers", description = "Suppliers (admin)"),
        (name = "Cart", description = "Shopping cart"),
        (name = "Orders", description = "Checkout and order lifecycle"),
        (name = "Admin", description = "Order oversight and inventory"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
