use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront API

Backend for an electronics shop where customers pay online and pick up in store.

## Order lifecycle

`pending` → `paid` → `processing` → `ready` → `completed`, with `cancelled`
reachable from any open status. A pending order holds its stock for a limited
reservation window; unpaid orders past the window are cancelled and restocked.

## Authentication

Obtain a token pair from `/api/v1/auth/login` and send the access token:

```
Authorization: Bearer <access-token>
```

## Pagination

List endpoints accept `page` (default 1) and `limit` (capped server-side) and
answer `{items, total, page, limit, total_pages}`.
        "#,
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    tags(
        (name = "auth", description = "Accounts and tokens"),
        (name = "catalog", description = "Categories and products"),
        (name = "orders", description = "Checkout and the order lifecycle"),
        (name = "payments", description = "Payment capture"),
        (name = "coupons", description = "Discount coupons")
    ),
    paths(
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::refresh,
        crate::handlers::auth::logout,
        crate::handlers::auth::get_profile,
        crate::handlers::auth::update_profile,

        crate::handlers::catalog::list_categories,
        crate::handlers::catalog::create_category,
        crate::handlers::catalog::delete_category,
        crate::handlers::catalog::list_products,
        crate::handlers::catalog::get_product,
        crate::handlers::catalog::create_product,
        crate::handlers::catalog::update_product,
        crate::handlers::catalog::delete_product,
        crate::handlers::catalog::toggle_product_active,

        crate::handlers::orders::list_orders,
        crate::handlers::orders::create_order,
        crate::handlers::orders::my_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::status_history,
        crate::handlers::orders::update_status,
        crate::handlers::orders::verify_pickup,
        crate::handlers::orders::manual_release,
        crate::handlers::orders::auto_process,

        crate::handlers::payments::list_payments,
        crate::handlers::payments::create_payment,
        crate::handlers::payments::get_payment,
        crate::handlers::payments::simulate_approval,

        crate::handlers::coupons::list_coupons,
        crate::handlers::coupons::create_coupon,
        crate::handlers::coupons::get_coupon,
        crate::handlers::coupons::update_coupon,
        crate::handlers::coupons::delete_coupon,
        crate::handlers::coupons::toggle_coupon_active,
        crate::handlers::coupons::validate_coupon,
    ),
    components(
        schemas(
            crate::auth::TokenPair,
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::RefreshRequest,
            crate::handlers::auth::AuthResponse,
            crate::services::accounts::RegisterRequest,
            crate::services::accounts::UpdateProfileRequest,
            crate::services::accounts::UserResponse,
            crate::entities::user::UserRole,

            crate::services::catalog::CreateCategoryRequest,
            crate::services::catalog::CategoryResponse,
            crate::services::catalog::CreateProductRequest,
            crate::services::catalog::UpdateProductRequest,
            crate::services::catalog::ProductResponse,
            crate::services::catalog::StockStatus,
            crate::services::catalog::ActiveStatus,

            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentMethod,
            crate::services::orders::OrderItemRequest,
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::OrderResponse,
            crate::services::order_status::UpdateStatusRequest,
            crate::services::order_status::VerifyPickupRequest,
            crate::services::order_status::ManualReleaseRequest,
            crate::services::order_status::StatusHistoryEntry,

            crate::entities::payment::PaymentStatus,
            crate::services::payments::CreatePaymentRequest,
            crate::services::payments::PaymentResponse,

            crate::entities::coupon::DiscountType,
            crate::services::coupons::CreateCouponRequest,
            crate::services::coupons::UpdateCouponRequest,
            crate::services::coupons::ValidateCouponRequest,
            crate::services::coupons::CouponValidation,
            crate::services::coupons::CouponResponse,

            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
