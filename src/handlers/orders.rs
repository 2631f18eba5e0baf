use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{created, ok},
    services::{
        order_status::{
            ManualReleaseRequest, StatusHistoryEntry, UpdateStatusRequest, VerifyPickupRequest,
        },
        orders::{CreateOrderRequest, OrderListQuery, OrderResponse},
    },
    ApiResponse, AppState, PaginatedResponse,
};

/// List orders with pagination; customers only see their own
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders page", body = ApiResponse<PaginatedResponse<OrderResponse>>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderResponse>>>, ServiceError> {
    let (page, limit) = state.page_window(query.page, query.limit);
    let orders = state
        .services
        .orders
        .list_orders(&auth_user, query, page, limit)
        .await?;
    Ok(ok(orders))
}

/// Checkout: reserves stock and opens a pending order
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    let order = state
        .services
        .orders
        .create_order(&auth_user, request)
        .await?;
    Ok(created(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/my_orders",
    responses((status = 200, description = "Caller's orders", body = ApiResponse<Vec<OrderResponse>>)),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn my_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    let orders = state.services.orders.my_orders(&auth_user).await?;
    Ok(ok(orders))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.get_order(id, &auth_user).await?;
    Ok(ok(order))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Order is not pending", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.cancel_order(id, &auth_user).await?;
    Ok(ok(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/status_history",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses((status = 200, description = "Audit trail, newest first", body = ApiResponse<Vec<StatusHistoryEntry>>)),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn status_history(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<StatusHistoryEntry>>>, ServiceError> {
    let history = state
        .services
        .order_status
        .status_history(id, &auth_user)
        .await?;
    Ok(ok(history))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/update_status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order changed concurrently", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn update_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .services
        .order_status
        .update_status(id, request, &auth_user)
        .await?;
    Ok(ok(state.services.orders.view(order).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/verify_pickup",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = VerifyPickupRequest,
    responses(
        (status = 200, description = "Order picked up", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid pickup code or order not ready", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn verify_pickup(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<VerifyPickupRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    request.validate()?;
    let order = state
        .services
        .order_status
        .verify_pickup(id, &request.pickup_code, &auth_user)
        .await?;
    Ok(ok(state.services.orders.view(order).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/manual_release",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = ManualReleaseRequest,
    responses(
        (status = 200, description = "Order released", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Missing reason or order not ready", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn manual_release(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ManualReleaseRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    request.validate()?;
    let order = state
        .services
        .order_status
        .manual_release(id, request.reason, request.image, &auth_user)
        .await?;
    Ok(ok(state.services.orders.view(order).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/auto_process",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order moved to processing", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Order is not paid", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn auto_process(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .services
        .order_status
        .auto_process(id, &auth_user)
        .await?;
    Ok(ok(state.services.orders.view(order).await?))
}
