use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::common::PaginationParams;
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{created, ok},
    services::payments::{CreatePaymentRequest, PaymentResponse},
    ApiResponse, AppState, PaginatedResponse,
};

#[utoipa::path(
    get,
    path = "/api/v1/payments",
    params(PaginationParams),
    responses((status = 200, description = "Payments page", body = ApiResponse<PaginatedResponse<PaymentResponse>>)),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<PaymentResponse>>>, ServiceError> {
    let (page, limit) = state.page_window(params.page, params.limit);
    let payments = state
        .services
        .payments
        .list_payments(&auth_user, page, limit)
        .await?;
    Ok(ok(payments))
}

/// Pays a pending order. A rejected charge still answers 201 with `status = rejected`.
#[utoipa::path(
    post,
    path = "/api/v1/payments",
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Payment recorded", body = ApiResponse<PaymentResponse>),
        (status = 400, description = "Order is not pending or expired", body = crate::errors::ErrorResponse),
        (status = 403, description = "Order belongs to someone else", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already has a payment", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentResponse>>), ServiceError> {
    let payment = state
        .services
        .payments
        .create_payment(&auth_user, request)
        .await?;
    Ok(created(payment))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment", body = ApiResponse<PaymentResponse>),
        (status = 404, description = "Payment not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentResponse>>, ServiceError> {
    let payment = state.services.payments.get_payment(id, &auth_user).await?;
    Ok(ok(payment))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/simulate_approval",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment approved", body = ApiResponse<PaymentResponse>),
        (status = 400, description = "Payment is not pending", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn simulate_approval(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentResponse>>, ServiceError> {
    let payment = state
        .services
        .payments
        .simulate_approval(id, &auth_user)
        .await?;
    Ok(ok(payment))
}
