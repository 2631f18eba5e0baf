use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::common::PaginationParams;
use crate::{
    errors::ServiceError,
    handlers::common::{created, ok},
    services::coupons::{
        CouponResponse, CouponValidation, CreateCouponRequest, UpdateCouponRequest,
        ValidateCouponRequest,
    },
    ApiResponse, AppState, PaginatedResponse,
};

#[utoipa::path(
    get,
    path = "/api/v1/coupons",
    params(PaginationParams),
    responses((status = 200, description = "Coupons page", body = ApiResponse<PaginatedResponse<CouponResponse>>)),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn list_coupons(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<CouponResponse>>>, ServiceError> {
    let (page, limit) = state.page_window(params.page, params.limit);
    let coupons = state.services.coupons.list_coupons(page, limit).await?;
    Ok(ok(coupons))
}

#[utoipa::path(
    post,
    path = "/api/v1/coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon created", body = ApiResponse<CouponResponse>),
        (status = 409, description = "Code already exists", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    Json(request): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CouponResponse>>), ServiceError> {
    let coupon = state.services.coupons.create_coupon(request).await?;
    Ok(created(coupon))
}

#[utoipa::path(
    get,
    path = "/api/v1/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    responses(
        (status = 200, description = "Coupon", body = ApiResponse<CouponResponse>),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn get_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CouponResponse>>, ServiceError> {
    Ok(ok(state.services.coupons.get_coupon(id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    request_body = UpdateCouponRequest,
    responses(
        (status = 200, description = "Coupon updated", body = ApiResponse<CouponResponse>),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn update_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCouponRequest>,
) -> Result<Json<ApiResponse<CouponResponse>>, ServiceError> {
    let coupon = state.services.coupons.update_coupon(id, request).await?;
    Ok(ok(coupon))
}

#[utoipa::path(
    delete,
    path = "/api/v1/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    responses(
        (status = 204, description = "Coupon deleted"),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn delete_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.coupons.delete_coupon(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/coupons/{id}/toggle_active",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    responses((status = 200, description = "Coupon toggled", body = ApiResponse<CouponResponse>)),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn toggle_coupon_active(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CouponResponse>>, ServiceError> {
    let coupon = state.services.coupons.toggle_active(id).await?;
    Ok(ok(coupon))
}

/// Previews the discount for a cart total; nothing is redeemed.
#[utoipa::path(
    post,
    path = "/api/v1/coupons/validate",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Coupon applies", body = ApiResponse<CouponValidation>),
        (status = 400, description = "Coupon cannot be used", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown code", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    Json(request): Json<ValidateCouponRequest>,
) -> Result<Json<ApiResponse<CouponValidation>>, ServiceError> {
    let validation = state.services.coupons.validate_coupon(request).await?;
    Ok(ok(validation))
}
