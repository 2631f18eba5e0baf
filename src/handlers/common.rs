use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

use crate::{services::page_window, ApiResponse, AppState};

/// Pagination parameters for list operations
#[derive(Debug, Default, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl AppState {
    /// Resolves page/limit against the configured defaults and ceiling.
    pub fn page_window(&self, page: Option<u64>, limit: Option<u64>) -> (u64, u64) {
        page_window(
            page,
            limit,
            self.config.api_default_page_size,
            self.config.api_max_page_size,
        )
    }
}

/// Standard created response
pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}
