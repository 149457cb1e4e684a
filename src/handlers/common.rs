use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::{ApiResponse, PaginatedResponse};

/// Wraps `data` in the standard envelope with a 200.
pub fn success_response<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

/// Wraps `data` in the standard envelope with a 201.
pub fn created_response<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

pub fn no_content_response() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

/// Enveloped page of a `(rows, total)` service result.
pub fn page_response<T: Serialize>(
    (items, total): (Vec<T>, u64),
    page: u64,
    limit: u64,
) -> impl IntoResponse {
    success_response(PaginatedResponse::new(items, total, page, limit))
}

