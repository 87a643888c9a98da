//! JSON body extractor that rejects in the standard error envelope

use axum::extract::FromRequest;

use crate::error::AppError;

/// `axum::Json` with rejections mapped through `AppError`.
///
/// Malformed or mistyped bodies become 400, oversized bodies 413.
#[derive(Debug, Clone, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);
