//! REST API module.
//!
//! JSON handlers wrap results in the `{success, data}` envelope; document
//! routes answer with the PDF bytes as a download.

mod merge_fields;
mod plans;
mod signed_waivers;
mod templates;

pub use merge_fields::*;
pub use plans::*;
pub use signed_waivers::*;
pub use templates::*;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::render::Download;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Acknowledgement body for deletes.
#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: String,
}

impl IntoResponse for Download {
    fn into_response(self) -> Response {
        let disposition = match HeaderValue::from_str(&content_disposition(&self.filename)) {
            Ok(value) => value,
            Err(e) => {
                return AppError::Internal(format!("Bad download filename: {}", e)).into_response()
            }
        };

        (
            [
                (header::CONTENT_TYPE, HeaderValue::from_static(self.content_type)),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            self.bytes,
        )
            .into_response()
    }
}

/// `attachment` disposition with an ASCII fallback name and an RFC 5987
/// `filename*` carrying the exact UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut encoded = String::with_capacity(filename.len());
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}
