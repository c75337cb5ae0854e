//! Response envelope shared by every endpoint

use serde::Serialize;

use crate::types::AppError;

/// Success envelope: `{ statusCode, data, message, success }`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub status_code: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status_code: u16, data: T, message: impl Into<String>) -> Self {
        Self {
            status_code,
            data,
            message: message.into(),
            success: status_code < 400,
        }
    }
}

/// Error envelope: `{ statusCode, message, success }`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub status_code: u16,
    pub message: String,
    pub success: bool,
}

impl From<&AppError> for ApiErrorBody {
    fn from(err: &AppError) -> Self {
        Self {
            status_code: err.status_code().as_u16(),
            message: err.public_message(),
            success: false,
        }
    }
}
