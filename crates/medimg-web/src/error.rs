//! HTTP 错误响应
//!
//! 错误体统一为 `{"error": "<mensaje>"}`，状态码由错误类别决定。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use medimg_core::MedError;
use medimg_dicom::DicomError;
use serde_json::json;
use tracing::{error, warn};

const INTERNAL_MESSAGE: &str = "Error interno del servidor";

/// 接口错误
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// 内部错误只记录日志，不把细节返回给客户端
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        error!("Internal error: {}", detail);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
    }
}

impl From<MedError> for ApiError {
    fn from(err: MedError) -> Self {
        match err {
            MedError::Validation(msg) => Self::new(StatusCode::BAD_REQUEST, msg),
            MedError::Unauthorized(msg) => Self::new(StatusCode::UNAUTHORIZED, msg),
            MedError::Forbidden(msg) => Self::new(StatusCode::FORBIDDEN, msg),
            MedError::NotFound(msg) => Self::new(StatusCode::NOT_FOUND, msg),
            MedError::Conflict(msg) => Self::new(StatusCode::CONFLICT, msg),
            MedError::Ai(msg) => {
                error!("AI service failure: {}", msg);
                Self::new(StatusCode::BAD_GATEWAY, "El servicio de IA no respondió correctamente")
            }
            other => Self::internal(other),
        }
    }
}

impl From<DicomError> for ApiError {
    fn from(err: DicomError) -> Self {
        match err {
            DicomError::UnsupportedTransferSyntax(_) => {
                Self::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, err.to_string())
            }
            DicomError::Render(_) => Self::internal(err),
            _ => Self::bad_request(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_client_error() {
            warn!("Request rejected ({}): {}", self.status.as_u16(), self.message);
        }

        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
