//! # Web模块
//!
//! 诊断、患者、用户资料、MFA、AI 诊断和 DICOM 预览的 HTTP 接口。

pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod imaging;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use server::{create_router, WebServer};
pub use state::AppState;
