//! # 认证模块
//!
//! MFA 密钥的加密存储、TOTP 注册与校验，以及校验通过后签发的会话令牌。

pub mod cipher;
pub mod session;
pub mod totp;

pub use cipher::SecretCipher;
pub use session::{EnrollmentClaims, SessionClaims, SessionManager};
pub use totp::{MfaEnrollment, MfaService};
