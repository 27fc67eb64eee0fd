//! 会话令牌
//!
//! MFA 校验通过后签发 HS256 JWT，后续受保护的路由凭此识别用户。
//! 注册时另签发一个短期的注册令牌，只能用于首次设置 MFA。

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use medimg_core::config::SecurityConfig;
use medimg_core::models::{UserRole, Usuario};
use medimg_core::{MedError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    pub sub: String,      // firebase_uid
    pub id_usuario: i32,
    pub rol: UserRole,
    pub exp: usize,       // 过期时间
    pub iat: usize,       // 签发时间
    pub jti: String,      // JWT ID
}

/// 注册令牌的用途标记
pub const ENROLLMENT_PURPOSE: &str = "mfa_enroll";

/// 注册令牌有效期（分钟）
const ENROLLMENT_TTL_MINUTES: i64 = 15;

/// 注册令牌 Claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrollmentClaims {
    pub sub: String,      // firebase_uid
    pub purpose: String,
    pub exp: usize,
    pub iat: usize,
}

/// 会话令牌管理
#[derive(Clone)]
pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_hours: i64,
}

impl SessionManager {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_hours,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(&config.session_secret, config.session_ttl_hours)
    }

    /// 为用户签发令牌
    pub fn issue(&self, user: &Usuario) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.ttl_hours);

        let claims = SessionClaims {
            sub: user.firebase_uid.clone(),
            id_usuario: user.id_usuario,
            rol: user.rol,
            exp: exp.timestamp().max(0) as usize,
            iat: now.timestamp().max(0) as usize,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| MedError::Crypto(format!("No se pudo firmar la sesión: {}", e)))
    }

    /// 为刚注册的用户签发注册令牌
    pub fn issue_enrollment(&self, user: &Usuario) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::minutes(ENROLLMENT_TTL_MINUTES);

        let claims = EnrollmentClaims {
            sub: user.firebase_uid.clone(),
            purpose: ENROLLMENT_PURPOSE.to_string(),
            exp: exp.timestamp().max(0) as usize,
            iat: now.timestamp().max(0) as usize,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| MedError::Crypto(format!("No se pudo firmar el registro: {}", e)))
    }

    /// 校验注册令牌，会话令牌不能充当注册令牌
    pub fn verify_enrollment(&self, token: &str) -> Result<EnrollmentClaims> {
        let validation = Validation::new(Algorithm::HS256);
        let claims = decode::<EnrollmentClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                warn!("Rejected enrollment token: {}", e);
                MedError::Unauthorized("Token de registro inválido o expirado".to_string())
            })?;

        if claims.purpose != ENROLLMENT_PURPOSE {
            return Err(MedError::Unauthorized(
                "Token de registro inválido o expirado".to_string(),
            ));
        }
        Ok(claims)
    }

    /// 校验令牌签名与有效期
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                warn!("Rejected session token: {}", e);
                MedError::Unauthorized("Sesión inválida o expirada".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn user() -> Usuario {
        let now = Utc::now();
        Usuario {
            id_usuario: 7,
            firebase_uid: "uid-7".to_string(),
            primer_nombre: "Ana".to_string(),
            segundo_nombre: None,
            primer_apellido: "Pérez".to_string(),
            segundo_apellido: None,
            correo: "ana@example.com".to_string(),
            telefono: None,
            rol: UserRole::Tecnico,
            mfa_secret: None,
            mfa_enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let sessions = SessionManager::new(SECRET, 12);
        let token = sessions.issue(&user()).unwrap();

        let claims = sessions.verify(&token).unwrap();
        assert_eq!(claims.sub, "uid-7");
        assert_eq!(claims.id_usuario, 7);
        assert_eq!(claims.rol, UserRole::Tecnico);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_rejects_other_secret() {
        let token = SessionManager::new(SECRET, 12).issue(&user()).unwrap();
        let other = SessionManager::new("ffffffffffffffffffffffffffffffff", 12);
        assert!(matches!(other.verify(&token), Err(MedError::Unauthorized(_))));
    }

    #[test]
    fn test_rejects_expired_token() {
        let sessions = SessionManager::new(SECRET, -2);
        let token = sessions.issue(&user()).unwrap();
        assert!(matches!(sessions.verify(&token), Err(MedError::Unauthorized(_))));
    }

    #[test]
    fn test_enrollment_token_is_not_a_session() {
        let sessions = SessionManager::new(SECRET, 12);
        let enrollment = sessions.issue_enrollment(&user()).unwrap();

        let claims = sessions.verify_enrollment(&enrollment).unwrap();
        assert_eq!(claims.sub, "uid-7");
        assert_eq!(claims.purpose, ENROLLMENT_PURPOSE);
        assert!(matches!(sessions.verify(&enrollment), Err(MedError::Unauthorized(_))));

        let session = sessions.issue(&user()).unwrap();
        assert!(matches!(
            sessions.verify_enrollment(&session),
            Err(MedError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        let sessions = SessionManager::new(SECRET, 12);
        assert!(sessions.verify("not.a.token").is_err());
    }
}
