//! 用户注册、个人资料、MFA 与会话中间件

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use medimg_auth::SessionClaims;
use medimg_core::models::{NewUsuario, ProfileUpdate, UserRole};
use medimg_core::utils::{is_valid_email, non_blank, require_text};
use medimg_core::MedError;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::state::AppState;

/// 注册请求
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub firebase_uid: Option<String>,
    pub correo: Option<String>,
    pub primer_nombre: Option<String>,
    pub segundo_nombre: Option<String>,
    pub primer_apellido: Option<String>,
    pub segundo_apellido: Option<String>,
    pub telefono: Option<String>,
    pub rol: Option<String>,
}

/// 个人资料更新请求
#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub primer_nombre: Option<String>,
    pub segundo_nombre: Option<String>,
    pub primer_apellido: Option<String>,
    pub segundo_apellido: Option<String>,
    pub correo: Option<String>,
    pub telefono: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MfaSetupRequest {
    pub firebase_uid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MfaVerifyRequest {
    pub firebase_uid: Option<String>,
    pub token: Option<String>,
}

fn checked_email(correo: Option<String>) -> Result<String, MedError> {
    let correo = require_text(correo, "correo")?;
    if !is_valid_email(&correo) {
        return Err(MedError::Validation(format!("Correo inválido: {}", correo)));
    }
    Ok(correo)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// 会话中间件
///
/// 校验 `Authorization: Bearer <token>`，通过后把 [`SessionClaims`] 放入请求扩展。
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Se requiere una sesión activa"))?;

    let claims = state.sessions.verify(token)?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// 注册用户
pub async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let rol = match non_blank(body.rol) {
        Some(rol) => rol.parse::<UserRole>()?,
        None => UserRole::default(),
    };

    let user = NewUsuario {
        firebase_uid: require_text(body.firebase_uid, "firebase_uid")?,
        correo: checked_email(body.correo)?,
        primer_nombre: require_text(body.primer_nombre, "primer_nombre")?,
        segundo_nombre: non_blank(body.segundo_nombre),
        primer_apellido: require_text(body.primer_apellido, "primer_apellido")?,
        segundo_apellido: non_blank(body.segundo_apellido),
        telefono: non_blank(body.telefono),
        rol,
    };

    let created = state.repo.create_user(&user).await?;
    let enrollment_token = state.sessions.issue_enrollment(&created)?;
    info!("Registered user {} ({})", created.id_usuario, created.rol);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Usuario registrado correctamente",
            "user": created,
            "enrollmentToken": enrollment_token
        })),
    ))
}

/// 获取当前用户资料
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> ApiResult<impl IntoResponse> {
    let user = state.repo.get_user_by_firebase_uid(&claims.sub).await?;
    Ok(Json(json!({ "user": user })))
}

/// 更新当前用户资料
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    ApiJson(body): ApiJson<ProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    let profile = ProfileUpdate {
        primer_nombre: require_text(body.primer_nombre, "primer_nombre")?,
        segundo_nombre: non_blank(body.segundo_nombre),
        primer_apellido: require_text(body.primer_apellido, "primer_apellido")?,
        segundo_apellido: non_blank(body.segundo_apellido),
        correo: checked_email(body.correo)?,
        telefono: non_blank(body.telefono),
    };

    let user = state.repo.update_profile(&claims.sub, &profile).await?;
    info!("Updated profile for user {}", user.id_usuario);

    Ok(Json(json!({ "message": "Perfil actualizado correctamente", "user": user })))
}

/// 注册接口的调用凭证
enum SetupCredential {
    Session,
    Enrollment,
}

/// 从 Bearer 令牌识别调用者：会话令牌或注册令牌
fn setup_credential(
    state: &AppState,
    headers: &HeaderMap,
    firebase_uid: &str,
) -> Result<SetupCredential, MedError> {
    let token = bearer_token(headers).ok_or_else(|| {
        MedError::Unauthorized("Se requiere un token de registro o una sesión activa".to_string())
    })?;

    let (subject, credential) = match state.sessions.verify(token) {
        Ok(claims) => (claims.sub, SetupCredential::Session),
        Err(_) => (
            state.sessions.verify_enrollment(token)?.sub,
            SetupCredential::Enrollment,
        ),
    };

    if subject != firebase_uid {
        return Err(MedError::Forbidden(
            "El token no corresponde a este usuario".to_string(),
        ));
    }
    Ok(credential)
}

/// 生成 MFA 密钥
///
/// 调用者必须持有该用户的注册令牌或会话；已启用 MFA 的用户只能凭自己的会话重新生成。
pub async fn mfa_setup(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<MfaSetupRequest>,
) -> ApiResult<impl IntoResponse> {
    let firebase_uid = require_text(body.firebase_uid, "firebase_uid")?;
    let credential = setup_credential(&state, &headers, &firebase_uid)?;
    let user = state.repo.get_user_by_firebase_uid(&firebase_uid).await?;

    if user.mfa_enabled && !matches!(credential, SetupCredential::Session) {
        return Err(MedError::Conflict(
            "La autenticación de dos factores ya está activada".to_string(),
        )
        .into());
    }

    let enrollment = state.mfa.setup(&user.correo)?;
    state
        .repo
        .set_mfa_secret(&user.firebase_uid, &enrollment.encrypted_secret)
        .await?;
    info!("MFA secret generated for user {}", user.id_usuario);

    let mut response = json!({ "otpauthUrl": enrollment.otpauth_url });
    if state.expose_mfa_secret {
        warn!("Exposing MFA secret in response (debug_expose_mfa_secret=true)");
        response["secret"] = json!(enrollment.secret_base32);
    }
    Ok(Json(response))
}

/// 校验 MFA 验证码并签发会话
pub async fn mfa_verify(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<MfaVerifyRequest>,
) -> ApiResult<impl IntoResponse> {
    let firebase_uid = require_text(body.firebase_uid, "firebase_uid")?;
    let token = require_text(body.token, "token")?;

    let user = state.repo.get_user_by_firebase_uid(&firebase_uid).await?;
    let encrypted = user.mfa_secret.as_deref().ok_or_else(|| {
        MedError::Validation("La autenticación de dos factores no está configurada".to_string())
    })?;

    if !state.mfa.verify(encrypted, &token)? {
        warn!("Invalid MFA code for user {}", user.id_usuario);
        return Err(ApiError::unauthorized("Código de verificación inválido"));
    }

    if !user.mfa_enabled {
        state.repo.enable_mfa(&user.firebase_uid).await?;
        info!("MFA enabled for user {}", user.id_usuario);
    }

    let session_token = state.sessions.issue(&user)?;
    Ok(Json(json!({ "verified": true, "sessionToken": session_token })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }

    #[test]
    fn test_checked_email() {
        assert!(checked_email(Some("ana@example.com".into())).is_ok());
        assert!(matches!(checked_email(None), Err(MedError::Validation(_))));
        assert!(matches!(
            checked_email(Some("no-es-correo".into())),
            Err(MedError::Validation(_))
        ));
    }
}
