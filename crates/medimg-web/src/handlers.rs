//! HTTP处理器：患者、检查类型与诊断记录

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::NaiveDate;
use medimg_core::models::{DiagnosisAiResult, NewDiagnostico, NewPaciente};
use medimg_core::utils::{deserialize_optional_id, is_valid_email, non_blank, require, require_text};
use medimg_core::MedError;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, IdPath};
use crate::state::AppState;

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 解码 Base64 影像，允许带 `data:<mime>;base64,` 前缀
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>, MedError> {
    let data = match payload.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => payload,
    };
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();

    STANDARD
        .decode(cleaned)
        .map_err(|_| MedError::Validation("imageBase64 no es Base64 válido".to_string()))
}

// ========== 患者 ==========

/// 患者请求体
#[derive(Debug, Deserialize)]
pub struct PacienteRequest {
    pub primer_nombre: Option<String>,
    pub segundo_nombre: Option<String>,
    pub primer_apellido: Option<String>,
    pub segundo_apellido: Option<String>,
    pub fecha_nacimiento: Option<NaiveDate>,
    pub genero: Option<String>,
    pub documento: Option<String>,
    pub telefono: Option<String>,
    pub correo: Option<String>,
}

impl PacienteRequest {
    fn into_new(self) -> Result<NewPaciente, MedError> {
        let correo = non_blank(self.correo);
        if let Some(correo) = &correo {
            if !is_valid_email(correo) {
                return Err(MedError::Validation(format!("Correo inválido: {}", correo)));
            }
        }

        Ok(NewPaciente {
            primer_nombre: require_text(self.primer_nombre, "primer_nombre")?,
            segundo_nombre: non_blank(self.segundo_nombre),
            primer_apellido: require_text(self.primer_apellido, "primer_apellido")?,
            segundo_apellido: non_blank(self.segundo_apellido),
            fecha_nacimiento: self.fecha_nacimiento,
            genero: non_blank(self.genero),
            documento: non_blank(self.documento),
            telefono: non_blank(self.telefono),
            correo,
        })
    }
}

pub async fn list_patients(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let patients = state.repo.list_patients().await?;
    Ok(Json(patients))
}

pub async fn get_patient(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<impl IntoResponse> {
    let patient = state.repo.get_patient(id).await?;
    Ok(Json(patient))
}

pub async fn create_patient(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<PacienteRequest>,
) -> ApiResult<impl IntoResponse> {
    let patient = body.into_new()?;
    let id = state.repo.create_patient(&patient).await?;
    info!("Created patient {}", id);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Paciente creado correctamente", "id_paciente": id })),
    ))
}

pub async fn update_patient(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<PacienteRequest>,
) -> ApiResult<impl IntoResponse> {
    let patient = body.into_new()?;
    let updated = state.repo.update_patient(id, &patient).await?;
    info!("Updated patient {}", id);

    Ok(Json(json!({ "message": "Paciente actualizado correctamente", "paciente": updated })))
}

pub async fn delete_patient(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<impl IntoResponse> {
    state.repo.delete_patient(id).await?;
    info!("Deleted patient {}", id);
    Ok(Json(json!({ "message": "Paciente eliminado correctamente" })))
}

pub async fn list_patient_diagnoses(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<impl IntoResponse> {
    // 患者不存在时返回 404，而不是空列表
    state.repo.get_patient(id).await?;
    let diagnoses = state.repo.list_diagnoses_for_patient(id).await?;
    Ok(Json(diagnoses))
}

// ========== 检查类型 ==========

pub async fn list_exam_types(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let types = state.repo.list_exam_types().await?;
    Ok(Json(types))
}

// ========== 诊断 ==========

/// 保存诊断的请求体
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDiagnosisRequest {
    #[serde(rename = "id_paciente", default, deserialize_with = "deserialize_optional_id")]
    pub id_paciente: Option<i32>,
    #[serde(rename = "id_medico", default, deserialize_with = "deserialize_optional_id")]
    pub id_medico: Option<i32>,
    pub tipo_examen_nombre: Option<String>,
    pub image_base64: Option<String>,
    pub tipo_imagen: Option<String>,
    pub original_file_name: Option<String>,
    #[serde(rename = "diagnosisAIResult")]
    pub diagnosis_ai_result: Option<DiagnosisAiResult>,
}

pub async fn create_diagnosis(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateDiagnosisRequest>,
) -> ApiResult<impl IntoResponse> {
    let id_paciente = require(body.id_paciente, "id_paciente")?;
    let id_medico = require(body.id_medico, "id_medico")?;
    let tipo_examen_nombre = require_text(body.tipo_examen_nombre, "tipoExamenNombre")?;
    let resultado = require(body.diagnosis_ai_result, "diagnosisAIResult")?;

    let imagen = match non_blank(body.image_base64) {
        Some(payload) => Some(decode_image_payload(&payload)?),
        None => None,
    };

    let diagnosis = NewDiagnostico {
        id_paciente,
        id_medico,
        tipo_examen_nombre,
        resultado,
        imagen,
        tipo_imagen: non_blank(body.tipo_imagen),
        nombre_archivo: non_blank(body.original_file_name),
    };

    let id = state.repo.create_diagnosis(&diagnosis).await?;
    info!("Saved diagnosis {} for patient {}", id, id_paciente);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Diagnóstico guardado correctamente", "id_diagnostico": id })),
    ))
}

pub async fn list_diagnoses(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let diagnoses = state.repo.list_diagnoses().await?;
    Ok(Json(diagnoses))
}

pub async fn get_diagnosis(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<impl IntoResponse> {
    let diagnosis = state.repo.get_diagnosis(id).await?;
    Ok(Json(diagnosis))
}

/// 返回诊断附带的影像字节
pub async fn get_diagnosis_image(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<impl IntoResponse> {
    let image = state.repo.get_diagnosis_image(id).await?;

    let content_type = image
        .tipo_imagen
        .as_deref()
        .and_then(|t| HeaderValue::from_str(t).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    let disposition = image
        .nombre_archivo
        .as_deref()
        .and_then(|name| HeaderValue::from_str(&format!("inline; filename=\"{}\"", name)).ok())
        .unwrap_or_else(|| HeaderValue::from_static("inline"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        image.bytes,
    ))
}

pub async fn delete_diagnosis(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<impl IntoResponse> {
    state.repo.delete_diagnosis(id).await?;
    info!("Deleted diagnosis {}", id);
    Ok(Json(json!({ "message": "Diagnóstico eliminado correctamente" })))
}

/// 未匹配的路由
pub async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Ruta no encontrada")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_image_payload() {
        assert_eq!(decode_image_payload("AQID").unwrap(), vec![1, 2, 3]);
        assert_eq!(
            decode_image_payload("data:image/png;base64,AQID").unwrap(),
            vec![1, 2, 3]
        );
        assert_eq!(decode_image_payload("AQ\nID").unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            decode_image_payload("@@@"),
            Err(MedError::Validation(_))
        ));
    }

    #[test]
    fn test_diagnosis_request_field_names() {
        let body: CreateDiagnosisRequest = serde_json::from_str(
            r#"{
                "id_paciente": "3",
                "id_medico": 1,
                "tipoExamenNombre": "Mamografía",
                "originalFileName": "a.png",
                "diagnosisAIResult": {"condition": "Normal"}
            }"#,
        )
        .unwrap();

        assert_eq!(body.id_paciente, Some(3));
        assert_eq!(body.id_medico, Some(1));
        assert_eq!(body.tipo_examen_nombre.as_deref(), Some("Mamografía"));
        assert_eq!(body.original_file_name.as_deref(), Some("a.png"));
        assert!(body.diagnosis_ai_result.is_some());
    }

    #[test]
    fn test_patient_request_requires_names() {
        let body = PacienteRequest {
            primer_nombre: Some("Juan".into()),
            segundo_nombre: None,
            primer_apellido: Some("  ".into()),
            segundo_apellido: None,
            fecha_nacimiento: None,
            genero: None,
            documento: None,
            telefono: None,
            correo: None,
        };
        let err = body.into_new().unwrap_err();
        assert!(err.to_string().contains("primer_apellido"));
    }
}
