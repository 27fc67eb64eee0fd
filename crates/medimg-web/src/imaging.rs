//! 影像相关接口：AI 诊断和 DICOM 预览渲染

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use medimg_ai::DiagnosisRequest;
use medimg_core::utils::{non_blank, require_text};
use medimg_dicom::{
    looks_like_dicom, parse_dicom_file, render_png, DicomImage, DicomMetadata, TransferSyntaxInfo,
    WindowParams,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::handlers::decode_image_payload;
use crate::state::AppState;

const PNG_MIME: &str = "image/png";

/// 在阻塞线程池中解码并渲染 DICOM
async fn render_dicom(
    file_name: String,
    mime_type: Option<String>,
    data: Vec<u8>,
    center: Option<f64>,
    width: Option<f64>,
) -> ApiResult<(DicomImage, WindowParams, Vec<u8>)> {
    let rendered = tokio::task::spawn_blocking(move || {
        let image = parse_dicom_file(&file_name, mime_type.as_deref(), &data)?;
        let params = image.window.with_window(center, width);
        let png = render_png(&image, &params)?;
        Ok::<_, medimg_dicom::DicomError>((image, params, png))
    })
    .await
    .map_err(ApiError::internal)??;

    debug!(
        "Rendered DICOM {}x{} ({} PNG bytes)",
        rendered.0.width,
        rendered.0.height,
        rendered.2.len()
    );
    Ok(rendered)
}

// ========== AI 诊断 ==========

/// AI 诊断请求体
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiDiagnoseRequest {
    pub image_base64: Option<String>,
    pub tipo_imagen: Option<String>,
    pub tipo_examen_nombre: Option<String>,
    pub original_file_name: Option<String>,
}

/// 调用 AI 生成初步诊断
///
/// DICOM 影像先按默认窗宽窗位渲染为 PNG 再发送。
pub async fn ai_diagnose(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AiDiagnoseRequest>,
) -> ApiResult<impl IntoResponse> {
    let payload = require_text(body.image_base64, "imageBase64")?;
    let tipo_imagen = require_text(body.tipo_imagen, "tipoImagen")?;
    let tipo_examen = require_text(body.tipo_examen_nombre, "tipoExamenNombre")?;
    let file_name = non_blank(body.original_file_name);

    let ai = state.ai.clone().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "El servicio de IA no está configurado",
        )
    })?;

    let bytes = decode_image_payload(&payload)?;
    let name = file_name.clone().unwrap_or_default();

    let (image_base64, mime_type) = if looks_like_dicom(&name, Some(&tipo_imagen)) {
        let (_, _, png) =
            render_dicom(name, Some(tipo_imagen), bytes, None, None).await?;
        (STANDARD.encode(png), PNG_MIME.to_string())
    } else {
        (STANDARD.encode(bytes), tipo_imagen)
    };

    let request = DiagnosisRequest {
        image_base64,
        mime_type,
        tipo_examen,
        file_name,
    };
    let result = ai.diagnose(&request).await?;
    info!(
        "AI diagnosis completed: exam={}, condition={:?}",
        request.tipo_examen, result.condition
    );

    Ok(Json(result))
}

// ========== DICOM 预览 ==========

/// 窗宽窗位查询参数
#[derive(Debug, Default, Deserialize)]
pub struct RenderQuery {
    pub window_center: Option<f64>,
    pub window_width: Option<f64>,
}

/// 渲染结果
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResponse {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub window: WindowParams,
    pub default_window: WindowParams,
    pub transfer_syntax: TransferSyntaxInfo,
    pub metadata: DicomMetadata,
    pub png_base64: String,
}

/// 上传 DICOM 文件（multipart 字段 `file`），返回元数据和 PNG 预览
pub async fn render_dicom_upload(
    Query(query): Query<RenderQuery>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    if let Some(width) = query.window_width {
        if !width.is_finite() || width <= 0.0 {
            return Err(ApiError::bad_request("window_width debe ser mayor que 0"));
        }
    }
    if matches!(query.window_center, Some(center) if !center.is_finite()) {
        return Err(ApiError::bad_request("window_center inválido"));
    }

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let mime_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        upload = Some((file_name, mime_type, data.to_vec()));
        break;
    }

    let (file_name, mime_type, data) =
        upload.ok_or_else(|| ApiError::bad_request("Falta el campo requerido: file"))?;
    info!("Rendering DICOM upload {} ({} bytes)", file_name, data.len());

    let (image, window, png) = render_dicom(
        file_name.clone(),
        mime_type,
        data,
        query.window_center,
        query.window_width,
    )
    .await?;

    Ok(Json(RenderResponse {
        file_name,
        width: image.width,
        height: image.height,
        window,
        default_window: image.window,
        transfer_syntax: image.transfer_syntax,
        metadata: image.metadata,
        png_base64: STANDARD.encode(png),
    }))
}
