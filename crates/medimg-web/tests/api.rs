//! 路由级集成测试，使用内存存储

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use medimg_ai::{DiagnosisAi, DiagnosisRequest};
use medimg_auth::{MfaService, SecretCipher, SessionManager};
use medimg_core::config::ServerConfig;
use medimg_core::models::DiagnosisAiResult;
use medimg_core::Result;
use medimg_database::MemoryRepository;
use medimg_dicom::testing::TestDicomBuilder;
use medimg_web::{create_router, AppState};
use serde_json::{json, Value};
use totp_rs::{Algorithm, Secret, TOTP};
use tower::ServiceExt;

const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
const SESSION_SECRET: &str = "integration-test-session-secret-0001";
const BOUNDARY: &str = "medimg-test-boundary";

/// 记录最后一次请求的假 AI 服务
#[derive(Default)]
struct FakeAi {
    last_mime: Mutex<Option<String>>,
}

#[async_trait]
impl DiagnosisAi for FakeAi {
    async fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisAiResult> {
        *self.last_mime.lock().unwrap() = Some(request.mime_type.clone());
        Ok(DiagnosisAiResult {
            condition: Some("Sin hallazgos".to_string()),
            confidence: Some(90.0),
            description: Some(format!("Examen: {}", request.tipo_examen)),
            ..Default::default()
        })
    }
}

fn server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_allowed_origins: Vec::new(),
        body_limit_bytes: 10 * 1024 * 1024,
    }
}

fn app_with(ai: Option<Arc<FakeAi>>) -> Router {
    let mfa = MfaService::new(SecretCipher::from_hex_key(KEY).unwrap(), "MedImg");
    let sessions = SessionManager::new(SESSION_SECRET, 12);
    let ai = ai.map(|ai| ai as Arc<dyn DiagnosisAi>);
    let state = AppState::new(Arc::new(MemoryRepository::new()), mfa, sessions, ai)
        .with_exposed_mfa_secret(true);
    create_router(state, &server_config())
}

fn app() -> Router {
    app_with(None)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// 注册用户，返回完整响应（含 `user` 和 `enrollmentToken`）
async fn register_account(app: &Router, uid: &str, correo: &str) -> Value {
    let (status, body) = send(
        app,
        json_request(
            Method::POST,
            "/api/auth/register",
            json!({
                "firebase_uid": uid,
                "correo": correo,
                "primer_nombre": "Laura",
                "primer_apellido": "Gómez"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

async fn register(app: &Router, uid: &str, correo: &str) -> Value {
    register_account(app, uid, correo).await["user"].clone()
}

fn mfa_setup_request(uid: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/mfa/setup")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder
        .body(Body::from(json!({ "firebase_uid": uid }).to_string()))
        .unwrap()
}

async fn create_patient(app: &Router) -> i64 {
    let (status, body) = send(
        app,
        json_request(
            Method::POST,
            "/api/pacientes",
            json!({"primer_nombre": "Juan", "primer_apellido": "Ríos", "fecha_nacimiento": "1980-05-17"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id_paciente"].as_i64().unwrap()
}

/// 完成 MFA 设置与验证，返回会话令牌
async fn login_with_mfa(app: &Router, uid: &str, bearer: &str) -> String {
    let (status, setup) = send(app, mfa_setup_request(uid, Some(bearer))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(setup["otpauthUrl"].as_str().unwrap().starts_with("otpauth://totp/"));

    let secret = setup["secret"].as_str().unwrap().to_string();
    let bytes = Secret::Encoded(secret).to_bytes().unwrap();
    let code = TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes, None, "test".to_string())
        .unwrap()
        .generate_current()
        .unwrap();

    let (status, verified) = send(
        app,
        json_request(
            Method::POST,
            "/api/mfa/verify",
            json!({ "firebase_uid": uid, "token": code }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["verified"], true);
    verified["sessionToken"].as_str().unwrap().to_string()
}

fn multipart_request(uri: &str, file_name: &str, mime: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn health_reports_healthy() {
    let (status, body) = send(&app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn diagnosis_without_patient_id_names_the_field() {
    let (status, body) = send(
        &app(),
        json_request(
            Method::POST,
            "/api/diagnosticos",
            json!({
                "id_medico": 1,
                "tipoExamenNombre": "Mamografía",
                "diagnosisAIResult": {"condition": "Normal"}
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("id_paciente"));
}

#[tokio::test]
async fn diagnosis_round_trip() {
    let app = app();
    let user = register(&app, "uid-1", "laura@example.com").await;
    let id_paciente = create_patient(&app).await;

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/diagnosticos",
            json!({
                "id_paciente": id_paciente,
                "id_medico": user["id_usuario"],
                "tipoExamenNombre": "Radiografía de tórax",
                "imageBase64": "data:image/png;base64,AQID",
                "tipoImagen": "image/png",
                "originalFileName": "torax.png",
                "diagnosisAIResult": {"condition": "Neumonía", "confidence": "87%"}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id_diagnostico"].as_i64().unwrap();

    let (status, list) = send(&app, get("/api/diagnosticos")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["resultado"], "Neumonía");
    assert_eq!(list[0]["confianza"], 87.0);
    assert_eq!(list[0]["tiene_imagen"], true);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/diagnosticos/{}/imagen", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.as_ref(), &[1, 2, 3]);

    let (status, _) = send(
        &app,
        Request::builder()
            .method(Method::DELETE)
            .uri(format!("/api/diagnosticos/{}", id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get(&format!("/api/diagnosticos/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn diagnosis_with_unknown_references_is_not_found() {
    let app = app();
    let user = register(&app, "uid-1", "laura@example.com").await;

    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/api/diagnosticos",
            json!({
                "id_paciente": 999,
                "id_medico": user["id_usuario"],
                "tipoExamenNombre": "Mamografía",
                "diagnosisAIResult": {}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn patient_crud_and_exam_types() {
    let app = app();
    let id = create_patient(&app).await;

    let (status, patient) = send(&app, get(&format!("/api/pacientes/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patient["fecha_nacimiento"], "1980-05-17");

    let (status, body) = send(
        &app,
        json_request(
            Method::PUT,
            &format!("/api/pacientes/{}", id),
            json!({"primer_nombre": "Juan Pablo", "primer_apellido": "Ríos"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paciente"]["primer_nombre"], "Juan Pablo");

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/pacientes", json!({"primer_nombre": "Sin apellido"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("primer_apellido"));

    let (status, _) = send(&app, get("/api/pacientes/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, types) = send(&app, get("/api/tipos-examen")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(types.as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app();
    register(&app, "uid-1", "laura@example.com").await;

    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/api/auth/register",
            json!({
                "firebase_uid": "uid-1",
                "correo": "otra@example.com",
                "primer_nombre": "Laura",
                "primer_apellido": "Gómez"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn profile_requires_session() {
    let app = app();

    let (status, body) = send(
        &app,
        json_request(
            Method::PUT,
            "/api/dashboard/profile",
            json!({"primer_nombre": "A", "primer_apellido": "B", "correo": "a@b.com"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let request = Request::builder()
        .uri("/api/dashboard/profile")
        .header(header::AUTHORIZATION, "Bearer not-a-token")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn mfa_then_profile_update() {
    let app = app();
    let account = register_account(&app, "uid-1", "laura@example.com").await;
    let enrollment = account["enrollmentToken"].as_str().unwrap();
    let session = login_with_mfa(&app, "uid-1", enrollment).await;

    let request = Request::builder()
        .uri("/api/dashboard/profile")
        .header(header::AUTHORIZATION, format!("Bearer {}", session))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["mfa_enabled"], true);
    assert!(body["user"].get("mfa_secret").is_none());

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/api/dashboard/profile")
        .header(header::AUTHORIZATION, format!("Bearer {}", session))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "primer_nombre": "Laura",
                "primer_apellido": "Gómez",
                "correo": "laura.gomez@example.com",
                "telefono": "3001234567"
            })
            .to_string(),
        ))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["correo"], "laura.gomez@example.com");
    assert_eq!(body["user"]["telefono"], "3001234567");
}

#[tokio::test]
async fn mfa_rejects_wrong_code_and_protects_reenrollment() {
    let app = app();
    let account = register_account(&app, "uid-1", "laura@example.com").await;
    let enrollment = account["enrollmentToken"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        json_request(Method::POST, "/api/mfa/verify", json!({"firebase_uid": "uid-1", "token": "123456"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let session = login_with_mfa(&app, "uid-1", &enrollment).await;

    // 启用后注册令牌不能再覆盖密钥
    let (status, _) = send(&app, mfa_setup_request("uid-1", Some(&enrollment))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, mfa_setup_request("uid-1", Some(&session))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["otpauthUrl"].is_string());

    let (status, _) = send(&app, mfa_setup_request("desconocido", Some(&session))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn mfa_setup_for_another_user_is_rejected() {
    let mfa = MfaService::new(SecretCipher::from_hex_key(KEY).unwrap(), "MedImg");
    let sessions = SessionManager::new(SESSION_SECRET, 12);
    let state = AppState::new(Arc::new(MemoryRepository::new()), mfa, sessions, None);
    let app = create_router(state, &server_config());

    register(&app, "victim-uid", "victima@example.com").await;
    let other = register_account(&app, "other-uid", "otro@example.com").await;
    let other_enrollment = other["enrollmentToken"].as_str().unwrap();

    let (status, body) = send(&app, mfa_setup_request("victim-uid", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.get("otpauthUrl").is_none());

    let (status, _) = send(&app, mfa_setup_request("victim-uid", Some("not-a-token"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, mfa_setup_request("victim-uid", Some(other_enrollment))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.get("otpauthUrl").is_none());

    // 没有写入密钥，验证无法签发会话
    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/mfa/verify",
            json!({"firebase_uid": "victim-uid", "token": "000000"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("sessionToken").is_none());

    let (status, _) = send(
        &app,
        json_request(
            Method::PUT,
            "/api/dashboard/profile",
            json!({"primer_nombre": "X", "primer_apellido": "Y", "correo": "x@evil.com"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_rejects_email_unusable_as_totp_account() {
    let (status, body) = send(
        &app(),
        json_request(
            Method::POST,
            "/api/auth/register",
            json!({
                "firebase_uid": "uid-2",
                "correo": "a:b@x.com",
                "primer_nombre": "Ana",
                "primer_apellido": "Vega"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Correo"));
}

#[tokio::test]
async fn dicom_render_returns_png_and_metadata() {
    let data = TestDicomBuilder::new()
        .dimensions(2, 2)
        .modality("CR")
        .pixels_u16(vec![0, 100, 200, 300])
        .build();

    let (status, body) = send(
        &app(),
        multipart_request(
            "/api/dicom/render?window_center=100&window_width=200",
            "estudio.dcm",
            "application/octet-stream",
            &data,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["width"], 2);
    assert_eq!(body["height"], 2);
    assert_eq!(body["window"]["windowCenter"], 100.0);
    assert_eq!(body["defaultWindow"]["windowCenter"], 50.0);
    assert_eq!(body["metadata"]["modality"], "CR");
    assert!(body["pngBase64"].as_str().unwrap().starts_with("iVBORw0KGgo"));
}

#[tokio::test]
async fn dicom_render_rejects_compressed_and_non_dicom() {
    let app = app();
    let compressed = TestDicomBuilder::new()
        .transfer_syntax("1.2.840.10008.1.2.4.50")
        .dimensions(2, 2)
        .pixels_u16(vec![0, 1, 2, 3])
        .build();

    let (status, body) = send(
        &app,
        multipart_request("/api/dicom/render", "jpeg.dcm", "application/dicom", &compressed),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["error"].as_str().unwrap().contains("sin compresión"));

    let (status, _) = send(
        &app,
        multipart_request("/api/dicom/render", "foto.png", "image/png", &[1, 2, 3]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        multipart_request("/api/dicom/render?window_width=0", "a.dcm", "application/dicom", &compressed),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ai_diagnose_renders_dicom_before_calling_model() {
    let fake = Arc::new(FakeAi::default());
    let app = app_with(Some(fake.clone()));

    let data = TestDicomBuilder::new()
        .dimensions(2, 2)
        .pixels_u16(vec![0, 100, 200, 300])
        .build();
    let payload = {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        STANDARD.encode(&data)
    };

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/ai/diagnose",
            json!({
                "imageBase64": payload,
                "tipoImagen": "application/dicom",
                "tipoExamenNombre": "Tomografía computarizada",
                "originalFileName": "corte.dcm"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["condition"], "Sin hallazgos");
    assert_eq!(fake.last_mime.lock().unwrap().as_deref(), Some("image/png"));
}

#[tokio::test]
async fn ai_diagnose_without_client_is_unavailable() {
    let (status, _) = send(
        &app(),
        json_request(
            Method::POST,
            "/api/ai/diagnose",
            json!({"imageBase64": "AQID", "tipoImagen": "image/png", "tipoExamenNombre": "Ecografía"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
