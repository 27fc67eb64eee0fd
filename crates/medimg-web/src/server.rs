//! Web服务器

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use medimg_core::config::ServerConfig;
use medimg_core::{MedError, Result};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::auth::{get_profile, mfa_setup, mfa_verify, register, require_session, update_profile};
use crate::handlers::{
    create_diagnosis, create_patient, delete_diagnosis, delete_patient, get_diagnosis,
    get_diagnosis_image, get_patient, health, list_diagnoses, list_exam_types,
    list_patient_diagnoses, list_patients, not_found, update_patient,
};
use crate::imaging::{ai_diagnose, render_dicom_upload};
use crate::state::AppState;

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(config: &ServerConfig, state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| MedError::Config(format!("Dirección de escucha inválida: {}", e)))?;
        let app = create_router(state, config);

        Ok(Self { addr, app })
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app).await?;

        Ok(())
    }
}

/// 构建完整路由
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health))
        // API路由
        .nest("/api", api_routes(state.clone()))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.cors_allowed_origins)),
        )
        .with_state(state)
}

/// API 路由
fn api_routes(state: AppState) -> Router<AppState> {
    // 需要会话的路由
    let dashboard = Router::new()
        .route("/dashboard/profile", get(get_profile).put(update_profile))
        .route_layer(middleware::from_fn_with_state(state, require_session));

    Router::new()
        .route("/diagnosticos", get(list_diagnoses).post(create_diagnosis))
        .route("/diagnosticos/:id", get(get_diagnosis).delete(delete_diagnosis))
        .route("/diagnosticos/:id/imagen", get(get_diagnosis_image))
        .route("/pacientes", get(list_patients).post(create_patient))
        .route(
            "/pacientes/:id",
            get(get_patient).put(update_patient).delete(delete_patient),
        )
        .route("/pacientes/:id/diagnosticos", get(list_patient_diagnoses))
        .route("/tipos-examen", get(list_exam_types))
        .route("/auth/register", post(register))
        .route("/mfa/setup", post(mfa_setup))
        .route("/mfa/verify", post(mfa_verify))
        .route("/ai/diagnose", post(ai_diagnose))
        .route("/dicom/render", post(render_dicom_upload))
        .merge(dashboard)
}

/// CORS：未配置来源时允许任意来源
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}
