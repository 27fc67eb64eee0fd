//! # AI 诊断模块
//!
//! 通过 OpenAI 兼容的对话接口对影像生成初步诊断。

pub mod client;
pub mod parse;

use async_trait::async_trait;
use medimg_core::models::DiagnosisAiResult;
use medimg_core::Result;

pub use client::OpenRouterClient;
pub use parse::parse_diagnosis_reply;

/// 一次诊断请求
#[derive(Debug, Clone)]
pub struct DiagnosisRequest {
    /// Base64 编码的影像（PNG/JPEG 等浏览器可显示的格式）
    pub image_base64: String,
    /// 影像 MIME 类型
    pub mime_type: String,
    /// 检查类型名称
    pub tipo_examen: String,
    pub file_name: Option<String>,
}

/// AI 诊断服务
#[async_trait]
pub trait DiagnosisAi: Send + Sync {
    async fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisAiResult>;
}
