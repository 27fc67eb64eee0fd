//! OpenAI 兼容对话接口客户端（默认 OpenRouter）

use std::time::Duration;

use async_trait::async_trait;
use medimg_core::config::AiConfig;
use medimg_core::models::DiagnosisAiResult;
use medimg_core::{MedError, Result};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::parse::{extract_content, parse_diagnosis_reply};
use crate::{DiagnosisAi, DiagnosisRequest};

const SYSTEM_PROMPT: &str = "Eres un asistente de apoyo al diagnóstico por imágenes médicas. \
Analiza la imagen y responde únicamente con un objeto JSON con las claves \
\"condition\" (hallazgo principal), \"confidence\" (número entre 0 y 100), \
\"description\", \"recomendaciones\" y \"pronostico\", todas en español. \
El resultado es orientativo y debe ser revisado por un médico.";

/// AI 诊断客户端
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    site_url: String,
    app_title: String,
}

impl OpenRouterClient {
    pub fn new(config: &AiConfig, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MedError::Ai(format!("No se pudo crear el cliente HTTP: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            site_url: config.site_url.clone(),
            app_title: config.app_title.clone(),
        })
    }

    /// 配置了 API 密钥时创建客户端
    pub fn from_config(config: &AiConfig) -> Result<Option<Self>> {
        match config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Self::new(config, key).map(Some),
            _ => {
                warn!("AI api_key not configured, /api/ai/diagnose disabled");
                Ok(None)
            }
        }
    }

    /// 构造对话请求体
    pub fn build_body(&self, request: &DiagnosisRequest) -> Value {
        let mut prompt = format!("Tipo de examen: {}.", request.tipo_examen);
        if let Some(name) = &request.file_name {
            prompt.push_str(&format!(" Archivo: {}.", name));
        }

        json!({
            "model": self.model,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {
                    "role": "user",
                    "content": [
                        {"type": "text", "text": prompt},
                        {
                            "type": "image_url",
                            "image_url": {
                                "url": format!("data:{};base64,{}", request.mime_type, request.image_base64)
                            }
                        }
                    ]
                }
            ]
        })
    }
}

#[async_trait]
impl DiagnosisAi for OpenRouterClient {
    async fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisAiResult> {
        info!(
            "Requesting AI diagnosis: exam={}, mime={}",
            request.tipo_examen, request.mime_type
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.site_url)
            .header("X-Title", &self.app_title)
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(|e| MedError::Ai(format!("Servicio de IA no disponible: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!("AI service returned {}: {}", status, detail);
            return Err(MedError::Ai(format!("El servicio de IA respondió {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| MedError::Ai(format!("Respuesta de IA ilegible: {}", e)))?;
        let content = extract_content(&body)?;
        debug!("AI reply: {}", content);

        parse_diagnosis_reply(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AiConfig {
        AiConfig {
            api_key: Some("sk-test".to_string()),
            base_url: "https://openrouter.ai/api/v1/".to_string(),
            model: "openai/gpt-4o-mini".to_string(),
            site_url: "http://localhost:3000".to_string(),
            app_title: "MedImg Dashboard".to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_from_config_requires_key() {
        assert!(OpenRouterClient::from_config(&config()).unwrap().is_some());

        let mut without_key = config();
        without_key.api_key = Some("  ".to_string());
        assert!(OpenRouterClient::from_config(&without_key).unwrap().is_none());
    }

    #[test]
    fn test_build_body() {
        let client = OpenRouterClient::new(&config(), "sk-test").unwrap();
        assert_eq!(client.base_url, "https://openrouter.ai/api/v1");

        let body = client.build_body(&DiagnosisRequest {
            image_base64: "iVBORw0KGgo=".to_string(),
            mime_type: "image/png".to_string(),
            tipo_examen: "Mamografía".to_string(),
            file_name: Some("estudio.dcm".to_string()),
        });

        assert_eq!(body["model"], "openai/gpt-4o-mini");
        assert_eq!(body["response_format"]["type"], "json_object");
        let user = &body["messages"][1]["content"];
        assert!(user[0]["text"].as_str().unwrap().contains("Mamografía"));
        assert_eq!(
            user[1]["image_url"]["url"],
            "data:image/png;base64,iVBORw0KGgo="
        );
    }
}
