//! 模型回复解析

use medimg_core::models::DiagnosisAiResult;
use medimg_core::{MedError, Result};
use serde_json::Value;

/// 从对话接口的响应中取出回复文本
pub fn extract_content(response: &Value) -> Result<&str> {
    response
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| MedError::Ai("Respuesta sin choices[0].message.content".to_string()))
}

/// 将回复文本解析为诊断结果
///
/// 模型有时会用 ```json 代码块包裹结果，或在前后附加说明文字，
/// 这里取第一个 `{` 到最后一个 `}` 之间的内容。
pub fn parse_diagnosis_reply(content: &str) -> Result<DiagnosisAiResult> {
    let start = content.find('{');
    let end = content.rfind('}');

    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => {
            return Err(MedError::Ai(
                "La respuesta del modelo no contiene JSON".to_string(),
            ))
        }
    };

    serde_json::from_str(json)
        .map_err(|e| MedError::Ai(format!("JSON de diagnóstico inválido: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        let result = parse_diagnosis_reply(
            r#"{"condition":"Neumonía","confidence":0.82,"description":"Opacidad basal"}"#,
        )
        .unwrap();
        assert_eq!(result.condition.as_deref(), Some("Neumonía"));
        assert_eq!(result.confidence, Some(0.82));
        assert!(result.recomendaciones.is_none());
    }

    #[test]
    fn test_fenced_json() {
        let reply = "```json\n{\"condition\": \"Normal\", \"confidence\": \"95%\", \"pronostico\": \"Bueno\"}\n```";
        let result = parse_diagnosis_reply(reply).unwrap();
        assert_eq!(result.condition.as_deref(), Some("Normal"));
        assert_eq!(result.confidence, Some(95.0));
        assert_eq!(result.pronostico.as_deref(), Some("Bueno"));
    }

    #[test]
    fn test_reply_without_json() {
        assert!(matches!(
            parse_diagnosis_reply("No puedo analizar esta imagen."),
            Err(MedError::Ai(_))
        ));
        assert!(parse_diagnosis_reply("{ roto").is_err());
    }

    #[test]
    fn test_extract_content() {
        let response = json!({
            "choices": [{"message": {"role": "assistant", "content": "{}"}}]
        });
        assert_eq!(extract_content(&response).unwrap(), "{}");
        assert!(extract_content(&json!({"choices": []})).is_err());
    }
}
