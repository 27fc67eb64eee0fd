//! 通用工具函数

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::error::{MedError, Result};

/// 检查必填字段是否存在
pub fn require<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| MedError::missing_field(field))
}

/// 检查必填文本字段，空白字符串视为缺失
pub fn require_text(value: Option<String>, field: &str) -> Result<String> {
    match non_blank(value) {
        Some(text) => Ok(text),
        None => Err(MedError::missing_field(field)),
    }
}

/// 去除首尾空白，空字符串转为 None
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 简单的邮箱格式检查
///
/// 邮箱同时用作 otpauth 链接的账户名，因此不允许出现 `:`。
pub fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !email.contains(':')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Int(i64),
    Text(String),
}

/// 反序列化数字或数字字符串形式的ID
pub fn deserialize_optional_id<'de, D>(deserializer: D) -> std::result::Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<IdRepr>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(IdRepr::Int(n)) => i32::try_from(n)
            .map(Some)
            .map_err(|_| de::Error::custom(format!("id fuera de rango: {}", n))),
        Some(IdRepr::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(IdRepr::Text(s)) => s
            .trim()
            .parse::<i32>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("id inválido: {}", s))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberRepr {
    Number(f64),
    Text(String),
}

/// 反序列化数字或 "87%" 这类文本形式的数值
pub fn deserialize_lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<NumberRepr>::deserialize(deserializer)?;
    Ok(match raw {
        None => None,
        Some(NumberRepr::Number(n)) => Some(n),
        Some(NumberRepr::Text(s)) => parse_leading_number(&s),
    })
}

fn parse_leading_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let end = trimmed
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Body {
        #[serde(default, deserialize_with = "deserialize_optional_id")]
        id: Option<i32>,
    }

    #[test]
    fn test_require_text() {
        assert_eq!(require_text(Some(" CT ".to_string()), "tipo").unwrap(), "CT");
        let err = require_text(Some("   ".to_string()), "tipoExamenNombre").unwrap_err();
        assert!(err.to_string().contains("tipoExamenNombre"));
        assert!(require::<i32>(None, "id_paciente").is_err());
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("dr.house@hospital.org"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email("a:b@x.com"));
        assert!(!is_valid_email("a@b@x.com"));
    }

    #[test]
    fn test_deserialize_optional_id() {
        let body: Body = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(body.id, Some(7));
        let body: Body = serde_json::from_str(r#"{"id": "12"}"#).unwrap();
        assert_eq!(body.id, Some(12));
        let body: Body = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(body.id, None);
        assert!(serde_json::from_str::<Body>(r#"{"id": "abc"}"#).is_err());
    }

    #[test]
    fn test_parse_leading_number() {
        assert_eq!(parse_leading_number("87%"), Some(87.0));
        assert_eq!(parse_leading_number(" 0.92 "), Some(0.92));
        assert_eq!(parse_leading_number("alta"), None);
    }
}
