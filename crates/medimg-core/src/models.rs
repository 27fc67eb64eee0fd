//! 核心数据模型定义

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MedError;

/// 患者信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paciente {
    pub id_paciente: i32,
    pub primer_nombre: String,
    pub segundo_nombre: Option<String>,
    pub primer_apellido: String,
    pub segundo_apellido: Option<String>,
    pub fecha_nacimiento: Option<NaiveDate>,
    pub genero: Option<String>,
    pub documento: Option<String>,        // 身份证件号
    pub telefono: Option<String>,
    pub correo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新建或更新患者时的输入
#[derive(Debug, Clone, Default)]
pub struct NewPaciente {
    pub primer_nombre: String,
    pub segundo_nombre: Option<String>,
    pub primer_apellido: String,
    pub segundo_apellido: Option<String>,
    pub fecha_nacimiento: Option<NaiveDate>,
    pub genero: Option<String>,
    pub documento: Option<String>,
    pub telefono: Option<String>,
    pub correo: Option<String>,
}

/// 检查类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TipoExamen {
    pub id_tipo_examen: i32,
    pub nombre: String,
}

/// 预置的检查类型
pub const DEFAULT_EXAM_TYPES: &[&str] = &[
    "Radiografía de tórax",
    "Tomografía computarizada",
    "Resonancia magnética",
    "Mamografía",
    "Ecografía",
];

/// AI 诊断结果
///
/// 字段名与前端约定保持一致，所有字段均可缺省。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiagnosisAiResult {
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default, deserialize_with = "crate::utils::deserialize_lenient_f64")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub recomendaciones: Option<String>,
    #[serde(default)]
    pub pronostico: Option<String>,
}

/// 诊断记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnostico {
    pub id_diagnostico: i32,
    pub id_paciente: i32,
    pub id_medico: i32,
    pub id_tipo_examen: i32,
    pub tipo_examen: String,
    pub resultado: Option<String>,
    pub confianza: Option<f64>,
    pub descripcion: Option<String>,
    pub recomendaciones: Option<String>,
    pub pronostico: Option<String>,
    pub tipo_imagen: Option<String>,
    pub nombre_archivo: Option<String>,
    pub tiene_imagen: bool,
    pub fecha: DateTime<Utc>,
}

/// 新建诊断记录的输入
#[derive(Debug, Clone)]
pub struct NewDiagnostico {
    pub id_paciente: i32,
    pub id_medico: i32,
    pub tipo_examen_nombre: String,
    pub resultado: DiagnosisAiResult,
    pub imagen: Option<Vec<u8>>,
    pub tipo_imagen: Option<String>,
    pub nombre_archivo: Option<String>,
}

/// 诊断附带的影像
#[derive(Debug, Clone)]
pub struct DiagnosticoImagen {
    pub bytes: Vec<u8>,
    pub tipo_imagen: Option<String>,
    pub nombre_archivo: Option<String>,
}

/// 用户角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Administrador,
    #[default]
    Medico,
    Tecnico,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Administrador => "administrador",
            UserRole::Medico => "medico",
            UserRole::Tecnico => "tecnico",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = MedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "administrador" => Ok(UserRole::Administrador),
            "medico" => Ok(UserRole::Medico),
            "tecnico" => Ok(UserRole::Tecnico),
            other => Err(MedError::Validation(format!("Rol desconocido: {}", other))),
        }
    }
}

/// 用户（医生）资料
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Usuario {
    pub id_usuario: i32,
    pub firebase_uid: String,
    pub primer_nombre: String,
    pub segundo_nombre: Option<String>,
    pub primer_apellido: String,
    pub segundo_apellido: Option<String>,
    pub correo: String,
    pub telefono: Option<String>,
    pub rol: UserRole,
    /// 加密后的 TOTP 密钥，永不返回给客户端
    #[serde(skip_serializing, default)]
    pub mfa_secret: Option<String>,
    pub mfa_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 注册用户的输入
#[derive(Debug, Clone)]
pub struct NewUsuario {
    pub firebase_uid: String,
    pub primer_nombre: String,
    pub segundo_nombre: Option<String>,
    pub primer_apellido: String,
    pub segundo_apellido: Option<String>,
    pub correo: String,
    pub telefono: Option<String>,
    pub rol: UserRole,
}

/// 个人资料更新
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub primer_nombre: String,
    pub segundo_nombre: Option<String>,
    pub primer_apellido: String,
    pub segundo_apellido: Option<String>,
    pub correo: String,
    pub telefono: Option<String>,
}
