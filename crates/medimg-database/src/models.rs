//! 数据库模型

use chrono::{DateTime, NaiveDate, Utc};
use medimg_core::models::*;
use sqlx::FromRow;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库患者表
#[derive(Debug, FromRow)]
pub struct DbPaciente {
    pub id_paciente: i32,
    pub primer_nombre: String,
    pub segundo_nombre: Option<String>,
    pub primer_apellido: String,
    pub segundo_apellido: Option<String>,
    pub fecha_nacimiento: Option<NaiveDate>,
    pub genero: Option<String>,
    pub documento: Option<String>,
    pub telefono: Option<String>,
    pub correo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbPaciente> for Paciente {
    fn from(row: DbPaciente) -> Self {
        Paciente {
            id_paciente: row.id_paciente,
            primer_nombre: row.primer_nombre,
            segundo_nombre: row.segundo_nombre,
            primer_apellido: row.primer_apellido,
            segundo_apellido: row.segundo_apellido,
            fecha_nacimiento: row.fecha_nacimiento,
            genero: row.genero,
            documento: row.documento,
            telefono: row.telefono,
            correo: row.correo,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// 数据库检查类型表
#[derive(Debug, FromRow)]
pub struct DbTipoExamen {
    pub id_tipo_examen: i32,
    pub nombre: String,
}

impl From<DbTipoExamen> for TipoExamen {
    fn from(row: DbTipoExamen) -> Self {
        TipoExamen {
            id_tipo_examen: row.id_tipo_examen,
            nombre: row.nombre,
        }
    }
}

/// 诊断查询结果（关联检查类型名称，不含影像字节）
#[derive(Debug, FromRow)]
pub struct DbDiagnostico {
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

impl From<DbDiagnostico> for Diagnostico {
    fn from(row: DbDiagnostico) -> Self {
        Diagnostico {
            id_diagnostico: row.id_diagnostico,
            id_paciente: row.id_paciente,
            id_medico: row.id_medico,
            id_tipo_examen: row.id_tipo_examen,
            tipo_examen: row.tipo_examen,
            resultado: row.resultado,
            confianza: row.confianza,
            descripcion: row.descripcion,
            recomendaciones: row.recomendaciones,
            pronostico: row.pronostico,
            tipo_imagen: row.tipo_imagen,
            nombre_archivo: row.nombre_archivo,
            tiene_imagen: row.tiene_imagen,
            fecha: row.fecha,
        }
    }
}

/// 诊断影像
#[derive(Debug, FromRow)]
pub struct DbDiagnosticoImagen {
    pub imagen: Option<Vec<u8>>,
    pub tipo_imagen: Option<String>,
    pub nombre_archivo: Option<String>,
}

/// 数据库用户表
#[derive(Debug, FromRow)]
pub struct DbUsuario {
    pub id_usuario: i32,
    pub firebase_uid: String,
    pub primer_nombre: String,
    pub segundo_nombre: Option<String>,
    pub primer_apellido: String,
    pub segundo_apellido: Option<String>,
    pub correo: String,
    pub telefono: Option<String>,
    pub rol: String, // 存储为字符串，转换为UserRole枚举
    pub mfa_secret: Option<String>,
    pub mfa_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbUsuario> for Usuario {
    fn from(row: DbUsuario) -> Self {
        Usuario {
            id_usuario: row.id_usuario,
            firebase_uid: row.firebase_uid,
            primer_nombre: row.primer_nombre,
            segundo_nombre: row.segundo_nombre,
            primer_apellido: row.primer_apellido,
            segundo_apellido: row.segundo_apellido,
            correo: row.correo,
            telefono: row.telefono,
            rol: row.rol.parse().unwrap_or_default(),
            mfa_secret: row.mfa_secret,
            mfa_enabled: row.mfa_enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
