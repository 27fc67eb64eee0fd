//! 数据库查询操作

use async_trait::async_trait;
use medimg_core::models::*;
use medimg_core::{MedError, Repository, Result};
use sqlx::Row;
use tracing::{debug, info};

use crate::connection::DatabasePool;
use crate::models::*;

/// 诊断查询的公共 SELECT，关联检查类型名称，不读取影像字节
const DIAGNOSIS_SELECT: &str = r#"
    SELECT d.id_diagnostico, d.id_paciente, d.id_medico, d.id_tipo_examen,
           t.nombre AS tipo_examen, d.resultado, d.confianza, d.descripcion,
           d.recomendaciones, d.pronostico, d.tipo_imagen, d.nombre_archivo,
           (d.imagen IS NOT NULL) AS tiene_imagen, d.fecha
    FROM diagnosticos d
    JOIN tipos_examen t ON t.id_tipo_examen = d.id_tipo_examen
"#;

/// 将 sqlx 错误转换为明确的错误类别
///
/// 外键约束失败（23503）视为关联记录不存在，唯一约束失败（23505）视为冲突。
fn map_db_error(err: sqlx::Error, entity: &str) -> MedError {
    match &err {
        sqlx::Error::RowNotFound => MedError::NotFound(format!("{} no encontrado", entity)),
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23503") => {
                MedError::NotFound(format!("{}: registro relacionado no encontrado", entity))
            }
            Some("23505") => {
                MedError::Conflict(format!("{}: ya existe un registro con esos datos", entity))
            }
            _ => MedError::Database(err.to_string()),
        },
        _ => MedError::Database(err.to_string()),
    }
}

/// PostgreSQL 存储实现
#[derive(Clone)]
pub struct PgRepository {
    pool: DatabasePool,
}

impl PgRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表并写入预置的检查类型
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 创建用户表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS usuarios (
                id_usuario SERIAL PRIMARY KEY,
                firebase_uid VARCHAR(128) UNIQUE NOT NULL,
                primer_nombre VARCHAR(100) NOT NULL,
                segundo_nombre VARCHAR(100),
                primer_apellido VARCHAR(100) NOT NULL,
                segundo_apellido VARCHAR(100),
                correo VARCHAR(255) UNIQUE NOT NULL,
                telefono VARCHAR(32),
                rol VARCHAR(20) NOT NULL DEFAULT 'medico',
                mfa_secret TEXT,
                mfa_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| MedError::Database(e.to_string()))?;

        // 创建患者表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS pacientes (
                id_paciente SERIAL PRIMARY KEY,
                primer_nombre VARCHAR(100) NOT NULL,
                segundo_nombre VARCHAR(100),
                primer_apellido VARCHAR(100) NOT NULL,
                segundo_apellido VARCHAR(100),
                fecha_nacimiento DATE,
                genero VARCHAR(20),
                documento VARCHAR(32) UNIQUE,
                telefono VARCHAR(32),
                correo VARCHAR(255),
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| MedError::Database(e.to_string()))?;

        // 创建检查类型表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS tipos_examen (
                id_tipo_examen SERIAL PRIMARY KEY,
                nombre VARCHAR(100) UNIQUE NOT NULL
            )
        "#).execute(pool).await.map_err(|e| MedError::Database(e.to_string()))?;

        // 创建诊断表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS diagnosticos (
                id_diagnostico SERIAL PRIMARY KEY,
                id_paciente INTEGER NOT NULL REFERENCES pacientes(id_paciente) ON DELETE CASCADE,
                id_medico INTEGER NOT NULL REFERENCES usuarios(id_usuario),
                id_tipo_examen INTEGER NOT NULL REFERENCES tipos_examen(id_tipo_examen),
                resultado TEXT,
                confianza DOUBLE PRECISION,
                descripcion TEXT,
                recomendaciones TEXT,
                pronostico TEXT,
                imagen BYTEA,
                tipo_imagen VARCHAR(100),
                nombre_archivo VARCHAR(255),
                fecha TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| MedError::Database(e.to_string()))?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_diagnosticos_id_paciente ON diagnosticos(id_paciente)",
            "CREATE INDEX IF NOT EXISTS idx_diagnosticos_fecha ON diagnosticos(fecha)",
            "CREATE INDEX IF NOT EXISTS idx_pacientes_apellido ON pacientes(primer_apellido)",
        ];
        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(|e| MedError::Database(e.to_string()))?;
        }

        for nombre in DEFAULT_EXAM_TYPES {
            sqlx::query("INSERT INTO tipos_examen (nombre) VALUES ($1) ON CONFLICT (nombre) DO NOTHING")
                .bind(nombre)
                .execute(pool)
                .await
                .map_err(|e| MedError::Database(e.to_string()))?;
        }

        info!("Database tables created successfully");
        Ok(())
    }
}

#[async_trait]
impl Repository for PgRepository {
    // ========== 患者相关操作 ==========

    async fn list_patients(&self) -> Result<Vec<Paciente>> {
        let rows = sqlx::query_as::<_, DbPaciente>(
            "SELECT * FROM pacientes ORDER BY primer_apellido, primer_nombre"
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| map_db_error(e, "Paciente"))?;

        Ok(rows.into_iter().map(Paciente::from).collect())
    }

    async fn get_patient(&self, id_paciente: i32) -> Result<Paciente> {
        sqlx::query_as::<_, DbPaciente>("SELECT * FROM pacientes WHERE id_paciente = $1")
            .bind(id_paciente)
            .fetch_one(self.pool.pool())
            .await
            .map(Paciente::from)
            .map_err(|e| map_db_error(e, "Paciente"))
    }

    async fn create_patient(&self, patient: &NewPaciente) -> Result<i32> {
        sqlx::query(r#"
            INSERT INTO pacientes (primer_nombre, segundo_nombre, primer_apellido, segundo_apellido,
                                   fecha_nacimiento, genero, documento, telefono, correo)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id_paciente
        "#)
        .bind(&patient.primer_nombre)
        .bind(&patient.segundo_nombre)
        .bind(&patient.primer_apellido)
        .bind(&patient.segundo_apellido)
        .bind(patient.fecha_nacimiento)
        .bind(&patient.genero)
        .bind(&patient.documento)
        .bind(&patient.telefono)
        .bind(&patient.correo)
        .fetch_one(self.pool.pool())
        .await
        .map(|row| row.get("id_paciente"))
        .map_err(|e| map_db_error(e, "Paciente"))
    }

    async fn update_patient(&self, id_paciente: i32, patient: &NewPaciente) -> Result<Paciente> {
        sqlx::query_as::<_, DbPaciente>(r#"
            UPDATE pacientes
            SET primer_nombre = $2, segundo_nombre = $3, primer_apellido = $4, segundo_apellido = $5,
                fecha_nacimiento = $6, genero = $7, documento = $8, telefono = $9, correo = $10,
                updated_at = NOW()
            WHERE id_paciente = $1
            RETURNING *
        "#)
        .bind(id_paciente)
        .bind(&patient.primer_nombre)
        .bind(&patient.segundo_nombre)
        .bind(&patient.primer_apellido)
        .bind(&patient.segundo_apellido)
        .bind(patient.fecha_nacimiento)
        .bind(&patient.genero)
        .bind(&patient.documento)
        .bind(&patient.telefono)
        .bind(&patient.correo)
        .fetch_one(self.pool.pool())
        .await
        .map(Paciente::from)
        .map_err(|e| map_db_error(e, "Paciente"))
    }

    async fn delete_patient(&self, id_paciente: i32) -> Result<()> {
        let result = sqlx::query("DELETE FROM pacientes WHERE id_paciente = $1")
            .bind(id_paciente)
            .execute(self.pool.pool())
            .await
            .map_err(|e| map_db_error(e, "Paciente"))?;

        if result.rows_affected() == 0 {
            return Err(MedError::NotFound("Paciente no encontrado".to_string()));
        }
        Ok(())
    }

    // ========== 检查类型 ==========

    async fn list_exam_types(&self) -> Result<Vec<TipoExamen>> {
        let rows = sqlx::query_as::<_, DbTipoExamen>(
            "SELECT id_tipo_examen, nombre FROM tipos_examen ORDER BY nombre"
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| map_db_error(e, "Tipo de examen"))?;

        Ok(rows.into_iter().map(TipoExamen::from).collect())
    }

    // ========== 诊断相关操作 ==========

    async fn create_diagnosis(&self, diagnosis: &NewDiagnostico) -> Result<i32> {
        let ai = &diagnosis.resultado;

        let row = sqlx::query(r#"
            INSERT INTO diagnosticos (id_paciente, id_medico, id_tipo_examen, resultado, confianza,
                                      descripcion, recomendaciones, pronostico, imagen, tipo_imagen,
                                      nombre_archivo)
            SELECT $1, $2, t.id_tipo_examen, $4, $5, $6, $7, $8, $9, $10, $11
            FROM tipos_examen t
            WHERE t.nombre = $3
            RETURNING id_diagnostico
        "#)
        .bind(diagnosis.id_paciente)
        .bind(diagnosis.id_medico)
        .bind(&diagnosis.tipo_examen_nombre)
        .bind(&ai.condition)
        .bind(ai.confidence)
        .bind(&ai.description)
        .bind(&ai.recomendaciones)
        .bind(&ai.pronostico)
        .bind(&diagnosis.imagen)
        .bind(&diagnosis.tipo_imagen)
        .bind(&diagnosis.nombre_archivo)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| map_db_error(e, "Paciente o médico"))?;

        match row {
            Some(row) => {
                let id: i32 = row.get("id_diagnostico");
                debug!("Inserted diagnosis {}", id);
                Ok(id)
            }
            None => Err(MedError::NotFound(format!(
                "Tipo de examen no encontrado: {}",
                diagnosis.tipo_examen_nombre
            ))),
        }
    }

    async fn list_diagnoses(&self) -> Result<Vec<Diagnostico>> {
        let sql = format!("{} ORDER BY d.fecha DESC", DIAGNOSIS_SELECT);
        let rows = sqlx::query_as::<_, DbDiagnostico>(&sql)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| map_db_error(e, "Diagnóstico"))?;

        Ok(rows.into_iter().map(Diagnostico::from).collect())
    }

    async fn list_diagnoses_for_patient(&self, id_paciente: i32) -> Result<Vec<Diagnostico>> {
        let sql = format!("{} WHERE d.id_paciente = $1 ORDER BY d.fecha DESC", DIAGNOSIS_SELECT);
        let rows = sqlx::query_as::<_, DbDiagnostico>(&sql)
            .bind(id_paciente)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| map_db_error(e, "Diagnóstico"))?;

        Ok(rows.into_iter().map(Diagnostico::from).collect())
    }

    async fn get_diagnosis(&self, id_diagnostico: i32) -> Result<Diagnostico> {
        let sql = format!("{} WHERE d.id_diagnostico = $1", DIAGNOSIS_SELECT);
        sqlx::query_as::<_, DbDiagnostico>(&sql)
            .bind(id_diagnostico)
            .fetch_one(self.pool.pool())
            .await
            .map(Diagnostico::from)
            .map_err(|e| map_db_error(e, "Diagnóstico"))
    }

    async fn get_diagnosis_image(&self, id_diagnostico: i32) -> Result<DiagnosticoImagen> {
        let row = sqlx::query_as::<_, DbDiagnosticoImagen>(
            "SELECT imagen, tipo_imagen, nombre_archivo FROM diagnosticos WHERE id_diagnostico = $1"
        )
        .bind(id_diagnostico)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| map_db_error(e, "Diagnóstico"))?;

        match row.imagen {
            Some(bytes) => Ok(DiagnosticoImagen {
                bytes,
                tipo_imagen: row.tipo_imagen,
                nombre_archivo: row.nombre_archivo,
            }),
            None => Err(MedError::NotFound(
                "El diagnóstico no tiene imagen asociada".to_string(),
            )),
        }
    }

    async fn delete_diagnosis(&self, id_diagnostico: i32) -> Result<()> {
        let result = sqlx::query("DELETE FROM diagnosticos WHERE id_diagnostico = $1")
            .bind(id_diagnostico)
            .execute(self.pool.pool())
            .await
            .map_err(|e| map_db_error(e, "Diagnóstico"))?;

        if result.rows_affected() == 0 {
            return Err(MedError::NotFound("Diagnóstico no encontrado".to_string()));
        }
        Ok(())
    }

    // ========== 用户相关操作 ==========

    async fn create_user(&self, user: &NewUsuario) -> Result<Usuario> {
        sqlx::query_as::<_, DbUsuario>(r#"
            INSERT INTO usuarios (firebase_uid, primer_nombre, segundo_nombre, primer_apellido,
                                  segundo_apellido, correo, telefono, rol)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
        "#)
        .bind(&user.firebase_uid)
        .bind(&user.primer_nombre)
        .bind(&user.segundo_nombre)
        .bind(&user.primer_apellido)
        .bind(&user.segundo_apellido)
        .bind(&user.correo)
        .bind(&user.telefono)
        .bind(user.rol.as_str())
        .fetch_one(self.pool.pool())
        .await
        .map(Usuario::from)
        .map_err(|e| map_db_error(e, "Usuario"))
    }

    async fn get_user_by_firebase_uid(&self, firebase_uid: &str) -> Result<Usuario> {
        sqlx::query_as::<_, DbUsuario>("SELECT * FROM usuarios WHERE firebase_uid = $1")
            .bind(firebase_uid)
            .fetch_one(self.pool.pool())
            .await
            .map(Usuario::from)
            .map_err(|e| map_db_error(e, "Usuario"))
    }

    async fn update_profile(&self, firebase_uid: &str, profile: &ProfileUpdate) -> Result<Usuario> {
        sqlx::query_as::<_, DbUsuario>(r#"
            UPDATE usuarios
            SET primer_nombre = $2, segundo_nombre = $3, primer_apellido = $4,
                segundo_apellido = $5, correo = $6, telefono = $7, updated_at = NOW()
            WHERE firebase_uid = $1
            RETURNING *
        "#)
        .bind(firebase_uid)
        .bind(&profile.primer_nombre)
        .bind(&profile.segundo_nombre)
        .bind(&profile.primer_apellido)
        .bind(&profile.segundo_apellido)
        .bind(&profile.correo)
        .bind(&profile.telefono)
        .fetch_one(self.pool.pool())
        .await
        .map(Usuario::from)
        .map_err(|e| map_db_error(e, "Usuario"))
    }

    async fn set_mfa_secret(&self, firebase_uid: &str, encrypted_secret: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE usuarios SET mfa_secret = $2, mfa_enabled = FALSE, updated_at = NOW() WHERE firebase_uid = $1"
        )
        .bind(firebase_uid)
        .bind(encrypted_secret)
        .execute(self.pool.pool())
        .await
        .map_err(|e| map_db_error(e, "Usuario"))?;

        if result.rows_affected() == 0 {
            return Err(MedError::NotFound("Usuario no encontrado".to_string()));
        }
        Ok(())
    }

    async fn enable_mfa(&self, firebase_uid: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE usuarios SET mfa_enabled = TRUE, updated_at = NOW() WHERE firebase_uid = $1 AND mfa_secret IS NOT NULL"
        )
        .bind(firebase_uid)
        .execute(self.pool.pool())
        .await
        .map_err(|e| map_db_error(e, "Usuario"))?;

        if result.rows_affected() == 0 {
            return Err(MedError::NotFound("Usuario no encontrado".to_string()));
        }
        Ok(())
    }
}
