//! 数据存储接口
//!
//! Web 层只依赖此 trait，PostgreSQL 实现和内存实现位于 `medimg-database`。

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;

/// 数据存储操作接口
///
/// 未找到的记录返回 `MedError::NotFound`，唯一性冲突返回 `MedError::Conflict`。
#[async_trait]
pub trait Repository: Send + Sync {
    // ========== 患者 ==========

    async fn list_patients(&self) -> Result<Vec<Paciente>>;

    async fn get_patient(&self, id_paciente: i32) -> Result<Paciente>;

    async fn create_patient(&self, patient: &NewPaciente) -> Result<i32>;

    async fn update_patient(&self, id_paciente: i32, patient: &NewPaciente) -> Result<Paciente>;

    async fn delete_patient(&self, id_paciente: i32) -> Result<()>;

    // ========== 检查类型 ==========

    async fn list_exam_types(&self) -> Result<Vec<TipoExamen>>;

    // ========== 诊断 ==========

    /// 按检查类型名称创建诊断，返回新诊断ID
    async fn create_diagnosis(&self, diagnosis: &NewDiagnostico) -> Result<i32>;

    async fn list_diagnoses(&self) -> Result<Vec<Diagnostico>>;

    async fn list_diagnoses_for_patient(&self, id_paciente: i32) -> Result<Vec<Diagnostico>>;

    async fn get_diagnosis(&self, id_diagnostico: i32) -> Result<Diagnostico>;

    async fn get_diagnosis_image(&self, id_diagnostico: i32) -> Result<DiagnosticoImagen>;

    async fn delete_diagnosis(&self, id_diagnostico: i32) -> Result<()>;

    // ========== 用户 ==========

    async fn create_user(&self, user: &NewUsuario) -> Result<Usuario>;

    async fn get_user_by_firebase_uid(&self, firebase_uid: &str) -> Result<Usuario>;

    async fn update_profile(&self, firebase_uid: &str, profile: &ProfileUpdate) -> Result<Usuario>;

    /// 保存加密后的 MFA 密钥，同时重置启用状态
    async fn set_mfa_secret(&self, firebase_uid: &str, encrypted_secret: &str) -> Result<()>;

    async fn enable_mfa(&self, firebase_uid: &str) -> Result<()>;
}
