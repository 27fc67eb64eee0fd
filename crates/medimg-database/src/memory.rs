//! 内存存储实现
//!
//! 用于开发模式（`--in-memory`）和测试，约束行为与 PostgreSQL 实现保持一致：
//! 外键缺失返回 NotFound，唯一字段重复返回 Conflict，删除患者级联删除其诊断。

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use medimg_core::models::*;
use medimg_core::{MedError, Repository, Result};
use tokio::sync::RwLock;
use tracing::debug;

struct StoredDiagnosis {
    record: Diagnostico,
    imagen: Option<Vec<u8>>,
}

#[derive(Default)]
struct MemoryState {
    patients: BTreeMap<i32, Paciente>,
    exam_types: BTreeMap<i32, TipoExamen>,
    diagnoses: BTreeMap<i32, StoredDiagnosis>,
    users: BTreeMap<i32, Usuario>,
    next_patient_id: i32,
    next_diagnosis_id: i32,
    next_user_id: i32,
}

impl MemoryState {
    fn user_mut(&mut self, firebase_uid: &str) -> Result<&mut Usuario> {
        self.users
            .values_mut()
            .find(|u| u.firebase_uid == firebase_uid)
            .ok_or_else(|| MedError::NotFound("Usuario no encontrado".to_string()))
    }

    fn document_taken(&self, documento: Option<&str>, except: Option<i32>) -> bool {
        match documento {
            Some(doc) => self.patients.values().any(|p| {
                p.documento.as_deref() == Some(doc) && Some(p.id_paciente) != except
            }),
            None => false,
        }
    }

    fn email_taken(&self, correo: &str, except_uid: Option<&str>) -> bool {
        self.users
            .values()
            .any(|u| u.correo == correo && Some(u.firebase_uid.as_str()) != except_uid)
    }
}

/// 基于 `RwLock` 的内存存储
pub struct MemoryRepository {
    state: RwLock<MemoryState>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    /// 创建存储并写入预置的检查类型
    pub fn new() -> Self {
        let exam_types = DEFAULT_EXAM_TYPES
            .iter()
            .zip(1..)
            .map(|(nombre, id)| {
                (
                    id,
                    TipoExamen {
                        id_tipo_examen: id,
                        nombre: nombre.to_string(),
                    },
                )
            })
            .collect();

        Self {
            state: RwLock::new(MemoryState {
                exam_types,
                next_patient_id: 1,
                next_diagnosis_id: 1,
                next_user_id: 1,
                ..Default::default()
            }),
        }
    }
}

fn sorted_by_date_desc(mut items: Vec<Diagnostico>) -> Vec<Diagnostico> {
    items.sort_by(|a, b| {
        b.fecha
            .cmp(&a.fecha)
            .then(b.id_diagnostico.cmp(&a.id_diagnostico))
    });
    items
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_patients(&self) -> Result<Vec<Paciente>> {
        let state = self.state.read().await;
        let mut patients: Vec<Paciente> = state.patients.values().cloned().collect();
        patients.sort_by(|a, b| {
            a.primer_apellido
                .cmp(&b.primer_apellido)
                .then_with(|| a.primer_nombre.cmp(&b.primer_nombre))
        });
        Ok(patients)
    }

    async fn get_patient(&self, id_paciente: i32) -> Result<Paciente> {
        let state = self.state.read().await;
        state
            .patients
            .get(&id_paciente)
            .cloned()
            .ok_or_else(|| MedError::NotFound("Paciente no encontrado".to_string()))
    }

    async fn create_patient(&self, patient: &NewPaciente) -> Result<i32> {
        let mut state = self.state.write().await;
        if state.document_taken(patient.documento.as_deref(), None) {
            return Err(MedError::Conflict(
                "Paciente: ya existe un registro con esos datos".to_string(),
            ));
        }

        let id = state.next_patient_id;
        state.next_patient_id += 1;
        let now = Utc::now();
        state.patients.insert(
            id,
            Paciente {
                id_paciente: id,
                primer_nombre: patient.primer_nombre.clone(),
                segundo_nombre: patient.segundo_nombre.clone(),
                primer_apellido: patient.primer_apellido.clone(),
                segundo_apellido: patient.segundo_apellido.clone(),
                fecha_nacimiento: patient.fecha_nacimiento,
                genero: patient.genero.clone(),
                documento: patient.documento.clone(),
                telefono: patient.telefono.clone(),
                correo: patient.correo.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        debug!("Created in-memory patient {}", id);
        Ok(id)
    }

    async fn update_patient(&self, id_paciente: i32, patient: &NewPaciente) -> Result<Paciente> {
        let mut state = self.state.write().await;
        if !state.patients.contains_key(&id_paciente) {
            return Err(MedError::NotFound("Paciente no encontrado".to_string()));
        }
        if state.document_taken(patient.documento.as_deref(), Some(id_paciente)) {
            return Err(MedError::Conflict(
                "Paciente: ya existe un registro con esos datos".to_string(),
            ));
        }

        let stored = state
            .patients
            .get_mut(&id_paciente)
            .ok_or_else(|| MedError::NotFound("Paciente no encontrado".to_string()))?;
        stored.primer_nombre = patient.primer_nombre.clone();
        stored.segundo_nombre = patient.segundo_nombre.clone();
        stored.primer_apellido = patient.primer_apellido.clone();
        stored.segundo_apellido = patient.segundo_apellido.clone();
        stored.fecha_nacimiento = patient.fecha_nacimiento;
        stored.genero = patient.genero.clone();
        stored.documento = patient.documento.clone();
        stored.telefono = patient.telefono.clone();
        stored.correo = patient.correo.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete_patient(&self, id_paciente: i32) -> Result<()> {
        let mut state = self.state.write().await;
        if state.patients.remove(&id_paciente).is_none() {
            return Err(MedError::NotFound("Paciente no encontrado".to_string()));
        }
        state
            .diagnoses
            .retain(|_, d| d.record.id_paciente != id_paciente);
        Ok(())
    }

    async fn list_exam_types(&self) -> Result<Vec<TipoExamen>> {
        let state = self.state.read().await;
        let mut types: Vec<TipoExamen> = state.exam_types.values().cloned().collect();
        types.sort_by(|a, b| a.nombre.cmp(&b.nombre));
        Ok(types)
    }

    async fn create_diagnosis(&self, diagnosis: &NewDiagnostico) -> Result<i32> {
        let mut state = self.state.write().await;

        let exam_type = state
            .exam_types
            .values()
            .find(|t| t.nombre == diagnosis.tipo_examen_nombre)
            .cloned()
            .ok_or_else(|| {
                MedError::NotFound(format!(
                    "Tipo de examen no encontrado: {}",
                    diagnosis.tipo_examen_nombre
                ))
            })?;

        if !state.patients.contains_key(&diagnosis.id_paciente)
            || !state.users.contains_key(&diagnosis.id_medico)
        {
            return Err(MedError::NotFound(
                "Paciente o médico: registro relacionado no encontrado".to_string(),
            ));
        }

        let id = state.next_diagnosis_id;
        state.next_diagnosis_id += 1;
        let ai = &diagnosis.resultado;
        let record = Diagnostico {
            id_diagnostico: id,
            id_paciente: diagnosis.id_paciente,
            id_medico: diagnosis.id_medico,
            id_tipo_examen: exam_type.id_tipo_examen,
            tipo_examen: exam_type.nombre,
            resultado: ai.condition.clone(),
            confianza: ai.confidence,
            descripcion: ai.description.clone(),
            recomendaciones: ai.recomendaciones.clone(),
            pronostico: ai.pronostico.clone(),
            tipo_imagen: diagnosis.tipo_imagen.clone(),
            nombre_archivo: diagnosis.nombre_archivo.clone(),
            tiene_imagen: diagnosis.imagen.is_some(),
            fecha: Utc::now(),
        };
        state.diagnoses.insert(
            id,
            StoredDiagnosis {
                record,
                imagen: diagnosis.imagen.clone(),
            },
        );
        Ok(id)
    }

    async fn list_diagnoses(&self) -> Result<Vec<Diagnostico>> {
        let state = self.state.read().await;
        Ok(sorted_by_date_desc(
            state.diagnoses.values().map(|d| d.record.clone()).collect(),
        ))
    }

    async fn list_diagnoses_for_patient(&self, id_paciente: i32) -> Result<Vec<Diagnostico>> {
        let state = self.state.read().await;
        Ok(sorted_by_date_desc(
            state
                .diagnoses
                .values()
                .filter(|d| d.record.id_paciente == id_paciente)
                .map(|d| d.record.clone())
                .collect(),
        ))
    }

    async fn get_diagnosis(&self, id_diagnostico: i32) -> Result<Diagnostico> {
        let state = self.state.read().await;
        state
            .diagnoses
            .get(&id_diagnostico)
            .map(|d| d.record.clone())
            .ok_or_else(|| MedError::NotFound("Diagnóstico no encontrado".to_string()))
    }

    async fn get_diagnosis_image(&self, id_diagnostico: i32) -> Result<DiagnosticoImagen> {
        let state = self.state.read().await;
        let stored = state
            .diagnoses
            .get(&id_diagnostico)
            .ok_or_else(|| MedError::NotFound("Diagnóstico no encontrado".to_string()))?;

        match &stored.imagen {
            Some(bytes) => Ok(DiagnosticoImagen {
                bytes: bytes.clone(),
                tipo_imagen: stored.record.tipo_imagen.clone(),
                nombre_archivo: stored.record.nombre_archivo.clone(),
            }),
            None => Err(MedError::NotFound(
                "El diagnóstico no tiene imagen asociada".to_string(),
            )),
        }
    }

    async fn delete_diagnosis(&self, id_diagnostico: i32) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .diagnoses
            .remove(&id_diagnostico)
            .map(|_| ())
            .ok_or_else(|| MedError::NotFound("Diagnóstico no encontrado".to_string()))
    }

    async fn create_user(&self, user: &NewUsuario) -> Result<Usuario> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.firebase_uid == user.firebase_uid)
            || state.email_taken(&user.correo, None)
        {
            return Err(MedError::Conflict(
                "Usuario: ya existe un registro con esos datos".to_string(),
            ));
        }

        let id = state.next_user_id;
        state.next_user_id += 1;
        let now = Utc::now();
        let created = Usuario {
            id_usuario: id,
            firebase_uid: user.firebase_uid.clone(),
            primer_nombre: user.primer_nombre.clone(),
            segundo_nombre: user.segundo_nombre.clone(),
            primer_apellido: user.primer_apellido.clone(),
            segundo_apellido: user.segundo_apellido.clone(),
            correo: user.correo.clone(),
            telefono: user.telefono.clone(),
            rol: user.rol,
            mfa_secret: None,
            mfa_enabled: false,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(id, created.clone());
        Ok(created)
    }

    async fn get_user_by_firebase_uid(&self, firebase_uid: &str) -> Result<Usuario> {
        let state = self.state.read().await;
        state
            .users
            .values()
            .find(|u| u.firebase_uid == firebase_uid)
            .cloned()
            .ok_or_else(|| MedError::NotFound("Usuario no encontrado".to_string()))
    }

    async fn update_profile(&self, firebase_uid: &str, profile: &ProfileUpdate) -> Result<Usuario> {
        let mut state = self.state.write().await;
        if state.email_taken(&profile.correo, Some(firebase_uid)) {
            return Err(MedError::Conflict(
                "Usuario: ya existe un registro con esos datos".to_string(),
            ));
        }

        let user = state.user_mut(firebase_uid)?;
        user.primer_nombre = profile.primer_nombre.clone();
        user.segundo_nombre = profile.segundo_nombre.clone();
        user.primer_apellido = profile.primer_apellido.clone();
        user.segundo_apellido = profile.segundo_apellido.clone();
        user.correo = profile.correo.clone();
        user.telefono = profile.telefono.clone();
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_mfa_secret(&self, firebase_uid: &str, encrypted_secret: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let user = state.user_mut(firebase_uid)?;
        user.mfa_secret = Some(encrypted_secret.to_string());
        user.mfa_enabled = false;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn enable_mfa(&self, firebase_uid: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let user = state.user_mut(firebase_uid)?;
        if user.mfa_secret.is_none() {
            return Err(MedError::NotFound("Usuario no encontrado".to_string()));
        }
        user.mfa_enabled = true;
        user.updated_at = Utc::now();
        Ok(())
    }
}
