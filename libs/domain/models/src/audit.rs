// [libs/domain/models/src/audit.rs]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entrada inmutable del rastro de auditoría. El estrato de persistencia
/// únicamente permite INSERT sobre esta entidad; no existen operaciones
/// de actualización ni borrado.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: String,

    #[serde(rename = "organization_id")]
    pub org_id: String,

    /// Identidad que ejecutó la acción (operador o dispositivo); `None`
    /// para acciones originadas por el propio sistema.
    #[serde(rename = "actor_id")]
    pub actor_id: Option<String>,

    /// Verbo de dominio: `device.registered`, `device.key-rotated`, etc.
    pub action: String,

    #[serde(rename = "resource_type")]
    pub resource_type: String,

    #[serde(rename = "resource_id")]
    pub resource_id: String,

    /// Instantáneas opacas del recurso; el núcleo no las interpreta.
    #[serde(rename = "before_state")]
    pub before_state: Option<serde_json::Value>,

    #[serde(rename = "after_state")]
    pub after_state: Option<serde_json::Value>,

    #[serde(rename = "ip_address")]
    pub ip_address: Option<String>,

    #[serde(rename = "user_agent")]
    pub user_agent: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    /// Forja una entrada de sistema sin actor humano.
    pub fn system_event(
        org_id: &str,
        action: &str,
        resource_type: &str,
        resource_id: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            org_id: org_id.to_string(),
            actor_id: None,
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            before_state: None,
            after_state: None,
            ip_address: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }
}
