// [libs/domain/models/src/organization.rs]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Frontera raíz de tenencia. Toda entidad del mesh referencia a una
/// organización de forma directa o transitiva.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,

    /// Identificador legible único a nivel global (slug).
    pub slug: String,

    pub name: String,

    /// Techo de dispositivos registrables bajo la organización.
    #[serde(rename = "max_devices")]
    pub max_devices: u32,

    /// Techo de redes virtuales definibles bajo la organización.
    #[serde(rename = "max_virtual_networks")]
    pub max_virtual_networks: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Determina si la organización aún admite un dispositivo adicional.
    pub fn admits_device(&self, current_device_count: u32) -> bool {
        current_device_count < self.max_devices
    }

    /// Determina si la organización aún admite una red virtual adicional.
    pub fn admits_network(&self, current_network_count: u32) -> bool {
        current_network_count < self.max_virtual_networks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_organization(max_devices: u32) -> Organization {
        Organization {
            id: "org-1".into(),
            slug: "acme".into(),
            name: "Acme Corp".into(),
            max_devices,
            max_virtual_networks: 4,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn device_quota_boundary_is_exclusive() {
        let organization = build_organization(2);
        assert!(organization.admits_device(0));
        assert!(organization.admits_device(1));
        assert!(!organization.admits_device(2));
    }
}
