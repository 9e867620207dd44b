// [libs/domain/models/src/device.rs]
/*!
 * =================================================================
 * APARATO: MESH DEVICE ENTITY (V4.1 - NAT AWARE)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: IDENTIDAD DE DISPOSITIVO Y CLASIFICACIÓN NAT
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SUM-TYPE SOVEREIGNTY: 'Platform' y 'NatType' son enums exhaustivos;
 *    la forma kebab-case queda reservada al cable.
 * 2. KEY UNIQUENESS: La llave pública WireGuard es única a nivel global;
 *    el índice lo garantiza en L3, el tipo lo documenta en L2.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sistema operativo / sustrato de ejecución del dispositivo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Windows,
    Macos,
    Ios,
    Android,
    Iot,
    Container,
}

impl Platform {
    /// Forma textual de cable (idéntica a la forma persistida).
    pub fn as_wire(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Windows => "windows",
            Platform::Macos => "macos",
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Iot => "iot",
            Platform::Container => "container",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_wire())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "linux" => Ok(Platform::Linux),
            "windows" => Ok(Platform::Windows),
            "macos" => Ok(Platform::Macos),
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            "iot" => Ok(Platform::Iot),
            "container" => Ok(Platform::Container),
            other => Err(format!("UNKNOWN_PLATFORM: {other}")),
        }
    }
}

/// Clasificación observada del NAT tras las sondas STUN reportadas.
/// Gobierna la estrategia de traversal del coordinador (L4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NatType {
    None,
    FullCone,
    RestrictedCone,
    PortRestrictedCone,
    Symmetric,
    Unknown,
}

impl NatType {
    pub fn as_wire(&self) -> &'static str {
        match self {
            NatType::None => "none",
            NatType::FullCone => "full-cone",
            NatType::RestrictedCone => "restricted-cone",
            NatType::PortRestrictedCone => "port-restricted-cone",
            NatType::Symmetric => "symmetric",
            NatType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NatType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_wire())
    }
}

impl FromStr for NatType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "none" => Ok(NatType::None),
            "full-cone" => Ok(NatType::FullCone),
            "restricted-cone" => Ok(NatType::RestrictedCone),
            "port-restricted-cone" => Ok(NatType::PortRestrictedCone),
            "symmetric" => Ok(NatType::Symmetric),
            "unknown" => Ok(NatType::Unknown),
            other => Err(format!("UNKNOWN_NAT_TYPE: {other}")),
        }
    }
}

/// Dispositivo registrado dentro de una red virtual del mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,

    #[serde(rename = "virtual_network_id")]
    pub virtual_network_id: String,

    pub name: String,

    /// Dirección asignada dentro del CIDR de la red virtual.
    /// Única por red; nunca coincide con la pasarela.
    #[serde(rename = "virtual_ip")]
    pub virtual_ip: String,

    /// Llave pública WireGuard (base64). Única a nivel global.
    #[serde(rename = "public_key")]
    pub public_key: String,

    pub platform: Platform,

    #[serde(rename = "nat_type")]
    pub nat_type: NatType,

    /// Último endpoint público observado (ip:puerto), si se conoce.
    #[serde(rename = "public_endpoint")]
    pub public_endpoint: Option<String>,

    /// Etiquetas operativas libres para reglas de notificación.
    pub tags: Vec<String>,

    pub online: bool,

    #[serde(rename = "last_seen_at")]
    pub last_seen_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// Segundos transcurridos desde el último latido observado.
    pub fn seconds_since_last_seen(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_seen_at
            .map(|last_seen| (now - last_seen).num_seconds())
    }

    /// Determina si el dispositivo porta todas las etiquetas exigidas.
    pub fn carries_tags(&self, required_tags: &[String]) -> bool {
        required_tags
            .iter()
            .all(|required| self.tags.iter().any(|carried| carried == required))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_wire_forms_round_trip() {
        for platform in [
            Platform::Linux,
            Platform::Windows,
            Platform::Macos,
            Platform::Ios,
            Platform::Android,
            Platform::Iot,
            Platform::Container,
        ] {
            assert_eq!(Platform::from_str(platform.as_wire()), Ok(platform));
        }
    }

    #[test]
    fn nat_type_wire_forms_round_trip() {
        for nat_type in [
            NatType::None,
            NatType::FullCone,
            NatType::RestrictedCone,
            NatType::PortRestrictedCone,
            NatType::Symmetric,
            NatType::Unknown,
        ] {
            assert_eq!(NatType::from_str(nat_type.as_wire()), Ok(nat_type));
        }
    }

    #[test]
    fn unknown_wire_form_is_rejected() {
        assert!(Platform::from_str("solaris").is_err());
        assert!(NatType::from_str("carrier-grade").is_err());
    }

    #[test]
    fn tag_superset_semantics() {
        let device = Device {
            id: "dev-1".into(),
            virtual_network_id: "net-1".into(),
            name: "edge-01".into(),
            virtual_ip: "10.99.0.2".into(),
            public_key: "pk".into(),
            platform: Platform::Linux,
            nat_type: NatType::Unknown,
            public_endpoint: None,
            tags: vec!["prod".into(), "gateway".into()],
            online: true,
            last_seen_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(device.carries_tags(&["prod".into()]));
        assert!(device.carries_tags(&["prod".into(), "gateway".into()]));
        assert!(!device.carries_tags(&["prod".into(), "staging".into()]));
    }
}
