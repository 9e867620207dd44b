// [libs/domain/models/src/lib.rs]
/*!
 * =================================================================
 * APARATO: MESH DOMAIN GRAMMAR (V4.0 - SOBERANO)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: DEFINICIÓN DE ENTIDADES E INVARIANTES DEL MESH
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CONTRACT SOVEREIGNTY: Define la gramática inmutable que viaja
 *    entre el Núcleo (L2), la Persistencia (L3) y la API (L4).
 * 2. SUM-TYPE PURITY: Todo estado discreto es un enum exhaustivo;
 *    las formas string quedan reservadas al borde de cable (serde).
 * 3. NOMINAL PURITY: Nomenclatura descriptiva absoluta.
 * =================================================================
 */

/// Entidad raíz de tenencia multi-organización.
pub mod organization;

/// Redes virtuales y su matemática CIDR.
pub mod network;

/// Dispositivos del mesh, plataformas y clasificación NAT.
pub mod device;

/// Llaves criptográficas por dispositivo y su ciclo de vida.
pub mod device_key;

/// Llaves pre-compartidas de registro (PSK).
pub mod psk;

/// Vista materializada de pares para la construcción de túneles.
pub mod peer;

/// Sesiones de túnel entre pares con orden canónico.
pub mod session;

/// Alertas operativas y su máquina de estados monotónica.
pub mod alert;

/// Rastro de auditoría inmutable (INSERT-only).
pub mod audit;

/// Operadores administrativos y jerarquía total de roles.
pub mod admin;

/// Telemetría de latidos y métricas de sesión.
pub mod telemetry;

pub use crate::admin::{AdminRole, AdminUser};
pub use crate::alert::{Alert, AlertStatus, AlertType, Severity};
pub use crate::audit::AuditLog;
pub use crate::device::{Device, NatType, Platform};
pub use crate::device_key::{DeviceKey, KeyStatus};
pub use crate::network::VirtualNetwork;
pub use crate::organization::Organization;
pub use crate::peer::{PeerConfiguration, DEFAULT_PERSISTENT_KEEPALIVE_SECONDS};
pub use crate::psk::PreSharedKey;
pub use crate::session::{ConnectionType, Session};
pub use crate::telemetry::{DeviceHeartbeat, SessionMetricsSample};

/**
 * PRELUDIO DEL DOMINIO
 *
 * Colección de tipos de alta frecuencia para inyección directa en los
 * estratos superiores (L3-Infra y L4-API).
 */
pub mod prelude {
    pub use crate::admin::{AdminRole, AdminUser};
    pub use crate::alert::{Alert, AlertStatus, AlertType, Severity};
    pub use crate::audit::AuditLog;
    pub use crate::device::{Device, NatType, Platform};
    pub use crate::device_key::{DeviceKey, KeyStatus};
    pub use crate::network::VirtualNetwork;
    pub use crate::organization::Organization;
    pub use crate::peer::{PeerConfiguration, DEFAULT_PERSISTENT_KEEPALIVE_SECONDS};
    pub use crate::psk::PreSharedKey;
    pub use crate::session::{ConnectionType, Session};
    pub use crate::telemetry::{DeviceHeartbeat, SessionMetricsSample};
}
