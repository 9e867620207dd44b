// [libs/infra/db-turso/src/repositories/mod.rs]
/*!
 * =================================================================
 * APARATO: REPOSITORY ACCESS MATRIX (V4.0 - MESH TOPOLOGY)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: ORQUESTACIÓN DE SUBSISTEMAS DE PERSISTENCIA
 *
 * # Mathematical Proof (Modular Encapsulation):
 * El barrel file actúa como interfaz galvánica: los sub-módulos
 * permanecen aislados y solo las estructuras de autoridad
 * (Repositories) se exponen al Orquestador, reduciendo el
 * acoplamiento sistémico.
 * =================================================================
 */

// --- ESTRATO 1: TENENCIA Y TOPOLOGÍA ---

/// Organizaciones: frontera raíz de tenencia.
pub mod organization;
/// Redes virtuales y su matemática CIDR persistida.
pub mod network;

// --- ESTRATO 2: CICLO DE VIDA DE DISPOSITIVOS ---

/// Dispositivos del mesh: registro CAS, presencia y NAT.
pub mod device;
/// Llaves de dispositivo y rotación transaccional.
pub mod device_key;
/// Credenciales de registro con consumo atómico.
pub mod psk;

// --- ESTRATO 3: TÚNELES Y PARES ---

/// Configuraciones de pares materializadas.
pub mod peer;
/// Sesiones de túnel con orden canónico.
pub mod session;

// --- ESTRATO 4: OPERACIÓN Y GOBIERNO ---

/// Alertas operativas con transiciones linealizadas.
pub mod alert;
/// Rastro de auditoría INSERT-only.
pub mod audit;
/// Operadores administrativos del plano de control.
pub mod admin_user;

// --- SOPORTE INTERNO ---

/// Ayudantes de mapeo fila -> dominio.
pub(crate) mod mapping;

// --- RE-EXPORTACIONES SOBERANAS (NOMINAL ACCESS API) ---

pub use admin_user::AdminUserRepository;
pub use alert::{AlertFilter, AlertPage, AlertRepository};
pub use audit::AuditRepository;
pub use device::DeviceRepository;
pub use device_key::DeviceKeyRepository;
pub use network::NetworkRepository;
pub use organization::OrganizationRepository;
pub use peer::PeerRepository;
pub use psk::PskRepository;
pub use session::SessionRepository;
