// [libs/infra/db-turso/src/lib.rs]
/*!
 * =================================================================
 * APARATO: RELATIONAL LEDGER ROOT (V4.0 - MESH ALIGNED)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: EXPOSICIÓN NOMINAL DEL ADAPTADOR RELACIONAL
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ACCESS SOVEREIGNTY: Centraliza cliente, esquema y repositorios
 *    para la inyección de dependencias en el Orquestador (L4).
 * 2. INVARIANT ENFORCEMENT: Los índices de unicidad del esquema son la
 *    autoridad final sobre llaves públicas e IPs virtuales; los
 *    repositorios traducen sus violaciones a fallos semánticos.
 * =================================================================
 */

/// Cliente de conexión con ancla de memoria para modo RAM.
pub mod client;

/// Catálogo semántico de fallos de persistencia.
pub mod errors;

/// Génesis idempotente de tablas, evoluciones e índices.
pub mod schema;

/// Matriz de repositorios del plano de control.
pub mod repositories;

pub use crate::client::DbClient;
pub use crate::errors::DbError;

/**
 * PRELUDIO DEL LEDGER
 *
 * Tipos de alta frecuencia para la ignición del Orquestador.
 */
pub mod prelude {
    pub use crate::client::DbClient;
    pub use crate::errors::DbError;
    pub use crate::repositories::{
        AdminUserRepository, AlertRepository, AuditRepository, DeviceKeyRepository,
        DeviceRepository, NetworkRepository, OrganizationRepository, PeerRepository,
        PskRepository, SessionRepository,
    };
}
