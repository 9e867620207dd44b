// [libs/infra/db-turso/src/errors.rs]
/*!
 * =================================================================
 * APARATO: LEDGER ERROR CATALOG (V4.0 - SOBERANO)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE PERSISTENCIA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. TAXONOMY PARITY: Cada fallo de invariante del mesh (llave pública
 *    duplicada, IP virtual tomada, PSK agotada) tiene su variante
 *    propia para el triaje programático en el estrato L4.
 * 2. PANOPTICON COMPLIANCE: Mensajes con prefijo de estrato para el
 *    renderizado cromático en observabilidad.
 * =================================================================
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Error de enlace físico o de red con el cluster libSQL.
    #[error("[L3_DB_NET_FAULT]: DATABASE_UPLINK_SEVERED -> {0}")]
    ConnectionError(String),

    /// Fallo de configuración del entorno (variables vacías o malformadas).
    #[error("[L3_DB_CONFIG_FAULT]: STRATEGIC_ENV_VOID -> {0}")]
    ConfigurationError(String),

    /// Error de sintaxis o ejecución devuelto por el motor libSQL.
    #[error("[L3_DB_QUERY_FAULT]: SQL_QUERY_REJECTED -> {0}")]
    QueryError(#[from] libsql::Error),

    /// Fallo en la transformación de tipos entre SQLite y el dominio.
    #[error("[L3_DB_MAPPING_FAULT]: DATA_MAPPING_VIOLATION -> {0}")]
    MappingError(String),

    /// Error al comprometer cambios en una secuencia multi-tabla.
    #[error("[L3_DB_FAULT]: TRANSACTION_COLLAPSE")]
    TransactionError,

    // --- ESTRATO DE INVARIANTES DEL MESH ---

    /// La entidad solicitada no existe en el Ledger.
    #[error("[L3_LEDGER_FAULT]: ENTITY_NOT_FOUND -> {0}")]
    NotFound(String),

    /// La llave pública WireGuard ya está registrada a nivel global.
    #[error("[L3_LEDGER_FAULT]: PUBLIC_KEY_DUPLICATED")]
    DuplicatePublicKey,

    /// La IP virtual candidata ya fue tomada dentro de la red (carrera CAS).
    #[error("[L3_LEDGER_FAULT]: VIRTUAL_IP_TAKEN")]
    VirtualIpTaken,

    /// La entidad viola otra restricción de unicidad del esquema.
    #[error("[L3_LEDGER_FAULT]: UNIQUENESS_VIOLATION -> {0}")]
    UniqueViolation(String),

    /// Transición de estado prohibida por la máquina monotónica.
    #[error("[L3_LEDGER_FAULT]: INVALID_STATE_TRANSITION")]
    InvalidState,

    // --- ESTRATO DE CREDENCIALES DE REGISTRO (PSK) ---

    /// Ningún registro coincide con el hash presentado.
    #[error("[L3_PSK_FAULT]: UNKNOWN_PSK")]
    PskUnknown,

    /// La PSK existe pero su ventana temporal ha caducado.
    #[error("[L3_PSK_FAULT]: PSK_EXPIRED")]
    PskExpired,

    /// La PSK existe pero su contador de usos alcanzó el techo.
    #[error("[L3_PSK_FAULT]: PSK_EXHAUSTED")]
    PskExhausted,
}

impl DbError {
    /**
     * Traduce una violación de índice único de libSQL al fallo semántico
     * del invariante que protege ese índice.
     */
    pub fn from_unique_violation(fault: libsql::Error) -> DbError {
        let message = fault.to_string();
        if message.contains("devices.public_key") {
            DbError::DuplicatePublicKey
        } else if message.contains("virtual_ip") {
            DbError::VirtualIpTaken
        } else if message.contains("UNIQUE") {
            DbError::UniqueViolation(message)
        } else {
            DbError::QueryError(fault)
        }
    }
}
