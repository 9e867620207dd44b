// [libs/infra/kv/src/errors.rs]

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    /// El motor de respaldo rechazó la operación (red, saturación, cierre).
    #[error("[L3_KV_BACKEND_FAULT]: STORE_UNAVAILABLE -> {0}")]
    Backend(String),

    /// La operación compare-and-set encontró un valor distinto al esperado.
    #[error("[L3_KV_CAS_FAULT]: PRECONDITION_DIVERGED")]
    CasMismatch,

    /// El valor persistido no es interpretable con el tipo solicitado.
    #[error("[L3_KV_CODEC_FAULT]: VALUE_MALFORMED -> {0}")]
    Codec(String),
}
