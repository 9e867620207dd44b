// [libs/domain/notification/src/errors.rs]

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    /// El fichero de reglas no es interpretable o viola la validación.
    #[error("[L2_HERALD_FAULT]: RULE_FILE_REJECTED -> {0}")]
    RuleFileInvalid(String),

    /// La cola de correo alcanzó su capacidad; el productor debe ceder.
    #[error("[L2_HERALD_FAULT]: EMAIL_QUEUE_FULL")]
    QueueFull,

    /// La cola de correo fue cerrada durante el apagado ordenado.
    #[error("[L2_HERALD_FAULT]: EMAIL_QUEUE_CLOSED")]
    QueueClosed,

    /// Expresión regular inválida en una regla (detectada en validación).
    #[error("[L2_HERALD_FAULT]: REGEX_REJECTED -> {0}")]
    RegexInvalid(String),

    /// Zona horaria desconocida en un rango temporal.
    #[error("[L2_HERALD_FAULT]: TIMEZONE_UNKNOWN -> {0}")]
    TimezoneUnknown(String),
}
