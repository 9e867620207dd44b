// [apps/orchestrator/src/errors.rs]
/*!
 * =================================================================
 * APARATO: API ERROR ENVELOPE (V4.2 - TAXONOMY SEALED)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: TRADUCCIÓN DE FALLOS DE DOMINIO A HTTP
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. MASKED AUTH: Todo fallo de autenticación (PSK desconocida, firma
 *    inválida, llave revocada) colapsa en el mismo 401 opaco; el
 *    detalle vive solo en la traza del servidor.
 * 2. ACTIONABLE CONFLICTS: Los 409 (llave duplicada, red llena, PSK
 *    agotada) portan mensaje accionable para el operador.
 * 3. CORRELATED 500s: Cada fallo interno emite un identificador de
 *    correlación en la traza y en el sobre de respuesta.
 * =================================================================
 */

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use edgelink_infra_db::DbError;
use edgelink_infra_kv::KvError;
use serde::Serialize;
use serde_json::json;
use tracing::error;

/// Fallo visible por el cliente, ya clasificado en la taxonomía HTTP.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad-request",
            message: message.into(),
        }
    }

    /// 401 opaco: el motivo real queda en la traza, jamás en el cliente.
    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: "Authentication failed.".into(),
        }
    }

    pub fn forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "forbidden",
            message: "Insufficient privileges for this operation.".into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not-found",
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: "conflict",
            message: message.into(),
        }
    }

    pub fn too_many_requests(retry_after_seconds: u64) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            code: "too-many-requests",
            message: format!("Rate limited; retry after {retry_after_seconds}s."),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "unavailable",
            message: message.into(),
        }
    }

    /// 500 con identificador de correlación forjado y trazado.
    pub fn internal(context: &str) -> Self {
        let correlation_id = edgelink_shared_heimdall::forge_correlation_id();
        error!(
            correlation = %correlation_id,
            "💀 [INTERNAL_FAULT]: {}",
            context
        );
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: format!("Internal fault (correlation: {correlation_id})."),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(fault: DbError) -> Self {
        match fault {
            // --- AUTENTICACIÓN ENMASCARADA ---
            DbError::PskUnknown | DbError::PskExpired => {
                error!("🔒 [AUTH_TRACE]: {}", fault);
                ApiError::unauthorized()
            }

            // --- CONFLICTOS ACCIONABLES ---
            DbError::PskExhausted => {
                ApiError::conflict("Pre-shared key has exhausted its registration quota.")
            }
            DbError::DuplicatePublicKey => {
                ApiError::conflict("Public key is already registered to another device.")
            }
            DbError::VirtualIpTaken => {
                ApiError::conflict("Virtual IP collision; retry the registration.")
            }
            DbError::UniqueViolation(detail) => ApiError::conflict(detail),
            DbError::InvalidState => {
                ApiError::conflict("Entity state forbids the requested transition.")
            }

            DbError::NotFound(entity) => ApiError::not_found(format!("Unknown entity: {entity}")),
            DbError::MappingError(detail) => ApiError::bad_request(detail),

            // --- TRANSITORIOS DE UPSTREAM ---
            DbError::ConnectionError(_) | DbError::TransactionError => {
                ApiError::unavailable("Persistence layer temporarily unavailable.")
            }

            other => ApiError::internal(&other.to_string()),
        }
    }
}

impl From<KvError> for ApiError {
    fn from(fault: KvError) -> Self {
        match fault {
            KvError::Backend(_) => ApiError::unavailable("Cache layer temporarily unavailable."),
            other => ApiError::internal(&other.to_string()),
        }
    }
}

/// Sobre de éxito homogéneo: `{"data": ...}`.
pub fn data_envelope<T: Serialize>(payload: T) -> Json<serde_json::Value> {
    Json(json!({ "data": payload }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_faults_collapse_to_one_message() {
        let unknown: ApiError = DbError::PskUnknown.into();
        let expired: ApiError = DbError::PskExpired.into();
        assert_eq!(unknown.message, expired.message);
        assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn exhausted_psk_is_a_conflict_not_auth() {
        let exhausted: ApiError = DbError::PskExhausted.into();
        assert_eq!(exhausted.status, StatusCode::CONFLICT);
    }
}
