// [apps/orchestrator/src/middleware.rs]
/*!
 * =================================================================
 * APARATO: PERIMETER AUTHENTICATION GUARDS (V4.3 - TRIPLE SHIELD)
 * CLASIFICACIÓN: SECURITY STRATUM (ESTRATO L4)
 * RESPONSABILIDAD: PSK, FIRMA DE DISPOSITIVO Y SESIÓN ADMINISTRATIVA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. THREE CITIZENSHIPS: PSK de registro (un solo endpoint), firma
 *    ed25519 de dispositivo (resto de la superficie device) y sesión
 *    bearer de operador con umbral de rol.
 * 2. MASKED REJECTION: Todo rechazo de autenticación colapsa en el
 *    mismo 401; el motivo real vive en la traza y en el contador de
 *    seguridad del KV.
 * 3. EXTENSION INJECTION: El principal autenticado viaja como
 *    extensión de la petición hacia los handlers L4.
 * =================================================================
 */

use crate::errors::ApiError;
use crate::services::maintenance::AUTH_REJECTION_COUNTER_KEY;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use edgelink_domain_models::{AdminRole, AdminUser, PreSharedKey};
use tracing::{debug, warn};

/// Principal inyectado tras la validación de PSK (solo registro).
#[derive(Debug, Clone)]
pub struct PskPrincipal {
    pub psk: PreSharedKey,
}

/// Principal inyectado tras la verificación de firma de dispositivo.
#[derive(Debug, Clone)]
pub struct DevicePrincipal {
    pub device_id: String,
}

/// Principal inyectado tras la resolución de sesión administrativa.
#[derive(Debug, Clone)]
pub struct AdminPrincipal {
    pub operator: AdminUser,
}

/// Llave KV de una sesión administrativa viva.
pub fn admin_session_key(token: &str) -> String {
    format!("admin:session:{token}")
}

async fn count_auth_rejection(state: &AppState) {
    let _ = state
        .kv_store
        .increment(AUTH_REJECTION_COUNTER_KEY, 1, None)
        .await;
}

// =================================================================
// GUARDIA ALFA: PSK DE REGISTRO
// =================================================================

/**
 * Valida y CONSUME la credencial de registro (cabecera
 * 'X-Pre-Shared-Key'). El consumo es el incremento atómico del L3:
 * tras esta guardia, 'used_count' ya refleja este intento.
 */
pub async fn psk_guard(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented_key = request
        .headers()
        .get("X-Pre-Shared-Key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let Some(presented_key) = presented_key else {
        count_auth_rejection(&state).await;
        return Err(ApiError::unauthorized());
    };

    match state.psk_repository.consume(&presented_key).await {
        Ok(consumed_psk) => {
            debug!("🎫 [PSK_GUARD]: Credential {} admitted.", consumed_psk.id);
            request.extensions_mut().insert(PskPrincipal { psk: consumed_psk });
            Ok(next.run(request).await)
        }
        Err(psk_fault) => {
            count_auth_rejection(&state).await;
            Err(psk_fault.into())
        }
    }
}

// =================================================================
// GUARDIA BETA: FIRMA DE DISPOSITIVO
// =================================================================

/// Digesto canónico firmado por el dispositivo.
pub fn canonical_request_digest(method: &str, path: &str, timestamp: &str) -> String {
    format!("{method}\n{path}\n{timestamp}")
}

/**
 * Verifica la firma ed25519 del dispositivo sobre el digesto canónico
 * 'MÉTODO\nRUTA\nSELLO-TEMPORAL'.
 *
 * # Logic:
 * 1. Sello temporal dentro de la deriva admitida (anti-replay).
 * 2. Llave ACTIVA del dispositivo, vigente y no revocada.
 * 3. Verificación criptográfica de la firma.
 * Todo fallo colapsa en 401 opaco con rastro en la traza.
 */
pub async fn device_guard(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers();
    let device_id = headers
        .get("X-Device-Id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let timestamp_raw = headers
        .get("X-Device-Timestamp")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let signature_b64 = headers
        .get("X-Device-Signature")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let (Some(device_id), Some(timestamp_raw), Some(signature_b64)) =
        (device_id, timestamp_raw, signature_b64)
    else {
        count_auth_rejection(&state).await;
        return Err(ApiError::unauthorized());
    };

    // 1. ANTI-REPLAY: deriva temporal acotada.
    let presented_timestamp: i64 = match timestamp_raw.parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            count_auth_rejection(&state).await;
            return Err(ApiError::unauthorized());
        }
    };
    let skew = (Utc::now().timestamp() - presented_timestamp).abs();
    if skew > state.config.signature_skew_seconds {
        warn!("🔒 [DEVICE_GUARD]: Stale signature from {} (skew {}s).", device_id, skew);
        count_auth_rejection(&state).await;
        return Err(ApiError::unauthorized());
    }

    // 2. LLAVE ACTIVA VIGENTE
    let active_key = match state.device_key_repository.find_active(&device_id).await {
        Ok(Some(key)) if key.is_operational(Utc::now()) => key,
        Ok(Some(_)) => {
            warn!("🔒 [DEVICE_GUARD]: Device {} key expired or frozen.", device_id);
            count_auth_rejection(&state).await;
            return Err(ApiError::unauthorized());
        }
        Ok(None) => {
            warn!("🔒 [DEVICE_GUARD]: Device {} carries no active key.", device_id);
            count_auth_rejection(&state).await;
            return Err(ApiError::unauthorized());
        }
        Err(ledger_fault) => return Err(ledger_fault.into()),
    };

    // 3. VERIFICACIÓN CRIPTOGRÁFICA
    let verification = verify_device_signature(
        &active_key.public_key,
        &canonical_request_digest(
            request.method().as_str(),
            request.uri().path(),
            &timestamp_raw,
        ),
        &signature_b64,
    );

    if !verification {
        warn!("🔒 [DEVICE_GUARD]: Signature rejected for device {}.", device_id);
        count_auth_rejection(&state).await;
        return Err(ApiError::unauthorized());
    }

    request.extensions_mut().insert(DevicePrincipal { device_id });
    Ok(next.run(request).await)
}

/// Verificación pura de una firma ed25519 en base64 sobre el digesto.
pub fn verify_device_signature(public_key_b64: &str, digest: &str, signature_b64: &str) -> bool {
    let Ok(public_key_bytes) = BASE64.decode(public_key_b64) else {
        return false;
    };
    let public_key_array: [u8; 32] = match public_key_bytes.try_into() {
        Ok(array) => array,
        Err(_) => return false,
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key_array) else {
        return false;
    };

    let Ok(signature_bytes) = BASE64.decode(signature_b64) else {
        return false;
    };
    let signature_array: [u8; 64] = match signature_bytes.try_into() {
        Ok(array) => array,
        Err(_) => return false,
    };
    let signature = Signature::from_bytes(&signature_array);

    verifying_key.verify(digest.as_bytes(), &signature).is_ok()
}

// =================================================================
// GUARDIA GAMMA: SESIÓN ADMINISTRATIVA CON UMBRAL DE ROL
// =================================================================

async fn admin_guard_with_threshold(
    state: AppState,
    mut request: Request,
    next: Next,
    required_role: AdminRole,
) -> Result<Response, ApiError> {
    let bearer_token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);

    let Some(bearer_token) = bearer_token else {
        count_auth_rejection(&state).await;
        return Err(ApiError::unauthorized());
    };

    let operator_id = match state.kv_store.get(&admin_session_key(&bearer_token)).await {
        Ok(Some(operator_id)) => operator_id,
        Ok(None) => {
            count_auth_rejection(&state).await;
            return Err(ApiError::unauthorized());
        }
        Err(kv_fault) => return Err(kv_fault.into()),
    };

    let operator = match state.admin_user_repository.find_by_id(&operator_id).await {
        Ok(Some(operator)) if operator.is_active => operator,
        Ok(_) => {
            count_auth_rejection(&state).await;
            return Err(ApiError::unauthorized());
        }
        Err(ledger_fault) => return Err(ledger_fault.into()),
    };

    if !operator.role.satisfies(required_role) {
        warn!(
            "⛔ [ADMIN_GUARD]: Operator {} ({}) below threshold {}.",
            operator.email, operator.role, required_role
        );
        return Err(ApiError::forbidden());
    }

    request.extensions_mut().insert(AdminPrincipal { operator });
    Ok(next.run(request).await)
}

/// Umbral de lectura: auditor o superior.
pub async fn admin_guard_auditor(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    admin_guard_with_threshold(state, request, next, AdminRole::Auditor).await
}

/// Umbral operativo: network-operator o superior.
pub async fn admin_guard_operator(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    admin_guard_with_threshold(state, request, next, AdminRole::NetworkOperator).await
}

/// Umbral de mutación de configuración: admin o superior.
pub async fn admin_guard_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    admin_guard_with_threshold(state, request, next, AdminRole::Admin).await
}
