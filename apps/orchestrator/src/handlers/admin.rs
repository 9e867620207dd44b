// [apps/orchestrator/src/handlers/admin.rs]
/*!
 * =================================================================
 * APARATO: ADMIN COMMAND HANDLER (V4.3 - OPERATOR SURFACE)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: SESIONES, ALERTAS, DISPOSITIVOS, PSK Y AUDITORÍA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SESSION BOOTSTRAP: La emisión de sesiones exige el token de
 *    arranque del registro congelado; la sesión vive en el KV con TTL.
 * 2. MONOTONIC OPERATIONS: Ack y resolve delegan en las transiciones
 *    linealizadas del Ledger; un retroceso responde 'conflict'.
 * 3. ONE-SHOT SECRETS: El material de una PSK nueva viaja UNA vez en
 *    la respuesta de creación; el Ledger solo guarda su hash.
 * =================================================================
 */

use crate::errors::{data_envelope, ApiError};
use crate::middleware::{admin_session_key, AdminPrincipal};
use crate::services::rule_reload;
use crate::state::AppState;
use axum::extract::{Extension, Json, Path, Query, State};
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL;
use base64::Engine;
use chrono::{Duration, Utc};
use edgelink_domain_models::{
    AlertStatus, AlertType, AuditLog, PreSharedKey, Severity,
};
use edgelink_infra_db::repositories::{AlertFilter, PskRepository};
use rand::RngCore;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use tracing::{info, instrument, warn};

#[derive(Debug, Deserialize)]
pub struct SessionPayload {
    pub email: String,
    #[serde(rename = "bootstrap_token")]
    pub bootstrap_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    pub status: Option<String>,
    pub severity: Option<String>,
    #[serde(rename = "alert_type")]
    pub alert_type: Option<String>,
    #[serde(rename = "device_id")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub page: u32,
    #[serde(rename = "page_size")]
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePskPayload {
    pub name: Option<String>,
    #[serde(rename = "max_uses")]
    pub max_uses: Option<u32>,
    #[serde(rename = "expires_in_days")]
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(rename = "page_size")]
    pub page_size: Option<u32>,
}

pub struct AdminCommandHandler;

impl AdminCommandHandler {
    /**
     * Endpoint: POST /api/v1/admin/session
     *
     * Emite una sesión administrativa para un operador aprovisionado,
     * validando el token de arranque del despliegue.
     */
    #[instrument(skip(application_state, payload), fields(operator = %payload.email))]
    pub async fn handle_session_bootstrap(
        State(application_state): State<AppState>,
        Json(payload): Json<SessionPayload>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        let configured_token = &application_state.config.admin_bootstrap_token;
        if configured_token.is_empty() || payload.bootstrap_token != *configured_token {
            warn!("🔒 [ADMIN_SESSION]: Bootstrap token rejected.");
            return Err(ApiError::unauthorized());
        }

        let operator = application_state
            .admin_user_repository
            .find_by_email(&payload.email)
            .await?
            .filter(|operator| operator.is_active)
            .ok_or_else(ApiError::unauthorized)?;

        let mut token_material = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut token_material);
        let session_token = BASE64_URL.encode(token_material);

        application_state
            .kv_store
            .set(
                &admin_session_key(&session_token),
                &operator.id,
                Some(application_state.config.admin_session_ttl),
            )
            .await?;
        application_state
            .admin_user_repository
            .touch_last_login(&operator.id)
            .await?;

        let audit_entry = AuditLog::system_event(
            &operator.org_id,
            "admin.session-issued",
            "admin-user",
            &operator.id,
        );
        application_state.audit_repository.append(&audit_entry).await?;

        info!("👤 [ADMIN_SESSION]: Operator {} authenticated.", operator.email);
        Ok(data_envelope(json!({
            "token": session_token,
            "role": operator.role,
            "expires_in_seconds": application_state.config.admin_session_ttl.as_secs(),
        })))
    }

    /// Endpoint: GET /api/v1/admin/alerts — listado filtrado y paginado.
    #[instrument(skip(application_state, query))]
    pub async fn handle_list_alerts(
        State(application_state): State<AppState>,
        Query(query): Query<AlertQuery>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        let filter = AlertFilter {
            status: parse_optional(&query.status, AlertStatus::from_str, "status")?,
            severity: parse_optional(&query.severity, Severity::from_str, "severity")?,
            alert_type: parse_optional(&query.alert_type, AlertType::from_str, "alert_type")?,
            device_id: query.device_id.clone(),
            page: query.page,
            page_size: query.page_size.unwrap_or(50),
        };

        let page = application_state.alert_repository.list_filtered(&filter).await?;
        Ok(data_envelope(json!({
            "alerts": page.alerts,
            "total_count": page.total_count,
            "page": page.page,
            "page_size": page.page_size,
        })))
    }

    /// Endpoint: POST /api/v1/admin/alerts/:id/acknowledge
    #[instrument(skip(application_state, admin_principal), fields(operator = %admin_principal.operator.email))]
    pub async fn handle_acknowledge_alert(
        State(application_state): State<AppState>,
        Extension(admin_principal): Extension<AdminPrincipal>,
        Path(alert_id): Path<String>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        let acknowledged = application_state
            .alert_repository
            .acknowledge(&alert_id, &admin_principal.operator.id)
            .await?;

        // La alerta abandonó 'active': el escalado temporal muere.
        application_state.alert_engine.on_alert_closed(&alert_id);
        application_state.event_bus.publish_alert_updated(&acknowledged);

        Ok(data_envelope(acknowledged))
    }

    /// Endpoint: POST /api/v1/admin/alerts/:id/resolve
    #[instrument(skip(application_state, admin_principal), fields(operator = %admin_principal.operator.email))]
    pub async fn handle_resolve_alert(
        State(application_state): State<AppState>,
        Extension(admin_principal): Extension<AdminPrincipal>,
        Path(alert_id): Path<String>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        let resolved = application_state.alert_repository.resolve(&alert_id).await?;

        application_state.alert_engine.on_alert_closed(&alert_id);
        application_state
            .event_bus
            .publish_alert_resolved(&alert_id, resolved.device_id.as_deref());

        // Desarme del dedup + periodo de silencio para el par (device, type).
        if let Some(device_id) = &resolved.device_id {
            application_state
                .alert_engine
                .resolve_device_alerts(device_id, resolved.alert_type)
                .await;
        }

        let audit_entry = AuditLog {
            actor_id: Some(admin_principal.operator.id.clone()),
            ..AuditLog::system_event(
                &admin_principal.operator.org_id,
                "alert.resolved",
                "alert",
                &alert_id,
            )
        };
        application_state.audit_repository.append(&audit_entry).await?;

        Ok(data_envelope(resolved))
    }

    /// Endpoint: GET /api/v1/admin/devices
    #[instrument(skip(application_state))]
    pub async fn handle_list_devices(
        State(application_state): State<AppState>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        let inventory = application_state.device_repository.list_all().await?;
        Ok(data_envelope(inventory))
    }

    /// Endpoint: DELETE /api/v1/admin/devices/:id — baja administrativa.
    #[instrument(skip(application_state, admin_principal), fields(operator = %admin_principal.operator.email))]
    pub async fn handle_delete_device(
        State(application_state): State<AppState>,
        Extension(admin_principal): Extension<AdminPrincipal>,
        Path(device_id): Path<String>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        let device = application_state
            .device_repository
            .find_by_id(&device_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Unknown device '{device_id}'.")))?;

        crate::handlers::device::deregister_device(
            &application_state,
            &device,
            &admin_principal.operator.id,
        )
        .await?;

        Ok(data_envelope(json!({ "deregistered": device_id })))
    }

    /**
     * Endpoint: POST /api/v1/admin/psk
     * Forja una credencial de registro; el material viaja UNA sola vez.
     */
    #[instrument(skip(application_state, admin_principal, payload), fields(operator = %admin_principal.operator.email))]
    pub async fn handle_create_psk(
        State(application_state): State<AppState>,
        Extension(admin_principal): Extension<AdminPrincipal>,
        Json(payload): Json<CreatePskPayload>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        let mut key_material_bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key_material_bytes);
        let key_material = BASE64_URL.encode(key_material_bytes);

        let credential = PreSharedKey {
            id: uuid::Uuid::new_v4().to_string(),
            org_id: admin_principal.operator.org_id.clone(),
            key_hash: PskRepository::hash_key_material(&key_material),
            name: payload.name.clone(),
            max_uses: payload.max_uses,
            used_count: 0,
            expires_at: payload
                .expires_in_days
                .map(|days| Utc::now() + Duration::days(days)),
            created_at: Utc::now(),
        };

        application_state.psk_repository.insert(&credential).await?;

        let audit_entry = AuditLog {
            actor_id: Some(admin_principal.operator.id.clone()),
            ..AuditLog::system_event(
                &admin_principal.operator.org_id,
                "psk.created",
                "pre-shared-key",
                &credential.id,
            )
        };
        application_state.audit_repository.append(&audit_entry).await?;

        Ok(data_envelope(json!({
            "psk_id": credential.id,
            // Material en claro: esta respuesta es su única aparición.
            "key_material": key_material,
            "max_uses": credential.max_uses,
            "expires_at": credential.expires_at,
        })))
    }

    /// Endpoint: GET /api/v1/admin/audit — rastro paginado por tiempo.
    #[instrument(skip(application_state, admin_principal, query))]
    pub async fn handle_list_audit(
        State(application_state): State<AppState>,
        Extension(admin_principal): Extension<AdminPrincipal>,
        Query(query): Query<AuditQuery>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        let entries = application_state
            .audit_repository
            .list_by_org(
                &admin_principal.operator.org_id,
                query.page,
                query.page_size.unwrap_or(100),
            )
            .await?;
        Ok(data_envelope(entries))
    }

    /// Endpoint: POST /api/v1/rules/reload — recarga forzada del Herald.
    #[instrument(skip(application_state, admin_principal), fields(operator = %admin_principal.operator.email))]
    pub async fn handle_rules_reload(
        State(application_state): State<AppState>,
        Extension(admin_principal): Extension<AdminPrincipal>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        match rule_reload::force_reload(&application_state) {
            Ok(active_count) => {
                info!(
                    "🔄 [RULES_RELOAD]: Operator {} applied {} rules.",
                    admin_principal.operator.email, active_count
                );
                Ok(data_envelope(json!({ "active_rules": active_count })))
            }
            Err(reload_fault) => Err(ApiError::bad_request(reload_fault)),
        }
    }
}

fn parse_optional<T>(
    raw: &Option<String>,
    parser: fn(&str) -> Result<T, String>,
    field: &str,
) -> Result<Option<T>, ApiError> {
    match raw {
        Some(value) => parser(value)
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("Unknown {field} '{value}'."))),
        None => Ok(None),
    }
}
