// [apps/orchestrator/src/handlers/device.rs]
/*!
 * =================================================================
 * APARATO: DEVICE LIFECYCLE HANDLER (V4.4 - CAS REGISTRATION)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: REGISTRO, LATIDO, PARES Y ROTACIÓN DE LLAVE
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SEQUENTIAL CAS ALLOCATION: El asignador de IP recorre el CIDR en
 *    orden saltando pasarela y ocupadas; el índice único del Ledger es
 *    el árbitro final y la colisión reintenta con la siguiente
 *    candidata hasta 'network-full'.
 * 2. AUDIT + EVENT PATTERN: Toda mutación registra auditoría y publica
 *    su señal en el bus antes de responder.
 * 3. PRESENCE FIRST: El latido refresca el KV de presencia de forma
 *    síncrona y delega la escritura del Ledger al write-behind.
 * =================================================================
 */

use crate::errors::{data_envelope, ApiError};
use crate::middleware::{DevicePrincipal, PskPrincipal};
use crate::services::health_probe::presence_key;
use crate::state::AppState;
use axum::extract::{Extension, Json, State};
use chrono::Utc;
use edgelink_domain_models::{
    AlertType, AuditLog, Device, DeviceHeartbeat, NatType, Platform,
};
use edgelink_infra_db::repositories::device::forge_initial_key;
use edgelink_infra_db::DbError;
use ipnetwork::Ipv4Network;
use serde::Deserialize;
use serde_json::json;
use std::net::Ipv4Addr;
use std::str::FromStr;
use tracing::{info, instrument, warn};

/// Payload de registro (autenticado por PSK).
#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    /// Llave pública del dispositivo (única a nivel global).
    pub public_key: String,
    pub platform: String,
    pub name: String,
    #[serde(rename = "org_slug")]
    pub org_slug: String,
    #[serde(rename = "virtual_network_id")]
    pub virtual_network_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Payload de latido (autenticado por firma).
#[derive(Debug, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(rename = "public_endpoint")]
    pub public_endpoint: Option<String>,
    #[serde(rename = "session_samples", default)]
    pub session_samples: Vec<edgelink_domain_models::SessionMetricsSample>,
    #[serde(rename = "tunnel_failures", default)]
    pub tunnel_failures: u32,
}

#[derive(Debug, Deserialize)]
pub struct RotateKeyPayload {
    #[serde(rename = "new_public_key")]
    pub new_public_key: String,
}

pub struct DeviceLifecycleHandler;

impl DeviceLifecycleHandler {
    /**
     * Endpoint: POST /api/v1/device/register
     *
     * # Errors:
     * - 'conflict' ante llave duplicada, cuota de organización o red llena.
     * - 'bad-request' ante plataforma o red desconocidas.
     */
    #[instrument(skip(application_state, psk_principal, payload), fields(org = %payload.org_slug))]
    pub async fn handle_register(
        State(application_state): State<AppState>,
        Extension(psk_principal): Extension<PskPrincipal>,
        Json(payload): Json<RegisterPayload>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        let platform = Platform::from_str(&payload.platform)
            .map_err(|_| ApiError::bad_request(format!("Unknown platform '{}'.", payload.platform)))?;

        // 1. TENENCIA: la organización del slug debe poseer la PSK.
        let organization = application_state
            .organization_repository
            .find_by_slug(&payload.org_slug)
            .await?
            .ok_or_else(|| ApiError::bad_request(format!("Unknown organization '{}'.", payload.org_slug)))?;

        if organization.id != psk_principal.psk.org_id {
            warn!("🔒 [REGISTER]: PSK organization mismatch for slug {}.", payload.org_slug);
            return Err(ApiError::unauthorized());
        }

        // 2. RED VIRTUAL BAJO LA ORGANIZACIÓN
        let network = application_state
            .network_repository
            .find_by_id(&payload.virtual_network_id)
            .await?
            .filter(|network| network.org_id == organization.id)
            .ok_or_else(|| {
                ApiError::bad_request(format!(
                    "Virtual network '{}' does not belong to '{}'.",
                    payload.virtual_network_id, payload.org_slug
                ))
            })?;

        // 3. CUOTA DE DISPOSITIVOS
        let current_device_count = application_state
            .organization_repository
            .count_devices(&organization.id)
            .await?;
        if !organization.admits_device(current_device_count) {
            return Err(ApiError::conflict("Organization device limit reached."));
        }

        // 4. ASIGNACIÓN CAS DE IP VIRTUAL
        let parsed_cidr: Ipv4Network = network
            .parsed_cidr()
            .map_err(|cidr_fault| ApiError::internal(&cidr_fault.to_string()))?;
        let gateway: Ipv4Addr = network
            .gateway_ip
            .parse()
            .map_err(|_| ApiError::internal("GATEWAY_UNPARSEABLE"))?;

        let mut taken_ips = application_state
            .device_repository
            .taken_ips(&network.id)
            .await?;

        let registered_device = loop {
            let candidate_ip = Self::next_free_ip(&parsed_cidr, gateway, &taken_ips)
                .ok_or_else(|| ApiError::conflict("Virtual network address space exhausted."))?;

            let now = Utc::now();
            let candidate_device = Device {
                id: uuid::Uuid::new_v4().to_string(),
                virtual_network_id: network.id.clone(),
                name: payload.name.clone(),
                virtual_ip: candidate_ip.to_string(),
                public_key: payload.public_key.clone(),
                platform,
                nat_type: NatType::Unknown,
                public_endpoint: None,
                tags: payload.tags.clone(),
                online: true,
                last_seen_at: Some(now),
                created_at: now,
                updated_at: now,
            };
            let initial_key = forge_initial_key(&candidate_device.id, &payload.public_key, None);

            match application_state
                .device_repository
                .insert_registered(&candidate_device, &initial_key)
                .await
            {
                Ok(()) => break candidate_device,
                // Carrera CAS: otra inscripción ganó la IP; reintentamos.
                Err(DbError::VirtualIpTaken) => {
                    taken_ips.insert(candidate_ip.to_string());
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        };

        // 5. PRESENCIA INICIAL
        let _ = application_state
            .kv_store
            .set(
                &presence_key(&registered_device.id),
                "1",
                Some(application_state.config.presence_ttl),
            )
            .await;

        // 6. AUDITORÍA + SEÑAL
        let mut audit_entry = AuditLog::system_event(
            &organization.id,
            "device.registered",
            "device",
            &registered_device.id,
        );
        audit_entry.after_state = Some(json!({
            "name": registered_device.name,
            "virtual_ip": registered_device.virtual_ip,
            "platform": registered_device.platform,
        }));
        application_state.audit_repository.append(&audit_entry).await?;

        application_state.event_bus.publish_device_registered(
            &registered_device.id,
            &network.id,
            &organization.id,
        );
        application_state.topology.invalidate_network(&network.id);

        info!(
            "🛰️ [DEVICE_REGISTERED]: {} joined network {} at {}.",
            registered_device.id, network.id, registered_device.virtual_ip
        );

        Ok(data_envelope(json!({
            "device_id": registered_device.id,
            "virtual_ip": registered_device.virtual_ip,
            "virtual_network_id": network.id,
            "created_at": registered_device.created_at,
        })))
    }

    /// Escaneo secuencial del CIDR saltando red, broadcast, pasarela y
    /// direcciones ya asignadas.
    fn next_free_ip(
        cidr: &Ipv4Network,
        gateway: Ipv4Addr,
        taken: &std::collections::HashSet<String>,
    ) -> Option<Ipv4Addr> {
        let network_address = u32::from(cidr.network());
        let broadcast_address = u32::from(cidr.broadcast());

        (network_address + 1..broadcast_address)
            .map(Ipv4Addr::from)
            .find(|candidate| *candidate != gateway && !taken.contains(&candidate.to_string()))
    }

    /**
     * Endpoint: POST /api/v1/device/heartbeat
     *
     * Refresca el TTL de presencia, alimenta las ventanas de telemetría
     * y encola la escritura del Ledger (write-behind). La transición
     * offline -> online resuelve las alertas del tipo y repuebla la
     * topología.
     */
    #[instrument(skip(application_state, device_principal, payload), fields(device = %device_principal.device_id))]
    pub async fn handle_heartbeat(
        State(application_state): State<AppState>,
        Extension(device_principal): Extension<DevicePrincipal>,
        Json(payload): Json<HeartbeatPayload>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        let device_id = device_principal.device_id.clone();
        let now = Utc::now();

        // 1. TRANSICIÓN DE PRESENCIA (el KV es la verdad a corto plazo)
        let was_online = application_state
            .kv_store
            .exists(&presence_key(&device_id))
            .await
            .unwrap_or(false);

        application_state
            .kv_store
            .set(
                &presence_key(&device_id),
                "1",
                Some(application_state.config.presence_ttl),
            )
            .await?;

        let heartbeat = DeviceHeartbeat {
            device_id: device_id.clone(),
            timestamp: now,
            public_endpoint: payload.public_endpoint.clone(),
            session_samples: payload.session_samples,
            tunnel_failures: payload.tunnel_failures,
        };

        // 2. VENTANAS DE TELEMETRÍA + MÉTRICAS DE SESIÓN
        application_state.telemetry_window.record_heartbeat(&heartbeat);
        for sample in &heartbeat.session_samples {
            if let Ok(Some(session)) = application_state
                .session_repository
                .find_active_for_pair(&device_id, &sample.peer_device_id)
                .await
            {
                let _ = application_state
                    .session_repository
                    .update_metrics(
                        &session.id,
                        sample.bytes_sent,
                        sample.bytes_received,
                        Some(sample.latency_ms),
                    )
                    .await;
            }
        }

        // 3. BUFFER WRITE-BEHIND (el flusher drena cada 5 s)
        if let Ok(mut buffer_guard) = application_state.heartbeat_buffer.lock() {
            buffer_guard.insert(device_id.clone(), heartbeat);
        }

        // 4. RECUPERACIÓN: el regreso a línea resuelve 'device-offline'.
        if !was_online {
            if let Ok(Some(device)) = application_state.device_repository.find_by_id(&device_id).await
            {
                let _ = application_state
                    .device_repository
                    .set_online(&device_id, true)
                    .await;
                application_state.event_bus.publish_device_presence(
                    &device_id,
                    &device.virtual_network_id,
                    true,
                );
                application_state
                    .topology
                    .invalidate_network(&device.virtual_network_id);
                application_state
                    .alert_engine
                    .resolve_device_alerts(&device_id, AlertType::DeviceOffline)
                    .await;
            }
        }

        Ok(data_envelope(json!({ "acknowledged_at": now })))
    }

    /**
     * Endpoint: GET /api/v1/device/peers
     *
     * Conjunto de pares vigente, orden estable por IP virtual. El pull
     * de 30 s acota la obsolescencia; el push 'peer.updated' la reduce
     * al presupuesto del bus.
     */
    #[instrument(skip(application_state, device_principal), fields(device = %device_principal.device_id))]
    pub async fn handle_get_peers(
        State(application_state): State<AppState>,
        Extension(device_principal): Extension<DevicePrincipal>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        let peer_set = application_state
            .topology
            .resolve_peers(&device_principal.device_id)
            .await?;
        Ok(data_envelope(peer_set))
    }

    /// Endpoint: GET /api/v1/device/config — ficha propia del dispositivo.
    #[instrument(skip(application_state, device_principal))]
    pub async fn handle_get_config(
        State(application_state): State<AppState>,
        Extension(device_principal): Extension<DevicePrincipal>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        let device = application_state
            .device_repository
            .find_by_id(&device_principal.device_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Device record vanished."))?;
        Ok(data_envelope(device))
    }

    /**
     * Endpoint: POST /api/v1/device/deregister
     * Baja voluntaria del propio dispositivo (auditoría + señal).
     */
    #[instrument(skip(application_state, device_principal))]
    pub async fn handle_deregister(
        State(application_state): State<AppState>,
        Extension(device_principal): Extension<DevicePrincipal>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        let device_id = device_principal.device_id.clone();
        let device = application_state
            .device_repository
            .find_by_id(&device_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Device record vanished."))?;

        deregister_device(&application_state, &device, &device_id).await?;
        Ok(data_envelope(json!({ "deregistered": device_id })))
    }

    /**
     * Endpoint: POST /api/v1/device/rotate-key
     * La llave activa pasa a gracia de rotación; la sucesora firma de
     * inmediato.
     */
    #[instrument(skip(application_state, device_principal, payload))]
    pub async fn handle_rotate_key(
        State(application_state): State<AppState>,
        Extension(device_principal): Extension<DevicePrincipal>,
        Json(payload): Json<RotateKeyPayload>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        let device_id = device_principal.device_id.clone();

        let successor = application_state
            .device_key_repository
            .rotate(&device_id, &payload.new_public_key, None)
            .await?;

        let device = application_state
            .device_repository
            .find_by_id(&device_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Device record vanished."))?;

        let audit_entry = AuditLog::system_event(
            // La organización se alcanza vía la red del dispositivo.
            &application_state
                .network_repository
                .find_by_id(&device.virtual_network_id)
                .await?
                .map(|network| network.org_id)
                .unwrap_or_default(),
            "device.key-rotated",
            "device-key",
            &successor.id,
        );
        application_state.audit_repository.append(&audit_entry).await?;
        application_state.event_bus.publish_key_rotated(&device_id);
        application_state
            .topology
            .invalidate_network(&device.virtual_network_id);

        Ok(data_envelope(json!({
            "key_id": successor.id,
            "valid_from": successor.valid_from,
        })))
    }
}

/// Baja completa de un dispositivo: Ledger, presencia, telemetría,
/// auditoría y señales. Compartida por la baja voluntaria y la
/// administrativa.
pub async fn deregister_device(
    application_state: &AppState,
    device: &Device,
    actor_id: &str,
) -> Result<(), ApiError> {
    application_state.device_repository.delete(&device.id).await?;

    let _ = application_state
        .kv_store
        .delete(&presence_key(&device.id))
        .await;
    application_state.telemetry_window.forget_device(&device.id);

    let organization_id = application_state
        .network_repository
        .find_by_id(&device.virtual_network_id)
        .await?
        .map(|network| network.org_id)
        .unwrap_or_default();

    let mut audit_entry =
        AuditLog::system_event(&organization_id, "device.deregistered", "device", &device.id);
    audit_entry.actor_id = Some(actor_id.to_string());
    audit_entry.before_state = Some(json!({
        "name": device.name,
        "virtual_ip": device.virtual_ip,
    }));
    application_state.audit_repository.append(&audit_entry).await?;

    application_state
        .event_bus
        .publish_device_deregistered(&device.id, &device.virtual_network_id);
    application_state
        .topology
        .invalidate_network(&device.virtual_network_id);

    info!("🪦 [DEVICE_RETIRED]: {} left network {}.", device.id, device.virtual_network_id);
    Ok(())
}
