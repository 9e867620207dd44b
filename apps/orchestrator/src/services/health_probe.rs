// [apps/orchestrator/src/services/health_probe.rs]
/*!
 * =================================================================
 * APARATO: DEVICE HEALTH PROBE (V4.3 - TRANSITION AWARE)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: SONDA PERIÓDICA DE SALUD DEL INVENTARIO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. PRESENCE RECONCILIATION: La verdad de presencia vive en el KV
 *    (TTL ≈ 2x latido); la sonda reconcilia la bandera 'online' del
 *    Ledger contra ella y publica las transiciones.
 * 2. FOUR RULES: offline (escalera de duración), latencia p95, fallos
 *    de túnel y caducidad de llaves; todo hallazgo entra al embudo de
 *    dedup del motor de alertas.
 * 3. NEVER PROPAGATE: La sonda registra y continúa; ningún fallo de un
 *    dispositivo detiene el barrido del inventario.
 * =================================================================
 */

use crate::state::AppState;
use chrono::Utc;
use tracing::{debug, instrument, warn};

/// Llave de presencia del dispositivo en el KV.
pub fn presence_key(device_id: &str) -> String {
    format!("device:online:{device_id}")
}

/**
 * Un barrido completo del inventario. Invocado por el planificador
 * bajo cerrojo distribuido cada 60 s.
 */
#[instrument(skip(application_state))]
pub async fn run_health_probe(application_state: AppState) {
    let now = Utc::now();
    let devices = match application_state.device_repository.list_all().await {
        Ok(devices) => devices,
        Err(ledger_fault) => {
            warn!("⚠️ [PROBE_DEGRADED]: Inventory unavailable: {}", ledger_fault);
            return;
        }
    };

    debug!("🩺 [PROBE_SWEEP]: Inspecting {} devices.", devices.len());

    for device in devices {
        let presence_alive = application_state
            .kv_store
            .exists(&presence_key(&device.id))
            .await
            .unwrap_or(false);

        // --- RECONCILIACIÓN DE PRESENCIA ---
        if device.online && !presence_alive {
            if let Err(transition_fault) = application_state
                .device_repository
                .set_online(&device.id, false)
                .await
            {
                warn!("⚠️ [PROBE_TRANSITION_FAULT]: {}", transition_fault);
            } else {
                application_state.event_bus.publish_device_presence(
                    &device.id,
                    &device.virtual_network_id,
                    false,
                );
                application_state
                    .topology
                    .invalidate_network(&device.virtual_network_id);
            }
        }

        // --- REGLA 1: DEVICE-OFFLINE ---
        if !presence_alive {
            if let Some(issue) = application_state
                .health_rules
                .evaluate_offline(&device, now)
            {
                application_state.alert_engine.ingest(issue).await;
            }
        }

        // --- REGLA 2: HIGH-LATENCY ---
        let latency_window = application_state.telemetry_window.latency_window(&device.id);
        if let Some(issue) = application_state
            .health_rules
            .evaluate_latency(&device, &latency_window)
        {
            application_state.alert_engine.ingest(issue).await;
        }

        // --- REGLA 3: TUNNEL-FAILURE ---
        let failures = application_state
            .telemetry_window
            .drain_tunnel_failures(&device.id);
        if let Some(issue) = application_state
            .health_rules
            .evaluate_tunnel_failures(&device, failures)
        {
            application_state.alert_engine.ingest(issue).await;
        }

        // --- REGLA 4: KEY-EXPIRING ---
        match application_state
            .device_key_repository
            .find_active(&device.id)
            .await
        {
            Ok(Some(active_key)) => {
                if let Some(issue) = application_state
                    .health_rules
                    .evaluate_key_expiry(&device, &active_key, now)
                {
                    application_state.alert_engine.ingest(issue).await;
                }
            }
            Ok(None) => {
                warn!("🔑 [PROBE_ANOMALY]: Device {} carries no active key.", device.id);
            }
            Err(ledger_fault) => {
                warn!("⚠️ [PROBE_KEY_FAULT]: {}", ledger_fault);
            }
        }
    }

    // Disparos de escalado temporal vencidos (alertas sin atender).
    application_state.alert_engine.tick_escalations().await;
}
