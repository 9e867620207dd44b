// [apps/orchestrator/src/services/heartbeat_flush.rs]
/*!
 * =================================================================
 * APARATO: HEARTBEAT FLUSH DAEMON (V4.1 - WRITE-BEHIND)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: CRISTALIZACIÓN DE LATIDOS EN EL LEDGER
 *
 * # Mathematical Proof (Write-Behind Efficiency):
 * Al diferir la escritura de latidos individuales hacia ráfagas de
 * lote cada 5 s, la contención de I/O sobre el Ledger se reduce en un
 * factor N:1, donde N es el número de latidos del intervalo.
 * =================================================================
 */

use crate::state::AppState;
use edgelink_domain_models::DeviceHeartbeat;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

/**
 * Lanza el servicio de persistencia asíncrona en el reactor de Tokio.
 *
 * # Logic:
 * Bucle infinito que monitoriza el buffer de RAM: si detecta actividad
 * drena los latidos bajo cerrojo breve y ejecuta la transacción masiva.
 */
#[instrument(skip(application_state))]
pub async fn spawn_heartbeat_flush(application_state: AppState) {
    let flush_interval = application_state.config.heartbeat_flush_interval;
    let mut synchronization_timer = interval(flush_interval.max(Duration::from_secs(1)));

    // Ticks perdidos ante congestión de CPU se omiten: prima la
    // frescura de los datos sobre la cantidad de ejecuciones.
    synchronization_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tokio::spawn(async move {
        info!("💾 [FLUSH_DAEMON]: Heartbeat write-behind engine operational.");

        loop {
            synchronization_timer.tick().await;

            // --- FASE 1: DRENAJE ATÓMICO (MEMORY STRATA) ---
            let pending_heartbeats: Vec<DeviceHeartbeat> = {
                match application_state.heartbeat_buffer.lock() {
                    Ok(mut buffer_guard) => {
                        if buffer_guard.is_empty() {
                            continue;
                        }
                        buffer_guard.drain().map(|(_, heartbeat)| heartbeat).collect()
                    }
                    Err(lock_poison_fault) => {
                        error!(
                            "❌ [FLUSH_CRITICAL_FAULT]: Heartbeat buffer lock poisoned: {}",
                            lock_poison_fault
                        );
                        break;
                    }
                }
            };

            // --- FASE 2: CRISTALIZACIÓN (IO STRATA) ---
            let observations: Vec<(String, chrono::DateTime<chrono::Utc>, Option<String>)> =
                pending_heartbeats
                    .iter()
                    .map(|heartbeat| {
                        (
                            heartbeat.device_id.clone(),
                            heartbeat.timestamp,
                            heartbeat.public_endpoint.clone(),
                        )
                    })
                    .collect();

            match application_state
                .device_repository
                .touch_last_seen_bulk(observations)
                .await
            {
                Ok(crystallized_count) if crystallized_count > 0 => {
                    debug!("✅ [FLUSH_SUCCESS]: {} presence records secured.", crystallized_count);
                }
                Ok(_) => {}
                Err(persistence_fault) => {
                    error!(
                        "⚠️ [FLUSH_REJECTED]: Ledger synchronization failed: {}. Signals retained next tick.",
                        persistence_fault
                    );
                    // Re-inyección: los latidos vuelven al buffer para el
                    // próximo intento (último escritor gana por dispositivo).
                    if let Ok(mut buffer_guard) = application_state.heartbeat_buffer.lock() {
                        for heartbeat in pending_heartbeats {
                            buffer_guard
                                .entry(heartbeat.device_id.clone())
                                .or_insert(heartbeat);
                        }
                    }
                }
            }
        }
    });
}
