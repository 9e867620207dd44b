// [tests/mirror/apps/orchestrator/alert_lifecycle.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE CICLO DE VIDA DE ALERTAS (V4.2 - MESH)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: DEDUP IDEMPOTENTE, ESCALADO Y PERIODO DE SILENCIO
 *
 * # Mathematical Proof (Dedup Idempotence):
 * K ingestas del mismo issue dentro de la ventana producen exactamente
 * una alerta con occurrence_count == K y first_seen_at inmutable; el
 * escalado promueve exactamente un peldaño en el umbral y nunca más
 * para el mismo registro.
 * =================================================================
 */

use chrono::Utc;
use edgelink_domain_alerting::HealthIssue;
use edgelink_domain_models::{AlertStatus, AlertType, Severity};
use edgelink_infra_db::repositories::AlertFilter;
use edgelink_infra_db::{DbClient, DbError};
use edgelink_orchestrator::config::OrchestratorConfig;
use edgelink_orchestrator::state::AppState;
use std::sync::Arc;

async fn forge_control_plane(ledger_name: &str) -> AppState {
    let memory_url = format!("file:{ledger_name}?mode=memory&cache=shared");
    let database_client = DbClient::connect(&memory_url, None)
        .await
        .expect("RAM ledger ignition");
    AppState::new(Arc::new(OrchestratorConfig::from_env()), database_client)
}

fn offline_issue(severity: Severity) -> HealthIssue {
    HealthIssue::new(
        "dev-probe",
        AlertType::DeviceOffline,
        severity,
        "Device 'edge-probe' has been silent.".to_string(),
    )
}

async fn active_offline_alert(state: &AppState) -> Option<edgelink_domain_models::Alert> {
    state
        .alert_repository
        .find_active_by_device_and_type("dev-probe", AlertType::DeviceOffline)
        .await
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// K ingestas -> una alerta, contador K, first_seen inmutable.
    #[tokio::test]
    async fn dedup_is_idempotent_over_repeated_issues() {
        let state = forge_control_plane("alerts-dedup").await;

        for _ in 0..5 {
            state.alert_engine.ingest(offline_issue(Severity::Medium)).await;
        }

        let page = state
            .alert_repository
            .list_filtered(&AlertFilter {
                device_id: Some("dev-probe".into()),
                page_size: 50,
                ..AlertFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total_count, 1, "exactly one alert row");

        let alert = active_offline_alert(&state).await.expect("active alert");
        assert_eq!(alert.occurrence_count, 5);
        assert_eq!(alert.severity, Severity::Medium);
        assert!(alert.first_seen_at <= alert.last_seen_at);
    }

    /**
     * Escalado por contador: en la ocurrencia umbral (10) la severidad
     * sube EXACTAMENTE un peldaño; las siguientes no re-escalan.
     */
    #[tokio::test]
    async fn counter_escalation_promotes_exactly_once() {
        let state = forge_control_plane("alerts-escalation").await;

        for _ in 0..9 {
            state.alert_engine.ingest(offline_issue(Severity::Medium)).await;
        }
        let before_threshold = active_offline_alert(&state).await.unwrap();
        assert_eq!(before_threshold.severity, Severity::Medium);

        // Ocurrencia 10: Medium -> High.
        state.alert_engine.ingest(offline_issue(Severity::Medium)).await;
        let at_threshold = active_offline_alert(&state).await.unwrap();
        assert_eq!(at_threshold.severity, Severity::High);
        assert_eq!(at_threshold.occurrence_count, 10);

        // Ocurrencias 11..15: sin segunda promoción por contador.
        for _ in 0..5 {
            state.alert_engine.ingest(offline_issue(Severity::Medium)).await;
        }
        let after_threshold = active_offline_alert(&state).await.unwrap();
        assert_eq!(after_threshold.severity, Severity::High);
        assert_eq!(after_threshold.occurrence_count, 15);
    }

    /**
     * Regla de duración: la sonda reporta severidades crecientes y la
     * alerta sube a Critical por el issue, no por el contador.
     */
    #[tokio::test]
    async fn duration_ladder_raises_severity_to_critical() {
        let state = forge_control_plane("alerts-ladder").await;

        state.alert_engine.ingest(offline_issue(Severity::Medium)).await;
        state.alert_engine.ingest(offline_issue(Severity::High)).await;
        state.alert_engine.ingest(offline_issue(Severity::Critical)).await;

        let alert = active_offline_alert(&state).await.unwrap();
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.occurrence_count, 3);
    }

    /// Resolución + silencio: el re-disparo inmediato queda suprimido.
    #[tokio::test]
    async fn silent_period_suppresses_immediate_retrigger() {
        let state = forge_control_plane("alerts-silence").await;

        state.alert_engine.ingest(offline_issue(Severity::Medium)).await;
        assert!(active_offline_alert(&state).await.is_some());

        state
            .alert_engine
            .resolve_device_alerts("dev-probe", AlertType::DeviceOffline)
            .await;
        assert!(active_offline_alert(&state).await.is_none());

        // Dentro del periodo de silencio: ninguna alerta nueva nace.
        state.alert_engine.ingest(offline_issue(Severity::Medium)).await;
        assert!(active_offline_alert(&state).await.is_none());
    }

    /// La máquina de estados es monotónica y linealizada por fila.
    #[tokio::test]
    async fn alert_transitions_are_monotonic() {
        let state = forge_control_plane("alerts-monotonic").await;

        state.alert_engine.ingest(offline_issue(Severity::Medium)).await;
        let alert = active_offline_alert(&state).await.unwrap();

        let acknowledged = state
            .alert_repository
            .acknowledge(&alert.id, "operator-1")
            .await
            .unwrap();
        assert_eq!(acknowledged.status, AlertStatus::Acknowledged);

        // Doble ack: retroceso prohibido.
        let second_ack = state.alert_repository.acknowledge(&alert.id, "operator-2").await;
        assert!(matches!(second_ack, Err(DbError::InvalidState)));

        let resolved = state.alert_repository.resolve(&alert.id).await.unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);

        // Resolver dos veces: terminal.
        let second_resolve = state.alert_repository.resolve(&alert.id).await;
        assert!(matches!(second_resolve, Err(DbError::InvalidState)));
    }
}
