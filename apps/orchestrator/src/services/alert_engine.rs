// [apps/orchestrator/src/services/alert_engine.rs]
/*!
 * =================================================================
 * APARATO: ALERT GENERATION ENGINE (V4.3 - DEDUP PIPELINE)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: HEALTHISSUE -> DEDUP -> LEDGER -> HERALD
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE FUNNEL: Todo HealthIssue atraviesa el almacén de dedup; el
 *    veredicto gobierna creación, absorción o supresión.
 * 2. DUAL SEVERITY RISE: La severidad sube por el contador (escalado,
 *    un peldaño, una vez) Y por la regla de duración del issue (la
 *    sonda reporta severidades crecientes); se aplica el máximo.
 * 3. RECOVERY PATH: La recuperación resuelve las alertas del tipo,
 *    desarma el dedup y arma el periodo de silencio.
 * 4. FAIL-OPEN: Los fallos transitorios del camino dedup/despacho se
 *    degluten con advertencia; la disponibilidad manda.
 * =================================================================
 */

use crate::services::event_bus::EventBus;
use chrono::Utc;
use edgelink_domain_alerting::{DedupStore, DedupVerdict, HealthIssue};
use edgelink_domain_models::{Alert, AlertStatus, AlertType, Severity};
use edgelink_domain_notification::NotificationDispatcher;
use edgelink_infra_db::repositories::{AlertRepository, DeviceRepository};
use edgelink_infra_db::DbError;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct AlertEngine {
    dedup_store: Arc<DedupStore>,
    alert_repository: Arc<AlertRepository>,
    device_repository: Arc<DeviceRepository>,
    dispatcher: Arc<NotificationDispatcher>,
    event_bus: Arc<EventBus>,
}

impl AlertEngine {
    #[must_use]
    pub fn new(
        dedup_store: Arc<DedupStore>,
        alert_repository: Arc<AlertRepository>,
        device_repository: Arc<DeviceRepository>,
        dispatcher: Arc<NotificationDispatcher>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            dedup_store,
            alert_repository,
            device_repository,
            dispatcher,
            event_bus,
        }
    }

    /**
     * Ingesta un HealthIssue por el embudo completo.
     *
     * # Logic:
     * - CreateNew  -> alta de alerta (count = 1) + alert.created + Herald.
     * - Duplicate  -> incremento, subida de severidad si procede
     *   (máx entre duración y escalado) + alert.updated + Herald.
     * - Suppressed -> silencio post-resolución o contención: sin efecto.
     */
    #[instrument(skip(self, issue), fields(device = %issue.device_id, issue = %issue.issue_type))]
    pub async fn ingest(&self, issue: HealthIssue) {
        let now = Utc::now();
        let verdict = self
            .dedup_store
            .evaluate_and_stamp(&issue.device_id, issue.issue_type, issue.severity, now)
            .await;

        let outcome = match verdict {
            DedupVerdict::CreateNew { alert_id } => self.create_alert(alert_id, &issue).await,
            DedupVerdict::Duplicate {
                alert_id,
                occurrence_count,
                escalate_to,
            } => {
                self.absorb_occurrence(alert_id, occurrence_count, escalate_to, &issue)
                    .await
            }
            DedupVerdict::Suppressed => {
                debug!("🤫 [ALERT_SUPPRESSED]: Issue absorbed by silence or contention.");
                Ok(())
            }
        };

        // Fail-open: el camino de alertas jamás propaga al llamador.
        if let Err(pipeline_fault) = outcome {
            warn!("⚠️ [ALERT_PIPELINE_FAULT]: {}. Issue processing degraded.", pipeline_fault);
        }
    }

    async fn create_alert(&self, alert_id: String, issue: &HealthIssue) -> Result<(), DbError> {
        let now = Utc::now();
        let alert = Alert {
            id: alert_id,
            device_id: Some(issue.device_id.clone()),
            severity: issue.severity,
            alert_type: issue.issue_type,
            title: issue.issue_type.to_string(),
            message: issue.message.clone(),
            status: AlertStatus::Active,
            metadata: issue.metadata.clone(),
            occurrence_count: 1,
            first_seen_at: now,
            last_seen_at: now,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
        };

        self.alert_repository.insert(&alert).await?;
        info!(
            "🚨 [ALERT_CREATED]: {} for device {} at {}.",
            alert.alert_type, issue.device_id, alert.severity
        );

        self.event_bus.publish_alert_created(&alert);
        self.dispatch_to_herald(&alert).await;
        Ok(())
    }

    async fn absorb_occurrence(
        &self,
        alert_id: String,
        occurrence_count: u32,
        escalate_to: Option<Severity>,
        issue: &HealthIssue,
    ) -> Result<(), DbError> {
        let now = Utc::now();
        self.alert_repository.record_occurrence(&alert_id, now).await?;

        let mut alert = match self.alert_repository.find_by_id(&alert_id).await? {
            Some(alert) => alert,
            None => {
                // Registro de dedup huérfano (alerta purgada a mano).
                warn!("⚠️ [ALERT_ORPHAN_DEDUP]: Record points to missing alert {}.", alert_id);
                return Ok(());
            }
        };

        // Máximo entre la escalera de duración del issue y la promoción
        // por contador; la severidad de una alerta jamás baja en caliente.
        let severity_target = [Some(issue.severity), escalate_to]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(alert.severity);

        if severity_target > alert.severity {
            self.alert_repository
                .promote_severity(&alert_id, severity_target)
                .await?;
            alert.severity = severity_target;
            if escalate_to.is_some() {
                info!(
                    "📈 [ALERT_ESCALATED]: Alert {} promoted to {} at occurrence {}.",
                    alert_id, severity_target, occurrence_count
                );
            }
        }

        alert.occurrence_count = occurrence_count;
        alert.last_seen_at = now;

        self.event_bus.publish_alert_updated(&alert);
        self.dispatch_to_herald(&alert).await;
        Ok(())
    }

    async fn dispatch_to_herald(&self, alert: &Alert) {
        let device_tags = match &alert.device_id {
            Some(device_id) => self
                .device_repository
                .find_by_id(device_id)
                .await
                .ok()
                .flatten()
                .map(|device| device.tags)
                .unwrap_or_default(),
            None => Vec::new(),
        };

        let outcome = self.dispatcher.dispatch(alert, &device_tags, Utc::now()).await;
        debug!(
            "📨 [HERALD_DISPATCH]: Alert {} matched {} rules ({} actions ok).",
            alert.id,
            outcome.matched_rule_ids.len(),
            outcome.actions_succeeded
        );
    }

    /**
     * Recuperación del dispositivo: resuelve las alertas activas del
     * tipo, desarma el dedup y arma el periodo de silencio.
     */
    #[instrument(skip(self), fields(device = %device_id, issue = %alert_type))]
    pub async fn resolve_device_alerts(&self, device_id: &str, alert_type: AlertType) {
        let resolved_ids = match self
            .alert_repository
            .resolve_by_device_and_type(device_id, alert_type)
            .await
        {
            Ok(ids) => ids,
            Err(ledger_fault) => {
                warn!("⚠️ [RECOVERY_FAULT]: Alert resolution degraded: {}", ledger_fault);
                return;
            }
        };

        for alert_id in &resolved_ids {
            self.dispatcher.on_alert_closed(alert_id);
            self.event_bus.publish_alert_resolved(alert_id, Some(device_id));
        }

        if let Err(kv_fault) = self
            .dedup_store
            .clear_and_arm_silence(device_id, alert_type)
            .await
        {
            warn!("⚠️ [RECOVERY_FAULT]: Silence arming degraded: {}", kv_fault);
        }
    }

    /// Cierre administrativo (ack/resolve manual): desarma el escalado.
    pub fn on_alert_closed(&self, alert_id: &str) {
        self.dispatcher.on_alert_closed(alert_id);
    }

    /// Disparos de escalado temporal vencidos (alertas sin reconocer).
    pub async fn tick_escalations(&self) {
        let due = self.dispatcher.collect_due_escalations(Utc::now());
        for escalation in due {
            let alert = match self.alert_repository.find_by_id(&escalation.alert_id).await {
                Ok(Some(alert)) => alert,
                _ => {
                    self.dispatcher.on_alert_closed(&escalation.alert_id);
                    continue;
                }
            };

            if alert.status != AlertStatus::Active {
                // El operador atendió la alerta: el temporizador muere.
                self.dispatcher.on_alert_closed(&escalation.alert_id);
                continue;
            }

            info!(
                "⏰ [ESCALATION_FIRE]: Alert {} unacknowledged; firing {} actions (round {}).",
                escalation.alert_id,
                escalation.actions.len(),
                escalation.fire_index
            );
            for action in &escalation.actions {
                self.dispatcher.execute_with_retries(action, &alert).await;
            }
        }
    }
}
