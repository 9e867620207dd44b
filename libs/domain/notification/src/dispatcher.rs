// [libs/domain/notification/src/dispatcher.rs]
/*!
 * =================================================================
 * APARATO: NOTIFICATION DISPATCHER (V4.3 - FALLBACK GUARANTEED)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: MATCH -> PRIORIDAD -> RATE LIMIT -> EJECUCIÓN
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ORDERED FIRING: Las reglas satisfechas disparan en prioridad
 *    ascendente; dentro de una regla las acciones conservan su orden
 *    declarado.
 * 2. QUIET RATE DROP: Una regla sobre su cuota pierde sus acciones
 *    para ese evento sin error: el silencio es la señal.
 * 3. FALLBACK MAP: Con el motor deshabilitado o el conjunto vacío, el
 *    mapa severidad -> canal (critical→page, high→chat, resto→email)
 *    garantiza que ninguna alerta muera sin canal.
 * 4. ATOMIC RULE SWAP: La recarga en caliente intercambia el Arc del
 *    conjunto bajo un RwLock de escritura breve.
 * =================================================================
 */

use crate::actions::{ActionError, ActionSpec, ActionType};
use crate::conditions::{AlertContext, RegexCache};
use crate::escalation::{DueEscalation, EscalationScheduler};
use crate::rate_limit::SlidingWindowTracker;
use crate::rules::RuleSet;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edgelink_domain_models::{Alert, Severity};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, instrument, warn};

/// Capacidad de ejecución de una acción contra su canal. Los adaptadores
/// concretos (SMTP, webhooks, chat) viven en el estrato L4.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &ActionSpec, alert: &Alert) -> Result<(), ActionError>;
}

/// Resultado contable del despacho de un evento.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub matched_rule_ids: Vec<String>,
    pub rate_limited_rule_ids: Vec<String>,
    pub actions_attempted: u32,
    pub actions_succeeded: u32,
    pub fallback_used: bool,
}

pub struct NotificationDispatcher {
    active_rule_set: RwLock<Arc<RuleSet>>,
    regex_cache: RegexCache,
    rate_tracker: SlidingWindowTracker,
    escalations: EscalationScheduler,
    executor: Arc<dyn ActionExecutor>,
    engine_enabled: AtomicBool,
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        initial_rule_set: Arc<RuleSet>,
        engine_enabled: bool,
    ) -> Self {
        Self {
            active_rule_set: RwLock::new(initial_rule_set),
            regex_cache: RegexCache::default(),
            rate_tracker: SlidingWindowTracker::new(),
            escalations: EscalationScheduler::new(),
            executor,
            engine_enabled: AtomicBool::new(engine_enabled),
        }
    }

    /// Intercambio atómico del conjunto de reglas (recarga en caliente).
    pub fn swap_rules(&self, next_rule_set: Arc<RuleSet>) {
        let rule_count = next_rule_set.len();
        if let Ok(mut active_guard) = self.active_rule_set.write() {
            *active_guard = next_rule_set;
            info!("🔄 [HERALD_RELOAD]: Rule set swapped ({} rules active).", rule_count);
        }
    }

    pub fn set_engine_enabled(&self, enabled: bool) {
        self.engine_enabled.store(enabled, Ordering::Relaxed);
    }

    fn current_rules(&self) -> Arc<RuleSet> {
        self.active_rule_set
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|_| Arc::new(RuleSet::empty()))
    }

    /**
     * Despacha una alerta recién creada o actualizada a sus canales.
     *
     * # Logic:
     * 1. Motor apagado o conjunto vacío -> mapa de fallback.
     * 2. Matching puro sobre el conjunto vigente (ya priorizado).
     * 3. Por regla: cuota deslizante -> descarte silencioso si excede.
     * 4. Acciones habilitadas en orden, cada una con su bucle de
     *    reintentos; un fallo permanente aborta SOLO esa acción.
     * 5. Armado de temporizadores de escalado para alertas nuevas.
     */
    #[instrument(skip(self, alert, device_tags), fields(alert = %alert.id, severity = %alert.severity))]
    pub async fn dispatch(
        &self,
        alert: &Alert,
        device_tags: &[String],
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let rule_set = self.current_rules();

        if !self.engine_enabled.load(Ordering::Relaxed) || rule_set.is_empty() {
            return self.dispatch_fallback(alert, &mut outcome).await;
        }

        let context = AlertContext {
            alert,
            device_tags,
            now,
        };

        let matched = rule_set.matching_rules(&context, &self.regex_cache);
        if matched.is_empty() {
            debug!("📭 [HERALD_SILENT]: No rule matched alert {}.", alert.id);
            return outcome;
        }

        for rule in matched {
            outcome.matched_rule_ids.push(rule.id.clone());

            if let Some(rate_limit) = &rule.rate_limit {
                let scope_key = SlidingWindowTracker::scope_key(
                    rate_limit,
                    &rule.id,
                    alert.device_id.as_deref(),
                );
                if !self.rate_tracker.allow(&scope_key, rate_limit, now) {
                    debug!(
                        "🧯 [HERALD_THROTTLED]: Rule {} over quota for alert {}.",
                        rule.id, alert.id
                    );
                    outcome.rate_limited_rule_ids.push(rule.id.clone());
                    continue;
                }
            }

            for action in rule.actions.iter().filter(|action| action.enabled) {
                outcome.actions_attempted += 1;
                if self.execute_with_retries(action, alert).await {
                    outcome.actions_succeeded += 1;
                }
            }

            if let Some(escalation) = &rule.escalation {
                self.escalations.arm(&alert.id, &rule.id, escalation, now);
            }
        }

        outcome
    }

    async fn dispatch_fallback(
        &self,
        alert: &Alert,
        outcome: &mut DispatchOutcome,
    ) -> DispatchOutcome {
        outcome.fallback_used = true;

        let channel = match alert.severity {
            Severity::Critical => ActionType::Pagerduty,
            Severity::High => ActionType::Slack,
            Severity::Medium | Severity::Low => ActionType::Email,
        };
        warn!(
            "🛟 [HERALD_FALLBACK]: Engine inactive; routing alert {} to {}.",
            alert.id, channel
        );

        let synthesized = ActionSpec {
            action_type: channel,
            enabled: true,
            config: serde_json::Value::Null,
            retry_policy: None,
        };

        outcome.actions_attempted += 1;
        if self.execute_with_retries(&synthesized, alert).await {
            outcome.actions_succeeded += 1;
        }
        outcome.clone()
    }

    /// Bucle de reintentos de una acción: backoff exponencial, aborto
    /// temprano ante fallo permanente.
    pub async fn execute_with_retries(&self, action: &ActionSpec, alert: &Alert) -> bool {
        let policy = action.effective_retry_policy();

        for attempt in 1..=policy.max_attempts.max(1) {
            let pre_delay = policy.delay_before_attempt(attempt);
            if !pre_delay.is_zero() {
                tokio::time::sleep(pre_delay).await;
            }

            match self.executor.execute(action, alert).await {
                Ok(()) => return true,
                Err(fault) if fault.is_permanent() => {
                    warn!(
                        "⛔ [ACTION_ABORTED]: {} for alert {} permanent: {}",
                        action.action_type, alert.id, fault
                    );
                    return false;
                }
                Err(transient_fault) => {
                    warn!(
                        "🔁 [ACTION_RETRY]: {} attempt {}/{} for alert {}: {}",
                        action.action_type,
                        attempt,
                        policy.max_attempts,
                        alert.id,
                        transient_fault
                    );
                }
            }
        }
        false
    }

    // --- ESTRATO DE ESCALADO ---

    /// Disparos de escalado vencidos; el servicio de tick verifica que
    /// la alerta siga 'active' antes de ejecutar.
    pub fn collect_due_escalations(&self, now: DateTime<Utc>) -> Vec<DueEscalation> {
        self.escalations.collect_due(now)
    }

    /// La alerta abandonó 'active': todo temporizador muere con ella.
    pub fn on_alert_closed(&self, alert_id: &str) {
        self.escalations.disarm(alert_id);
    }

    pub fn armed_escalations(&self) -> usize {
        self.escalations.armed_count()
    }

    /// Poda periódica de las ventanas del limitador.
    pub fn prune_rate_windows(&self, now: DateTime<Utc>, widest_window_seconds: i64) -> usize {
        self.rate_tracker.prune(now, widest_window_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Ejecutor de prueba: registra el orden de disparo.
    struct RecordingExecutor {
        fired: Mutex<Vec<(ActionType, String)>>,
        fail_with: Option<fn() -> ActionError>,
    }

    impl RecordingExecutor {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                fired: Mutex::new(Vec::new()),
                fail_with: None,
            })
        }
    }

    #[async_trait]
    impl ActionExecutor for RecordingExecutor {
        async fn execute(&self, action: &ActionSpec, alert: &Alert) -> Result<(), ActionError> {
            self.fired
                .lock()
                .unwrap()
                .push((action.action_type, alert.id.clone()));
            match self.fail_with {
                Some(fault_factory) => Err(fault_factory()),
                None => Ok(()),
            }
        }
    }

    fn alert(severity: Severity) -> Alert {
        Alert {
            id: "alert-1".into(),
            device_id: Some("dev-1".into()),
            severity,
            alert_type: edgelink_domain_models::AlertType::DeviceOffline,
            title: "offline".into(),
            message: "device offline".into(),
            status: edgelink_domain_models::AlertStatus::Active,
            metadata: BTreeMap::new(),
            occurrence_count: 1,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
        }
    }

    const PRIORITY_DOCUMENT: &str = r#"{
        "version": 1,
        "rules": [
            {
                "id": "second", "name": "second", "priority": 20,
                "conditions": { "severity_in": ["high"] },
                "actions": [ { "type": "email" } ]
            },
            {
                "id": "first", "name": "first", "priority": 5,
                "conditions": { "severity_in": ["high"] },
                "actions": [ { "type": "slack" } ]
            }
        ]
    }"#;

    #[tokio::test]
    async fn rules_fire_in_priority_order() {
        let executor = RecordingExecutor::ok();
        let rule_set = Arc::new(RuleSet::from_json(PRIORITY_DOCUMENT).unwrap());
        let dispatcher = NotificationDispatcher::new(executor.clone(), rule_set, true);

        let outcome = dispatcher.dispatch(&alert(Severity::High), &[], Utc::now()).await;
        assert_eq!(outcome.matched_rule_ids, vec!["first", "second"]);

        let fired = executor.fired.lock().unwrap();
        assert_eq!(fired[0].0, ActionType::Slack);
        assert_eq!(fired[1].0, ActionType::Email);
    }

    #[tokio::test]
    async fn disabled_engine_uses_severity_fallback() {
        let executor = RecordingExecutor::ok();
        let dispatcher =
            NotificationDispatcher::new(executor.clone(), Arc::new(RuleSet::empty()), false);

        let outcome = dispatcher
            .dispatch(&alert(Severity::Critical), &[], Utc::now())
            .await;
        assert!(outcome.fallback_used);

        let fired = executor.fired.lock().unwrap();
        assert_eq!(fired[0].0, ActionType::Pagerduty);
    }

    #[tokio::test]
    async fn fallback_maps_low_and_medium_to_email() {
        let executor = RecordingExecutor::ok();
        let dispatcher =
            NotificationDispatcher::new(executor.clone(), Arc::new(RuleSet::empty()), true);

        dispatcher.dispatch(&alert(Severity::Medium), &[], Utc::now()).await;
        dispatcher.dispatch(&alert(Severity::Low), &[], Utc::now()).await;

        let fired = executor.fired.lock().unwrap();
        assert!(fired.iter().all(|(channel, _)| *channel == ActionType::Email));
    }

    #[tokio::test]
    async fn rate_limit_quietly_drops_over_quota_events() {
        let executor = RecordingExecutor::ok();
        let document = r#"{
            "version": 1,
            "rules": [
                {
                    "id": "limited", "name": "limited", "priority": 1,
                    "conditions": { "severity_in": ["high"] },
                    "actions": [ { "type": "slack" } ],
                    "rate_limit": { "max": 2, "window_seconds": 3600, "scope": "per-device" }
                }
            ]
        }"#;
        let dispatcher = NotificationDispatcher::new(
            executor.clone(),
            Arc::new(RuleSet::from_json(document).unwrap()),
            true,
        );

        let probe = alert(Severity::High);
        for _ in 0..5 {
            dispatcher.dispatch(&probe, &[], Utc::now()).await;
        }

        assert_eq!(executor.fired.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn permanent_fault_aborts_single_action_without_retries() {
        let executor = Arc::new(RecordingExecutor {
            fired: Mutex::new(Vec::new()),
            fail_with: Some(|| ActionError::Permanent("HTTP_404".into())),
        });
        let document = r#"{
            "version": 1,
            "rules": [
                {
                    "id": "r", "name": "r", "priority": 1,
                    "conditions": { "severity_in": ["high"] },
                    "actions": [ { "type": "webhook" } ]
                }
            ]
        }"#;
        let dispatcher = NotificationDispatcher::new(
            executor.clone(),
            Arc::new(RuleSet::from_json(document).unwrap()),
            true,
        );

        let outcome = dispatcher.dispatch(&alert(Severity::High), &[], Utc::now()).await;
        assert_eq!(outcome.actions_attempted, 1);
        assert_eq!(outcome.actions_succeeded, 0);
        // Un fallo permanente consume exactamente un intento.
        assert_eq!(executor.fired.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn escalation_arms_and_disarms_with_alert_lifecycle() {
        let executor = RecordingExecutor::ok();
        let document = r#"{
            "version": 1,
            "rules": [
                {
                    "id": "esc", "name": "esc", "priority": 1,
                    "conditions": { "severity_in": ["high"] },
                    "actions": [ { "type": "slack" } ],
                    "escalation": {
                        "enabled": true, "wait_seconds": 60,
                        "repeat_seconds": 0, "max_repeat": 1,
                        "actions": [ { "type": "pagerduty" } ]
                    }
                }
            ]
        }"#;
        let dispatcher = NotificationDispatcher::new(
            executor,
            Arc::new(RuleSet::from_json(document).unwrap()),
            true,
        );

        dispatcher.dispatch(&alert(Severity::High), &[], Utc::now()).await;
        assert_eq!(dispatcher.armed_escalations(), 1);

        dispatcher.on_alert_closed("alert-1");
        assert_eq!(dispatcher.armed_escalations(), 0);
    }
}
