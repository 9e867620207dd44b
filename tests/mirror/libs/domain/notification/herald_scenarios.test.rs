// [tests/mirror/libs/domain/notification/herald_scenarios.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE ESCENARIOS HERALD (V4.1 - MESH)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L2-MIRROR
 * RESPONSABILIDAD: RANGOS HORARIOS, PRECEDENCIA Y CUOTAS POR REGLA
 * =================================================================
 */

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use edgelink_domain_models::{Alert, AlertStatus, AlertType, Severity};
use edgelink_domain_notification::{
    ActionError, ActionExecutor, ActionSpec, ActionType, NotificationDispatcher, RuleSet,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Ejecutor espía: registra cada disparo de canal.
struct SpyExecutor {
    fired: Mutex<Vec<ActionType>>,
}

impl SpyExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            fired: Mutex::new(Vec::new()),
        })
    }

    fn fired_channels(&self) -> Vec<ActionType> {
        self.fired.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionExecutor for SpyExecutor {
    async fn execute(&self, action: &ActionSpec, _alert: &Alert) -> Result<(), ActionError> {
        self.fired.lock().unwrap().push(action.action_type);
        Ok(())
    }
}

fn high_alert(device_id: &str) -> Alert {
    Alert {
        id: format!("alert-{device_id}"),
        device_id: Some(device_id.to_string()),
        severity: Severity::High,
        alert_type: AlertType::DeviceOffline,
        title: "device-offline".into(),
        message: "device offline beyond threshold".into(),
        status: AlertStatus::Active,
        metadata: BTreeMap::new(),
        occurrence_count: 1,
        first_seen_at: Utc::now(),
        last_seen_at: Utc::now(),
        acknowledged_by: None,
        acknowledged_at: None,
        resolved_at: None,
    }
}

fn shanghai_instant(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    chrono_tz::Asia::Shanghai
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

const OFFICE_HOURS_DOCUMENT: &str = r#"{
    "version": 1,
    "rules": [
        {
            "id": "office-hours",
            "name": "Office hours responder",
            "priority": 10,
            "conditions": {
                "all_of": [
                    { "severity_in": ["high"] },
                    { "time_range": {
                        "start": "09:00", "end": "18:00",
                        "timezone": "Asia/Shanghai",
                        "weekdays": ["mon", "tue", "wed", "thu", "fri"]
                    } }
                ]
            },
            "actions": [ { "type": "slack" } ]
        }
    ]
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * ESCENARIO HORARIO: martes 10:00 dispara Slack una vez; sábado
     * 10:00 y lunes 18:01 no disparan nada.
     */
    #[tokio::test]
    async fn office_hours_rule_fires_only_inside_the_window() {
        let spy = SpyExecutor::new();
        let dispatcher = NotificationDispatcher::new(
            spy.clone(),
            Arc::new(RuleSet::from_json(OFFICE_HOURS_DOCUMENT).unwrap()),
            true,
        );
        let alert = high_alert("dev-1");

        // Martes 2026-03-03 10:00 Asia/Shanghai: dispara.
        let tuesday = dispatcher
            .dispatch(&alert, &[], shanghai_instant(2026, 3, 3, 10, 0))
            .await;
        assert_eq!(tuesday.matched_rule_ids, vec!["office-hours"]);
        assert_eq!(spy.fired_channels(), vec![ActionType::Slack]);

        // Sábado 2026-03-07 10:00: silencio.
        let saturday = dispatcher
            .dispatch(&alert, &[], shanghai_instant(2026, 3, 7, 10, 0))
            .await;
        assert!(saturday.matched_rule_ids.is_empty());

        // Lunes 2026-03-02 18:01: fuera por un minuto.
        let monday_after_close = dispatcher
            .dispatch(&alert, &[], shanghai_instant(2026, 3, 2, 18, 1))
            .await;
        assert!(monday_after_close.matched_rule_ids.is_empty());

        // Exactamente un disparo total.
        assert_eq!(spy.fired_channels().len(), 1);
    }

    /// PRECEDENCIA: R1.priority < R2.priority implica orden R1 -> R2.
    #[tokio::test]
    async fn matching_rules_fire_in_priority_order() {
        let document = r#"{
            "version": 1,
            "rules": [
                { "id": "late", "name": "late", "priority": 50,
                  "conditions": { "severity_in": ["high"] },
                  "actions": [ { "type": "email" } ] },
                { "id": "early", "name": "early", "priority": 1,
                  "conditions": { "severity_in": ["high"] },
                  "actions": [ { "type": "pagerduty" } ] }
            ]
        }"#;

        let spy = SpyExecutor::new();
        let dispatcher = NotificationDispatcher::new(
            spy.clone(),
            Arc::new(RuleSet::from_json(document).unwrap()),
            true,
        );

        let outcome = dispatcher.dispatch(&high_alert("dev-1"), &[], Utc::now()).await;
        assert_eq!(outcome.matched_rule_ids, vec!["early", "late"]);
        assert_eq!(
            spy.fired_channels(),
            vec![ActionType::Pagerduty, ActionType::Email]
        );
    }

    /**
     * INTERACCIÓN DEDUP + CUOTA: cinco actualizaciones de la misma
     * alerta bajo cuota per-device max=3 admiten exactamente 3 disparos.
     */
    #[tokio::test]
    async fn per_device_quota_admits_exactly_max_fires() {
        let document = r#"{
            "version": 1,
            "rules": [
                {
                    "id": "offline-page", "name": "offline page", "priority": 1,
                    "conditions": { "alert_type_in": ["device-offline"] },
                    "actions": [ { "type": "slack" } ],
                    "rate_limit": { "max": 3, "window_seconds": 3600, "scope": "per-device" }
                }
            ]
        }"#;

        let spy = SpyExecutor::new();
        let dispatcher = NotificationDispatcher::new(
            spy.clone(),
            Arc::new(RuleSet::from_json(document).unwrap()),
            true,
        );

        // Una creación + cuatro actualizaciones absorbidas por dedup.
        let alert = high_alert("dev-1");
        for _ in 0..5 {
            dispatcher.dispatch(&alert, &[], Utc::now()).await;
        }
        assert_eq!(spy.fired_channels().len(), 3);

        // Otro dispositivo porta su propia cuota.
        let other_device_alert = high_alert("dev-2");
        dispatcher.dispatch(&other_device_alert, &[], Utc::now()).await;
        assert_eq!(spy.fired_channels().len(), 4);
    }

    /// SILENCIO POR REGLA: la ventana mata la regla solo para ese evento.
    #[tokio::test]
    async fn silence_window_kills_the_rule_for_that_event_only() {
        let document = r#"{
            "version": 1,
            "rules": [
                {
                    "id": "quiet-nights", "name": "quiet nights", "priority": 1,
                    "conditions": { "severity_in": ["high"] },
                    "actions": [ { "type": "slack" } ],
                    "silence": [ {
                        "start": "22:00", "end": "06:00",
                        "timezone": "Asia/Shanghai",
                        "weekdays": []
                    } ]
                }
            ]
        }"#;

        let spy = SpyExecutor::new();
        let dispatcher = NotificationDispatcher::new(
            spy.clone(),
            Arc::new(RuleSet::from_json(document).unwrap()),
            true,
        );
        let alert = high_alert("dev-1");

        // 23:00 local: silenciada.
        let night = dispatcher
            .dispatch(&alert, &[], shanghai_instant(2026, 3, 3, 23, 0))
            .await;
        assert!(night.matched_rule_ids.is_empty());

        // 12:00 local: despierta.
        let noon = dispatcher
            .dispatch(&alert, &[], shanghai_instant(2026, 3, 3, 12, 0))
            .await;
        assert_eq!(noon.matched_rule_ids, vec!["quiet-nights"]);
        assert_eq!(spy.fired_channels().len(), 1);
    }
}
