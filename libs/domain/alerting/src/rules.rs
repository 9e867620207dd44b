// [libs/domain/alerting/src/rules.rs]
/*!
 * =================================================================
 * APARATO: HEALTH PROBE RULES (V4.1 - THRESHOLD TUNABLE)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: EVALUACIÓN PURA DE REGLAS DE SALUD DEL MESH
 *
 * # Logic:
 * Cuatro reglas inspeccionan el estado observado de cada dispositivo:
 *   - device-offline : ausencia de latido sobre el umbral, severidad
 *                      por escalera de duración.
 *   - high-latency   : p95 de la ventana de sesiones sobre el umbral.
 *   - tunnel-failure : telemetría de fallos de establecimiento.
 *   - key-expiring   : llave activa con caducidad dentro del horizonte.
 * El orquestador aporta reloj y telemetría; la evaluación es pura.
 * =================================================================
 */

use crate::issue::{offline_severity, HealthIssue};
use chrono::{DateTime, Duration, Utc};
use edgelink_domain_models::{AlertType, Device, DeviceKey, Severity};
use serde::{Deserialize, Serialize};

/// Umbrales de la sonda. Todos configurables; los defaults reflejan la
/// operación nominal del mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRulesConfig {
    /// Ausencia de latido que marca un dispositivo como offline (seg).
    #[serde(rename = "offline_threshold_seconds")]
    pub offline_threshold_seconds: i64,

    /// Umbral de latencia p95 en milisegundos.
    #[serde(rename = "latency_p95_threshold_ms")]
    pub latency_p95_threshold_ms: f64,

    /// Horizonte de preaviso de caducidad de llaves (días).
    #[serde(rename = "key_expiry_horizon_days")]
    pub key_expiry_horizon_days: i64,
}

impl Default for HealthRulesConfig {
    fn default() -> Self {
        Self {
            offline_threshold_seconds: 300,
            latency_p95_threshold_ms: 200.0,
            key_expiry_horizon_days: 7,
        }
    }
}

pub struct HealthRulesEngine {
    config: HealthRulesConfig,
}

impl HealthRulesEngine {
    #[must_use]
    pub fn new(config: HealthRulesConfig) -> Self {
        Self { config }
    }

    /**
     * Regla 'device-offline'. Evalúa la recencia del último latido;
     * la severidad crece con la duración de la ausencia.
     */
    pub fn evaluate_offline(&self, device: &Device, now: DateTime<Utc>) -> Option<HealthIssue> {
        let last_seen = device.last_seen_at?;
        let silent_for = now - last_seen;

        if silent_for < Duration::seconds(self.config.offline_threshold_seconds) {
            return None;
        }

        let minutes_offline = silent_for.num_minutes();
        Some(
            HealthIssue::new(
                &device.id,
                AlertType::DeviceOffline,
                offline_severity(silent_for),
                format!(
                    "Device '{}' has been silent for {} minutes.",
                    device.name, minutes_offline
                ),
            )
            .with_metadata("minutes_offline", minutes_offline.to_string())
            .with_metadata("last_seen_at", last_seen.to_rfc3339()),
        )
    }

    /**
     * Regla 'high-latency' sobre el p95 de la ventana rodante de
     * latencias de sesión del dispositivo.
     */
    pub fn evaluate_latency(&self, device: &Device, window_latencies: &[f64]) -> Option<HealthIssue> {
        if window_latencies.is_empty() {
            return None;
        }

        let mut ordered = window_latencies.to_vec();
        ordered.sort_by(|left, right| left.partial_cmp(right).unwrap_or(std::cmp::Ordering::Equal));
        let rank = ((ordered.len() as f64) * 0.95).ceil() as usize;
        let p95 = ordered[rank.clamp(1, ordered.len()) - 1];

        if p95 <= self.config.latency_p95_threshold_ms {
            return None;
        }

        Some(
            HealthIssue::new(
                &device.id,
                AlertType::HighLatency,
                Severity::High,
                format!(
                    "Device '{}' session latency p95 at {:.1} ms (threshold {:.0} ms).",
                    device.name, p95, self.config.latency_p95_threshold_ms
                ),
            )
            .with_metadata("latency_p95_ms", format!("{p95:.1}")),
        )
    }

    /// Regla 'tunnel-failure' sobre telemetría de fallos reportados.
    pub fn evaluate_tunnel_failures(
        &self,
        device: &Device,
        failures_in_window: u32,
    ) -> Option<HealthIssue> {
        if failures_in_window == 0 {
            return None;
        }

        Some(
            HealthIssue::new(
                &device.id,
                AlertType::TunnelFailure,
                Severity::High,
                format!(
                    "Device '{}' reported {} tunnel establishment failures.",
                    device.name, failures_in_window
                ),
            )
            .with_metadata("failure_count", failures_in_window.to_string()),
        )
    }

    /// Regla 'key-expiring' dentro del horizonte de preaviso.
    pub fn evaluate_key_expiry(
        &self,
        device: &Device,
        active_key: &DeviceKey,
        now: DateTime<Utc>,
    ) -> Option<HealthIssue> {
        let days_remaining = active_key.days_until_expiry(now)?;
        if days_remaining < 0 || days_remaining > self.config.key_expiry_horizon_days {
            return None;
        }

        Some(
            HealthIssue::new(
                &device.id,
                AlertType::KeyExpiring,
                Severity::Medium,
                format!(
                    "Device '{}' signing key expires in {} days.",
                    device.name, days_remaining
                ),
            )
            .with_metadata("days_remaining", days_remaining.to_string())
            .with_metadata("key_id", active_key.id.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgelink_domain_models::{KeyStatus, NatType, Platform};

    fn build_device(last_seen_minutes_ago: i64) -> Device {
        Device {
            id: "dev-1".into(),
            virtual_network_id: "net-1".into(),
            name: "edge-01".into(),
            virtual_ip: "10.99.0.2".into(),
            public_key: "pk".into(),
            platform: Platform::Linux,
            nat_type: NatType::Unknown,
            public_endpoint: None,
            tags: vec![],
            online: true,
            last_seen_at: Some(Utc::now() - Duration::minutes(last_seen_minutes_ago)),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn recent_heartbeat_produces_no_offline_issue() {
        let engine = HealthRulesEngine::new(HealthRulesConfig::default());
        assert!(engine.evaluate_offline(&build_device(2), Utc::now()).is_none());
    }

    #[test]
    fn offline_issue_severity_follows_duration_ladder() {
        let engine = HealthRulesEngine::new(HealthRulesConfig::default());

        let medium = engine.evaluate_offline(&build_device(6), Utc::now()).unwrap();
        assert_eq!(medium.severity, Severity::Medium);

        let high = engine.evaluate_offline(&build_device(20), Utc::now()).unwrap();
        assert_eq!(high.severity, Severity::High);

        let critical = engine.evaluate_offline(&build_device(90), Utc::now()).unwrap();
        assert_eq!(critical.severity, Severity::Critical);
    }

    #[test]
    fn latency_rule_fires_only_above_threshold() {
        let engine = HealthRulesEngine::new(HealthRulesConfig::default());
        let device = build_device(0);

        let calm: Vec<f64> = vec![20.0, 30.0, 45.0, 50.0];
        assert!(engine.evaluate_latency(&device, &calm).is_none());

        let degraded: Vec<f64> = (0..100).map(|i| 100.0 + (i as f64) * 3.0).collect();
        let issue = engine.evaluate_latency(&device, &degraded).unwrap();
        assert_eq!(issue.issue_type, AlertType::HighLatency);
        assert_eq!(issue.severity, Severity::High);
    }

    #[test]
    fn key_expiry_rule_honors_horizon() {
        let engine = HealthRulesEngine::new(HealthRulesConfig::default());
        let device = build_device(0);
        let now = Utc::now();

        let expiring_key = DeviceKey {
            id: "key-1".into(),
            device_id: "dev-1".into(),
            public_key: "pk".into(),
            status: KeyStatus::Active,
            valid_from: now,
            expires_at: Some(now + Duration::days(3)),
        };
        let issue = engine.evaluate_key_expiry(&device, &expiring_key, now).unwrap();
        assert_eq!(issue.issue_type, AlertType::KeyExpiring);
        assert_eq!(issue.severity, Severity::Medium);

        let distant_key = DeviceKey {
            expires_at: Some(now + Duration::days(30)),
            ..expiring_key.clone()
        };
        assert!(engine.evaluate_key_expiry(&device, &distant_key, now).is_none());

        let perpetual_key = DeviceKey {
            expires_at: None,
            ..expiring_key
        };
        assert!(engine.evaluate_key_expiry(&device, &perpetual_key, now).is_none());
    }
}
