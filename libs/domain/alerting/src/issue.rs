// [libs/domain/alerting/src/issue.rs]

use chrono::Duration;
use edgelink_domain_models::{AlertType, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hallazgo puntual de la sonda de salud. Cada issue atraviesa la ruta
/// de deduplicación antes de materializarse (o no) como alerta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthIssue {
    #[serde(rename = "device_id")]
    pub device_id: String,

    #[serde(rename = "issue_type")]
    pub issue_type: AlertType,

    pub severity: Severity,

    pub message: String,

    /// Contexto opaco adjuntado a la alerta resultante.
    pub metadata: BTreeMap<String, String>,
}

impl HealthIssue {
    pub fn new(
        device_id: &str,
        issue_type: AlertType,
        severity: Severity,
        message: String,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            issue_type,
            severity,
            message,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: String) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Escalera de severidad del issue 'device-offline': crece con la
/// duración de la ausencia (≥5 min medium, ≥15 min high, ≥60 min critical).
pub fn offline_severity(offline_for: Duration) -> Severity {
    if offline_for >= Duration::minutes(60) {
        Severity::Critical
    } else if offline_for >= Duration::minutes(15) {
        Severity::High
    } else {
        Severity::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_ladder_boundaries() {
        assert_eq!(offline_severity(Duration::minutes(5)), Severity::Medium);
        assert_eq!(offline_severity(Duration::minutes(14)), Severity::Medium);
        assert_eq!(offline_severity(Duration::minutes(15)), Severity::High);
        assert_eq!(offline_severity(Duration::minutes(59)), Severity::High);
        assert_eq!(offline_severity(Duration::minutes(60)), Severity::Critical);
        assert_eq!(offline_severity(Duration::hours(5)), Severity::Critical);
    }
}
