// [libs/domain/models/src/alert.rs]
/*!
 * =================================================================
 * APARATO: OPERATIONAL ALERT ENTITY (V4.2 - MONOTONIC MACHINE)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: ALERTAS, SEVERIDADES Y MÁQUINA DE ESTADOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. MONOTONIC SOVEREIGNTY: Las transiciones de estado solo avanzan
 *    (active → acknowledged → resolved); 'resolved' es terminal salvo
 *    la reapertura automática tras el periodo de silencio.
 * 2. ESCALATION LADDER: La promoción de severidad sube exactamente un
 *    peldaño (low → medium → high → critical) y satura en critical.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Severidad operativa en orden total ascendente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Promoción de un peldaño con saturación en 'critical'.
    pub fn escalated(&self) -> Severity {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium => Severity::High,
            Severity::High => Severity::Critical,
            Severity::Critical => Severity::Critical,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_wire())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("UNKNOWN_SEVERITY: {other}")),
        }
    }
}

/// Taxonomía semántica de la causa de la alerta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertType {
    DeviceOffline,
    HighLatency,
    TunnelFailure,
    KeyExpiring,
    KeyExpired,
    SecurityAnomaly,
}

impl AlertType {
    pub fn as_wire(&self) -> &'static str {
        match self {
            AlertType::DeviceOffline => "device-offline",
            AlertType::HighLatency => "high-latency",
            AlertType::TunnelFailure => "tunnel-failure",
            AlertType::KeyExpiring => "key-expiring",
            AlertType::KeyExpired => "key-expired",
            AlertType::SecurityAnomaly => "security-anomaly",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_wire())
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "device-offline" => Ok(AlertType::DeviceOffline),
            "high-latency" => Ok(AlertType::HighLatency),
            "tunnel-failure" => Ok(AlertType::TunnelFailure),
            "key-expiring" => Ok(AlertType::KeyExpiring),
            "key-expired" => Ok(AlertType::KeyExpired),
            "security-anomaly" => Ok(AlertType::SecurityAnomaly),
            other => Err(format!("UNKNOWN_ALERT_TYPE: {other}")),
        }
    }
}

/// Estado de tratamiento de la alerta por parte del operador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_wire(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }

    /// La máquina es monotónica: solo se avanza hacia 'resolved'.
    pub fn can_transition_to(&self, target: AlertStatus) -> bool {
        matches!(
            (self, target),
            (AlertStatus::Active, AlertStatus::Acknowledged)
                | (AlertStatus::Active, AlertStatus::Resolved)
                | (AlertStatus::Acknowledged, AlertStatus::Resolved)
        )
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_wire())
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "active" => Ok(AlertStatus::Active),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(format!("UNKNOWN_ALERT_STATUS: {other}")),
        }
    }
}

/// Alerta operativa deduplicada del plano de control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,

    #[serde(rename = "device_id")]
    pub device_id: Option<String>,

    pub severity: Severity,

    #[serde(rename = "alert_type")]
    pub alert_type: AlertType,

    pub title: String,
    pub message: String,

    pub status: AlertStatus,

    /// Contexto opaco clave/valor; el núcleo jamás lo interpreta.
    pub metadata: BTreeMap<String, String>,

    /// Ocurrencias absorbidas dentro de la ventana de deduplicación.
    #[serde(rename = "occurrence_count")]
    pub occurrence_count: u32,

    #[serde(rename = "first_seen_at")]
    pub first_seen_at: DateTime<Utc>,

    #[serde(rename = "last_seen_at")]
    pub last_seen_at: DateTime<Utc>,

    #[serde(rename = "acknowledged_by")]
    pub acknowledged_by: Option<String>,

    #[serde(rename = "acknowledged_at")]
    pub acknowledged_at: Option<DateTime<Utc>>,

    #[serde(rename = "resolved_at")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order_is_total_and_ascending() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn escalation_ladder_saturates_at_critical() {
        assert_eq!(Severity::Low.escalated(), Severity::Medium);
        assert_eq!(Severity::Medium.escalated(), Severity::High);
        assert_eq!(Severity::High.escalated(), Severity::Critical);
        assert_eq!(Severity::Critical.escalated(), Severity::Critical);
    }

    #[test]
    fn status_machine_is_monotonic() {
        assert!(AlertStatus::Active.can_transition_to(AlertStatus::Acknowledged));
        assert!(AlertStatus::Active.can_transition_to(AlertStatus::Resolved));
        assert!(AlertStatus::Acknowledged.can_transition_to(AlertStatus::Resolved));

        // Retrocesos prohibidos
        assert!(!AlertStatus::Acknowledged.can_transition_to(AlertStatus::Active));
        assert!(!AlertStatus::Resolved.can_transition_to(AlertStatus::Active));
        assert!(!AlertStatus::Resolved.can_transition_to(AlertStatus::Acknowledged));
    }

    #[test]
    fn alert_type_wire_round_trip() {
        for alert_type in [
            AlertType::DeviceOffline,
            AlertType::HighLatency,
            AlertType::TunnelFailure,
            AlertType::KeyExpiring,
            AlertType::KeyExpired,
            AlertType::SecurityAnomaly,
        ] {
            assert_eq!(AlertType::from_str(alert_type.as_wire()), Ok(alert_type));
        }
    }
}
