// [libs/domain/models/src/device_key.rs]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ciclo de vida de una llave de dispositivo. Exactamente una llave
/// 'active' existe por dispositivo en todo momento; la rotación crea la
/// sucesora y degrada la anterior en la misma transacción.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyStatus {
    Active,
    PendingRotation,
    Revoked,
    Expired,
}

impl KeyStatus {
    pub fn as_wire(&self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::PendingRotation => "pending-rotation",
            KeyStatus::Revoked => "revoked",
            KeyStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_wire())
    }
}

impl FromStr for KeyStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "active" => Ok(KeyStatus::Active),
            "pending-rotation" => Ok(KeyStatus::PendingRotation),
            "revoked" => Ok(KeyStatus::Revoked),
            "expired" => Ok(KeyStatus::Expired),
            other => Err(format!("UNKNOWN_KEY_STATUS: {other}")),
        }
    }
}

/// Material público de firma asociado a un dispositivo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceKey {
    pub id: String,

    #[serde(rename = "device_id")]
    pub device_id: String,

    /// Llave pública ed25519 (base64) usada para verificar firmas de petición.
    #[serde(rename = "public_key")]
    pub public_key: String,

    pub status: KeyStatus,

    #[serde(rename = "valid_from")]
    pub valid_from: DateTime<Utc>,

    #[serde(rename = "expires_at")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl DeviceKey {
    /// Una llave es operativa si está 'active' y no ha caducado.
    pub fn is_operational(&self, now: DateTime<Utc>) -> bool {
        self.status == KeyStatus::Active && !self.is_expired(now)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map(|deadline| now >= deadline)
            .unwrap_or(false)
    }

    /// Días restantes hasta la caducidad, si la llave tiene fecha límite.
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|deadline| (deadline - now).num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn build_key(status: KeyStatus, expires_in_hours: Option<i64>) -> DeviceKey {
        let now = Utc::now();
        DeviceKey {
            id: "key-1".into(),
            device_id: "dev-1".into(),
            public_key: "pk".into(),
            status,
            valid_from: now,
            expires_at: expires_in_hours.map(|hours| now + Duration::hours(hours)),
        }
    }

    #[test]
    fn active_unexpired_key_is_operational() {
        let key = build_key(KeyStatus::Active, Some(24));
        assert!(key.is_operational(Utc::now()));
    }

    #[test]
    fn revoked_key_is_never_operational() {
        let key = build_key(KeyStatus::Revoked, None);
        assert!(!key.is_operational(Utc::now()));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let key = build_key(KeyStatus::Active, Some(0));
        assert!(!key.is_operational(Utc::now() + Duration::seconds(1)));
    }
}
