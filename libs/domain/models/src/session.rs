// [libs/domain/models/src/session.rs]
/*!
 * =================================================================
 * APARATO: TUNNEL SESSION ENTITY (V4.0 - CANONICAL PAIR)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: REGISTRO DE SESIONES DE TÚNEL CON ORDEN CANÓNICO
 *
 * # Mathematical Proof (Pair Canonicalization):
 * Para todo par (x, y) con x ≠ y existe exactamente una forma canónica
 * {device_a = min(x,y), device_b = max(x,y)}. La relación A↔B produce
 * por tanto una única fila por intento de conexión.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Naturaleza del camino de datos decidido por el coordinador NAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionType {
    P2pDirect,
    TurnRelay,
}

impl ConnectionType {
    pub fn as_wire(&self) -> &'static str {
        match self {
            ConnectionType::P2pDirect => "p2p-direct",
            ConnectionType::TurnRelay => "turn-relay",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_wire())
    }
}

impl FromStr for ConnectionType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "p2p-direct" => Ok(ConnectionType::P2pDirect),
            "turn-relay" => Ok(ConnectionType::TurnRelay),
            other => Err(format!("UNKNOWN_CONNECTION_TYPE: {other}")),
        }
    }
}

/// Sesión de túnel entre dos dispositivos. Invariante estructural:
/// `device_a_id < device_b_id` (orden canónico).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,

    #[serde(rename = "device_a_id")]
    pub device_a_id: String,

    #[serde(rename = "device_b_id")]
    pub device_b_id: String,

    #[serde(rename = "connection_type")]
    pub connection_type: ConnectionType,

    #[serde(rename = "started_at")]
    pub started_at: DateTime<Utc>,

    #[serde(rename = "ended_at")]
    pub ended_at: Option<DateTime<Utc>>,

    #[serde(rename = "last_handshake_at")]
    pub last_handshake_at: Option<DateTime<Utc>>,

    #[serde(rename = "bytes_sent")]
    pub bytes_sent: u64,

    #[serde(rename = "bytes_received")]
    pub bytes_received: u64,

    #[serde(rename = "avg_latency_ms")]
    pub avg_latency_ms: Option<f64>,
}

impl Session {
    /**
     * Proyecta un par arbitrario (x, y) a su forma canónica ordenada.
     *
     * # Errors:
     * Retorna `None` si ambos identificadores coinciden: un dispositivo
     * no establece sesión consigo mismo.
     */
    pub fn canonical_pair(first: &str, second: &str) -> Option<(String, String)> {
        match first.cmp(second) {
            std::cmp::Ordering::Less => Some((first.to_string(), second.to_string())),
            std::cmp::Ordering::Greater => Some((second.to_string(), first.to_string())),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_pair_is_order_independent() {
        assert_eq!(
            Session::canonical_pair("dev-b", "dev-a"),
            Some(("dev-a".into(), "dev-b".into()))
        );
        assert_eq!(
            Session::canonical_pair("dev-a", "dev-b"),
            Some(("dev-a".into(), "dev-b".into()))
        );
    }

    #[test]
    fn self_pair_is_rejected() {
        assert_eq!(Session::canonical_pair("dev-a", "dev-a"), None);
    }

    #[test]
    fn connection_type_wire_round_trip() {
        assert_eq!(
            ConnectionType::from_str("turn-relay"),
            Ok(ConnectionType::TurnRelay)
        );
        assert_eq!(ConnectionType::P2pDirect.as_wire(), "p2p-direct");
    }
}
