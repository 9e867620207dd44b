// [libs/domain/models/src/telemetry.rs]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latido periódico de un dispositivo. Refresca la presencia en el KV y
/// alimenta el buffer write-behind hacia el Ledger relacional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceHeartbeat {
    #[serde(rename = "device_id")]
    pub device_id: String,

    #[serde(rename = "timestamp_utc")]
    pub timestamp: DateTime<Utc>,

    /// Endpoint público observado por el dispositivo (ip:puerto), si lo hay.
    #[serde(rename = "public_endpoint")]
    pub public_endpoint: Option<String>,

    /// Muestras de sesión acumuladas desde el último latido.
    #[serde(rename = "session_samples", default)]
    pub session_samples: Vec<SessionMetricsSample>,

    /// Fallos de establecimiento de túnel desde el último latido.
    #[serde(rename = "tunnel_failures", default)]
    pub tunnel_failures: u32,
}

/// Muestra puntual de métricas de una sesión activa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetricsSample {
    #[serde(rename = "peer_device_id")]
    pub peer_device_id: String,

    #[serde(rename = "latency_ms")]
    pub latency_ms: f64,

    #[serde(rename = "bytes_sent")]
    pub bytes_sent: u64,

    #[serde(rename = "bytes_received")]
    pub bytes_received: u64,

    #[serde(rename = "last_handshake_at")]
    pub last_handshake_at: Option<DateTime<Utc>>,
}

impl DeviceHeartbeat {
    /// Percentil 95 de latencia sobre las muestras portadas por el latido.
    /// Retorna `None` si el latido no trae muestras.
    pub fn latency_p95(&self) -> Option<f64> {
        if self.session_samples.is_empty() {
            return None;
        }

        let mut latencies: Vec<f64> = self
            .session_samples
            .iter()
            .map(|sample| sample.latency_ms)
            .collect();
        latencies.sort_by(|left, right| left.partial_cmp(right).unwrap_or(std::cmp::Ordering::Equal));

        let rank = ((latencies.len() as f64) * 0.95).ceil() as usize;
        let index = rank.clamp(1, latencies.len()) - 1;
        Some(latencies[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(latency_ms: f64) -> SessionMetricsSample {
        SessionMetricsSample {
            peer_device_id: "dev-2".into(),
            latency_ms,
            bytes_sent: 0,
            bytes_received: 0,
            last_handshake_at: None,
        }
    }

    #[test]
    fn p95_of_empty_sample_set_is_none() {
        let heartbeat = DeviceHeartbeat {
            device_id: "dev-1".into(),
            timestamp: Utc::now(),
            public_endpoint: None,
            session_samples: vec![],
            tunnel_failures: 0,
        };
        assert_eq!(heartbeat.latency_p95(), None);
    }

    #[test]
    fn p95_selects_upper_tail() {
        let mut samples: Vec<SessionMetricsSample> = (1..=100).map(|i| sample(i as f64)).collect();
        samples.reverse();

        let heartbeat = DeviceHeartbeat {
            device_id: "dev-1".into(),
            timestamp: Utc::now(),
            public_endpoint: None,
            session_samples: samples,
            tunnel_failures: 0,
        };
        assert_eq!(heartbeat.latency_p95(), Some(95.0));
    }
}
