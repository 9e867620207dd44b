// [apps/orchestrator/src/state/telemetry_window.rs]
/*!
 * =================================================================
 * APARATO: SESSION TELEMETRY WINDOWS (V4.1 - BOUNDED MEMORY)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L3)
 * RESPONSABILIDAD: MEMORIA A CORTO PLAZO DE LATENCIAS Y FALLOS
 *
 * MEJORA TÁCTICA:
 * Ventanas rodantes acotadas (256 muestras por dispositivo) para el
 * cálculo de p95 de la sonda de salud; los contadores de fallo de
 * túnel se drenan en cada sonda.
 * =================================================================
 */

use edgelink_domain_models::DeviceHeartbeat;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use tracing::debug;

/// Muestras retenidas por dispositivo para la ventana rodante.
const LATENCY_WINDOW_CAPACITY: usize = 256;

pub struct TelemetryWindowManager {
    latency_windows: RwLock<HashMap<String, VecDeque<f64>>>,
    tunnel_failure_counters: RwLock<HashMap<String, u32>>,
}

impl Default for TelemetryWindowManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryWindowManager {
    pub fn new() -> Self {
        Self {
            latency_windows: RwLock::new(HashMap::new()),
            tunnel_failure_counters: RwLock::new(HashMap::new()),
        }
    }

    /// Absorbe las muestras de un latido en las ventanas del dispositivo.
    pub fn record_heartbeat(&self, heartbeat: &DeviceHeartbeat) {
        if !heartbeat.session_samples.is_empty() {
            if let Ok(mut windows_guard) = self.latency_windows.write() {
                let window = windows_guard
                    .entry(heartbeat.device_id.clone())
                    .or_insert_with(|| VecDeque::with_capacity(LATENCY_WINDOW_CAPACITY));

                for sample in &heartbeat.session_samples {
                    if window.len() >= LATENCY_WINDOW_CAPACITY {
                        window.pop_front();
                    }
                    window.push_back(sample.latency_ms);
                }
            }
        }

        if heartbeat.tunnel_failures > 0 {
            if let Ok(mut counters_guard) = self.tunnel_failure_counters.write() {
                *counters_guard.entry(heartbeat.device_id.clone()).or_insert(0) +=
                    heartbeat.tunnel_failures;
            }
            debug!(
                "📉 [TELEMETRY]: Device {} reported {} tunnel failures.",
                heartbeat.device_id, heartbeat.tunnel_failures
            );
        }
    }

    /// Instantánea de la ventana de latencias del dispositivo.
    pub fn latency_window(&self, device_id: &str) -> Vec<f64> {
        self.latency_windows
            .read()
            .ok()
            .and_then(|windows| windows.get(device_id).map(|window| window.iter().copied().collect()))
            .unwrap_or_default()
    }

    /// Drena el contador de fallos de túnel (lectura destructiva por sonda).
    pub fn drain_tunnel_failures(&self, device_id: &str) -> u32 {
        self.tunnel_failure_counters
            .write()
            .ok()
            .and_then(|mut counters| counters.remove(device_id))
            .unwrap_or(0)
    }

    /// Purga las ventanas de dispositivos dados de baja.
    pub fn forget_device(&self, device_id: &str) {
        if let Ok(mut windows) = self.latency_windows.write() {
            windows.remove(device_id);
        }
        if let Ok(mut counters) = self.tunnel_failure_counters.write() {
            counters.remove(device_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use edgelink_domain_models::SessionMetricsSample;

    fn heartbeat(device_id: &str, latencies: &[f64], failures: u32) -> DeviceHeartbeat {
        DeviceHeartbeat {
            device_id: device_id.into(),
            timestamp: Utc::now(),
            public_endpoint: None,
            session_samples: latencies
                .iter()
                .map(|latency| SessionMetricsSample {
                    peer_device_id: "peer".into(),
                    latency_ms: *latency,
                    bytes_sent: 0,
                    bytes_received: 0,
                    last_handshake_at: None,
                })
                .collect(),
            tunnel_failures: failures,
        }
    }

    #[test]
    fn window_is_bounded_and_fifo() {
        let manager = TelemetryWindowManager::new();
        let samples: Vec<f64> = (0..300).map(|i| i as f64).collect();
        manager.record_heartbeat(&heartbeat("dev-1", &samples, 0));

        let window = manager.latency_window("dev-1");
        assert_eq!(window.len(), LATENCY_WINDOW_CAPACITY);
        // Las muestras más antiguas fueron desalojadas.
        assert_eq!(window[0], (300 - LATENCY_WINDOW_CAPACITY) as f64);
    }

    #[test]
    fn failure_drain_is_destructive() {
        let manager = TelemetryWindowManager::new();
        manager.record_heartbeat(&heartbeat("dev-1", &[], 3));
        manager.record_heartbeat(&heartbeat("dev-1", &[], 2));

        assert_eq!(manager.drain_tunnel_failures("dev-1"), 5);
        assert_eq!(manager.drain_tunnel_failures("dev-1"), 0);
    }
}
