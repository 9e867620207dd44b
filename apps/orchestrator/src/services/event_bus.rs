// [apps/orchestrator/src/services/event_bus.rs]
/*!
 * =================================================================
 * APARATO: MESH EVENT BUS SERVICE (V4.2 - SUBJECT ORDERED)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: DIFUSIÓN DE SEÑALES DEL PLANO DE CONTROL
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. AT-MOST-ONCE: Canal broadcast de Tokio; un suscriptor rezagado
 *    pierde tramas (Lagged) y debe re-sincronizar por pull, jamás
 *    bloquea al emisor.
 * 2. SUBJECT FIFO: Un único canal serializa la emisión: el orden por
 *    sujeto se preserva para cada suscriptor.
 * 3. PREDICATE AT EDGE: El filtrado por sujeto/organización ocurre en
 *    el borde (sesión WebSocket), no en el bus.
 *
 * # Mathematical Proof (Signal Propagation):
 * El despacho es O(1) respecto del número de receptores; la pérdida de
 * un suscriptor no afecta el determinismo del reactor principal.
 * =================================================================
 */

use edgelink_domain_models::Alert;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::trace;

/// Capacidad del canal de difusión, sintonizada para absorber ráfagas
/// de invalidación de topología sin disparar 'Lagged' en operación nominal.
const BUS_CHANNEL_CAPACITY: usize = 4096;

/// Señal tipada del plano de control. El sujeto gobierna la suscripción
/// (`device.*`, `peer.updated`, `alert.*`, `nat.endpoint`).
#[derive(Debug, Clone, Serialize)]
pub struct BusEvent {
    pub subject: String,
    pub payload: serde_json::Value,
}

impl BusEvent {
    /// Un patrón de suscripción admite coincidencia exacta o prefijo
    /// con comodín terminal (`device.*`).
    pub fn matches_pattern(&self, pattern: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix(".*") {
            return self
                .subject
                .strip_prefix(prefix)
                .map(|rest| rest.starts_with('.'))
                .unwrap_or(false);
        }
        self.subject == pattern
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    transmission_channel: broadcast::Sender<BusEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CHANNEL_CAPACITY);
        Self {
            transmission_channel: sender,
        }
    }

    /// Genera un receptor para sesiones WebSocket o long-pollers.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.transmission_channel.subscribe()
    }

    // --- ESTRATO DE DISPOSITIVOS ---

    pub fn publish_device_registered(&self, device_id: &str, network_id: &str, org_id: &str) {
        self.dispatch(BusEvent {
            subject: "device.registered".into(),
            payload: json!({
                "device_id": device_id,
                "virtual_network_id": network_id,
                "organization_id": org_id,
            }),
        });
    }

    pub fn publish_device_presence(&self, device_id: &str, network_id: &str, online: bool) {
        self.dispatch(BusEvent {
            subject: if online { "device.online" } else { "device.offline" }.into(),
            payload: json!({
                "device_id": device_id,
                "virtual_network_id": network_id,
            }),
        });
    }

    pub fn publish_device_deregistered(&self, device_id: &str, network_id: &str) {
        self.dispatch(BusEvent {
            subject: "device.deregistered".into(),
            payload: json!({
                "device_id": device_id,
                "virtual_network_id": network_id,
            }),
        });
    }

    pub fn publish_key_rotated(&self, device_id: &str) {
        self.dispatch(BusEvent {
            subject: "device.key-rotated".into(),
            payload: json!({ "device_id": device_id }),
        });
    }

    // --- ESTRATO DE TOPOLOGÍA ---

    /// Invalidación de topología: los suscriptores de la red deben
    /// refrescar su conjunto de pares.
    pub fn publish_peer_updated(&self, network_id: &str) {
        self.dispatch(BusEvent {
            subject: "peer.updated".into(),
            payload: json!({ "virtual_network_id": network_id }),
        });
    }

    // --- ESTRATO DE ALERTAS ---

    pub fn publish_alert_created(&self, alert: &Alert) {
        self.dispatch_alert("alert.created", alert);
    }

    pub fn publish_alert_updated(&self, alert: &Alert) {
        self.dispatch_alert("alert.updated", alert);
    }

    pub fn publish_alert_resolved(&self, alert_id: &str, device_id: Option<&str>) {
        self.dispatch(BusEvent {
            subject: "alert.resolved".into(),
            payload: json!({
                "alert_id": alert_id,
                "device_id": device_id,
            }),
        });
    }

    fn dispatch_alert(&self, subject: &str, alert: &Alert) {
        let payload = serde_json::to_value(alert).unwrap_or_else(|_| json!({ "id": alert.id }));
        self.dispatch(BusEvent {
            subject: subject.into(),
            payload,
        });
    }

    // --- ESTRATO DE TRAVERSAL ---

    pub fn publish_nat_endpoint(&self, pair_key: &str, device_id: &str, public_endpoint: &str) {
        self.dispatch(BusEvent {
            subject: "nat.endpoint".into(),
            payload: json!({
                "pair_key": pair_key,
                "device_id": device_id,
                "public_endpoint": public_endpoint,
            }),
        });
    }

    // --- DESPACHO INTERNO ---

    fn dispatch(&self, event: BusEvent) {
        match self.transmission_channel.send(event) {
            Ok(subscriber_count) => {
                trace!("📡 [EVENT_BUS]: Signal reached {} active links.", subscriber_count);
            }
            Err(_) => {
                // Sin suscriptores: broadcast::send falla con el evento de
                // vuelta; condición nominal con el dashboard cerrado.
                trace!("💤 [EVENT_BUS]: Signal discarded. No active links.");
            }
        }
    }

    /// Diagnóstico del canal para el volcado de métricas.
    pub fn subscriber_count(&self) -> usize {
        self.transmission_channel.receiver_count()
    }
}
