// [libs/domain/notification/src/escalation.rs]
/*!
 * =================================================================
 * APARATO: ESCALATION TIMER REGISTRY (V4.1 - ACK AWARE)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: TEMPORIZADORES DE ESCALADO POR ALERTA NO ATENDIDA
 *
 * # Logic:
 * El despachador arma un temporizador por (alerta, regla) cuando la
 * regla declara escalado. El bucle de tick consulta 'collect_due':
 *   - Primer disparo al vencer 'wait_seconds' sin reconocimiento.
 *   - Repetición cada 'repeat_seconds' (si > 0) hasta alcanzar
 *     'max_repeat' disparos totales.
 * El estado se desarma cuando la alerta abandona 'active'.
 * =================================================================
 */

use crate::actions::ActionSpec;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Especificación de escalado declarada en la regla.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationSpec {
    #[serde(default)]
    pub enabled: bool,

    /// Espera inicial sin reconocimiento antes del primer disparo (seg).
    #[serde(rename = "wait_seconds")]
    pub wait_seconds: i64,

    /// Intervalo de repetición; 0 desactiva la repetición.
    #[serde(rename = "repeat_seconds", default)]
    pub repeat_seconds: i64,

    /// Techo de disparos totales (incluido el primero). Default 3.
    #[serde(rename = "max_repeat", default = "default_max_repeat")]
    pub max_repeat: u32,

    /// Acciones a ejecutar en cada disparo de escalado.
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

fn default_max_repeat() -> u32 {
    3
}

/// Estado armado de una pareja (alerta, regla).
#[derive(Debug, Clone)]
struct ArmedEscalation {
    rule_id: String,
    spec: EscalationSpec,
    next_fire_at: DateTime<Utc>,
    fired_count: u32,
}

/// Disparo vencido entregado al despachador.
#[derive(Debug, Clone)]
pub struct DueEscalation {
    pub alert_id: String,
    pub rule_id: String,
    pub actions: Vec<ActionSpec>,
    pub fire_index: u32,
}

/// Registro de temporizadores de escalado. Mutex de grano único: las
/// operaciones son O(armed) y jamás cruzan un punto de suspensión.
pub struct EscalationScheduler {
    armed: Mutex<HashMap<String, Vec<ArmedEscalation>>>,
}

impl Default for EscalationScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl EscalationScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            armed: Mutex::new(HashMap::new()),
        }
    }

    /// Arma el temporizador para una alerta recién creada. Re-armar la
    /// misma pareja (alerta, regla) es idempotente.
    pub fn arm(&self, alert_id: &str, rule_id: &str, spec: &EscalationSpec, now: DateTime<Utc>) {
        if !spec.enabled || spec.actions.is_empty() {
            return;
        }

        let mut armed_guard = match self.armed.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };

        let entries = armed_guard.entry(alert_id.to_string()).or_default();
        if entries.iter().any(|entry| entry.rule_id == rule_id) {
            return;
        }

        entries.push(ArmedEscalation {
            rule_id: rule_id.to_string(),
            spec: spec.clone(),
            next_fire_at: now + Duration::seconds(spec.wait_seconds),
            fired_count: 0,
        });
        debug!("⏲️ [ESCALATION_ARMED]: Alert {} under rule {}.", alert_id, rule_id);
    }

    /// Desarme total de la alerta (ack, resolve o cierre).
    pub fn disarm(&self, alert_id: &str) {
        if let Ok(mut armed_guard) = self.armed.lock() {
            if armed_guard.remove(alert_id).is_some() {
                debug!("⏲️ [ESCALATION_DISARMED]: Alert {}.", alert_id);
            }
        }
    }

    /**
     * Recolecta los disparos vencidos y reprograma (o retira) cada
     * temporizador en la misma sección crítica.
     */
    pub fn collect_due(&self, now: DateTime<Utc>) -> Vec<DueEscalation> {
        let mut due = Vec::new();
        let mut armed_guard = match self.armed.lock() {
            Ok(guard) => guard,
            Err(_) => return due,
        };

        for (alert_id, entries) in armed_guard.iter_mut() {
            for entry in entries.iter_mut() {
                if now < entry.next_fire_at || entry.fired_count >= entry.spec.max_repeat {
                    continue;
                }

                entry.fired_count += 1;
                due.push(DueEscalation {
                    alert_id: alert_id.clone(),
                    rule_id: entry.rule_id.clone(),
                    actions: entry.spec.actions.clone(),
                    fire_index: entry.fired_count,
                });

                if entry.spec.repeat_seconds > 0 && entry.fired_count < entry.spec.max_repeat {
                    entry.next_fire_at = now + Duration::seconds(entry.spec.repeat_seconds);
                } else {
                    // Sin repetición: el techo sella el temporizador.
                    entry.fired_count = entry.spec.max_repeat;
                }
            }

            entries.retain(|entry| entry.fired_count < entry.spec.max_repeat);
        }

        armed_guard.retain(|_, entries| !entries.is_empty());
        due
    }

    pub fn armed_count(&self) -> usize {
        self.armed.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}
