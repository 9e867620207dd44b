// [libs/domain/notification/src/rate_limit.rs]
/*!
 * =================================================================
 * APARATO: SLIDING WINDOW RATE LIMITER (V4.0 - PRUNED TRACKING)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: ADMISIÓN POR VENTANA DESLIZANTE CON ÁMBITOS
 *
 * # Mathematical Proof (Admission Monotonicity):
 * Para una ventana W y techo M, N > M eventos dentro de W admiten
 * exactamente M: cada admisión estampa su marca temporal y la poda
 * elimina solo marcas anteriores a (now - W), por lo que el conteo
 * vigente nunca subestima los eventos admitidos dentro de la ventana.
 * =================================================================
 */

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Ámbito de contabilidad del límite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitScope {
    /// Un contador único para todos los eventos de la regla.
    Global,
    /// Contador por regla (equivalente a Global dentro de una regla,
    /// pero aislado si varias reglas comparten tracker).
    PerRule,
    /// Contador independiente por dispositivo origen.
    PerDevice,
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RateLimitScope::Global => "global",
            RateLimitScope::PerRule => "per-rule",
            RateLimitScope::PerDevice => "per-device",
        };
        formatter.write_str(label)
    }
}

/// Especificación declarada en la regla.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitSpec {
    /// Máximo de eventos admitidos dentro de la ventana.
    pub max: u32,

    /// Ventana deslizante en segundos.
    #[serde(rename = "window_seconds")]
    pub window_seconds: i64,

    pub scope: RateLimitScope,
}

/// Tracker de ventana deslizante: almacena marcas temporales por llave
/// de ámbito y poda las caducadas en cada decisión.
pub struct SlidingWindowTracker {
    admissions: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl Default for SlidingWindowTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SlidingWindowTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            admissions: Mutex::new(HashMap::new()),
        }
    }

    /// Llave de contabilidad derivada del ámbito declarado.
    pub fn scope_key(spec: &RateLimitSpec, rule_id: &str, device_id: Option<&str>) -> String {
        match spec.scope {
            RateLimitScope::Global => "rl:global".to_string(),
            RateLimitScope::PerRule => format!("rl:rule:{rule_id}"),
            RateLimitScope::PerDevice => {
                format!("rl:rule:{rule_id}:device:{}", device_id.unwrap_or("-"))
            }
        }
    }

    /**
     * Decide la admisión del evento: poda marcas fuera de la ventana y
     * admite si el conteo vigente queda bajo el techo. La admisión
     * estampa la marca en la misma sección crítica.
     */
    pub fn allow(&self, scope_key: &str, spec: &RateLimitSpec, now: DateTime<Utc>) -> bool {
        let mut admissions_guard = match self.admissions.lock() {
            Ok(guard) => guard,
            // Cerrojo envenenado: degradamos a admitir (fail-open).
            Err(_) => return true,
        };

        let window_floor = now - Duration::seconds(spec.window_seconds);
        let stamps = admissions_guard.entry(scope_key.to_string()).or_default();
        stamps.retain(|stamp| *stamp > window_floor);

        if stamps.len() >= spec.max as usize {
            return false;
        }

        stamps.push(now);
        true
    }

    /// Poda global de higiene para el barrido periódico.
    pub fn prune(&self, now: DateTime<Utc>, widest_window_seconds: i64) -> usize {
        let mut admissions_guard = match self.admissions.lock() {
            Ok(guard) => guard,
            Err(_) => return 0,
        };

        let floor = now - Duration::seconds(widest_window_seconds);
        let before: usize = admissions_guard.values().map(Vec::len).sum();
        admissions_guard.retain(|_, stamps| {
            stamps.retain(|stamp| *stamp > floor);
            !stamps.is_empty()
        });
        let after: usize = admissions_guard.values().map(Vec::len).sum();
        before - after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(max: u32, window_seconds: i64, scope: RateLimitScope) -> RateLimitSpec {
        RateLimitSpec {
            max,
            window_seconds,
            scope,
        }
    }

    #[test]
    fn admits_exactly_max_within_window() {
        let tracker = SlidingWindowTracker::new();
        let spec = spec(3, 3600, RateLimitScope::PerDevice);
        let key = SlidingWindowTracker::scope_key(&spec, "rule-1", Some("dev-1"));
        let now = Utc::now();

        let admitted = (0..5)
            .filter(|offset| tracker.allow(&key, &spec, now + Duration::seconds(*offset)))
            .count();
        assert_eq!(admitted, 3);
    }

    #[test]
    fn window_slide_reopens_admission() {
        let tracker = SlidingWindowTracker::new();
        let spec = spec(1, 60, RateLimitScope::PerRule);
        let key = SlidingWindowTracker::scope_key(&spec, "rule-1", None);
        let origin = Utc::now();

        assert!(tracker.allow(&key, &spec, origin));
        assert!(!tracker.allow(&key, &spec, origin + Duration::seconds(30)));
        // La marca original cae fuera de la ventana.
        assert!(tracker.allow(&key, &spec, origin + Duration::seconds(61)));
    }

    #[test]
    fn per_device_scopes_are_isolated() {
        let tracker = SlidingWindowTracker::new();
        let spec = spec(1, 3600, RateLimitScope::PerDevice);
        let now = Utc::now();

        let key_a = SlidingWindowTracker::scope_key(&spec, "rule-1", Some("dev-a"));
        let key_b = SlidingWindowTracker::scope_key(&spec, "rule-1", Some("dev-b"));

        assert!(tracker.allow(&key_a, &spec, now));
        assert!(tracker.allow(&key_b, &spec, now));
        assert!(!tracker.allow(&key_a, &spec, now));
    }

    #[test]
    fn prune_reclaims_expired_stamps() {
        let tracker = SlidingWindowTracker::new();
        let spec = spec(10, 60, RateLimitScope::Global);
        let key = SlidingWindowTracker::scope_key(&spec, "rule-1", None);
        let origin = Utc::now() - Duration::hours(2);

        tracker.allow(&key, &spec, origin);
        tracker.allow(&key, &spec, origin + Duration::seconds(1));
        assert_eq!(tracker.prune(Utc::now(), 3600), 2);
    }
}
