// [libs/domain/notification/src/conditions.rs]
/*!
 * =================================================================
 * APARATO: CONDITION TREE EVALUATOR (V4.2 - PURE MATCHING)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: PREDICADOS DE HOJA Y COMBINADORES LÓGICOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. VALIDATE-THEN-TRUST: La validación recursiva (profundidad, regex,
 *    zona horaria, listas vacías) ocurre en la carga del fichero; la
 *    evaluación confía en el árbol ya certificado.
 * 2. LRU REGEX CACHE: Las expresiones se compilan una vez y viven en
 *    una caché acotada; un fichero de reglas adversario no puede
 *    crecer la memoria sin techo.
 * 3. CROSS-MIDNIGHT RANGES: Un rango 22:00-06:00 cubre la noche: el
 *    tramo pre-medianoche ancla el día de semana configurado y el
 *    tramo post-medianoche hereda el día anterior.
 * =================================================================
 */

use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use edgelink_domain_models::{Alert, AlertType, Severity};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::errors::NotifyError;

/// Profundidad máxima del árbol de condiciones admitida en validación.
const MAX_CONDITION_DEPTH: usize = 8;

/// Capacidad por defecto de la caché de expresiones compiladas.
const REGEX_CACHE_CAPACITY: usize = 256;

/// Contexto inmutable de evaluación: la alerta recién creada o
/// actualizada, las etiquetas del dispositivo y el reloj del despacho.
#[derive(Debug, Clone)]
pub struct AlertContext<'a> {
    pub alert: &'a Alert,
    pub device_tags: &'a [String],
    pub now: DateTime<Utc>,
}

/// Rango horario con zona, admitiendo cruce de medianoche.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeRangeSpec {
    /// Hora de apertura "HH:MM" (inclusive).
    pub start: String,

    /// Hora de cierre "HH:MM" (inclusive).
    pub end: String,

    /// Zona horaria IANA (ej: "Asia/Shanghai").
    pub timezone: String,

    /// Días admitidos: "mon", "tue", "wed", "thu", "fri", "sat", "sun".
    /// Lista vacía equivale a todos los días.
    #[serde(default)]
    pub weekdays: Vec<String>,
}

impl TimeRangeSpec {
    fn parse_clock(raw: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(raw, "%H:%M").ok()
    }

    fn parse_weekday(raw: &str) -> Option<Weekday> {
        match raw.to_ascii_lowercase().as_str() {
            "mon" | "monday" => Some(Weekday::Mon),
            "tue" | "tuesday" => Some(Weekday::Tue),
            "wed" | "wednesday" => Some(Weekday::Wed),
            "thu" | "thursday" => Some(Weekday::Thu),
            "fri" | "friday" => Some(Weekday::Fri),
            "sat" | "saturday" => Some(Weekday::Sat),
            "sun" | "sunday" => Some(Weekday::Sun),
            _ => None,
        }
    }

    /// Validación estructural: horas interpretables, zona conocida y
    /// días de semana reconocibles.
    pub fn validate(&self) -> Result<(), NotifyError> {
        Self::parse_clock(&self.start)
            .ok_or_else(|| NotifyError::RuleFileInvalid(format!("START_CLOCK: {}", self.start)))?;
        Self::parse_clock(&self.end)
            .ok_or_else(|| NotifyError::RuleFileInvalid(format!("END_CLOCK: {}", self.end)))?;
        self.timezone
            .parse::<Tz>()
            .map_err(|_| NotifyError::TimezoneUnknown(self.timezone.clone()))?;
        for day in &self.weekdays {
            Self::parse_weekday(day)
                .ok_or_else(|| NotifyError::RuleFileInvalid(format!("WEEKDAY: {day}")))?;
        }
        Ok(())
    }

    fn admits_weekday(&self, weekday: Weekday) -> bool {
        if self.weekdays.is_empty() {
            return true;
        }
        self.weekdays
            .iter()
            .filter_map(|raw| Self::parse_weekday(raw))
            .any(|admitted| admitted == weekday)
    }

    /**
     * Determina si el instante cae dentro del rango en su zona horaria.
     * Un árbol ya validado jamás retorna error; un spec corrupto en
     * caliente degrada a 'false'.
     */
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        let timezone: Tz = match self.timezone.parse() {
            Ok(parsed) => parsed,
            Err(_) => return false,
        };
        let (start, end) = match (Self::parse_clock(&self.start), Self::parse_clock(&self.end)) {
            (Some(start), Some(end)) => (start, end),
            _ => return false,
        };

        let local = instant.with_timezone(&timezone);
        let local_clock = match NaiveTime::from_hms_opt(local.hour(), local.minute(), local.second())
        {
            Some(clock) => clock,
            None => return false,
        };

        if start <= end {
            // Rango diurno ordinario.
            self.admits_weekday(local.weekday()) && local_clock >= start && local_clock <= end
        } else {
            // Cruce de medianoche: el tramo post-medianoche pertenece al
            // día configurado anterior.
            let in_late_leg = local_clock >= start && self.admits_weekday(local.weekday());
            let in_early_leg = local_clock <= end && self.admits_weekday(local.weekday().pred());
            in_late_leg || in_early_leg
        }
    }
}

/// Caché LRU de expresiones regulares compiladas, compartida por el
/// motor de reglas.
pub struct RegexCache {
    inner: Mutex<RegexCacheInner>,
    capacity: usize,
}

struct RegexCacheInner {
    compiled: HashMap<String, Arc<Regex>>,
    recency: VecDeque<String>,
}

impl Default for RegexCache {
    fn default() -> Self {
        Self::with_capacity(REGEX_CACHE_CAPACITY)
    }
}

impl RegexCache {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegexCacheInner {
                compiled: HashMap::new(),
                recency: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /**
     * Obtiene la expresión compilada, compilando y cacheando en el
     * primer uso. La entrada menos reciente se desaloja al superar la
     * capacidad.
     */
    pub fn fetch(&self, pattern: &str) -> Option<Arc<Regex>> {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(_) => return None,
        };

        if let Some(compiled) = guard.compiled.get(pattern).cloned() {
            guard.recency.retain(|entry| entry != pattern);
            guard.recency.push_back(pattern.to_string());
            return Some(compiled);
        }

        let compiled = match Regex::new(pattern) {
            Ok(regex) => Arc::new(regex),
            Err(fault) => {
                warn!("⚠️ [REGEX_CACHE]: Pattern rejected at evaluation: {}", fault);
                return None;
            }
        };

        if guard.compiled.len() >= self.capacity {
            if let Some(evicted) = guard.recency.pop_front() {
                guard.compiled.remove(&evicted);
            }
        }

        guard.compiled.insert(pattern.to_string(), compiled.clone());
        guard.recency.push_back(pattern.to_string());
        Some(compiled)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|guard| guard.compiled.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Nodo del árbol de condiciones: predicados de hoja y combinadores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionNode {
    /// Conjunción: todas las ramas deben cumplirse.
    AllOf(Vec<ConditionNode>),
    /// Disyunción: al menos una rama debe cumplirse.
    AnyOf(Vec<ConditionNode>),
    /// Negación conjunta: ninguna rama puede cumplirse.
    NoneOf(Vec<ConditionNode>),

    /// Severidad de la alerta dentro del conjunto.
    SeverityIn(Vec<Severity>),
    /// Tipo de alerta dentro del conjunto.
    AlertTypeIn(Vec<AlertType>),
    /// Dispositivo dentro del conjunto; "*" admite cualquiera.
    DeviceIdIn(Vec<String>),
    /// Las etiquetas del dispositivo contienen todas las exigidas.
    DeviceTagsContain(Vec<String>),
    /// El instante de despacho cae en el rango horario.
    TimeRange(TimeRangeSpec),
    /// El mensaje de la alerta satisface la expresión regular.
    MessageMatch(String),
    /// Igualdad exacta sobre una entrada de metadata.
    MetadataEquals { key: String, value: String },
}

impl ConditionNode {
    /**
     * Validación recursiva del árbol: profundidad acotada, combinadores
     * no vacíos, regex compilables, zonas horarias conocidas.
     */
    pub fn validate(&self) -> Result<(), NotifyError> {
        self.validate_at_depth(0)
    }

    fn validate_at_depth(&self, depth: usize) -> Result<(), NotifyError> {
        if depth > MAX_CONDITION_DEPTH {
            return Err(NotifyError::RuleFileInvalid(format!(
                "CONDITION_DEPTH_EXCEEDED (> {MAX_CONDITION_DEPTH})"
            )));
        }

        match self {
            ConditionNode::AllOf(branches)
            | ConditionNode::AnyOf(branches)
            | ConditionNode::NoneOf(branches) => {
                if branches.is_empty() {
                    return Err(NotifyError::RuleFileInvalid("EMPTY_COMBINATOR".into()));
                }
                for branch in branches {
                    branch.validate_at_depth(depth + 1)?;
                }
                Ok(())
            }
            ConditionNode::SeverityIn(set) if set.is_empty() => {
                Err(NotifyError::RuleFileInvalid("EMPTY_SEVERITY_SET".into()))
            }
            ConditionNode::AlertTypeIn(set) if set.is_empty() => {
                Err(NotifyError::RuleFileInvalid("EMPTY_ALERT_TYPE_SET".into()))
            }
            ConditionNode::DeviceIdIn(set) if set.is_empty() => {
                Err(NotifyError::RuleFileInvalid("EMPTY_DEVICE_SET".into()))
            }
            ConditionNode::TimeRange(spec) => spec.validate(),
            ConditionNode::MessageMatch(pattern) => Regex::new(pattern)
                .map(|_| ())
                .map_err(|fault| NotifyError::RegexInvalid(fault.to_string())),
            _ => Ok(()),
        }
    }

    /// Evaluación pura del árbol sobre el contexto de la alerta.
    pub fn evaluate(&self, context: &AlertContext<'_>, regex_cache: &RegexCache) -> bool {
        match self {
            ConditionNode::AllOf(branches) => branches
                .iter()
                .all(|branch| branch.evaluate(context, regex_cache)),
            ConditionNode::AnyOf(branches) => branches
                .iter()
                .any(|branch| branch.evaluate(context, regex_cache)),
            ConditionNode::NoneOf(branches) => !branches
                .iter()
                .any(|branch| branch.evaluate(context, regex_cache)),

            ConditionNode::SeverityIn(set) => set.contains(&context.alert.severity),
            ConditionNode::AlertTypeIn(set) => set.contains(&context.alert.alert_type),

            ConditionNode::DeviceIdIn(set) => {
                if set.iter().any(|entry| entry == "*") {
                    return true;
                }
                match &context.alert.device_id {
                    Some(device_id) => set.iter().any(|entry| entry == device_id),
                    None => false,
                }
            }

            ConditionNode::DeviceTagsContain(required) => required
                .iter()
                .all(|tag| context.device_tags.iter().any(|carried| carried == tag)),

            ConditionNode::TimeRange(spec) => spec.contains(context.now),

            ConditionNode::MessageMatch(pattern) => regex_cache
                .fetch(pattern)
                .map(|regex| regex.is_match(&context.alert.message))
                .unwrap_or(false),

            ConditionNode::MetadataEquals { key, value } => context
                .alert
                .metadata
                .get(key)
                .map(|carried| carried == value)
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn build_alert(severity: Severity, message: &str) -> Alert {
        let mut metadata = BTreeMap::new();
        metadata.insert("region".to_string(), "eu-west".to_string());
        Alert {
            id: "alert-1".into(),
            device_id: Some("dev-1".into()),
            severity,
            alert_type: AlertType::DeviceOffline,
            title: "offline".into(),
            message: message.into(),
            status: edgelink_domain_models::AlertStatus::Active,
            metadata,
            occurrence_count: 1,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
        }
    }

    fn context_at<'a>(alert: &'a Alert, tags: &'a [String], now: DateTime<Utc>) -> AlertContext<'a> {
        AlertContext {
            alert,
            device_tags: tags,
            now,
        }
    }

    fn shanghai(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
    ) -> DateTime<Utc> {
        chrono_tz::Asia::Shanghai
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn office_hours() -> TimeRangeSpec {
        TimeRangeSpec {
            start: "09:00".into(),
            end: "18:00".into(),
            timezone: "Asia/Shanghai".into(),
            weekdays: vec!["mon".into(), "tue".into(), "wed".into(), "thu".into(), "fri".into()],
        }
    }

    #[test]
    fn office_hours_range_matches_spec_scenarios() {
        let range = office_hours();

        // Martes 10:00 Asia/Shanghai (2026-03-03 es martes): dentro.
        assert!(range.contains(shanghai(2026, 3, 3, 10, 0)));
        // Sábado 10:00: fuera por día.
        assert!(!range.contains(shanghai(2026, 3, 7, 10, 0)));
        // Lunes 18:01: fuera por minuto.
        assert!(!range.contains(shanghai(2026, 3, 2, 18, 1)));
        // Lunes 18:00 exacto: el cierre es inclusivo.
        assert!(range.contains(shanghai(2026, 3, 2, 18, 0)));
    }

    #[test]
    fn cross_midnight_range_spans_both_legs() {
        let night_shift = TimeRangeSpec {
            start: "22:00".into(),
            end: "06:00".into(),
            timezone: "Asia/Shanghai".into(),
            weekdays: vec!["fri".into()],
        };

        // Viernes 23:00: tramo tardío.
        assert!(night_shift.contains(shanghai(2026, 3, 6, 23, 0)));
        // Sábado 05:00: tramo temprano heredado del viernes.
        assert!(night_shift.contains(shanghai(2026, 3, 7, 5, 0)));
        // Sábado 23:00: fuera (el sábado no está configurado).
        assert!(!night_shift.contains(shanghai(2026, 3, 7, 23, 0)));
        // Viernes 12:00: fuera de ambos tramos.
        assert!(!night_shift.contains(shanghai(2026, 3, 6, 12, 0)));
    }

    #[test]
    fn combinators_compose_recursively() {
        let alert = build_alert(Severity::High, "tunnel collapse on edge-01");
        let tags = vec!["prod".to_string()];
        let cache = RegexCache::default();
        let context = context_at(&alert, &tags, Utc::now());

        let tree = ConditionNode::AllOf(vec![
            ConditionNode::SeverityIn(vec![Severity::High, Severity::Critical]),
            ConditionNode::AnyOf(vec![
                ConditionNode::DeviceTagsContain(vec!["prod".into()]),
                ConditionNode::MetadataEquals {
                    key: "region".into(),
                    value: "us-east".into(),
                },
            ]),
            ConditionNode::NoneOf(vec![ConditionNode::AlertTypeIn(vec![AlertType::KeyExpiring])]),
        ]);

        assert!(tree.validate().is_ok());
        assert!(tree.evaluate(&context, &cache));
    }

    #[test]
    fn wildcard_device_matches_any() {
        let alert = build_alert(Severity::Low, "msg");
        let tags: Vec<String> = vec![];
        let cache = RegexCache::default();
        let context = context_at(&alert, &tags, Utc::now());

        assert!(ConditionNode::DeviceIdIn(vec!["*".into()]).evaluate(&context, &cache));
        assert!(ConditionNode::DeviceIdIn(vec!["dev-1".into()]).evaluate(&context, &cache));
        assert!(!ConditionNode::DeviceIdIn(vec!["dev-9".into()]).evaluate(&context, &cache));
    }

    #[test]
    fn message_match_uses_cache_and_rejects_bad_patterns() {
        let alert = build_alert(Severity::Low, "latency p95 at 250ms");
        let tags: Vec<String> = vec![];
        let cache = RegexCache::default();
        let context = context_at(&alert, &tags, Utc::now());

        let matching = ConditionNode::MessageMatch(r"p95 at \d+ms".into());
        assert!(matching.evaluate(&context, &cache));
        assert_eq!(cache.len(), 1);

        // Segunda evaluación reutiliza la compilación.
        assert!(matching.evaluate(&context, &cache));
        assert_eq!(cache.len(), 1);

        // Un patrón roto jamás llega aquí tras validación; en caliente degrada a false.
        let broken = ConditionNode::MessageMatch("([unclosed".into());
        assert!(broken.validate().is_err());
        assert!(!broken.evaluate(&context, &cache));
    }

    #[test]
    fn regex_cache_evicts_least_recent() {
        let cache = RegexCache::with_capacity(2);
        cache.fetch("a+").unwrap();
        cache.fetch("b+").unwrap();
        cache.fetch("a+").unwrap(); // refresca 'a+'
        cache.fetch("c+").unwrap(); // expulsa 'b+'
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn validation_rejects_structural_defects() {
        assert!(ConditionNode::AllOf(vec![]).validate().is_err());
        assert!(ConditionNode::SeverityIn(vec![]).validate().is_err());
        assert!(ConditionNode::TimeRange(TimeRangeSpec {
            start: "25:00".into(),
            end: "18:00".into(),
            timezone: "Asia/Shanghai".into(),
            weekdays: vec![],
        })
        .validate()
        .is_err());
        assert!(ConditionNode::TimeRange(TimeRangeSpec {
            start: "09:00".into(),
            end: "18:00".into(),
            timezone: "Mars/Olympus".into(),
            weekdays: vec![],
        })
        .validate()
        .is_err());
    }
}
