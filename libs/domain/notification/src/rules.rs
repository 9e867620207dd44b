// [libs/domain/notification/src/rules.rs]
/*!
 * =================================================================
 * APARATO: DECLARATIVE RULE SET (V4.1 - HOT SWAP READY)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: FICHERO DE REGLAS, VALIDACIÓN Y MATCHING ORDENADO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. VERSIONED DOCUMENT: El fichero porta 'version' + 'rules[]'; una
 *    versión desconocida rechaza la carga completa (el conjunto previo
 *    sigue vigente).
 * 2. PRIORITY ORDER: El matching retorna TODAS las reglas satisfechas
 *    ordenadas por prioridad ascendente; el despacho respeta ese orden.
 * 3. SILENCE WINDOWS: Una regla silenciada para el instante del evento
 *    queda muerta solo para ese evento.
 * =================================================================
 */

use crate::actions::ActionSpec;
use crate::conditions::{AlertContext, ConditionNode, RegexCache, TimeRangeSpec};
use crate::errors::NotifyError;
use crate::escalation::EscalationSpec;
use crate::rate_limit::RateLimitSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Versión de formato soportada por este motor.
pub const SUPPORTED_RULE_FILE_VERSION: u32 = 1;

/// Regla declarativa de enrutamiento.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Identificador único dentro del fichero.
    pub id: String,

    pub name: String,

    /// Prioridad de despacho: menor dispara primero.
    pub priority: i32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub conditions: ConditionNode,

    #[serde(default)]
    pub actions: Vec<ActionSpec>,

    #[serde(rename = "rate_limit")]
    pub rate_limit: Option<RateLimitSpec>,

    pub escalation: Option<EscalationSpec>,

    /// Ventanas de silencio: si el instante del evento cae en alguna,
    /// la regla no participa del matching para ese evento.
    #[serde(default)]
    pub silence: Vec<TimeRangeSpec>,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    fn is_silenced_at(&self, context: &AlertContext<'_>) -> bool {
        self.silence.iter().any(|window| window.contains(context.now))
    }
}

/// Documento de reglas tal como viaja en disco.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFile {
    pub version: u32,

    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Conjunto validado e inmutable de reglas. La recarga en caliente
/// construye un RuleSet nuevo y lo intercambia atómicamente.
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /**
     * Interpreta y valida el documento JSON completo.
     *
     * # Errors:
     * - `RuleFileInvalid` ante versión desconocida, identificadores
     *   duplicados, condiciones estructuralmente inválidas o silencios
     *   malformados. Un fichero rechazado jamás sustituye al vigente.
     */
    #[instrument(skip(raw_document))]
    pub fn from_json(raw_document: &str) -> Result<RuleSet, NotifyError> {
        let parsed: RuleFile = serde_json::from_str(raw_document)
            .map_err(|fault| NotifyError::RuleFileInvalid(format!("JSON_MALFORMED: {fault}")))?;

        if parsed.version != SUPPORTED_RULE_FILE_VERSION {
            return Err(NotifyError::RuleFileInvalid(format!(
                "UNSUPPORTED_VERSION: {} (engine speaks {})",
                parsed.version, SUPPORTED_RULE_FILE_VERSION
            )));
        }

        let mut seen_identifiers = HashSet::new();
        for rule in &parsed.rules {
            if rule.id.trim().is_empty() {
                return Err(NotifyError::RuleFileInvalid("EMPTY_RULE_ID".into()));
            }
            if !seen_identifiers.insert(rule.id.clone()) {
                return Err(NotifyError::RuleFileInvalid(format!(
                    "DUPLICATE_RULE_ID: {}",
                    rule.id
                )));
            }

            rule.conditions.validate()?;
            for window in &rule.silence {
                window.validate()?;
            }
            if let Some(escalation) = &rule.escalation {
                if escalation.enabled && escalation.wait_seconds <= 0 {
                    return Err(NotifyError::RuleFileInvalid(format!(
                        "NON_POSITIVE_ESCALATION_WAIT: {}",
                        rule.id
                    )));
                }
            }
            if let Some(rate_limit) = &rule.rate_limit {
                if rate_limit.max == 0 || rate_limit.window_seconds <= 0 {
                    return Err(NotifyError::RuleFileInvalid(format!(
                        "DEGENERATE_RATE_LIMIT: {}",
                        rule.id
                    )));
                }
            }
        }

        let mut rules = parsed.rules;
        rules.sort_by_key(|rule| rule.priority);

        debug!("📜 [RULE_SET]: {} rules validated and ordered.", rules.len());
        Ok(RuleSet { rules })
    }

    /// Conjunto vacío: el despachador degrada al mapa de fallback.
    #[must_use]
    pub fn empty() -> RuleSet {
        RuleSet { rules: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn find(&self, rule_id: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.id == rule_id)
    }

    /**
     * Matching puro: todas las reglas habilitadas, no silenciadas y
     * satisfechas, en orden de prioridad ascendente (ya pre-ordenado).
     */
    pub fn matching_rules<'a>(
        &'a self,
        context: &AlertContext<'_>,
        regex_cache: &RegexCache,
    ) -> Vec<&'a Rule> {
        self.rules
            .iter()
            .filter(|rule| rule.enabled)
            .filter(|rule| !rule.is_silenced_at(context))
            .filter(|rule| rule.conditions.evaluate(context, regex_cache))
            .collect()
    }
}
