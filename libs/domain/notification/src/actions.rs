// [libs/domain/notification/src/actions.rs]
/*!
 * =================================================================
 * APARATO: CHANNEL ACTION CATALOG (V4.1 - RETRY DISCIPLINED)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: ACCIONES DE CANAL Y POLÍTICA DE REINTENTOS
 *
 * # Logic:
 * Cada acción porta su tipo de canal, configuración opaca y política
 * de reintentos. La clasificación permanente/transitoria gobierna el
 * bucle de ejecución: un fallo permanente (HTTP 4xx ≠ 429, credencial
 * rechazada) aborta temprano; uno transitorio consume presupuesto de
 * reintentos con backoff exponencial.
 * =================================================================
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Canales de notificación soportados por el despachador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    Email,
    Webhook,
    Slack,
    Pagerduty,
    Dingtalk,
    Wechat,
    Telegram,
    CustomHttp,
    Opsgenie,
    Discord,
    Teams,
}

impl ActionType {
    pub fn as_wire(&self) -> &'static str {
        match self {
            ActionType::Email => "email",
            ActionType::Webhook => "webhook",
            ActionType::Slack => "slack",
            ActionType::Pagerduty => "pagerduty",
            ActionType::Dingtalk => "dingtalk",
            ActionType::Wechat => "wechat",
            ActionType::Telegram => "telegram",
            ActionType::CustomHttp => "custom-http",
            ActionType::Opsgenie => "opsgenie",
            ActionType::Discord => "discord",
            ActionType::Teams => "teams",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_wire())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "email" => Ok(ActionType::Email),
            "webhook" => Ok(ActionType::Webhook),
            "slack" => Ok(ActionType::Slack),
            "pagerduty" => Ok(ActionType::Pagerduty),
            "dingtalk" => Ok(ActionType::Dingtalk),
            "wechat" => Ok(ActionType::Wechat),
            "telegram" => Ok(ActionType::Telegram),
            "custom-http" => Ok(ActionType::CustomHttp),
            "opsgenie" => Ok(ActionType::Opsgenie),
            "discord" => Ok(ActionType::Discord),
            "teams" => Ok(ActionType::Teams),
            other => Err(format!("UNKNOWN_ACTION_TYPE: {other}")),
        }
    }
}

/// Política de reintentos de una acción.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Intentos totales (incluido el primero). Default 3.
    #[serde(rename = "max_attempts")]
    pub max_attempts: u32,

    /// Espera inicial entre intentos (segundos). Default 5.
    #[serde(rename = "initial_delay_seconds")]
    pub initial_delay_seconds: u64,

    /// Factor multiplicativo del backoff. Default 2.0.
    #[serde(rename = "backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_seconds: 5,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Espera previa al intento `attempt` (1-indexado; el primer intento
    /// no espera).
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2) as i32;
        let scaled =
            (self.initial_delay_seconds as f64) * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(scaled.clamp(0.0, 600.0))
    }
}

/// Acción declarada dentro de una regla.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub action_type: ActionType,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Configuración opaca del adaptador (URL de webhook, canal, etc.).
    #[serde(default)]
    pub config: serde_json::Value,

    #[serde(rename = "retry_policy")]
    pub retry_policy: Option<RetryPolicy>,
}

fn default_enabled() -> bool {
    true
}

impl ActionSpec {
    pub fn effective_retry_policy(&self) -> RetryPolicy {
        self.retry_policy.clone().unwrap_or_default()
    }
}

/// Fallo de ejecución de una acción, clasificado por el adaptador.
#[derive(Error, Debug)]
pub enum ActionError {
    /// Fallo definitivo (HTTP 4xx ≠ 429, configuración rechazada):
    /// el bucle de reintentos aborta de inmediato.
    #[error("[L2_ACTION_FAULT]: PERMANENT -> {0}")]
    Permanent(String),

    /// Fallo transitorio (red, 5xx, 429, timeout): candidato a reintento.
    #[error("[L2_ACTION_FAULT]: TRANSIENT -> {0}")]
    Transient(String),
}

impl ActionError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, ActionError::Permanent(_))
    }

    /// Clasificación canónica de estados HTTP para adaptadores de canal.
    pub fn from_http_status(status: u16, body_excerpt: &str) -> ActionError {
        if status == 429 || status >= 500 {
            ActionError::Transient(format!("HTTP_{status}: {body_excerpt}"))
        } else {
            ActionError::Permanent(format!("HTTP_{status}: {body_excerpt}"))
        }
    }
}
