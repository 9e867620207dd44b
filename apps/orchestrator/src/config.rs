// [apps/orchestrator/src/config.rs]
/*!
 * =================================================================
 * APARATO: FROZEN ORCHESTRATOR CONFIG (V4.1 - SINGLE READ)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: CAPTURA ÚNICA DE ENTORNO Y REGISTRO CONGELADO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. NO GLOBALS: El entorno se lee UNA vez en la ignición; cada
 *    componente recibe el registro congelado por constructor. La única
 *    subsección recargable es el fichero de reglas (swap atómico en el
 *    despachador).
 * 2. DEFAULTS OPERATIVOS: Todo umbral porta el default nominal del
 *    mesh y es sobreescribible por variable de entorno.
 * =================================================================
 */

use edgelink_domain_alerting::{DedupConfig, HealthRulesConfig};
use edgelink_domain_notification::EmailQueueConfig;
use std::time::Duration;

/// Registro congelado de configuración del Orquestador.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    // --- RED Y PERSISTENCIA ---
    pub listening_port: u16,
    pub database_url: String,
    pub database_auth_token: Option<String>,
    /// Dirección del transporte RPC interno; vacía lo desactiva.
    pub internal_rpc_bind: Option<String>,

    // --- SEGURIDAD PERIMETRAL ---
    /// Token de arranque para emitir sesiones administrativas.
    pub admin_bootstrap_token: String,
    /// Ventana de validez de una sesión administrativa.
    pub admin_session_ttl: Duration,
    /// Deriva máxima admitida del sello temporal de firma (±segundos).
    pub signature_skew_seconds: i64,

    // --- PRESENCIA Y LATIDOS ---
    /// Intervalo nominal de latido declarado a los dispositivos.
    pub heartbeat_interval: Duration,
    /// TTL de la entrada de presencia (≈ 2x heartbeat).
    pub presence_ttl: Duration,
    /// Cadencia del volcado write-behind de latidos.
    pub heartbeat_flush_interval: Duration,

    // --- SALUD, DEDUP Y NOTIFICACIÓN ---
    pub health_rules: HealthRulesConfig,
    pub dedup: DedupConfig,
    pub email_queue: EmailQueueConfig,
    /// Fichero de reglas del motor Herald; ausente = solo fallback.
    pub rule_file_path: Option<String>,
    /// Cadencia del sondeo de mtime del fichero de reglas.
    pub rule_reload_interval: Duration,
    /// Timeout por acción de canal saliente.
    pub action_timeout: Duration,
    pub notification_engine_enabled: bool,

    // --- CORREO SALIENTE (SMTP) ---
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_sender: String,
    pub email_recipients: Vec<String>,

    // --- PLANIFICADOR ---
    /// Techo de ejecuciones de jobs concurrentes.
    pub scheduler_pool_size: usize,
    /// Gracia de llaves 'pending-rotation' antes de expirar (horas).
    pub key_rotation_grace_hours: i64,
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

impl OrchestratorConfig {
    /**
     * Captura el entorno completo en un registro congelado.
     * Esta es la ÚNICA lectura de variables del proceso.
     */
    pub fn from_env() -> Self {
        let heartbeat_seconds: u64 = env_parse("EDGELINK_HEARTBEAT_SECONDS", 30);

        Self {
            listening_port: env_parse("PORT", 3000),
            database_url: env_string("DATABASE_URL", ":memory:"),
            database_auth_token: std::env::var("TURSO_AUTH_TOKEN").ok(),
            internal_rpc_bind: std::env::var("EDGELINK_RPC_BIND").ok(),

            admin_bootstrap_token: env_string("EDGELINK_ADMIN_BOOTSTRAP_TOKEN", ""),
            admin_session_ttl: Duration::from_secs(env_parse(
                "EDGELINK_ADMIN_SESSION_TTL_SECONDS",
                43_200,
            )),
            signature_skew_seconds: env_parse("EDGELINK_SIGNATURE_SKEW_SECONDS", 300),

            heartbeat_interval: Duration::from_secs(heartbeat_seconds),
            presence_ttl: Duration::from_secs(heartbeat_seconds * 2),
            heartbeat_flush_interval: Duration::from_secs(env_parse(
                "EDGELINK_HEARTBEAT_FLUSH_SECONDS",
                5,
            )),

            health_rules: HealthRulesConfig {
                offline_threshold_seconds: env_parse("EDGELINK_OFFLINE_THRESHOLD_SECONDS", 300),
                latency_p95_threshold_ms: env_parse("EDGELINK_LATENCY_P95_MS", 200.0),
                key_expiry_horizon_days: env_parse("EDGELINK_KEY_EXPIRY_HORIZON_DAYS", 7),
            },
            dedup: DedupConfig {
                dedup_window_seconds: env_parse("EDGELINK_DEDUP_WINDOW_SECONDS", 1800),
                escalation_threshold: env_parse("EDGELINK_ESCALATION_THRESHOLD", 10),
                silent_period_seconds: env_parse("EDGELINK_SILENT_PERIOD_SECONDS", 300),
                lock_ttl_seconds: env_parse("EDGELINK_DEDUP_LOCK_TTL_SECONDS", 5),
            },
            email_queue: EmailQueueConfig {
                capacity: env_parse("EDGELINK_EMAIL_QUEUE_CAPACITY", 1000),
                worker_count: env_parse("EDGELINK_EMAIL_WORKERS", 3),
                sends_per_minute: env_parse("EDGELINK_EMAIL_SENDS_PER_MINUTE", 100),
                max_retries: env_parse("EDGELINK_EMAIL_MAX_RETRIES", 3),
                retry_delay_seconds: env_parse("EDGELINK_EMAIL_RETRY_DELAY_SECONDS", 5),
            },
            rule_file_path: std::env::var("EDGELINK_RULE_FILE").ok(),
            rule_reload_interval: Duration::from_secs(env_parse(
                "EDGELINK_RULE_RELOAD_SECONDS",
                30,
            )),
            action_timeout: Duration::from_secs(env_parse("EDGELINK_ACTION_TIMEOUT_SECONDS", 15)),
            notification_engine_enabled: env_parse("EDGELINK_NOTIFICATIONS_ENABLED", true),

            smtp_host: env_string("EDGELINK_SMTP_HOST", "127.0.0.1"),
            smtp_port: env_parse("EDGELINK_SMTP_PORT", 25),
            smtp_username: std::env::var("EDGELINK_SMTP_USERNAME").ok(),
            smtp_password: std::env::var("EDGELINK_SMTP_PASSWORD").ok(),
            smtp_sender: env_string("EDGELINK_SMTP_SENDER", "alerts@edgelink.local"),
            email_recipients: env_string("EDGELINK_EMAIL_RECIPIENTS", "")
                .split(',')
                .map(str::trim)
                .filter(|recipient| !recipient.is_empty())
                .map(str::to_string)
                .collect(),

            scheduler_pool_size: env_parse("EDGELINK_SCHEDULER_POOL", num_cpus::get().max(2)),
            key_rotation_grace_hours: env_parse("EDGELINK_KEY_ROTATION_GRACE_HOURS", 24),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_ttl_doubles_heartbeat() {
        // Sin entorno: defaults nominales.
        let config = OrchestratorConfig::from_env();
        assert_eq!(config.presence_ttl, config.heartbeat_interval * 2);
        assert_eq!(config.dedup.escalation_threshold, 10);
        assert_eq!(config.email_queue.capacity, 1000);
    }
}
