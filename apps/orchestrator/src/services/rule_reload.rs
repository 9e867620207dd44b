// [apps/orchestrator/src/services/rule_reload.rs]
/*!
 * =================================================================
 * APARATO: RULE FILE HOT-RELOAD WATCHER (V4.1 - MTIME POLL)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: RECARGA EN CALIENTE DEL FICHERO DE REGLAS
 *
 * # Logic:
 * Sondeo de mtime a cadencia configurable. Un fichero modificado se
 * interpreta y valida COMPLETO antes del intercambio atómico; un
 * documento rechazado deja el conjunto vigente intacto.
 * =================================================================
 */

use crate::state::AppState;
use edgelink_domain_notification::RuleSet;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::time::interval;
use tracing::{info, instrument, warn};

/// Carga y valida el fichero de reglas; intercambia el conjunto si es
/// sano. Retorna la cantidad de reglas activas tras la operación.
pub fn force_reload(application_state: &AppState) -> Result<usize, String> {
    let rule_file_path = application_state
        .config
        .rule_file_path
        .clone()
        .ok_or_else(|| "RULE_FILE_UNCONFIGURED".to_string())?;

    let raw_document = std::fs::read_to_string(&rule_file_path)
        .map_err(|io_fault| format!("RULE_FILE_UNREADABLE: {io_fault}"))?;

    let rule_set =
        RuleSet::from_json(&raw_document).map_err(|validation_fault| validation_fault.to_string())?;

    let active_count = rule_set.len();
    application_state.dispatcher.swap_rules(Arc::new(rule_set));
    Ok(active_count)
}

fn read_mtime(path: &str) -> Option<SystemTime> {
    std::fs::metadata(Path::new(path))
        .and_then(|metadata| metadata.modified())
        .ok()
}

/// Daemon de sondeo de mtime. Sin fichero configurado, se retira.
#[instrument(skip(application_state))]
pub async fn spawn_rule_reload_watcher(application_state: AppState) {
    let Some(rule_file_path) = application_state.config.rule_file_path.clone() else {
        info!("📜 [RULE_WATCHER]: No rule file configured; Herald runs on fallback map.");
        return;
    };

    let poll_interval = application_state.config.rule_reload_interval;

    tokio::spawn(async move {
        let mut watcher_timer = interval(poll_interval);
        let mut last_observed_mtime = read_mtime(&rule_file_path);

        info!(
            "📜 [RULE_WATCHER]: Watching '{}' every {:?}.",
            rule_file_path, poll_interval
        );

        loop {
            watcher_timer.tick().await;

            let current_mtime = read_mtime(&rule_file_path);
            if current_mtime == last_observed_mtime {
                continue;
            }
            last_observed_mtime = current_mtime;

            match force_reload(&application_state) {
                Ok(active_count) => {
                    info!("🔄 [RULE_WATCHER]: Hot reload applied ({} rules).", active_count);
                }
                Err(reload_fault) => {
                    // El conjunto vigente sigue activo: disponibilidad manda.
                    warn!("⚠️ [RULE_WATCHER]: Reload rejected: {}. Previous set retained.", reload_fault);
                }
            }
        }
    });
}
