// [libs/domain/alerting/src/lib.rs]
/*!
 * =================================================================
 * APARATO: HEALTH & ALERTING STRATUM ROOT (V4.0 - SOBERANO)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: SALUD DEL MESH, DEDUPLICACIÓN Y ESCALADO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. RULE PURITY: Las reglas de salud son funciones puras sobre el
 *    estado observado del dispositivo; el orquestador aporta el reloj
 *    y la telemetría.
 * 2. FAIL-OPEN DISCIPLINE: Todo fallo del KV en la ruta de dedup
 *    degrada a creación de alerta: preferimos duplicados a pérdida.
 * =================================================================
 */

/// HealthIssues y la escalera de severidad por duración.
pub mod issue;

/// Reglas de la sonda de salud con umbrales configurables.
pub mod rules;

/// Almacén de deduplicación, escalado y periodo de silencio sobre el KV.
pub mod dedupe;

pub use crate::dedupe::{DedupConfig, DedupRecord, DedupStore, DedupVerdict};
pub use crate::issue::{offline_severity, HealthIssue};
pub use crate::rules::{HealthRulesConfig, HealthRulesEngine};
