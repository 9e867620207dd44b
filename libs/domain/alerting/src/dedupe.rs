// [libs/domain/alerting/src/dedupe.rs]
/*!
 * =================================================================
 * APARATO: ALERT DEDUPLICATION STORE (V4.2 - FAIL-OPEN SEALED)
 * CLASIFICACIÓN: DOMAIN LOGIC SOBRE KV (ESTRATO L2/L3)
 * RESPONSABILIDAD: DEDUPLICACIÓN, ESCALADO Y PERIODO DE SILENCIO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. KEYED BY HASH16: La identidad del registro es el prefijo de 16
 *    hex de SHA-256(device_id ":" alert_type); el espacio de llaves
 *    queda acotado y uniforme.
 * 2. LOCK-GATED MUTATION: El contador es estrictamente monótono bajo
 *    el cerrojo de 5 s; la contención cede el turno a otro worker.
 * 3. FAIL-OPEN: Cualquier fallo del KV degrada a 'CreateNew' con
 *    advertencia. Preferimos alertas duplicadas a alertas perdidas.
 *
 * # Mathematical Proof (Dedup Idempotence):
 * K envíos del mismo issue dentro de la ventana producen exactamente
 * una alerta con occurrence_count == K y first_seen_at inmutable: el
 * primer envío crea el registro, los K-1 restantes solo incrementan.
 * =================================================================
 */

use chrono::{DateTime, Duration, Utc};
use edgelink_domain_models::{AlertType, Severity};
use edgelink_infra_kv::{DistributedLock, KeyValueStore, KvError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Configuración del almacén de deduplicación.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Ventana de fusión de ocurrencias (segundos). Default 30 min.
    #[serde(rename = "dedup_window_seconds")]
    pub dedup_window_seconds: i64,

    /// Ocurrencias que disparan la promoción de severidad. Default 10.
    #[serde(rename = "escalation_threshold")]
    pub escalation_threshold: u32,

    /// Supresión tras resolución (segundos). Default 5 min.
    #[serde(rename = "silent_period_seconds")]
    pub silent_period_seconds: i64,

    /// Vida del cerrojo de mutación (segundos). Default 5 s.
    #[serde(rename = "lock_ttl_seconds")]
    pub lock_ttl_seconds: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            dedup_window_seconds: 1800,
            escalation_threshold: 10,
            silent_period_seconds: 300,
            lock_ttl_seconds: 5,
        }
    }
}

/// Registro JSON persistido bajo `alert:dedupe:{hash16}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupRecord {
    #[serde(rename = "alert_id")]
    pub alert_id: String,

    #[serde(rename = "first_seen_at")]
    pub first_seen_at: DateTime<Utc>,

    #[serde(rename = "last_seen_at")]
    pub last_seen_at: DateTime<Utc>,

    #[serde(rename = "occurrence_count")]
    pub occurrence_count: u32,

    #[serde(rename = "current_severity")]
    pub current_severity: Severity,

    pub escalated: bool,
}

/// Veredicto del camino de deduplicación.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupVerdict {
    /// No hay registro vivo: el generador debe crear la alerta con este
    /// identificador y occurrence_count = 1.
    CreateNew { alert_id: String },

    /// Ocurrencia absorbida por una alerta existente. Si
    /// 'escalate_to' porta severidad, el generador debe promover.
    Duplicate {
        alert_id: String,
        occurrence_count: u32,
        escalate_to: Option<Severity>,
    },

    /// Silencio post-resolución o contención de cerrojo: otro worker
    /// (o el propio silencio) gobierna este hallazgo.
    Suppressed,
}

pub struct DedupStore {
    kv_store: Arc<dyn KeyValueStore>,
    config: DedupConfig,
}

impl DedupStore {
    #[must_use]
    pub fn new(kv_store: Arc<dyn KeyValueStore>, config: DedupConfig) -> Self {
        Self { kv_store, config }
    }

    /// Prefijo de 16 hex de SHA-256(device_id ":" alert_type).
    pub fn dedup_hash(device_id: &str, alert_type: AlertType) -> String {
        let mut hasher = Sha256::new();
        hasher.update(device_id.as_bytes());
        hasher.update(b":");
        hasher.update(alert_type.as_wire().as_bytes());
        hex::encode(hasher.finalize())[..16].to_string()
    }

    fn record_key(hash: &str) -> String {
        format!("alert:dedupe:{hash}")
    }

    fn lock_key(hash: &str) -> String {
        format!("alert:lock:{hash}")
    }

    fn silent_key(hash: &str) -> String {
        format!("alert:silent:{hash}")
    }

    /**
     * Decide el destino de un HealthIssue y estampa el registro en la
     * misma sección crítica.
     *
     * # Logic:
     * 1. Silencio armado -> Suppressed.
     * 2. Cerrojo contendido -> Suppressed (otro worker lo gobierna).
     * 3. Registro ausente o fuera de ventana -> CreateNew + registro fresco.
     * 4. Registro vivo -> incremento monótono + veredicto de escalado.
     *
     * # Errors:
     * Nunca propaga fallos del KV: degrada a CreateNew (fail-open).
     */
    #[instrument(skip(self), fields(device = %device_id, issue = %alert_type))]
    pub async fn evaluate_and_stamp(
        &self,
        device_id: &str,
        alert_type: AlertType,
        observed_severity: Severity,
        now: DateTime<Utc>,
    ) -> DedupVerdict {
        match self
            .evaluate_inner(device_id, alert_type, observed_severity, now)
            .await
        {
            Ok(verdict) => verdict,
            Err(kv_fault) => {
                warn!(
                    "⚠️ [DEDUP_FAIL_OPEN]: KV unavailable ({}). Creating alert without dedup.",
                    kv_fault
                );
                DedupVerdict::CreateNew {
                    alert_id: uuid::Uuid::new_v4().to_string(),
                }
            }
        }
    }

    async fn evaluate_inner(
        &self,
        device_id: &str,
        alert_type: AlertType,
        observed_severity: Severity,
        now: DateTime<Utc>,
    ) -> Result<DedupVerdict, KvError> {
        let hash = Self::dedup_hash(device_id, alert_type);

        // 1. PERIODO DE SILENCIO
        if self.kv_store.exists(&Self::silent_key(&hash)).await? {
            debug!("🤫 [DEDUP_SILENT]: Key {} under silent period.", hash);
            return Ok(DedupVerdict::Suppressed);
        }

        // 2. SECCIÓN CRÍTICA POR LLAVE
        let lock = match DistributedLock::try_acquire(
            self.kv_store.clone(),
            &Self::lock_key(&hash),
            std::time::Duration::from_secs(self.config.lock_ttl_seconds),
        )
        .await?
        {
            Some(lock) => lock,
            None => return Ok(DedupVerdict::Suppressed),
        };

        let verdict = self
            .decide_under_lock(&hash, observed_severity, now)
            .await;

        // Liberación idempotente; el veredicto no depende de su éxito.
        if let Err(release_fault) = lock.release().await {
            warn!("⚠️ [DEDUP_LOCK]: Release failed: {}", release_fault);
        }

        verdict
    }

    async fn decide_under_lock(
        &self,
        hash: &str,
        observed_severity: Severity,
        now: DateTime<Utc>,
    ) -> Result<DedupVerdict, KvError> {
        let record_key = Self::record_key(hash);
        let record_ttl =
            std::time::Duration::from_secs((self.config.dedup_window_seconds * 2).max(1) as u64);

        let live_record = match self.kv_store.get(&record_key).await? {
            Some(raw) => serde_json::from_str::<DedupRecord>(&raw)
                .map_err(|fault| KvError::Codec(fault.to_string()))
                .map(Some)?,
            None => None,
        };

        let window = Duration::seconds(self.config.dedup_window_seconds);

        match live_record {
            // 3. REGISTRO AUSENTE O FUERA DE VENTANA
            None => self.stamp_fresh(&record_key, record_ttl, observed_severity, now).await,
            Some(record) if now - record.last_seen_at > window => {
                self.stamp_fresh(&record_key, record_ttl, observed_severity, now).await
            }

            // 4. REGISTRO VIVO: INCREMENTO MONÓTONO
            Some(mut record) => {
                record.occurrence_count += 1;
                record.last_seen_at = now;

                let escalation_due = !record.escalated
                    && record.occurrence_count >= self.config.escalation_threshold
                    && record.current_severity != Severity::Critical;

                let escalate_to = if escalation_due {
                    let promoted = record.current_severity.escalated();
                    record.current_severity = promoted;
                    record.escalated = true;
                    Some(promoted)
                } else {
                    None
                };

                let serialized = serde_json::to_string(&record)
                    .map_err(|fault| KvError::Codec(fault.to_string()))?;
                self.kv_store.set(&record_key, &serialized, Some(record_ttl)).await?;

                Ok(DedupVerdict::Duplicate {
                    alert_id: record.alert_id,
                    occurrence_count: record.occurrence_count,
                    escalate_to,
                })
            }
        }
    }

    async fn stamp_fresh(
        &self,
        record_key: &str,
        record_ttl: std::time::Duration,
        observed_severity: Severity,
        now: DateTime<Utc>,
    ) -> Result<DedupVerdict, KvError> {
        let fresh = DedupRecord {
            alert_id: uuid::Uuid::new_v4().to_string(),
            first_seen_at: now,
            last_seen_at: now,
            occurrence_count: 1,
            current_severity: observed_severity,
            escalated: false,
        };

        let serialized =
            serde_json::to_string(&fresh).map_err(|fault| KvError::Codec(fault.to_string()))?;
        self.kv_store.set(record_key, &serialized, Some(record_ttl)).await?;

        Ok(DedupVerdict::CreateNew {
            alert_id: fresh.alert_id,
        })
    }

    /**
     * Desarme post-resolución: elimina el registro de dedup y arma el
     * periodo de silencio para suprimir re-disparos inmediatos.
     */
    #[instrument(skip(self), fields(device = %device_id, issue = %alert_type))]
    pub async fn clear_and_arm_silence(
        &self,
        device_id: &str,
        alert_type: AlertType,
    ) -> Result<(), KvError> {
        let hash = Self::dedup_hash(device_id, alert_type);

        self.kv_store.delete(&Self::record_key(&hash)).await?;
        self.kv_store
            .set(
                &Self::silent_key(&hash),
                "1",
                Some(std::time::Duration::from_secs(
                    self.config.silent_period_seconds.max(0) as u64,
                )),
            )
            .await?;

        debug!("🤫 [DEDUP_DISARMED]: Key {} cleared, silence armed.", hash);
        Ok(())
    }

    /// Lectura del registro vivo (diagnóstico y pruebas).
    pub async fn read_record(
        &self,
        device_id: &str,
        alert_type: AlertType,
    ) -> Result<Option<DedupRecord>, KvError> {
        let hash = Self::dedup_hash(device_id, alert_type);
        match self.kv_store.get(&Self::record_key(&hash)).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|fault| KvError::Codec(fault.to_string())),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgelink_infra_kv::MemoryKvStore;

    fn build_store() -> DedupStore {
        DedupStore::new(Arc::new(MemoryKvStore::new()), DedupConfig::default())
    }

    #[tokio::test]
    async fn first_issue_creates_then_duplicates_accumulate() {
        let store = build_store();
        let now = Utc::now();

        let first = store
            .evaluate_and_stamp("dev-1", AlertType::DeviceOffline, Severity::Medium, now)
            .await;
        let created_id = match first {
            DedupVerdict::CreateNew { alert_id } => alert_id,
            other => panic!("expected CreateNew, got {other:?}"),
        };

        for expected_count in 2..=5u32 {
            let verdict = store
                .evaluate_and_stamp("dev-1", AlertType::DeviceOffline, Severity::Medium, now)
                .await;
            match verdict {
                DedupVerdict::Duplicate {
                    alert_id,
                    occurrence_count,
                    escalate_to,
                } => {
                    assert_eq!(alert_id, created_id);
                    assert_eq!(occurrence_count, expected_count);
                    assert_eq!(escalate_to, None);
                }
                other => panic!("expected Duplicate, got {other:?}"),
            }
        }

        let record = store
            .read_record("dev-1", AlertType::DeviceOffline)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.occurrence_count, 5);
    }

    #[tokio::test]
    async fn first_seen_is_immutable_across_occurrences() {
        let store = build_store();
        let origin = Utc::now();

        store
            .evaluate_and_stamp("dev-1", AlertType::HighLatency, Severity::High, origin)
            .await;
        let stamped_origin = store
            .read_record("dev-1", AlertType::HighLatency)
            .await
            .unwrap()
            .unwrap()
            .first_seen_at;

        store
            .evaluate_and_stamp(
                "dev-1",
                AlertType::HighLatency,
                Severity::High,
                origin + Duration::minutes(5),
            )
            .await;

        let record = store
            .read_record("dev-1", AlertType::HighLatency)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.first_seen_at, stamped_origin);
        assert!(record.last_seen_at > stamped_origin);
    }

    #[tokio::test]
    async fn escalation_fires_exactly_once_at_threshold() {
        let store = build_store();
        let now = Utc::now();

        // Ocurrencias 1..=9: sin escalado.
        for _ in 0..9 {
            let verdict = store
                .evaluate_and_stamp("dev-1", AlertType::DeviceOffline, Severity::Medium, now)
                .await;
            if let DedupVerdict::Duplicate { escalate_to, .. } = verdict {
                assert_eq!(escalate_to, None);
            }
        }

        // Ocurrencia 10: promoción exacta de un peldaño.
        let verdict = store
            .evaluate_and_stamp("dev-1", AlertType::DeviceOffline, Severity::Medium, now)
            .await;
        match verdict {
            DedupVerdict::Duplicate {
                occurrence_count,
                escalate_to,
                ..
            } => {
                assert_eq!(occurrence_count, 10);
                assert_eq!(escalate_to, Some(Severity::High));
            }
            other => panic!("expected Duplicate, got {other:?}"),
        }

        // Ocurrencia 11: jamás re-escala el mismo registro.
        let verdict = store
            .evaluate_and_stamp("dev-1", AlertType::DeviceOffline, Severity::Medium, now)
            .await;
        match verdict {
            DedupVerdict::Duplicate { escalate_to, .. } => assert_eq!(escalate_to, None),
            other => panic!("expected Duplicate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn critical_severity_never_escalates() {
        let store = DedupStore::new(
            Arc::new(MemoryKvStore::new()),
            DedupConfig {
                escalation_threshold: 2,
                ..DedupConfig::default()
            },
        );
        let now = Utc::now();

        store
            .evaluate_and_stamp("dev-1", AlertType::TunnelFailure, Severity::Critical, now)
            .await;
        for _ in 0..5 {
            let verdict = store
                .evaluate_and_stamp("dev-1", AlertType::TunnelFailure, Severity::Critical, now)
                .await;
            if let DedupVerdict::Duplicate { escalate_to, .. } = verdict {
                assert_eq!(escalate_to, None);
            }
        }
    }

    #[tokio::test]
    async fn silence_suppresses_until_it_lapses() {
        let store = DedupStore::new(
            Arc::new(MemoryKvStore::new()),
            DedupConfig {
                silent_period_seconds: 1,
                ..DedupConfig::default()
            },
        );
        let now = Utc::now();

        store
            .evaluate_and_stamp("dev-1", AlertType::DeviceOffline, Severity::Medium, now)
            .await;
        store
            .clear_and_arm_silence("dev-1", AlertType::DeviceOffline)
            .await
            .unwrap();

        let verdict = store
            .evaluate_and_stamp("dev-1", AlertType::DeviceOffline, Severity::Medium, now)
            .await;
        assert_eq!(verdict, DedupVerdict::Suppressed);

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let verdict = store
            .evaluate_and_stamp("dev-1", AlertType::DeviceOffline, Severity::Medium, now)
            .await;
        assert!(matches!(verdict, DedupVerdict::CreateNew { .. }));
    }

    #[tokio::test]
    async fn stale_record_outside_window_creates_anew() {
        let store = DedupStore::new(
            Arc::new(MemoryKvStore::new()),
            DedupConfig {
                dedup_window_seconds: 60,
                ..DedupConfig::default()
            },
        );
        let origin = Utc::now() - Duration::minutes(10);

        store
            .evaluate_and_stamp("dev-1", AlertType::DeviceOffline, Severity::Medium, origin)
            .await;

        // Fuera de la ventana de 60 s: nueva alerta, nuevo registro.
        let verdict = store
            .evaluate_and_stamp("dev-1", AlertType::DeviceOffline, Severity::Medium, Utc::now())
            .await;
        assert!(matches!(verdict, DedupVerdict::CreateNew { .. }));
    }
}
