// [libs/infra/kv/src/lock.rs]
/*!
 * =================================================================
 * APARATO: DISTRIBUTED LOCK GUARD (V4.0 - NX DISCIPLINE)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: EXCLUSIÓN MUTUA SOBRE PRIMITIVAS NX + TTL
 *
 * # Mathematical Proof (Fencing by Token):
 * Cada adquisición porta un token único. La liberación es un borrado
 * condicionado al token propio: si el TTL expiró y otro poseedor tomó
 * el cerrojo, la liberación tardía degenera en no-operación en lugar
 * de robar la exclusión ajena.
 * =================================================================
 */

use crate::errors::KvError;
use crate::store::KeyValueStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Secuencia monótona de proceso para diferenciar tokens emitidos en el
/// mismo nanosegundo.
static LOCK_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Posesión viva de un cerrojo distribuido. La liberación es explícita
/// ('release') o implícita por expiración del TTL en el almacén.
pub struct DistributedLock {
    store: Arc<dyn KeyValueStore>,
    lock_key: String,
    fencing_token: String,
}

impl DistributedLock {
    /**
     * Intenta adquirir el cerrojo mediante escritura NX con TTL.
     *
     * Retorna `Ok(None)` si otro poseedor mantiene la exclusión: el
     * llamador debe ceder el turno, jamás esperar bloqueado.
     */
    pub async fn try_acquire(
        store: Arc<dyn KeyValueStore>,
        lock_key: &str,
        ttl: Duration,
    ) -> Result<Option<DistributedLock>, KvError> {
        let sequence = LOCK_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let fencing_token = format!(
            "{}-{}",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            sequence
        );

        let acquired = store.set_if_absent(lock_key, &fencing_token, Some(ttl)).await?;
        if !acquired {
            debug!("⏳ [LOCK_CONTENDED]: Key [{}] held by another owner.", lock_key);
            return Ok(None);
        }

        debug!("🔐 [LOCK_ACQUIRED]: Key [{}] fenced.", lock_key);
        Ok(Some(DistributedLock {
            store,
            lock_key: lock_key.to_string(),
            fencing_token,
        }))
    }

    /**
     * Libera el cerrojo de forma idempotente.
     *
     * Si el TTL ya expiró (y quizá otro poseedor lo reclamó), el borrado
     * condicionado no encuentra el token propio y la operación degenera
     * en no-op con advertencia.
     */
    pub async fn release(self) -> Result<(), KvError> {
        let released = self
            .store
            .compare_and_delete(&self.lock_key, &self.fencing_token)
            .await?;

        if released {
            debug!("🔓 [LOCK_RELEASED]: Key [{}] freed.", self.lock_key);
        } else {
            warn!(
                "⚠️ [LOCK_LAPSED]: Key [{}] expired before explicit release.",
                self.lock_key
            );
        }
        Ok(())
    }

    pub fn key(&self) -> &str {
        &self.lock_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKvStore;

    #[tokio::test]
    async fn second_acquire_is_rejected_while_held() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());

        let held = DistributedLock::try_acquire(store.clone(), "job:lock:probe", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(held.is_some());

        let contender =
            DistributedLock::try_acquire(store.clone(), "job:lock:probe", Duration::from_secs(5))
                .await
                .unwrap();
        assert!(contender.is_none());
    }

    #[tokio::test]
    async fn release_reopens_the_lock() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());

        let held = DistributedLock::try_acquire(store.clone(), "job:lock:sweep", Duration::from_secs(5))
            .await
            .unwrap()
            .expect("first acquire must win");
        held.release().await.unwrap();

        let second =
            DistributedLock::try_acquire(store, "job:lock:sweep", Duration::from_secs(5))
                .await
                .unwrap();
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn lapsed_ttl_makes_release_a_noop_and_lock_reclaimable() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());

        let held =
            DistributedLock::try_acquire(store.clone(), "job:lock:fast", Duration::from_millis(10))
                .await
                .unwrap()
                .expect("first acquire must win");

        tokio::time::sleep(Duration::from_millis(30)).await;

        // Otro poseedor reclama el cerrojo ya expirado.
        let successor =
            DistributedLock::try_acquire(store.clone(), "job:lock:fast", Duration::from_secs(5))
                .await
                .unwrap();
        assert!(successor.is_some());

        // La liberación tardía no roba la exclusión del sucesor.
        held.release().await.unwrap();
        let contender =
            DistributedLock::try_acquire(store, "job:lock:fast", Duration::from_secs(5))
                .await
                .unwrap();
        assert!(contender.is_none());
    }
}
