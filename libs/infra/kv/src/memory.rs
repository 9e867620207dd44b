// [libs/infra/kv/src/memory.rs]
/*!
 * =================================================================
 * APARATO: MEMORY KV ENGINE (V4.1 - SWEEPER HARDENED)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: MOTOR DE REFERENCIA EN RAM CON EXPIRACIÓN LAZY
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. LAZY EXPIRY: Toda lectura filtra entradas caducadas; el barrido
 *    periódico solo recupera memoria, nunca afecta a la semántica.
 * 2. SINGLE LOCK DISCIPLINE: Un único RwLock protege el mapa; jamás se
 *    retiene a través de un punto de suspensión.
 * 3. POISON SHIELDING: El envenenamiento del cerrojo se reporta como
 *    fallo de backend en lugar de propagar el pánico.
 * =================================================================
 */

use crate::errors::KvError;
use crate::store::KeyValueStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|deadline| now >= deadline).unwrap_or(false)
    }
}

/// Motor clave-valor de referencia del monolito. Un despliegue
/// multi-instancia sustituye este motor por uno de red que cumpla el
/// mismo contrato de capacidad.
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /**
     * Barrido de higiene: purga físicamente las entradas caducadas.
     * Retorna la cantidad de entradas recuperadas.
     */
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries_guard = match self.entries.write() {
            Ok(guard) => guard,
            Err(_) => return 0,
        };

        let initial_count = entries_guard.len();
        entries_guard.retain(|_, entry| !entry.is_expired(now));
        let purged_count = initial_count - entries_guard.len();

        if purged_count > 0 {
            debug!("🧹 [KV_SWEEP]: Evicted {} expired entries from memory strata.", purged_count);
        }
        purged_count
    }

    fn with_write<T>(
        &self,
        operation: impl FnOnce(&mut HashMap<String, StoredEntry>) -> T,
    ) -> Result<T, KvError> {
        let mut guard = self
            .entries
            .write()
            .map_err(|fault| KvError::Backend(format!("LOCK_POISONED: {fault}")))?;
        Ok(operation(&mut guard))
    }

    fn live_value(entry: Option<&StoredEntry>, now: Instant) -> Option<String> {
        entry
            .filter(|stored| !stored.is_expired(now))
            .map(|stored| stored.value.clone())
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = Instant::now();
        let guard = self
            .entries
            .read()
            .map_err(|fault| KvError::Backend(format!("LOCK_POISONED: {fault}")))?;
        Ok(Self::live_value(guard.get(key), now))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        self.with_write(|entries| {
            entries.insert(
                key.to_string(),
                StoredEntry {
                    value: value.to_string(),
                    expires_at: ttl.map(|duration| Instant::now() + duration),
                },
            );
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let now = Instant::now();
        self.with_write(|entries| match entries.remove(key) {
            Some(entry) => !entry.is_expired(now),
            None => false,
        })
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, KvError> {
        let now = Instant::now();
        self.with_write(|entries| {
            let is_vacant = Self::live_value(entries.get(key), now).is_none();
            if is_vacant {
                entries.insert(
                    key.to_string(),
                    StoredEntry {
                        value: value.to_string(),
                        expires_at: ttl.map(|duration| now + duration),
                    },
                );
            }
            is_vacant
        })
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        next: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, KvError> {
        let now = Instant::now();
        self.with_write(|entries| {
            let current = Self::live_value(entries.get(key), now);
            if current.as_deref() != expected {
                return false;
            }
            entries.insert(
                key.to_string(),
                StoredEntry {
                    value: next.to_string(),
                    expires_at: ttl.map(|duration| now + duration),
                },
            );
            true
        })
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, KvError> {
        let now = Instant::now();
        self.with_write(|entries| {
            let matches = Self::live_value(entries.get(key), now)
                .map(|current| current == expected)
                .unwrap_or(false);
            if matches {
                entries.remove(key);
            }
            matches
        })
    }

    async fn increment(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, KvError> {
        let now = Instant::now();
        let outcome = self.with_write(|entries| {
            let current = Self::live_value(entries.get(key), now);
            let parsed: Result<i64, KvError> = match current {
                Some(raw) => raw
                    .parse::<i64>()
                    .map_err(|_| KvError::Codec(format!("NON_NUMERIC_COUNTER: {key}"))),
                None => Ok(0),
            };

            parsed.map(|base| {
                let next_value = base + delta;
                let expires_at = match entries.get(key).filter(|entry| !entry.is_expired(now)) {
                    // Entrada viva: preservamos su TTL vigente.
                    Some(existing) => existing.expires_at,
                    // Creación: el TTL solicitado aplica una sola vez.
                    None => ttl.map(|duration| now + duration),
                };
                entries.insert(
                    key.to_string(),
                    StoredEntry {
                        value: next_value.to_string(),
                        expires_at,
                    },
                );
                next_value
            })
        })?;
        outcome
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let now = Instant::now();
        self.with_write(|entries| match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                true
            }
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete_cycle() {
        let store = MemoryKvStore::new();
        store.set("alpha", "1", None).await.unwrap();
        assert_eq!(store.get("alpha").await.unwrap(), Some("1".into()));
        assert!(store.delete("alpha").await.unwrap());
        assert_eq!(store.get("alpha").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let store = MemoryKvStore::new();
        store
            .set("ephemeral", "x", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.get("ephemeral").await.unwrap(), None);
        // La llave caducada vuelve a estar disponible para NX.
        assert!(store.set_if_absent("ephemeral", "y", None).await.unwrap());
    }

    #[tokio::test]
    async fn set_if_absent_admits_exactly_one_winner() {
        let store = MemoryKvStore::new();
        assert!(store.set_if_absent("lock", "owner-1", None).await.unwrap());
        assert!(!store.set_if_absent("lock", "owner-2", None).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap(), Some("owner-1".into()));
    }

    #[tokio::test]
    async fn compare_and_swap_enforces_precondition() {
        let store = MemoryKvStore::new();
        assert!(store.compare_and_swap("k", None, "v1", None).await.unwrap());
        assert!(!store.compare_and_swap("k", None, "v2", None).await.unwrap());
        assert!(store
            .compare_and_swap("k", Some("v1"), "v2", None)
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("v2".into()));
    }

    #[tokio::test]
    async fn compare_and_delete_is_idempotent() {
        let store = MemoryKvStore::new();
        store.set("token", "abc", None).await.unwrap();
        assert!(store.compare_and_delete("token", "abc").await.unwrap());
        // Segunda liberación: sin entrada, sin fallo.
        assert!(!store.compare_and_delete("token", "abc").await.unwrap());
    }

    #[tokio::test]
    async fn increment_preserves_live_ttl_and_counts() {
        let store = MemoryKvStore::new();
        assert_eq!(
            store
                .increment("counter", 1, Some(Duration::from_secs(60)))
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.increment("counter", 4, None).await.unwrap(), 5);
        assert_eq!(store.increment("counter", -2, None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn non_numeric_counter_is_a_codec_fault() {
        let store = MemoryKvStore::new();
        store.set("counter", "not-a-number", None).await.unwrap();
        assert!(matches!(
            store.increment("counter", 1, None).await,
            Err(KvError::Codec(_))
        ));
    }

    #[tokio::test]
    async fn sweep_reclaims_only_expired_entries() {
        let store = MemoryKvStore::new();
        store
            .set("old", "x", Some(Duration::from_millis(5)))
            .await
            .unwrap();
        store.set("fresh", "y", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.get("fresh").await.unwrap(), Some("y".into()));
    }
}
