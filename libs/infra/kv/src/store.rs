// [libs/infra/kv/src/store.rs]
/*!
 * =================================================================
 * APARATO: KEY-VALUE CAPABILITY CONTRACT (V4.0 - SOBERANO)
 * CLASIFICACIÓN: INFRASTRUCTURE CONTRACT (ESTRATO L3)
 * RESPONSABILIDAD: CONTRATO MÍNIMO TTL + CAS + NX + CONTADORES
 *
 * # Mathematical Proof (Atomicity Floor):
 * Toda mutación de estado compartido (contadores de PSK, registros de
 * deduplicación, cerrojos) pasa por 'compare_and_swap', 'set_if_absent'
 * o 'increment'. Un motor que implemente estas tres primitivas de forma
 * atómica hereda todas las garantías de concurrencia del plano de
 * control sin cambios en los estratos superiores.
 * =================================================================
 */

use crate::errors::KvError;
use async_trait::async_trait;
use std::time::Duration;

/// Contrato de capacidad del almacén clave-valor compartido.
///
/// Las implementaciones deben ser seguras para multihilo y cancelables:
/// abandonar el future antes de su resolución no puede dejar el almacén
/// en estado intermedio observable.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Lee el valor vigente; las entradas expiradas se reportan ausentes.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Escribe el valor con TTL opcional (None = sin expiración).
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError>;

    /// Elimina la entrada. Retorna si existía una entrada vigente.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// Escritura NX: solo inserta si la llave está ausente o expirada.
    /// Retorna `true` si esta invocación ganó la inserción.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, KvError>;

    /// Sustitución condicionada al valor vigente exacto (`None` exige
    /// ausencia). Retorna `true` si la precondición se cumplió.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        next: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, KvError>;

    /// Borrado condicionado al valor vigente exacto. Idempotente por
    /// construcción: una entrada ya ausente retorna `false` sin fallo.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, KvError>;

    /// Contador atómico con TTL aplicado solo en la creación.
    /// Retorna el valor resultante tras aplicar el delta.
    async fn increment(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, KvError>;

    /// Renueva el TTL de una entrada vigente. Retorna si la entrada existía.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError>;

    /// Existencia de entrada vigente (no expirada).
    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.get(key).await?.is_some())
    }
}
