// [libs/infra/db-turso/src/repositories/psk.rs]
/*!
 * =================================================================
 * APARATO: PRE-SHARED KEY REPOSITORY (V4.1 - ATOMIC CONSUMPTION)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: CONSUMO ATÓMICO Y TRIAJE DE CREDENCIALES
 *
 * # Mathematical Proof (Monotonic used_count):
 * 'consume' es un UPDATE condicionado que incrementa 'used_count' solo
 * si la credencial sigue viva y bajo techo. Dos registros concurrentes
 * contra la última plaza ejecutan el mismo UPDATE; el motor serializa
 * las filas y exactamente uno observa 'affected = 1'. Tras N intentos
 * contra maxUses = M el contador vale min(N, M).
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::mapping;
use crate::DbClient;
use chrono::Utc;
use edgelink_domain_models::PreSharedKey;
use libsql::{params, Row};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

pub struct PskRepository {
    database_client: DbClient,
}

impl PskRepository {
    #[must_use]
    pub fn new(database_client: DbClient) -> Self {
        Self { database_client }
    }

    /// SHA-256 hex del material en claro. Única forma que toca el Ledger.
    pub fn hash_key_material(raw_key_material: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw_key_material.as_bytes());
        hex::encode(hasher.finalize())
    }

    #[instrument(skip(self, psk))]
    pub async fn insert(&self, psk: &PreSharedKey) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                r#"
                INSERT INTO pre_shared_keys
                    (id, org_id, key_hash, name, max_uses, used_count, expires_at, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    psk.id.clone(),
                    psk.org_id.clone(),
                    psk.key_hash.clone(),
                    psk.name.clone(),
                    psk.max_uses.map(|ceiling| ceiling as i64),
                    psk.used_count as i64,
                    psk.expires_at.map(|ts| ts.to_rfc3339()),
                    psk.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_unique_violation)?;
        Ok(())
    }

    pub async fn find_by_hash(&self, key_hash: &str) -> Result<Option<PreSharedKey>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, org_id, key_hash, name, max_uses, used_count, expires_at, created_at
                 FROM pre_shared_keys WHERE key_hash = ?1",
                params![key_hash],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::map_row(&row)?)),
            None => Ok(None),
        }
    }

    /**
     * Valida y consume un uso de la credencial en una sola operación
     * atómica. Retorna la PSK con el contador ya incrementado.
     *
     * # Errors:
     * - `PskUnknown` si el hash no existe.
     * - `PskExpired` si la ventana temporal caducó.
     * - `PskExhausted` si el techo de usos fue alcanzado.
     */
    #[instrument(skip(self, raw_key_material))]
    pub async fn consume(&self, raw_key_material: &str) -> Result<PreSharedKey, DbError> {
        let key_hash = Self::hash_key_material(raw_key_material);
        let connection = self.database_client.get_connection()?;
        let now_raw = Utc::now().to_rfc3339();

        // Incremento condicionado: la primitiva CAS del invariante.
        let affected = connection
            .execute(
                r#"
                UPDATE pre_shared_keys
                SET used_count = used_count + 1
                WHERE key_hash = ?1
                  AND (expires_at IS NULL OR expires_at > ?2)
                  AND (max_uses IS NULL OR used_count < max_uses)
                "#,
                params![key_hash.clone(), now_raw],
            )
            .await?;

        if affected == 1 {
            let consumed = self
                .find_by_hash(&key_hash)
                .await?
                .ok_or_else(|| DbError::NotFound("psk".into()))?;
            debug!(
                "🎫 [PSK_CONSUMED]: Credential {} now at {} uses.",
                consumed.id, consumed.used_count
            );
            return Ok(consumed);
        }

        // Triaje post-fallo: distinguir desconocida / caducada / agotada.
        match self.find_by_hash(&key_hash).await? {
            None => Err(DbError::PskUnknown),
            Some(existing) if existing.is_expired(Utc::now()) => {
                warn!("⛔ [PSK_REJECTED]: Credential {} expired.", existing.id);
                Err(DbError::PskExpired)
            }
            Some(existing) => {
                warn!("⛔ [PSK_REJECTED]: Credential {} exhausted.", existing.id);
                Err(DbError::PskExhausted)
            }
        }
    }

    fn map_row(row: &Row) -> Result<PreSharedKey, DbError> {
        Ok(PreSharedKey {
            id: mapping::get_string(row, 0)?,
            org_id: mapping::get_string(row, 1)?,
            key_hash: mapping::get_string(row, 2)?,
            name: mapping::get_opt_string(row, 3)?,
            max_uses: mapping::get_opt_i64(row, 4)?.map(|ceiling| ceiling as u32),
            used_count: mapping::get_i64(row, 5)? as u32,
            expires_at: mapping::get_opt_timestamp(row, 6)?,
            created_at: mapping::get_timestamp(row, 7)?,
        })
    }
}
