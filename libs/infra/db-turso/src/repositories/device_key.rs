// [libs/infra/db-turso/src/repositories/device_key.rs]
/*!
 * =================================================================
 * APARATO: DEVICE KEY REPOSITORY (V4.1 - SINGLE ACTIVE)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: CICLO DE VIDA DE LLAVES CON UNICIDAD ACTIVA
 *
 * # Mathematical Proof (Single Active Key):
 * La rotación degrada la llave vigente y alta la sucesora dentro de la
 * misma transacción. Entre el inicio y el commit ningún lector observa
 * cero o dos llaves 'active': la propiedad se preserva linealizada.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::mapping;
use crate::DbClient;
use chrono::{DateTime, Utc};
use edgelink_domain_models::{DeviceKey, KeyStatus};
use libsql::{params, Row};
use std::str::FromStr;
use tracing::{debug, instrument};

pub struct DeviceKeyRepository {
    database_client: DbClient,
}

impl DeviceKeyRepository {
    #[must_use]
    pub fn new(database_client: DbClient) -> Self {
        Self { database_client }
    }

    /// Llave 'active' vigente del dispositivo (exactamente una por invariante).
    pub async fn find_active(&self, device_id: &str) -> Result<Option<DeviceKey>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, device_id, public_key, status, valid_from, expires_at
                 FROM device_keys WHERE device_id = ?1 AND status = 'active'",
                params![device_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::map_row(&row)?)),
            None => Ok(None),
        }
    }

    /**
     * Rotación transaccional: la llave activa pasa a 'pending-rotation'
     * (gracia para peticiones en vuelo) y la sucesora nace 'active'.
     */
    #[instrument(skip(self, new_public_key))]
    pub async fn rotate(
        &self,
        device_id: &str,
        new_public_key: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<DeviceKey, DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection.transaction().await.map_err(DbError::QueryError)?;

        let demoted = transaction
            .execute(
                "UPDATE device_keys SET status = 'pending-rotation'
                 WHERE device_id = ?1 AND status = 'active'",
                params![device_id],
            )
            .await?;

        if demoted == 0 {
            return Err(DbError::NotFound(format!("active-key:{device_id}")));
        }

        let successor = DeviceKey {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            public_key: new_public_key.to_string(),
            status: KeyStatus::Active,
            valid_from: Utc::now(),
            expires_at,
        };

        transaction
            .execute(
                "INSERT INTO device_keys (id, device_id, public_key, status, valid_from, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    successor.id.clone(),
                    successor.device_id.clone(),
                    successor.public_key.clone(),
                    successor.status.as_wire(),
                    successor.valid_from.to_rfc3339(),
                    successor.expires_at.map(|ts| ts.to_rfc3339())
                ],
            )
            .await?;

        transaction.commit().await.map_err(|_| DbError::TransactionError)?;
        debug!("🔑 [KEY_ROTATED]: Device {} now signs with key {}.", device_id, successor.id);
        Ok(successor)
    }

    /// Revocación inmediata por compromiso. La llave queda inutilizable.
    #[instrument(skip(self))]
    pub async fn revoke(&self, key_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE device_keys SET status = 'revoked' WHERE id = ?1",
                params![key_id],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::NotFound(format!("device-key:{key_id}")));
        }
        Ok(())
    }

    /**
     * Barrido del planificador: expira llaves 'active' pasadas de fecha
     * y llaves 'pending-rotation' cuya gracia terminó.
     * Retorna los identificadores de dispositivo afectados.
     */
    #[instrument(skip(self))]
    pub async fn sweep_expired(
        &self,
        now: DateTime<Utc>,
        rotation_grace_hours: i64,
    ) -> Result<Vec<String>, DbError> {
        let connection = self.database_client.get_connection()?;
        let grace_deadline = (now - chrono::Duration::hours(rotation_grace_hours)).to_rfc3339();
        let now_raw = now.to_rfc3339();

        let mut rows = connection
            .query(
                r#"
                SELECT DISTINCT device_id FROM device_keys
                WHERE (status = 'active' AND expires_at IS NOT NULL AND expires_at <= ?1)
                   OR (status = 'pending-rotation' AND valid_from <= ?2)
                "#,
                params![now_raw.clone(), grace_deadline.clone()],
            )
            .await?;

        let mut affected_devices = Vec::new();
        while let Some(row) = rows.next().await? {
            affected_devices.push(mapping::get_string(&row, 0)?);
        }

        connection
            .execute(
                r#"
                UPDATE device_keys SET status = 'expired'
                WHERE (status = 'active' AND expires_at IS NOT NULL AND expires_at <= ?1)
                   OR (status = 'pending-rotation' AND valid_from <= ?2)
                "#,
                params![now_raw, grace_deadline],
            )
            .await?;

        Ok(affected_devices)
    }

    /// Llaves activas que caducan dentro del horizonte dado (alerta 'key-expiring').
    pub async fn list_expiring_within(
        &self,
        now: DateTime<Utc>,
        horizon_days: i64,
    ) -> Result<Vec<DeviceKey>, DbError> {
        let connection = self.database_client.get_connection()?;
        let horizon = (now + chrono::Duration::days(horizon_days)).to_rfc3339();
        let mut rows = connection
            .query(
                r#"
                SELECT id, device_id, public_key, status, valid_from, expires_at
                FROM device_keys
                WHERE status = 'active' AND expires_at IS NOT NULL
                  AND expires_at > ?1 AND expires_at <= ?2
                "#,
                params![now.to_rfc3339(), horizon],
            )
            .await?;

        let mut keys = Vec::new();
        while let Some(row) = rows.next().await? {
            keys.push(Self::map_row(&row)?);
        }
        Ok(keys)
    }

    fn map_row(row: &Row) -> Result<DeviceKey, DbError> {
        Ok(DeviceKey {
            id: mapping::get_string(row, 0)?,
            device_id: mapping::get_string(row, 1)?,
            public_key: mapping::get_string(row, 2)?,
            status: KeyStatus::from_str(&mapping::get_string(row, 3)?)
                .map_err(DbError::MappingError)?,
            valid_from: mapping::get_timestamp(row, 4)?,
            expires_at: mapping::get_opt_timestamp(row, 5)?,
        })
    }
}
