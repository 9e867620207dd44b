// [libs/infra/db-turso/src/repositories/device.rs]
/*!
 * =================================================================
 * APARATO: DEVICE LEDGER REPOSITORY (V4.2 - CAS DISCIPLINE)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: REGISTRO ATÓMICO, PRESENCIA Y CLASIFICACIÓN NAT
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CAS BY INDEX: El índice UNIQUE(virtual_network_id, virtual_ip) es
 *    la primitiva compare-and-set del asignador de IPs; una colisión se
 *    traduce a 'VirtualIpTaken' y el estrato L4 reintenta con la
 *    siguiente candidata.
 * 2. REGISTRATION ATOMICITY: Dispositivo y llave activa nacen en la
 *    misma transacción; jamás existe dispositivo sin llave.
 * 3. WRITE-BEHIND FRIENDLY: 'touch_last_seen_bulk' absorbe ráfagas de
 *    latidos en una sola transacción.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::mapping;
use crate::DbClient;
use chrono::{DateTime, Utc};
use edgelink_domain_models::{Device, DeviceKey, KeyStatus, NatType, Platform};
use libsql::{params, Row};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, instrument, warn};

const DEVICE_COLUMNS: &str = "id, virtual_network_id, name, virtual_ip, public_key, platform, \
     nat_type, public_endpoint, tags, online, last_seen_at, created_at, updated_at";

pub struct DeviceRepository {
    database_client: DbClient,
}

impl DeviceRepository {
    #[must_use]
    pub fn new(database_client: DbClient) -> Self {
        Self { database_client }
    }

    /**
     * Registra el dispositivo junto con su llave activa inicial en una
     * única transacción ACID.
     *
     * # Errors:
     * - `DuplicatePublicKey` si la llave WireGuard ya existe globalmente.
     * - `VirtualIpTaken` si otra inscripción ganó la IP candidata (CAS).
     */
    #[instrument(skip(self, device, initial_key), fields(device = %device.id))]
    pub async fn insert_registered(
        &self,
        device: &Device,
        initial_key: &DeviceKey,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection.transaction().await.map_err(DbError::QueryError)?;

        let tags_json = serde_json::to_string(&device.tags)
            .map_err(|fault| DbError::MappingError(fault.to_string()))?;

        transaction
            .execute(
                r#"
                INSERT INTO devices
                    (id, virtual_network_id, name, virtual_ip, public_key, platform,
                     nat_type, public_endpoint, tags, online, last_seen_at, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
                params![
                    device.id.clone(),
                    device.virtual_network_id.clone(),
                    device.name.clone(),
                    device.virtual_ip.clone(),
                    device.public_key.clone(),
                    device.platform.as_wire(),
                    device.nat_type.as_wire(),
                    device.public_endpoint.clone(),
                    tags_json,
                    if device.online { 1 } else { 0 },
                    device.last_seen_at.map(|ts| ts.to_rfc3339()),
                    device.created_at.to_rfc3339(),
                    device.updated_at.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_unique_violation)?;

        transaction
            .execute(
                r#"
                INSERT INTO device_keys (id, device_id, public_key, status, valid_from, expires_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    initial_key.id.clone(),
                    initial_key.device_id.clone(),
                    initial_key.public_key.clone(),
                    initial_key.status.as_wire(),
                    initial_key.valid_from.to_rfc3339(),
                    initial_key.expires_at.map(|ts| ts.to_rfc3339())
                ],
            )
            .await
            .map_err(DbError::QueryError)?;

        transaction.commit().await.map_err(|fault| {
            warn!("❌ [REGISTRATION_COMMIT_FAULT]: {}", fault);
            DbError::TransactionError
        })?;

        debug!("✅ [DEVICE_SEALED]: Device {} registered with active key.", device.id);
        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Device>, DbError> {
        self.find_one("id = ?1", id).await
    }

    pub async fn find_by_public_key(&self, public_key: &str) -> Result<Option<Device>, DbError> {
        self.find_one("public_key = ?1", public_key).await
    }

    async fn find_one(&self, predicate: &str, argument: &str) -> Result<Option<Device>, DbError> {
        let connection = self.database_client.get_connection()?;
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE {predicate}");
        let mut rows = connection.query(&sql, params![argument]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::map_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_by_network(&self, network_id: &str) -> Result<Vec<Device>, DbError> {
        self.list_where("virtual_network_id = ?1", network_id).await
    }

    /// Consulta caliente del resolutor de pares: miembros en línea.
    pub async fn list_online_by_network(&self, network_id: &str) -> Result<Vec<Device>, DbError> {
        self.list_where("virtual_network_id = ?1 AND online = 1", network_id)
            .await
    }

    async fn list_where(&self, predicate: &str, argument: &str) -> Result<Vec<Device>, DbError> {
        let connection = self.database_client.get_connection()?;
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE {predicate} ORDER BY virtual_ip");
        let mut rows = connection.query(&sql, params![argument]).await?;

        let mut devices = Vec::new();
        while let Some(row) = rows.next().await? {
            devices.push(Self::map_row(&row)?);
        }
        Ok(devices)
    }

    /// Inventario completo para la sonda de salud.
    pub async fn list_all(&self) -> Result<Vec<Device>, DbError> {
        let connection = self.database_client.get_connection()?;
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices ORDER BY virtual_network_id, virtual_ip");
        let mut rows = connection.query(&sql, ()).await?;

        let mut devices = Vec::new();
        while let Some(row) = rows.next().await? {
            devices.push(Self::map_row(&row)?);
        }
        Ok(devices)
    }

    /// IPs ya asignadas dentro de una red, para el escaneo secuencial
    /// del asignador.
    pub async fn taken_ips(&self, network_id: &str) -> Result<HashSet<String>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT virtual_ip FROM devices WHERE virtual_network_id = ?1",
                params![network_id],
            )
            .await?;

        let mut occupied = HashSet::new();
        while let Some(row) = rows.next().await? {
            occupied.insert(mapping::get_string(&row, 0)?);
        }
        Ok(occupied)
    }

    #[instrument(skip(self))]
    pub async fn set_online(&self, device_id: &str, online: bool) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE devices SET online = ?2, updated_at = ?3 WHERE id = ?1",
                params![device_id, if online { 1 } else { 0 }, Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn update_nat_classification(
        &self,
        device_id: &str,
        nat_type: NatType,
        public_endpoint: Option<&str>,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                r#"
                UPDATE devices
                SET nat_type = ?2,
                    public_endpoint = COALESCE(?3, public_endpoint),
                    updated_at = ?4
                WHERE id = ?1
                "#,
                params![
                    device_id,
                    nat_type.as_wire(),
                    public_endpoint.map(str::to_string),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::NotFound(format!("device:{device_id}")));
        }
        Ok(())
    }

    /**
     * Cristaliza una ráfaga de latidos acumulada por el buffer
     * write-behind: 'last_seen_at', endpoint observado y bandera online
     * en una sola transacción.
     */
    #[instrument(skip(self, observations), fields(count = observations.len()))]
    pub async fn touch_last_seen_bulk(
        &self,
        observations: Vec<(String, DateTime<Utc>, Option<String>)>,
    ) -> Result<usize, DbError> {
        if observations.is_empty() {
            return Ok(0);
        }

        let connection = self.database_client.get_connection()?;
        let transaction = connection.transaction().await.map_err(DbError::QueryError)?;

        let update_sql = r#"
            UPDATE devices
            SET last_seen_at = ?2,
                online = 1,
                public_endpoint = COALESCE(?3, public_endpoint),
                updated_at = ?2
            WHERE id = ?1
        "#;

        let processed_count = observations.len();
        for (device_id, observed_at, public_endpoint) in &observations {
            transaction
                .execute(
                    update_sql,
                    params![device_id.clone(), observed_at.to_rfc3339(), public_endpoint.clone()],
                )
                .await
                .map_err(DbError::QueryError)?;
        }

        transaction.commit().await.map_err(|_| DbError::TransactionError)?;
        debug!("💾 [PRESENCE_SYNC]: {} heartbeat records secured in the Ledger.", processed_count);
        Ok(processed_count)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, device_id: &str) -> Result<bool, DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection.transaction().await.map_err(DbError::QueryError)?;

        transaction
            .execute("DELETE FROM device_keys WHERE device_id = ?1", params![device_id])
            .await?;
        transaction
            .execute(
                "DELETE FROM peer_configurations WHERE device_id = ?1 OR peer_device_id = ?1",
                params![device_id],
            )
            .await?;
        let affected = transaction
            .execute("DELETE FROM devices WHERE id = ?1", params![device_id])
            .await?;

        transaction.commit().await.map_err(|_| DbError::TransactionError)?;
        Ok(affected > 0)
    }

    fn map_row(row: &Row) -> Result<Device, DbError> {
        Ok(Device {
            id: mapping::get_string(row, 0)?,
            virtual_network_id: mapping::get_string(row, 1)?,
            name: mapping::get_string(row, 2)?,
            virtual_ip: mapping::get_string(row, 3)?,
            public_key: mapping::get_string(row, 4)?,
            platform: Platform::from_str(&mapping::get_string(row, 5)?)
                .map_err(DbError::MappingError)?,
            nat_type: NatType::from_str(&mapping::get_string(row, 6)?)
                .map_err(DbError::MappingError)?,
            public_endpoint: mapping::get_opt_string(row, 7)?,
            tags: mapping::get_string_list(row, 8)?,
            online: mapping::get_bool(row, 9)?,
            last_seen_at: mapping::get_opt_timestamp(row, 10)?,
            created_at: mapping::get_timestamp(row, 11)?,
            updated_at: mapping::get_timestamp(row, 12)?,
        })
    }
}

/// Forja la llave activa inicial que acompaña al registro.
pub fn forge_initial_key(
    device_id: &str,
    signing_public_key: &str,
    expires_at: Option<DateTime<Utc>>,
) -> DeviceKey {
    DeviceKey {
        id: uuid::Uuid::new_v4().to_string(),
        device_id: device_id.to_string(),
        public_key: signing_public_key.to_string(),
        status: KeyStatus::Active,
        valid_from: Utc::now(),
        expires_at,
    }
}
