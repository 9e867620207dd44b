// [libs/infra/db-turso/src/repositories/peer.rs]

use crate::errors::DbError;
use crate::repositories::mapping;
use crate::DbClient;
use edgelink_domain_models::PeerConfiguration;
use libsql::{params, Row};
use tracing::{debug, instrument};

/// Persistencia de la vista materializada de pares. El resolutor de
/// topología reconstruye el conjunto por dispositivo; aquí solo se
/// sustituye de forma transaccional y se sirve ordenado.
pub struct PeerRepository {
    database_client: DbClient,
}

impl PeerRepository {
    #[must_use]
    pub fn new(database_client: DbClient) -> Self {
        Self { database_client }
    }

    /**
     * Sustituye el conjunto de pares del dispositivo en una transacción:
     * borrado del conjunto previo + alta del recalculado.
     */
    #[instrument(skip(self, peer_set), fields(device = %device_id, count = peer_set.len()))]
    pub async fn replace_for_device(
        &self,
        device_id: &str,
        peer_set: &[PeerConfiguration],
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection.transaction().await.map_err(DbError::QueryError)?;

        transaction
            .execute(
                "DELETE FROM peer_configurations WHERE device_id = ?1",
                params![device_id],
            )
            .await?;

        for peer in peer_set {
            let allowed_ips_json = serde_json::to_string(&peer.allowed_ips)
                .map_err(|fault| DbError::MappingError(fault.to_string()))?;

            transaction
                .execute(
                    r#"
                    INSERT INTO peer_configurations
                        (id, device_id, peer_device_id, peer_public_key, peer_virtual_ip,
                         allowed_ips, persistent_keepalive)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                    params![
                        peer.id.clone(),
                        peer.device_id.clone(),
                        peer.peer_device_id.clone(),
                        peer.peer_public_key.clone(),
                        peer.peer_virtual_ip.clone(),
                        allowed_ips_json,
                        peer.persistent_keepalive.map(|seconds| seconds as i64)
                    ],
                )
                .await?;
        }

        transaction.commit().await.map_err(|_| DbError::TransactionError)?;
        debug!("🕸️ [PEER_SET_SEALED]: {} peers materialized for device {}.", peer_set.len(), device_id);
        Ok(())
    }

    /// Conjunto de pares del dispositivo, orden estable por IP virtual.
    pub async fn list_by_device(&self, device_id: &str) -> Result<Vec<PeerConfiguration>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                r#"
                SELECT id, device_id, peer_device_id, peer_public_key, peer_virtual_ip,
                       allowed_ips, persistent_keepalive
                FROM peer_configurations WHERE device_id = ?1
                "#,
                params![device_id],
            )
            .await?;

        let mut peer_set = Vec::new();
        while let Some(row) = rows.next().await? {
            peer_set.push(Self::map_row(&row)?);
        }

        PeerConfiguration::sort_stable(&mut peer_set);
        Ok(peer_set)
    }

    fn map_row(row: &Row) -> Result<PeerConfiguration, DbError> {
        Ok(PeerConfiguration {
            id: mapping::get_string(row, 0)?,
            device_id: mapping::get_string(row, 1)?,
            peer_device_id: mapping::get_string(row, 2)?,
            peer_public_key: mapping::get_string(row, 3)?,
            peer_virtual_ip: mapping::get_string(row, 4)?,
            allowed_ips: mapping::get_string_list(row, 5)?,
            persistent_keepalive: mapping::get_opt_i64(row, 6)?.map(|seconds| seconds as u16),
        })
    }
}
