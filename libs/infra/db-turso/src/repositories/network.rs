// [libs/infra/db-turso/src/repositories/network.rs]

use crate::errors::DbError;
use crate::repositories::mapping;
use crate::DbClient;
use edgelink_domain_models::VirtualNetwork;
use libsql::{params, Row};
use tracing::instrument;

pub struct NetworkRepository {
    database_client: DbClient,
}

impl NetworkRepository {
    #[must_use]
    pub fn new(database_client: DbClient) -> Self {
        Self { database_client }
    }

    /**
     * Persiste una red virtual tras verificar el invariante de pasarela.
     *
     * # Errors:
     * - `MappingError` si el invariante `gateway_ip ∈ cidr` no se cumple.
     * - `UniqueViolation` si el CIDR ya existe dentro de la organización.
     */
    #[instrument(skip(self, network))]
    pub async fn insert(&self, network: &VirtualNetwork) -> Result<(), DbError> {
        network
            .validate_gateway()
            .map_err(|fault| DbError::MappingError(fault.to_string()))?;

        let dns_servers_json = serde_json::to_string(&network.dns_servers)
            .map_err(|fault| DbError::MappingError(fault.to_string()))?;

        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                r#"
                INSERT INTO virtual_networks
                    (id, org_id, name, cidr, gateway_ip, dns_servers, flat_mesh, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    network.id.clone(),
                    network.org_id.clone(),
                    network.name.clone(),
                    network.cidr.clone(),
                    network.gateway_ip.clone(),
                    dns_servers_json,
                    if network.flat_mesh { 1 } else { 0 },
                    network.created_at.to_rfc3339(),
                    network.updated_at.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_unique_violation)?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<VirtualNetwork>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, org_id, name, cidr, gateway_ip, dns_servers, flat_mesh, created_at, updated_at
                 FROM virtual_networks WHERE id = ?1",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::map_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_by_org(&self, org_id: &str) -> Result<Vec<VirtualNetwork>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, org_id, name, cidr, gateway_ip, dns_servers, flat_mesh, created_at, updated_at
                 FROM virtual_networks WHERE org_id = ?1 ORDER BY created_at",
                params![org_id],
            )
            .await?;

        let mut networks = Vec::new();
        while let Some(row) = rows.next().await? {
            networks.push(Self::map_row(&row)?);
        }
        Ok(networks)
    }

    fn map_row(row: &Row) -> Result<VirtualNetwork, DbError> {
        Ok(VirtualNetwork {
            id: mapping::get_string(row, 0)?,
            org_id: mapping::get_string(row, 1)?,
            name: mapping::get_string(row, 2)?,
            cidr: mapping::get_string(row, 3)?,
            gateway_ip: mapping::get_string(row, 4)?,
            dns_servers: mapping::get_string_list(row, 5)?,
            flat_mesh: mapping::get_bool(row, 6)?,
            created_at: mapping::get_timestamp(row, 7)?,
            updated_at: mapping::get_timestamp(row, 8)?,
        })
    }
}
