// [libs/infra/db-turso/src/repositories/organization.rs]

use crate::errors::DbError;
use crate::repositories::mapping;
use crate::DbClient;
use edgelink_domain_models::Organization;
use libsql::{params, Row};
use tracing::instrument;

pub struct OrganizationRepository {
    database_client: DbClient,
}

impl OrganizationRepository {
    #[must_use]
    pub fn new(database_client: DbClient) -> Self {
        Self { database_client }
    }

    #[instrument(skip(self, organization))]
    pub async fn insert(&self, organization: &Organization) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                r#"
                INSERT INTO organizations (id, slug, name, max_devices, max_virtual_networks, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    organization.id.clone(),
                    organization.slug.clone(),
                    organization.name.clone(),
                    organization.max_devices as i64,
                    organization.max_virtual_networks as i64,
                    organization.created_at.to_rfc3339(),
                    organization.updated_at.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_unique_violation)?;
        Ok(())
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Organization>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, slug, name, max_devices, max_virtual_networks, created_at, updated_at
                 FROM organizations WHERE slug = ?1",
                params![slug],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::map_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Organization>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, slug, name, max_devices, max_virtual_networks, created_at, updated_at
                 FROM organizations WHERE id = ?1",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::map_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Dispositivos vivos bajo la organización (todas sus redes).
    pub async fn count_devices(&self, org_id: &str) -> Result<u32, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                r#"
                SELECT COUNT(*) FROM devices d
                JOIN virtual_networks vn ON vn.id = d.virtual_network_id
                WHERE vn.org_id = ?1
                "#,
                params![org_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(mapping::get_i64(&row, 0)? as u32),
            None => Ok(0),
        }
    }

    fn map_row(row: &Row) -> Result<Organization, DbError> {
        Ok(Organization {
            id: mapping::get_string(row, 0)?,
            slug: mapping::get_string(row, 1)?,
            name: mapping::get_string(row, 2)?,
            max_devices: mapping::get_i64(row, 3)? as u32,
            max_virtual_networks: mapping::get_i64(row, 4)? as u32,
            created_at: mapping::get_timestamp(row, 5)?,
            updated_at: mapping::get_timestamp(row, 6)?,
        })
    }
}
