// [libs/infra/db-turso/src/repositories/audit.rs]
/*!
 * =================================================================
 * APARATO: AUDIT TRAIL REPOSITORY (V4.0 - INSERT ONLY)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: RASTRO DE AUDITORÍA INMUTABLE DEL MESH
 *
 * # Mathematical Proof (Immutability by Omission):
 * El repositorio no expone UPDATE ni DELETE sobre 'audit_logs'. La
 * inmutabilidad del rastro queda garantizada por construcción del
 * adaptador: ninguna ruta de código del plano de control puede mutar
 * una entrada tras su inserción.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::mapping;
use crate::DbClient;
use edgelink_domain_models::AuditLog;
use libsql::{params, Row};
use tracing::instrument;

pub struct AuditRepository {
    database_client: DbClient,
}

impl AuditRepository {
    #[must_use]
    pub fn new(database_client: DbClient) -> Self {
        Self { database_client }
    }

    #[instrument(skip(self, entry), fields(action = %entry.action))]
    pub async fn append(&self, entry: &AuditLog) -> Result<(), DbError> {
        let before_state_json = entry
            .before_state
            .as_ref()
            .map(serde_json::Value::to_string);
        let after_state_json = entry.after_state.as_ref().map(serde_json::Value::to_string);

        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                r#"
                INSERT INTO audit_logs
                    (id, org_id, actor_id, action, resource_type, resource_id,
                     before_state, after_state, ip_address, user_agent, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    entry.id.clone(),
                    entry.org_id.clone(),
                    entry.actor_id.clone(),
                    entry.action.clone(),
                    entry.resource_type.clone(),
                    entry.resource_id.clone(),
                    before_state_json,
                    after_state_json,
                    entry.ip_address.clone(),
                    entry.user_agent.clone(),
                    entry.created_at.to_rfc3339()
                ],
            )
            .await?;
        Ok(())
    }

    /// Rastro ordenado por tiempo descendente, paginado.
    pub async fn list_by_org(
        &self,
        org_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<AuditLog>, DbError> {
        let bounded_page_size = page_size.clamp(1, 500);
        let offset = page.saturating_mul(bounded_page_size);

        let connection = self.database_client.get_connection()?;
        let sql = format!(
            "SELECT id, org_id, actor_id, action, resource_type, resource_id,
                    before_state, after_state, ip_address, user_agent, created_at
             FROM audit_logs WHERE org_id = ?1
             ORDER BY created_at DESC LIMIT {bounded_page_size} OFFSET {offset}"
        );
        let mut rows = connection.query(&sql, params![org_id]).await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::map_row(&row)?);
        }
        Ok(entries)
    }

    fn map_row(row: &Row) -> Result<AuditLog, DbError> {
        let parse_state = |raw: Option<String>| -> Result<Option<serde_json::Value>, DbError> {
            match raw {
                Some(text) => serde_json::from_str(&text)
                    .map(Some)
                    .map_err(|fault| DbError::MappingError(format!("STATE_MALFORMED: {fault}"))),
                None => Ok(None),
            }
        };

        Ok(AuditLog {
            id: mapping::get_string(row, 0)?,
            org_id: mapping::get_string(row, 1)?,
            actor_id: mapping::get_opt_string(row, 2)?,
            action: mapping::get_string(row, 3)?,
            resource_type: mapping::get_string(row, 4)?,
            resource_id: mapping::get_string(row, 5)?,
            before_state: parse_state(mapping::get_opt_string(row, 6)?)?,
            after_state: parse_state(mapping::get_opt_string(row, 7)?)?,
            ip_address: mapping::get_opt_string(row, 8)?,
            user_agent: mapping::get_opt_string(row, 9)?,
            created_at: mapping::get_timestamp(row, 10)?,
        })
    }
}
