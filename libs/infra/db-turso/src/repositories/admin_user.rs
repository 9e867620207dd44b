// [libs/infra/db-turso/src/repositories/admin_user.rs]

use crate::errors::DbError;
use crate::repositories::mapping;
use crate::DbClient;
use chrono::Utc;
use edgelink_domain_models::{AdminRole, AdminUser};
use libsql::{params, Row};
use std::str::FromStr;
use tracing::instrument;

pub struct AdminUserRepository {
    database_client: DbClient,
}

impl AdminUserRepository {
    #[must_use]
    pub fn new(database_client: DbClient) -> Self {
        Self { database_client }
    }

    #[instrument(skip(self, operator))]
    pub async fn insert(&self, operator: &AdminUser) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                r#"
                INSERT INTO admin_users
                    (id, org_id, email, name, role, oidc_subject, is_active, last_login_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    operator.id.clone(),
                    operator.org_id.clone(),
                    operator.email.clone(),
                    operator.name.clone(),
                    operator.role.as_wire(),
                    operator.oidc_subject.clone(),
                    if operator.is_active { 1 } else { 0 },
                    operator.last_login_at.map(|ts| ts.to_rfc3339())
                ],
            )
            .await
            .map_err(DbError::from_unique_violation)?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<AdminUser>, DbError> {
        self.find_one("id = ?1", id).await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<AdminUser>, DbError> {
        self.find_one("email = ?1", email).await
    }

    async fn find_one(&self, predicate: &str, argument: &str) -> Result<Option<AdminUser>, DbError> {
        let connection = self.database_client.get_connection()?;
        let sql = format!(
            "SELECT id, org_id, email, name, role, oidc_subject, is_active, last_login_at
             FROM admin_users WHERE {predicate}"
        );
        let mut rows = connection.query(&sql, params![argument]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::map_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn touch_last_login(&self, operator_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE admin_users SET last_login_at = ?2 WHERE id = ?1",
                params![operator_id, Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(())
    }

    fn map_row(row: &Row) -> Result<AdminUser, DbError> {
        Ok(AdminUser {
            id: mapping::get_string(row, 0)?,
            org_id: mapping::get_string(row, 1)?,
            email: mapping::get_string(row, 2)?,
            name: mapping::get_string(row, 3)?,
            role: AdminRole::from_str(&mapping::get_string(row, 4)?)
                .map_err(DbError::MappingError)?,
            oidc_subject: mapping::get_opt_string(row, 5)?,
            is_active: mapping::get_bool(row, 6)?,
            last_login_at: mapping::get_opt_timestamp(row, 7)?,
        })
    }
}
