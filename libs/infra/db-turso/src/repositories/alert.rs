// [libs/infra/db-turso/src/repositories/alert.rs]
/*!
 * =================================================================
 * APARATO: ALERT LEDGER REPOSITORY (V4.2 - LINEARIZED TRANSITIONS)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: ALERTAS DEDUPLICADAS Y MÁQUINA DE ESTADOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. LINEARIZED TRANSITIONS: Cada transición es un UPDATE condicionado
 *    al estado de origen; el motor serializa las filas y un retroceso
 *    concurrente observa 'affected = 0' → 'InvalidState'.
 * 2. FILTER + PAGE: La consulta de operación admite filtros por estado,
 *    severidad, tipo y dispositivo con paginación acotada.
 * 3. FIRST_SEEN IMMUTABILITY: El incremento de ocurrencias jamás toca
 *    'first_seen_at'.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::mapping;
use crate::DbClient;
use chrono::{DateTime, Utc};
use edgelink_domain_models::{Alert, AlertStatus, AlertType, Severity};
use libsql::{params, Row};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, instrument};

const ALERT_COLUMNS: &str = "id, device_id, severity, alert_type, title, message, status, \
     metadata, occurrence_count, first_seen_at, last_seen_at, acknowledged_by, \
     acknowledged_at, resolved_at";

/// Filtro de operación para el listado paginado.
#[derive(Debug, Default, Clone)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub severity: Option<Severity>,
    pub alert_type: Option<AlertType>,
    pub device_id: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

/// Página de resultados con el total para la navegación del operador.
#[derive(Debug, Clone)]
pub struct AlertPage {
    pub alerts: Vec<Alert>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
}

pub struct AlertRepository {
    database_client: DbClient,
}

impl AlertRepository {
    #[must_use]
    pub fn new(database_client: DbClient) -> Self {
        Self { database_client }
    }

    #[instrument(skip(self, alert), fields(alert = %alert.id))]
    pub async fn insert(&self, alert: &Alert) -> Result<(), DbError> {
        let metadata_json = serde_json::to_string(&alert.metadata)
            .map_err(|fault| DbError::MappingError(fault.to_string()))?;

        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                r#"
                INSERT INTO alerts
                    (id, device_id, severity, alert_type, title, message, status, metadata,
                     occurrence_count, first_seen_at, last_seen_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    alert.id.clone(),
                    alert.device_id.clone(),
                    alert.severity.as_wire(),
                    alert.alert_type.as_wire(),
                    alert.title.clone(),
                    alert.message.clone(),
                    alert.status.as_wire(),
                    metadata_json,
                    alert.occurrence_count as i64,
                    alert.first_seen_at.to_rfc3339(),
                    alert.last_seen_at.to_rfc3339()
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, alert_id: &str) -> Result<Option<Alert>, DbError> {
        let connection = self.database_client.get_connection()?;
        let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1");
        let mut rows = connection.query(&sql, params![alert_id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::map_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Alerta activa por (dispositivo, tipo): consulta caliente del dedup.
    pub async fn find_active_by_device_and_type(
        &self,
        device_id: &str,
        alert_type: AlertType,
    ) -> Result<Option<Alert>, DbError> {
        let connection = self.database_client.get_connection()?;
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts
             WHERE device_id = ?1 AND alert_type = ?2 AND status != 'resolved'
             ORDER BY first_seen_at DESC LIMIT 1"
        );
        let mut rows = connection
            .query(&sql, params![device_id, alert_type.as_wire()])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::map_row(&row)?)),
            None => Ok(None),
        }
    }

    /**
     * Absorbe una ocurrencia duplicada: incrementa el contador y avanza
     * 'last_seen_at'. 'first_seen_at' es intocable por diseño del
     * invariante de idempotencia.
     */
    #[instrument(skip(self))]
    pub async fn record_occurrence(
        &self,
        alert_id: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                r#"
                UPDATE alerts
                SET occurrence_count = occurrence_count + 1,
                    last_seen_at = ?2
                WHERE id = ?1 AND status != 'resolved'
                "#,
                params![alert_id, observed_at.to_rfc3339()],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::NotFound(format!("active-alert:{alert_id}")));
        }
        Ok(())
    }

    /// Promoción de severidad decidida por el motor de escalado.
    #[instrument(skip(self))]
    pub async fn promote_severity(
        &self,
        alert_id: &str,
        promoted: Severity,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE alerts SET severity = ?2 WHERE id = ?1 AND status != 'resolved'",
                params![alert_id, promoted.as_wire()],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::NotFound(format!("active-alert:{alert_id}")));
        }
        debug!("📈 [ALERT_ESCALATED]: Alert {} promoted to {}.", alert_id, promoted);
        Ok(())
    }

    /**
     * Transición active → acknowledged, linealizada por fila.
     *
     * # Errors:
     * `InvalidState` si la alerta no está en 'active' (retroceso o doble ack).
     */
    #[instrument(skip(self))]
    pub async fn acknowledge(
        &self,
        alert_id: &str,
        operator_id: &str,
    ) -> Result<Alert, DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                r#"
                UPDATE alerts
                SET status = 'acknowledged', acknowledged_by = ?2, acknowledged_at = ?3
                WHERE id = ?1 AND status = 'active'
                "#,
                params![alert_id, operator_id, Utc::now().to_rfc3339()],
            )
            .await?;

        if affected == 0 {
            return match self.find_by_id(alert_id).await? {
                Some(_) => Err(DbError::InvalidState),
                None => Err(DbError::NotFound(format!("alert:{alert_id}"))),
            };
        }

        self.find_by_id(alert_id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("alert:{alert_id}")))
    }

    /// Transición {active, acknowledged} → resolved.
    #[instrument(skip(self))]
    pub async fn resolve(&self, alert_id: &str) -> Result<Alert, DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                r#"
                UPDATE alerts SET status = 'resolved', resolved_at = ?2
                WHERE id = ?1 AND status != 'resolved'
                "#,
                params![alert_id, Utc::now().to_rfc3339()],
            )
            .await?;

        if affected == 0 {
            return match self.find_by_id(alert_id).await? {
                Some(_) => Err(DbError::InvalidState),
                None => Err(DbError::NotFound(format!("alert:{alert_id}"))),
            };
        }

        self.find_by_id(alert_id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("alert:{alert_id}")))
    }

    /// Resolución masiva por recuperación del dispositivo. Retorna los
    /// identificadores resueltos para la difusión en el bus.
    #[instrument(skip(self))]
    pub async fn resolve_by_device_and_type(
        &self,
        device_id: &str,
        alert_type: AlertType,
    ) -> Result<Vec<String>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id FROM alerts
                 WHERE device_id = ?1 AND alert_type = ?2 AND status != 'resolved'",
                params![device_id, alert_type.as_wire()],
            )
            .await?;

        let mut resolved_ids = Vec::new();
        while let Some(row) = rows.next().await? {
            resolved_ids.push(mapping::get_string(&row, 0)?);
        }

        if resolved_ids.is_empty() {
            return Ok(resolved_ids);
        }

        connection
            .execute(
                r#"
                UPDATE alerts SET status = 'resolved', resolved_at = ?3
                WHERE device_id = ?1 AND alert_type = ?2 AND status != 'resolved'
                "#,
                params![device_id, alert_type.as_wire(), Utc::now().to_rfc3339()],
            )
            .await?;

        debug!(
            "✅ [ALERTS_RECOVERED]: {} {} alerts resolved for device {}.",
            resolved_ids.len(),
            alert_type,
            device_id
        );
        Ok(resolved_ids)
    }

    /// Listado paginado con filtros de operación.
    #[instrument(skip(self, filter))]
    pub async fn list_filtered(&self, filter: &AlertFilter) -> Result<AlertPage, DbError> {
        let mut predicates: Vec<String> = Vec::new();
        let mut arguments: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            predicates.push(format!("status = ?{}", arguments.len() + 1));
            arguments.push(status.as_wire().to_string());
        }
        if let Some(severity) = filter.severity {
            predicates.push(format!("severity = ?{}", arguments.len() + 1));
            arguments.push(severity.as_wire().to_string());
        }
        if let Some(alert_type) = filter.alert_type {
            predicates.push(format!("alert_type = ?{}", arguments.len() + 1));
            arguments.push(alert_type.as_wire().to_string());
        }
        if let Some(device_id) = &filter.device_id {
            predicates.push(format!("device_id = ?{}", arguments.len() + 1));
            arguments.push(device_id.clone());
        }

        let where_clause = if predicates.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", predicates.join(" AND "))
        };

        let page_size = filter.page_size.clamp(1, 200);
        let offset = filter.page.saturating_mul(page_size);

        let connection = self.database_client.get_connection()?;

        let count_sql = format!("SELECT COUNT(*) FROM alerts {where_clause}");
        let mut count_rows = connection
            .query(&count_sql, libsql::params_from_iter(arguments.clone()))
            .await?;
        let total_count = match count_rows.next().await? {
            Some(row) => mapping::get_i64(&row, 0)? as u64,
            None => 0,
        };

        let page_sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts {where_clause}
             ORDER BY last_seen_at DESC LIMIT {page_size} OFFSET {offset}"
        );
        let mut rows = connection
            .query(&page_sql, libsql::params_from_iter(arguments))
            .await?;

        let mut alerts = Vec::new();
        while let Some(row) = rows.next().await? {
            alerts.push(Self::map_row(&row)?);
        }

        Ok(AlertPage {
            alerts,
            total_count,
            page: filter.page,
            page_size,
        })
    }

    fn map_row(row: &Row) -> Result<Alert, DbError> {
        let metadata_raw = mapping::get_string(row, 7)?;
        let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_raw)
            .map_err(|fault| DbError::MappingError(format!("METADATA_MALFORMED: {fault}")))?;

        Ok(Alert {
            id: mapping::get_string(row, 0)?,
            device_id: mapping::get_opt_string(row, 1)?,
            severity: Severity::from_str(&mapping::get_string(row, 2)?)
                .map_err(DbError::MappingError)?,
            alert_type: AlertType::from_str(&mapping::get_string(row, 3)?)
                .map_err(DbError::MappingError)?,
            title: mapping::get_string(row, 4)?,
            message: mapping::get_string(row, 5)?,
            status: AlertStatus::from_str(&mapping::get_string(row, 6)?)
                .map_err(DbError::MappingError)?,
            metadata,
            occurrence_count: mapping::get_i64(row, 8)? as u32,
            first_seen_at: mapping::get_timestamp(row, 9)?,
            last_seen_at: mapping::get_timestamp(row, 10)?,
            acknowledged_by: mapping::get_opt_string(row, 11)?,
            acknowledged_at: mapping::get_opt_timestamp(row, 12)?,
            resolved_at: mapping::get_opt_timestamp(row, 13)?,
        })
    }
}
