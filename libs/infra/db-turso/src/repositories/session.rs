// [libs/infra/db-turso/src/repositories/session.rs]
/*!
 * =================================================================
 * APARATO: TUNNEL SESSION REPOSITORY (V4.1 - CANONICAL LEDGER)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: REGISTRO DE SESIONES CON PAR CANÓNICO ÚNICO
 *
 * # Mathematical Proof (One Row Per Attempt):
 * 'record_established' cierra cualquier sesión activa del par canónico
 * y alta la nueva dentro de la misma transacción: para todo (x, y) con
 * x ≠ y existe a lo sumo una fila activa {min, max} en el Ledger.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::mapping;
use crate::DbClient;
use chrono::Utc;
use edgelink_domain_models::{ConnectionType, Session};
use libsql::{params, Row};
use std::str::FromStr;
use tracing::{debug, instrument};

pub struct SessionRepository {
    database_client: DbClient,
}

impl SessionRepository {
    #[must_use]
    pub fn new(database_client: DbClient) -> Self {
        Self { database_client }
    }

    /**
     * Registra la sesión decidida por el coordinador NAT.
     *
     * # Errors:
     * `MappingError` si ambos extremos son el mismo dispositivo.
     */
    #[instrument(skip(self))]
    pub async fn record_established(
        &self,
        first_device_id: &str,
        second_device_id: &str,
        connection_type: ConnectionType,
    ) -> Result<Session, DbError> {
        let (device_a_id, device_b_id) = Session::canonical_pair(first_device_id, second_device_id)
            .ok_or_else(|| DbError::MappingError("SELF_SESSION_FORBIDDEN".into()))?;

        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            device_a_id: device_a_id.clone(),
            device_b_id: device_b_id.clone(),
            connection_type,
            started_at: Utc::now(),
            ended_at: None,
            last_handshake_at: None,
            bytes_sent: 0,
            bytes_received: 0,
            avg_latency_ms: None,
        };

        let connection = self.database_client.get_connection()?;
        let transaction = connection.transaction().await.map_err(DbError::QueryError)?;

        // Cierre de la sesión activa previa del par, si existe.
        transaction
            .execute(
                "UPDATE sessions SET ended_at = ?3
                 WHERE device_a_id = ?1 AND device_b_id = ?2 AND ended_at IS NULL",
                params![device_a_id.clone(), device_b_id.clone(), session.started_at.to_rfc3339()],
            )
            .await?;

        transaction
            .execute(
                r#"
                INSERT INTO sessions
                    (id, device_a_id, device_b_id, connection_type, started_at,
                     bytes_sent, bytes_received)
                VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)
                "#,
                params![
                    session.id.clone(),
                    device_a_id,
                    device_b_id,
                    connection_type.as_wire(),
                    session.started_at.to_rfc3339()
                ],
            )
            .await?;

        transaction.commit().await.map_err(|_| DbError::TransactionError)?;
        debug!(
            "🔗 [SESSION_SEALED]: Pair ({}, {}) via {}.",
            session.device_a_id, session.device_b_id, connection_type
        );
        Ok(session)
    }

    /// Sesión activa del par canónico, si existe.
    pub async fn find_active_for_pair(
        &self,
        first_device_id: &str,
        second_device_id: &str,
    ) -> Result<Option<Session>, DbError> {
        let (device_a_id, device_b_id) = Session::canonical_pair(first_device_id, second_device_id)
            .ok_or_else(|| DbError::MappingError("SELF_SESSION_FORBIDDEN".into()))?;

        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                r#"
                SELECT id, device_a_id, device_b_id, connection_type, started_at, ended_at,
                       last_handshake_at, bytes_sent, bytes_received, avg_latency_ms
                FROM sessions
                WHERE device_a_id = ?1 AND device_b_id = ?2 AND ended_at IS NULL
                "#,
                params![device_a_id, device_b_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::map_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Actualiza contadores y latencia media reportados por telemetría.
    #[instrument(skip(self))]
    pub async fn update_metrics(
        &self,
        session_id: &str,
        bytes_sent: u64,
        bytes_received: u64,
        avg_latency_ms: Option<f64>,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                r#"
                UPDATE sessions
                SET bytes_sent = ?2, bytes_received = ?3,
                    avg_latency_ms = COALESCE(?4, avg_latency_ms),
                    last_handshake_at = ?5
                WHERE id = ?1
                "#,
                params![
                    session_id,
                    bytes_sent as i64,
                    bytes_received as i64,
                    avg_latency_ms,
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;
        Ok(())
    }

    /// Latencias medias de sesiones activas que involucran al dispositivo,
    /// insumo de la regla 'high-latency' de la sonda de salud.
    pub async fn active_latencies_for_device(&self, device_id: &str) -> Result<Vec<f64>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                r#"
                SELECT avg_latency_ms FROM sessions
                WHERE (device_a_id = ?1 OR device_b_id = ?1)
                  AND ended_at IS NULL AND avg_latency_ms IS NOT NULL
                "#,
                params![device_id],
            )
            .await?;

        let mut latencies = Vec::new();
        while let Some(row) = rows.next().await? {
            if let Some(latency) = mapping::get_opt_f64(&row, 0)? {
                latencies.push(latency);
            }
        }
        Ok(latencies)
    }

    #[instrument(skip(self))]
    pub async fn end_session(&self, session_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE sessions SET ended_at = ?2 WHERE id = ?1 AND ended_at IS NULL",
                params![session_id, Utc::now().to_rfc3339()],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::NotFound(format!("session:{session_id}")));
        }
        Ok(())
    }

    fn map_row(row: &Row) -> Result<Session, DbError> {
        Ok(Session {
            id: mapping::get_string(row, 0)?,
            device_a_id: mapping::get_string(row, 1)?,
            device_b_id: mapping::get_string(row, 2)?,
            connection_type: ConnectionType::from_str(&mapping::get_string(row, 3)?)
                .map_err(DbError::MappingError)?,
            started_at: mapping::get_timestamp(row, 4)?,
            ended_at: mapping::get_opt_timestamp(row, 5)?,
            last_handshake_at: mapping::get_opt_timestamp(row, 6)?,
            bytes_sent: mapping::get_i64(row, 7)? as u64,
            bytes_received: mapping::get_i64(row, 8)? as u64,
            avg_latency_ms: mapping::get_opt_f64(row, 9)?,
        })
    }
}
