// [libs/infra/db-turso/src/client.rs]
/*!
 * =================================================================
 * APARATO: LEDGER CONNECTION CLIENT (V4.0 - MEMORY ANCHORED)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GESTIÓN DE ENLACES RELACIONALES Y BOOTSTRAP ACID
 *
 * # Mathematical Proof (In-Memory Consistency):
 * Para garantizar que el esquema sea visible entre hilos en modo RAM,
 * el cliente detecta URLs de memoria y aplica el ancla de persistencia
 * ANTES del bootstrap, asegurando que las tablas residan en un
 * segmento de memoria compartido durante toda la vida del proceso.
 * =================================================================
 */

use crate::errors::DbError;
use crate::schema::apply_full_mesh_schema;
use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use tracing::{error, info, instrument};

#[derive(Clone)]
pub struct DbClient {
    internal_database_driver: Arc<Database>,
    /// Mantiene la base en memoria viva evitando que SQLite la purgue.
    _memory_persistence_anchor: Option<Arc<Connection>>,
}

impl DbClient {
    #[instrument(skip(database_access_token))]
    pub async fn connect(
        database_connection_url: &str,
        database_access_token: Option<String>,
    ) -> Result<Self, DbError> {
        if database_connection_url.is_empty() {
            return Err(DbError::ConfigurationError("DATABASE_URL_UNDEFINED".into()));
        }

        info!("🔌 [LEDGER]: Initiating relational link synchronization to [{}]", database_connection_url);

        let is_remote = database_connection_url.starts_with("libsql://")
            || database_connection_url.starts_with("https://");

        let is_memory = database_connection_url.contains(":memory:")
            || database_connection_url.contains("mode=memory");

        let database_driver = if is_remote {
            let token = database_access_token.ok_or_else(|| {
                DbError::ConfigurationError("SECURITY_FAULT: Remote access denied (token missing)".into())
            })?;
            Builder::new_remote(database_connection_url.to_string(), token)
                .build()
                .await
        } else {
            Builder::new_local(database_connection_url).build().await
        }
        .map_err(|fault| DbError::ConnectionError(format!("DRIVER_IGNITION_FAILURE: {fault}")))?;

        let shared_driver = Arc::new(database_driver);
        let mut anchor = None;

        if is_memory {
            // En modo memoria el ancla se abre ANTES que cualquier otra
            // operación: el esquema debe residir en el segmento compartido.
            let anchor_connection = shared_driver
                .connect()
                .map_err(|fault| DbError::ConnectionError(format!("ANCHOR_FAULT: {fault}")))?;

            apply_full_mesh_schema(&anchor_connection)
                .await
                .map_err(|fault| DbError::ConnectionError(format!("SCHEMA_SYNC_FAULT: {fault}")))?;

            anchor = Some(Arc::new(anchor_connection));
            info!("⚓ [LEDGER]: Memory strata solidified and anchored.");
        } else {
            let bootstrap_connection = shared_driver
                .connect()
                .map_err(|fault| DbError::ConnectionError(format!("BOOTSTRAP_LINK_FAULT: {fault}")))?;
            apply_full_mesh_schema(&bootstrap_connection)
                .await
                .map_err(|fault| DbError::ConnectionError(format!("SCHEMA_SYNC_FAULT: {fault}")))?;
        }

        Ok(Self {
            internal_database_driver: shared_driver,
            _memory_persistence_anchor: anchor,
        })
    }

    pub fn get_connection(&self) -> Result<Connection, DbError> {
        self.internal_database_driver.connect().map_err(|fault| {
            error!("⚠️ [POOL_FAULT]: Connection allocation failed: {}", fault);
            DbError::ConnectionError(fault.to_string())
        })
    }
}
