// [libs/infra/db-turso/src/schema.rs]
/**
 * =================================================================
 * APARATO: MESH LEDGER SCHEMA (V4.1 - INVARIANT HARDENED)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GOBERNANZA ESTRUCTURAL E IDEMPOTENCIA TOTAL
 *
 * VISION HIPER-HOLÍSTICA:
 * 1. INVARIANT INDEXES: Los índices únicos son la autoridad final sobre
 *    llaves públicas globales, CIDR por organización e IPs virtuales por
 *    red. El estrato L4 confía en ellos como primitiva CAS.
 * 2. IDEMPOTENCIA: Gestión de errores para migraciones en caliente.
 * 3. PERFORMANCE: Índices de aceleración para el despacho de sondas y
 *    el filtrado paginado de alertas.
 * =================================================================
 */

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, instrument, warn};

/**
 * ESTRATO 1: SOLIDIFICACIÓN (Génesis de Tablas)
 * Define las entidades base del plano de control EdgeLink.
 */
const MESH_TABLES: &[(&str, &str)] = &[
    ("TABLE_ORGANIZATIONS", r#"
        CREATE TABLE IF NOT EXISTS organizations (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            max_devices INTEGER NOT NULL DEFAULT 100,
            max_virtual_networks INTEGER NOT NULL DEFAULT 10,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_VIRTUAL_NETWORKS", r#"
        CREATE TABLE IF NOT EXISTS virtual_networks (
            id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL,
            name TEXT NOT NULL,
            cidr TEXT NOT NULL,
            gateway_ip TEXT NOT NULL,
            dns_servers TEXT NOT NULL DEFAULT '[]',
            flat_mesh INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(org_id, cidr)
        );
    "#),
    ("TABLE_DEVICES", r#"
        CREATE TABLE IF NOT EXISTS devices (
            id TEXT PRIMARY KEY,
            virtual_network_id TEXT NOT NULL,
            name TEXT NOT NULL,
            virtual_ip TEXT NOT NULL,
            public_key TEXT NOT NULL UNIQUE,
            platform TEXT NOT NULL,
            nat_type TEXT NOT NULL DEFAULT 'unknown',
            public_endpoint TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            online INTEGER NOT NULL DEFAULT 0,
            last_seen_at DATETIME,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(virtual_network_id, virtual_ip)
        );
    "#),
    ("TABLE_DEVICE_KEYS", r#"
        CREATE TABLE IF NOT EXISTS device_keys (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            public_key TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            valid_from DATETIME NOT NULL,
            expires_at DATETIME
        );
    "#),
    ("TABLE_PRE_SHARED_KEYS", r#"
        CREATE TABLE IF NOT EXISTS pre_shared_keys (
            id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL,
            key_hash TEXT NOT NULL UNIQUE,
            name TEXT,
            max_uses INTEGER,
            used_count INTEGER NOT NULL DEFAULT 0,
            expires_at DATETIME,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_PEER_CONFIGURATIONS", r#"
        CREATE TABLE IF NOT EXISTS peer_configurations (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            peer_device_id TEXT NOT NULL,
            peer_public_key TEXT NOT NULL,
            peer_virtual_ip TEXT NOT NULL,
            allowed_ips TEXT NOT NULL DEFAULT '[]',
            persistent_keepalive INTEGER,
            UNIQUE(device_id, peer_device_id)
        );
    "#),
    ("TABLE_SESSIONS", r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            device_a_id TEXT NOT NULL,
            device_b_id TEXT NOT NULL,
            connection_type TEXT NOT NULL,
            started_at DATETIME NOT NULL,
            ended_at DATETIME,
            last_handshake_at DATETIME,
            bytes_sent INTEGER NOT NULL DEFAULT 0,
            bytes_received INTEGER NOT NULL DEFAULT 0,
            avg_latency_ms REAL,
            CHECK (device_a_id < device_b_id)
        );
    "#),
    ("TABLE_ALERTS", r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id TEXT PRIMARY KEY,
            device_id TEXT,
            severity TEXT NOT NULL,
            alert_type TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            metadata TEXT NOT NULL DEFAULT '{}',
            occurrence_count INTEGER NOT NULL DEFAULT 1,
            first_seen_at DATETIME NOT NULL,
            last_seen_at DATETIME NOT NULL,
            acknowledged_by TEXT,
            acknowledged_at DATETIME,
            resolved_at DATETIME
        );
    "#),
    ("TABLE_AUDIT_LOGS", r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL,
            actor_id TEXT,
            action TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            before_state TEXT,
            after_state TEXT,
            ip_address TEXT,
            user_agent TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_ADMIN_USERS", r#"
        CREATE TABLE IF NOT EXISTS admin_users (
            id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'readonly',
            oidc_subject TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_login_at DATETIME
        );
    "#),
];

/**
 * ESTRATO 2: EVOLUCIÓN (Mutaciones de Columna)
 * Asegura que despliegues previos se adapten a nuevas capacidades.
 */
const EVOLUTIONARY_STRATA: &[(&str, &str)] = &[
    // --- TOPOLOGÍA FLAT-MESH ---
    ("NETWORK_FLAT_MESH", "ALTER TABLE virtual_networks ADD COLUMN flat_mesh INTEGER NOT NULL DEFAULT 0"),
    // --- TRAVERSAL ---
    ("DEVICE_PUBLIC_ENDPOINT", "ALTER TABLE devices ADD COLUMN public_endpoint TEXT"),
    ("DEVICE_NAT_TYPE", "ALTER TABLE devices ADD COLUMN nat_type TEXT NOT NULL DEFAULT 'unknown'"),
    // --- OPERACIÓN DE ALERTAS ---
    ("ALERT_ACK_BY", "ALTER TABLE alerts ADD COLUMN acknowledged_by TEXT"),
    ("ALERT_RESOLVED_AT", "ALTER TABLE alerts ADD COLUMN resolved_at DATETIME"),
];

/**
 * ESTRATO 3: ENDURECIMIENTO (Índices de Aceleración)
 * Cubre las consultas calientes del resolutor de pares, la sonda de
 * salud y el filtrado paginado de alertas.
 */
const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    ("IDX_DEVICES_NETWORK_ONLINE", "CREATE INDEX IF NOT EXISTS idx_devices_network_online ON devices(virtual_network_id, online);"),
    ("IDX_DEVICE_KEYS_DEVICE_STATUS", "CREATE INDEX IF NOT EXISTS idx_device_keys_device_status ON device_keys(device_id, status);"),
    ("IDX_ALERTS_DEVICE_TYPE_STATUS", "CREATE INDEX IF NOT EXISTS idx_alerts_device_type_status ON alerts(device_id, alert_type, status);"),
    ("IDX_ALERTS_STATUS_SEVERITY", "CREATE INDEX IF NOT EXISTS idx_alerts_status_severity ON alerts(status, severity, last_seen_at);"),
    ("IDX_AUDIT_ORG_TIME", "CREATE INDEX IF NOT EXISTS idx_audit_org_time ON audit_logs(org_id, created_at);"),
    ("IDX_PEERS_DEVICE", "CREATE INDEX IF NOT EXISTS idx_peers_device ON peer_configurations(device_id);"),
    ("IDX_SESSIONS_PAIR_ACTIVE", "CREATE INDEX IF NOT EXISTS idx_sessions_pair_active ON sessions(device_a_id, device_b_id, ended_at);"),
    ("IDX_NETWORKS_ORG", "CREATE INDEX IF NOT EXISTS idx_networks_org ON virtual_networks(org_id);"),
];

/**
 * Ejecuta la secuencia maestra de sincronización del esquema del mesh.
 *
 * # Errors:
 * Retorna error si alguna tabla base falla en solidificarse, indicando
 * un colapso en el enlace relacional.
 */
#[instrument(skip(database_connection))]
pub async fn apply_full_mesh_schema(database_connection: &Connection) -> Result<()> {
    info!("🏗️ [SCHEMA_ENGINE]: Initiating structural synchronization V4.1...");

    solidify_base_strata(database_connection).await?;
    execute_evolutionary_repair(database_connection).await?;
    harden_access_layer(database_connection).await?;

    info!("✅ [SCHEMA_ENGINE]: Mesh Ledger V4.1 level and certified.");
    Ok(())
}

async fn solidify_base_strata(db: &Connection) -> Result<()> {
    for (identifier, sql) in MESH_TABLES {
        debug!("  ↳ Solidifying: {}", identifier);
        db.execute(*sql, ())
            .await
            .with_context(|| format!("CRITICAL_SOLIDIFICATION_FAULT: {identifier}"))?;
    }
    Ok(())
}

async fn execute_evolutionary_repair(db: &Connection) -> Result<()> {
    for (identifier, sql) in EVOLUTIONARY_STRATA {
        match db.execute(*sql, ()).await {
            Ok(_) => debug!("  🟢 [REPAIR_OK]: Applied evolutionary stratum {}", identifier),
            Err(fault) => {
                let message = fault.to_string();
                // Columna ya presente: estado nominal en re-despliegues.
                if message.contains("duplicate column name") {
                    debug!("  ⚪ [REPAIR_SKIP]: Stratum {} already level.", identifier);
                } else {
                    warn!("  🟡 [REPAIR_DEFERRED]: Stratum {} rejected: {}", identifier, message);
                }
            }
        }
    }
    Ok(())
}

async fn harden_access_layer(db: &Connection) -> Result<()> {
    for (identifier, sql) in ACCELERATION_INDEXES {
        db.execute(*sql, ())
            .await
            .with_context(|| format!("INDEX_HARDENING_FAULT: {identifier}"))?;
    }
    Ok(())
}
