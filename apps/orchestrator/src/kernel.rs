// [apps/orchestrator/src/kernel.rs]
/**
 * =================================================================
 * APARATO: ORCHESTRATOR MESH KERNEL (V4.3 - DAEMON IGNITION)
 * CLASIFICACIÓN: COMPOSITION ROOT (ESTRATO L1-APP)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 *
 * VISION HIPER-HOLÍSTICA:
 * Actúa como la placa base donde se conectan todos los servicios:
 * Ledger, KV, bus, Herald, planificador y transporte HTTP/RPC.
 * El orden de ignición garantiza que los daemons de mantenimiento
 * estén vivos antes de abrir el socket TCP.
 * =================================================================
 */

use crate::config::OrchestratorConfig;
use crate::routes::create_mesh_router;
use crate::services::{
    health_probe, maintenance, rpc::spawn_internal_rpc, spawn_heartbeat_flush,
    spawn_rule_reload_watcher, ScheduledJob, SchedulerService,
};
use crate::state::AppState;
use edgelink_infra_db::DbClient;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{error, info, instrument};

pub struct OrchestratorKernel {
    pub server_network_port: u16,
    pub application_shared_state: AppState,
}

impl OrchestratorKernel {
    /**
     * Realiza la ignición del cliente relacional y el estado del mesh.
     * La conexión al Ledger precede a cualquier servicio.
     */
    #[instrument(skip(config))]
    pub async fn ignite(config: Arc<OrchestratorConfig>) -> Self {
        let database_client = DbClient::connect(
            &config.database_url,
            config.database_auth_token.clone(),
        )
        .await
        .expect("FATAL: Ledger link collapse. Ignition aborted.");

        Self {
            server_network_port: config.listening_port,
            application_shared_state: AppState::new(config, database_client),
        }
    }

    /**
     * Lanza todas las operaciones autónomas del plano de control:
     * daemons de fondo, planificador cron y servidor Axum.
     */
    pub async fn launch_mesh_operations(self) {
        let shared_state = self.application_shared_state.clone();

        // --- 1. DAEMONS DE PERSISTENCIA Y RECARGA ---
        spawn_heartbeat_flush(shared_state.clone()).await;
        spawn_rule_reload_watcher(shared_state.clone()).await;

        // --- 2. PLANIFICADOR CRON (cerrojo distribuido + deadline) ---
        let scheduler = SchedulerService::new(
            shared_state.kv_store.clone(),
            shared_state.config.scheduler_pool_size,
        );
        scheduler.ignite(Self::forge_job_matrix(&shared_state));

        // --- 3. TRANSPORTE RPC INTERNO (opcional por configuración) ---
        spawn_internal_rpc(shared_state.clone());

        // --- 4. IGNICIÓN DEL TRANSPORTE HTTP (AXUM) ---
        let mesh_router = create_mesh_router(shared_state);

        let bind_address = SocketAddr::new(
            "0.0.0.0".parse::<IpAddr>().expect("static address"),
            self.server_network_port,
        );

        info!("🚀 [KERNEL_ONLINE]: EdgeLink control plane listening at {}.", bind_address);

        let tcp_listener = tokio::net::TcpListener::bind(bind_address)
            .await
            .expect("CRITICAL_FAULT: Failed to bind network port.");

        if let Err(server_error) = axum::serve(tcp_listener, mesh_router).await {
            error!("💀 [KERNEL_COLLAPSE]: Runtime failure: {}", server_error);
            std::process::exit(1);
        }
    }

    /// Matriz de jobs del planificador con sus expresiones por defecto.
    fn forge_job_matrix(shared_state: &AppState) -> Vec<ScheduledJob> {
        let mut job_matrix = Vec::with_capacity(5);

        // A. Sonda de salud del inventario — cada 60 s.
        let probe_state = shared_state.clone();
        job_matrix.push(
            ScheduledJob::new(
                "device-health-probe",
                "* * * * *",
                Arc::new(move || {
                    let state = probe_state.clone();
                    Box::pin(async move { health_probe::run_health_probe(state).await })
                }),
            )
            .expect("static cron expression"),
        );

        // B. Roll-up de rendimiento — cada 5 min.
        let rollup_state = shared_state.clone();
        job_matrix.push(
            ScheduledJob::new(
                "performance-rollup",
                "*/5 * * * *",
                Arc::new(move || {
                    let state = rollup_state.clone();
                    Box::pin(async move { maintenance::run_performance_rollup(state).await })
                }),
            )
            .expect("static cron expression"),
        );

        // C. Monitor de seguridad — cada 60 s.
        let security_state = shared_state.clone();
        job_matrix.push(
            ScheduledJob::new(
                "security-monitor",
                "* * * * *",
                Arc::new(move || {
                    let state = security_state.clone();
                    Box::pin(async move { maintenance::run_security_monitor(state).await })
                }),
            )
            .expect("static cron expression"),
        );

        // D. Barrido de caducidad de llaves — diario a las 02:00.
        let expiry_state = shared_state.clone();
        job_matrix.push(
            ScheduledJob::new(
                "key-expiry-sweep",
                "0 2 * * *",
                Arc::new(move || {
                    let state = expiry_state.clone();
                    Box::pin(async move { maintenance::run_key_expiry_sweep(state).await })
                }),
            )
            .expect("static cron expression"),
        );

        // E. Limpieza de registros de dedup — cada ventana (30 min).
        let cleanup_state = shared_state.clone();
        job_matrix.push(
            ScheduledJob::new(
                "dedup-record-cleanup",
                "*/30 * * * *",
                Arc::new(move || {
                    let state = cleanup_state.clone();
                    Box::pin(async move { maintenance::run_dedup_cleanup(state).await })
                }),
            )
            .expect("static cron expression"),
        );

        job_matrix
    }
}
