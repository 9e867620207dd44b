// [apps/orchestrator/src/main.rs]
/*!
 * =================================================================
 * APARATO: ORCHESTRATOR MAIN ENTRY POINT (V4.1 - MESH IGNITION)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L3)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 *
 * # Mathematical Proof (Deterministic Ignition):
 * El proceso garantiza que el esquema del Ledger y el grafo de estado
 * existan ANTES de la apertura del socket TCP, previniendo carreras
 * donde un dispositivo registre contra tablas aún no solidificadas.
 * =================================================================
 */

use edgelink_orchestrator::prelude::*;

use dotenvy::dotenv;
use edgelink_shared_heimdall::init_tracing;
use std::sync::Arc;
use tracing::info;

/**
 * Punto de ignición supremo del binario del Orquestador.
 */
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. CARGA DE ENTORNO
    dotenv().ok();

    // 2. OBSERVABILIDAD (HEIMDALL)
    init_tracing("edgelink_orchestrator");

    // 3. RUNTIME MULTI-HILO
    let runtime_orchestrator = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime_orchestrator.block_on(async {
        info!("🛰️  [CONTROL_PLANE]: Global ignition sequence starting...");

        // 4. REGISTRO CONGELADO DE CONFIGURACIÓN (única lectura de entorno)
        let frozen_config = Arc::new(OrchestratorConfig::from_env());
        let listening_port = frozen_config.listening_port;

        // 5. KERNEL DEL MESH (Ledger -> Estado -> Daemons -> HTTP)
        let kernel_instance = OrchestratorKernel::ignite(frozen_config).await;

        info!("🚀 [EDGELINK_ONLINE]: Control plane operational on port {}.", listening_port);
        kernel_instance.launch_mesh_operations().await;

        Ok(())
    })
}
