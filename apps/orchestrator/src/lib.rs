// [apps/orchestrator/src/lib.rs]
/*!
 * =================================================================
 * APARATO: ORCHESTRATOR LIBRARY ROOT (V4.0 - MESH AUTHORITY)
 * CLASIFICACIÓN: CRATE ROOT (ESTRATO L3)
 * RESPONSABILIDAD: DEFINICIÓN SUPREMA DEL ÁRBOL DE MÓDULOS
 *
 * # Mathematical Proof (Modular Encapsulation):
 * Al declarar 'pub mod' aquí, Rust genera un grafo de visibilidad
 * donde estado, servicios y adaptadores son hermanos bajo 'crate',
 * habilitando la inyección de dependencias en compilación.
 * =================================================================
 */

// --- ESTRATO DE CONFIGURACIÓN Y ESTADO (L1-APP) ---
/// Registro congelado de configuración del proceso.
pub mod config;
/// Gestor del grafo de dependencias del orquestador.
pub mod state;

// --- ESTRATO DE TRANSPORTE Y ACCIÓN ---
/// Adaptadores de entrada para ráfagas HTTP y WebSockets.
pub mod handlers;
/// Núcleo de mando para la ignición de servicios.
pub mod kernel;
/// Topología de rutas y capas de guardia.
pub mod routes;

// --- ESTRATO DE SEGURIDAD Y SOPORTE ---
/// Sobre de errores y taxonomía HTTP.
pub mod errors;
/// Guardianes perimetrales de autenticación.
pub mod middleware;
/// Daemons de fondo y motores del plano de control.
pub mod services;

/**
 * PRELUDIO DEL ORQUESTADOR
 *
 * Re-exportación estratégica para la ignición mínima desde 'main.rs'.
 */
pub mod prelude {
    pub use crate::config::OrchestratorConfig;
    pub use crate::kernel::OrchestratorKernel;
    pub use crate::state::AppState;
}
