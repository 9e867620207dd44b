// [apps/orchestrator/src/handlers/mod.rs]
/**
 * =================================================================
 * APARATO: HANDLER ACCESS MATRIX (V4.0 - MESH SURFACE)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: EXPOSICIÓN NOMINAL DE ADAPTADORES DE ENTRADA
 * =================================================================
 */

/// Ciclo de vida de dispositivos: registro, latido, pares, rotación.
pub mod device;

/// Traversal NAT: clasificación STUN y rendezvous.
pub mod nat;

/// Superficie administrativa: sesiones, alertas, PSK, auditoría.
pub mod admin;

/// Push en tiempo real (WebSocket) para sesiones administrativas.
pub mod stream;
