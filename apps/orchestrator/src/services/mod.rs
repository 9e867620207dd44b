// [apps/orchestrator/src/services/mod.rs]
/**
 * =================================================================
 * APARATO: SERVICE ORCHESTRATION HUB (V4.0 - MESH ENABLED)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: EXPOSICIÓN NOMINAL DE DAEMONS Y MOTORES
 *
 * VISION HIPER-HOLÍSTICA:
 * Central de registro de la inteligencia del plano de control.
 * 1. MODULARIDAD: Cada servicio opera como unidad atómica aislada.
 * 2. TYPE SAFETY: Garantiza la visibilidad de los tipos en apps/.
 * =================================================================
 */

pub mod alert_engine;
pub mod cron;
pub mod event_bus;
pub mod health_probe;
pub mod heartbeat_flush;
pub mod maintenance;
pub mod nat_coordinator;
pub mod notify_channels;
pub mod rpc;
pub mod rule_reload;
pub mod scheduler;
pub mod topology;

// --- RE-EXPORTACIONES SOBERANAS (NOMINAL ACCESS) ---

pub use alert_engine::AlertEngine;
pub use event_bus::{BusEvent, EventBus};
pub use heartbeat_flush::spawn_heartbeat_flush;
pub use nat_coordinator::{NatCoordinator, TraversalError};
pub use rule_reload::spawn_rule_reload_watcher;
pub use scheduler::{JobBody, ScheduledJob, SchedulerService};
pub use topology::TopologyResolver;
