// [libs/domain/notification/src/lib.rs]
/*!
 * =================================================================
 * APARATO: HERALD NOTIFICATION ENGINE (V4.0 - RULE SOVEREIGN)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: ENRUTAMIENTO DECLARATIVO DE ALERTAS MULTI-CANAL
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. DECLARATIVE SOVEREIGNTY: El fichero de reglas (version + rules[])
 *    gobierna el enrutamiento; la recarga en caliente intercambia el
 *    conjunto de forma atómica sin pausar el despacho.
 * 2. PURE MATCHING: La evaluación de condiciones es pura; todo efecto
 *    (canal, reintento, rate limit) vive en el despachador.
 * 3. BOUNDED EVERYTHING: Cola de correo acotada, caché de regex LRU
 *    acotada, ventanas deslizantes podadas. Nada crece sin techo.
 * =================================================================
 */

/// Catálogo semántico de fallos del motor Herald.
pub mod errors;

/// Árbol de condiciones, rangos horarios y caché de regex acotada.
pub mod conditions;

/// Acciones de canal, políticas de reintento y clasificación de fallos.
pub mod actions;

/// Reglas declarativas, fichero versionado y validación recursiva.
pub mod rules;

/// Limitador de tasa por ventana deslizante con ámbitos.
pub mod rate_limit;

/// Temporizadores de escalado por alerta no reconocida.
pub mod escalation;

/// Cola de correo acotada con pool de workers y token bucket.
pub mod email;

/// Despachador: match -> prioridad -> rate limit -> ejecución -> fallback.
pub mod dispatcher;

pub use crate::actions::{ActionError, ActionSpec, ActionType, RetryPolicy};
pub use crate::conditions::{AlertContext, ConditionNode, RegexCache, TimeRangeSpec};
pub use crate::dispatcher::{ActionExecutor, DispatchOutcome, NotificationDispatcher};
pub use crate::email::{EmailMessage, EmailProvider, EmailQueue, EmailQueueConfig, EmailQueueStats};
pub use crate::errors::NotifyError;
pub use crate::escalation::{EscalationScheduler, EscalationSpec};
pub use crate::rate_limit::{RateLimitScope, RateLimitSpec, SlidingWindowTracker};
pub use crate::rules::{Rule, RuleFile, RuleSet};
