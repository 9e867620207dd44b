// [libs/domain/traversal/src/lib.rs]
/*!
 * =================================================================
 * APARATO: NAT TRAVERSAL STRATUM ROOT (V4.0 - PURE CORE)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: DECISIONES DE TRAVERSAL SIN EFECTOS SECUNDARIOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. PURITY SOVEREIGNTY: Clasificación y decisión de camino son
 *    funciones puras sobre (NatType, NatType); el coordinador L4 aporta
 *    el estado (KV, Ledger, bus) alrededor de este núcleo.
 * 2. POLICY AS PARAMETER: La heurística de tipos híbridos es una
 *    función libre intercambiable sin tocar el coordinador.
 * =================================================================
 */

/// Clasificación del NAT a partir de sondas STUN reportadas.
pub mod classify;

/// Política pura de decisión de camino (directo vs relay).
pub mod decision;

/// Tipos del rendezvous efímero de intercambio de endpoints.
pub mod rendezvous;

pub use crate::classify::{classify_nat, StunProbeReport};
pub use crate::decision::match_decision;
pub use crate::rendezvous::{EndpointCandidate, RendezvousRecord, RENDEZVOUS_TTL_SECONDS};
