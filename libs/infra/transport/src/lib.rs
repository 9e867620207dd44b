// [libs/infra/transport/src/lib.rs]
/*!
 * =================================================================
 * APARATO: INTERNAL RPC TRANSPORT ROOT (V4.0 - FRAMED)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: RPC BINARIO ENTRE SUBSERVICIOS DEL PLANO DE CONTROL
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. METHOD-PRESERVING ENVELOPES: Cada trama porta servicio, método e
 *    identificador de correlación; el payload viaja como MessagePack
 *    opaco tipado por el contrato del servicio.
 * 2. LENGTH-PREFIX DISCIPLINE: u32 big-endian + tope de 1 MiB por
 *    trama; una longitud hostil se rechaza antes de reservar memoria.
 * =================================================================
 */

/// Catálogo semántico de fallos de transporte.
pub mod errors;

/// Sobre RPC y codificación de tramas con prefijo de longitud.
pub mod frame;

/// Despachador de servicios del lado servidor.
pub mod server;

/// Cliente de invocación remota.
pub mod client;

pub use crate::client::RpcClient;
pub use crate::errors::TransportError;
pub use crate::frame::{read_frame, write_frame, RpcEnvelope, MAX_FRAME_BYTES};
pub use crate::server::{RpcServer, ServiceHandler};
