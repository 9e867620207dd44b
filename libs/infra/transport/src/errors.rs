// [libs/infra/transport/src/errors.rs]

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Fallo físico de socket (conexión, lectura, escritura).
    #[error("[L3_RPC_NET_FAULT]: SOCKET_SEVERED -> {0}")]
    Io(#[from] std::io::Error),

    /// La trama anuncia una longitud sobre el tope admitido.
    #[error("[L3_RPC_FRAME_FAULT]: FRAME_OVERSIZED ({0} bytes)")]
    FrameOversized(usize),

    /// El sobre no es MessagePack interpretable.
    #[error("[L3_RPC_CODEC_FAULT]: ENVELOPE_MALFORMED -> {0}")]
    Codec(String),

    /// El servicio o método invocado no está registrado.
    #[error("[L3_RPC_DISPATCH_FAULT]: UNKNOWN_TARGET -> {0}")]
    UnknownTarget(String),

    /// El extremo remoto reportó un fallo de aplicación.
    #[error("[L3_RPC_REMOTE_FAULT]: {0}")]
    Remote(String),
}
