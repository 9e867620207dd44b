// [libs/infra/transport/src/frame.rs]
/*!
 * =================================================================
 * APARATO: RPC FRAME CODEC (V4.1 - HOSTILE LENGTH SHIELDED)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: SOBRES MESSAGEPACK CON PREFIJO DE LONGITUD
 *
 * # Wire Format:
 * ```text
 * +--------------------+----------------------------------+
 * | length (u32 BE)    | envelope (MessagePack)           |
 * +--------------------+----------------------------------+
 * ```
 * El sobre porta {service, method, correlation_id, payload, error?}.
 * Una longitud anunciada sobre MAX_FRAME_BYTES se rechaza ANTES de
 * reservar el buffer.
 * =================================================================
 */

use crate::errors::TransportError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Tope duro por trama: 1 MiB.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Sobre RPC: identifica servicio y método y transporta el payload
/// tipado como MessagePack opaco.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEnvelope {
    pub service: String,
    pub method: String,

    #[serde(rename = "correlation_id")]
    pub correlation_id: String,

    /// Payload MessagePack del contrato (petición o respuesta).
    pub payload: Vec<u8>,

    /// Fallo de aplicación del lado remoto, si lo hubo.
    pub error: Option<String>,
}

impl RpcEnvelope {
    /// Forja un sobre de petición serializando el payload tipado.
    pub fn request<T: Serialize>(
        service: &str,
        method: &str,
        payload: &T,
    ) -> Result<RpcEnvelope, TransportError> {
        Ok(RpcEnvelope {
            service: service.to_string(),
            method: method.to_string(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
            payload: rmp_serde::to_vec_named(payload)
                .map_err(|fault| TransportError::Codec(fault.to_string()))?,
            error: None,
        })
    }

    /// Forja la respuesta correlacionada a una petición.
    pub fn respond_to<T: Serialize>(
        request: &RpcEnvelope,
        payload: &T,
    ) -> Result<RpcEnvelope, TransportError> {
        Ok(RpcEnvelope {
            service: request.service.clone(),
            method: request.method.clone(),
            correlation_id: request.correlation_id.clone(),
            payload: rmp_serde::to_vec_named(payload)
                .map_err(|fault| TransportError::Codec(fault.to_string()))?,
            error: None,
        })
    }

    /// Forja una respuesta de fallo de aplicación.
    pub fn fault_of(request: &RpcEnvelope, reason: &str) -> RpcEnvelope {
        RpcEnvelope {
            service: request.service.clone(),
            method: request.method.clone(),
            correlation_id: request.correlation_id.clone(),
            payload: Vec::new(),
            error: Some(reason.to_string()),
        }
    }

    /// Interpreta el payload con el tipo del contrato.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        rmp_serde::from_slice(&self.payload)
            .map_err(|fault| TransportError::Codec(fault.to_string()))
    }
}

/// Escribe una trama completa (prefijo + sobre) en el stream.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    stream: &mut W,
    envelope: &RpcEnvelope,
) -> Result<(), TransportError> {
    let encoded = rmp_serde::to_vec_named(envelope)
        .map_err(|fault| TransportError::Codec(fault.to_string()))?;

    if encoded.len() > MAX_FRAME_BYTES {
        return Err(TransportError::FrameOversized(encoded.len()));
    }

    stream.write_all(&(encoded.len() as u32).to_be_bytes()).await?;
    stream.write_all(&encoded).await?;
    stream.flush().await?;
    Ok(())
}

/// Lee una trama completa del stream. Retorna `None` ante EOF limpio
/// en frontera de trama (cierre ordenado del par).
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    stream: &mut R,
) -> Result<Option<RpcEnvelope>, TransportError> {
    let mut length_prefix = [0u8; 4];
    match stream.read_exact(&mut length_prefix).await {
        Ok(_) => {}
        Err(fault) if fault.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(fault) => return Err(TransportError::Io(fault)),
    }

    let announced_length = u32::from_be_bytes(length_prefix) as usize;
    if announced_length > MAX_FRAME_BYTES {
        return Err(TransportError::FrameOversized(announced_length));
    }

    let mut frame_buffer = vec![0u8; announced_length];
    stream.read_exact(&mut frame_buffer).await?;

    rmp_serde::from_slice(&frame_buffer)
        .map(Some)
        .map_err(|fault| TransportError::Codec(fault.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct ProbePayload {
        device_id: String,
        sequence: u64,
    }

    #[tokio::test]
    async fn frame_survives_the_wire() {
        let request = RpcEnvelope::request(
            "DeviceService",
            "GetPeers",
            &ProbePayload {
                device_id: "dev-1".into(),
                sequence: 7,
            },
        )
        .unwrap();

        let mut wire: Vec<u8> = Vec::new();
        write_frame(&mut wire, &request).await.unwrap();

        let mut reader = wire.as_slice();
        let decoded = read_frame(&mut reader).await.unwrap().unwrap();

        assert_eq!(decoded.service, "DeviceService");
        assert_eq!(decoded.method, "GetPeers");
        assert_eq!(decoded.correlation_id, request.correlation_id);
        assert_eq!(
            decoded.decode_payload::<ProbePayload>().unwrap(),
            ProbePayload {
                device_id: "dev-1".into(),
                sequence: 7,
            }
        );
    }

    #[tokio::test]
    async fn clean_eof_reads_as_none() {
        let mut reader: &[u8] = &[];
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hostile_length_is_rejected_before_allocation() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&(u32::MAX).to_be_bytes());
        wire.extend_from_slice(&[0u8; 16]);

        let mut reader = wire.as_slice();
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(TransportError::FrameOversized(_))
        ));
    }
}
