// [libs/infra/transport/src/client.rs]

use crate::errors::TransportError;
use crate::frame::{read_frame, write_frame, RpcEnvelope};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Tiempo máximo de espera de una respuesta correlacionada.
const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Cliente RPC de conexión persistente. Las invocaciones se serializan
/// sobre el stream bajo un mutex: el protocolo es petición-respuesta
/// estricta por conexión.
pub struct RpcClient {
    stream: Mutex<TcpStream>,
    remote_label: String,
}

impl RpcClient {
    #[instrument]
    pub async fn connect(remote_address: &str) -> Result<RpcClient, TransportError> {
        let stream = TcpStream::connect(remote_address).await?;
        debug!("🔌 [RPC_CLIENT]: Link established with {}.", remote_address);
        Ok(RpcClient {
            stream: Mutex::new(stream),
            remote_label: remote_address.to_string(),
        })
    }

    /**
     * Invoca un método remoto y decodifica la respuesta tipada.
     *
     * # Errors:
     * - `Remote` si el extremo reporta fallo de aplicación.
     * - `Io` con el enlace caído o la espera agotada.
     */
    #[instrument(skip(self, request_payload), fields(target = %self.remote_label))]
    pub async fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        service: &str,
        method: &str,
        request_payload: &Req,
    ) -> Result<Resp, TransportError> {
        let request = RpcEnvelope::request(service, method, request_payload)?;

        let mut stream_guard = self.stream.lock().await;
        write_frame(&mut *stream_guard, &request).await?;

        let response = tokio::time::timeout(CALL_TIMEOUT, read_frame(&mut *stream_guard))
            .await
            .map_err(|_| {
                TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "RPC_CALL_DEADLINE_EXCEEDED",
                ))
            })??
            .ok_or_else(|| {
                TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "RPC_LINK_CLOSED_MID_CALL",
                ))
            })?;

        if let Some(remote_fault) = response.error {
            return Err(TransportError::Remote(remote_fault));
        }
        if response.correlation_id != request.correlation_id {
            return Err(TransportError::Codec("CORRELATION_MISMATCH".into()));
        }

        response.decode_payload()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{RpcServer, ServiceHandler};
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Serialize, Deserialize)]
    struct EchoRequest {
        text: String,
    }

    #[derive(Serialize, Deserialize)]
    struct EchoResponse {
        text: String,
    }

    struct EchoService;

    #[async_trait::async_trait]
    impl ServiceHandler for EchoService {
        fn service_name(&self) -> &str {
            "TopologyService"
        }

        async fn handle(&self, method: &str, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
            match method {
                "Echo" => {
                    let request: EchoRequest = rmp_serde::from_slice(payload)
                        .map_err(|fault| TransportError::Codec(fault.to_string()))?;
                    rmp_serde::to_vec_named(&EchoResponse { text: request.text })
                        .map_err(|fault| TransportError::Codec(fault.to_string()))
                }
                unknown => Err(TransportError::UnknownTarget(unknown.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn round_trip_call_and_remote_fault() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let bound_address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let _ = RpcServer::new()
                .register(Arc::new(EchoService))
                .serve_with_listener(listener)
                .await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let client = RpcClient::connect(&bound_address).await.unwrap();

        let response: EchoResponse = client
            .call(
                "TopologyService",
                "Echo",
                &EchoRequest {
                    text: "mesh".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(response.text, "mesh");

        // Método desconocido: fallo de aplicación, no cierre de enlace.
        let fault: Result<EchoResponse, _> = client
            .call(
                "TopologyService",
                "Vanish",
                &EchoRequest { text: "x".into() },
            )
            .await;
        assert!(matches!(fault, Err(TransportError::Remote(_))));

        // El enlace sigue vivo tras el fallo.
        let alive: EchoResponse = client
            .call(
                "TopologyService",
                "Echo",
                &EchoRequest {
                    text: "still-up".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(alive.text, "still-up");
    }
}
