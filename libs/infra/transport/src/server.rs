// [libs/infra/transport/src/server.rs]
/*!
 * =================================================================
 * APARATO: RPC SERVICE DISPATCHER (V4.0 - REGISTRY DRIVEN)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: ESCUCHA TCP Y RUTEO POR (SERVICIO, MÉTODO)
 *
 * # Logic:
 * Cada conexión entrante obtiene su propia tarea de Tokio que lee
 * tramas en bucle, resuelve el handler registrado bajo el nombre del
 * servicio y responde con el sobre correlacionado. Un destino
 * desconocido produce una respuesta de fallo, jamás un cierre.
 * =================================================================
 */

use crate::errors::TransportError;
use crate::frame::{read_frame, write_frame, RpcEnvelope};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, instrument, warn};

/// Capacidad de servicio: resuelve un método con su payload crudo.
#[async_trait::async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Nombre nominal del servicio (ej: "DeviceService").
    fn service_name(&self) -> &str;

    /// Resuelve la invocación; el payload de retorno es MessagePack.
    async fn handle(&self, method: &str, payload: &[u8]) -> Result<Vec<u8>, TransportError>;
}

pub struct RpcServer {
    registry: HashMap<String, Arc<dyn ServiceHandler>>,
}

impl Default for RpcServer {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcServer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: HashMap::new(),
        }
    }

    /// Registra un servicio bajo su nombre nominal.
    pub fn register(mut self, handler: Arc<dyn ServiceHandler>) -> Self {
        self.registry
            .insert(handler.service_name().to_string(), handler);
        self
    }

    /**
     * Enlaza el listener y sirve conexiones hasta que la tarea muera.
     * Diseñado para correr bajo 'tokio::spawn' del kernel.
     */
    #[instrument(skip(self))]
    pub async fn serve(self, bind_address: &str) -> Result<(), TransportError> {
        let listener = TcpListener::bind(bind_address).await?;
        self.serve_with_listener(listener).await
    }

    /// Variante con listener pre-enlazado (puertos efímeros en pruebas).
    pub async fn serve_with_listener(self, listener: TcpListener) -> Result<(), TransportError> {
        info!(
            "🛰️ [RPC_SERVER]: Internal transport listening at {:?}.",
            listener.local_addr().ok()
        );

        let shared_registry = Arc::new(self.registry);
        loop {
            let (stream, remote_address) = listener.accept().await?;
            debug!("🔌 [RPC_ACCEPT]: Link from {}.", remote_address);

            let connection_registry = shared_registry.clone();
            tokio::spawn(async move {
                if let Err(connection_fault) =
                    drive_connection(stream, connection_registry).await
                {
                    warn!("⚠️ [RPC_LINK_FAULT]: {}", connection_fault);
                }
            });
        }
    }
}

async fn drive_connection(
    mut stream: TcpStream,
    registry: Arc<HashMap<String, Arc<dyn ServiceHandler>>>,
) -> Result<(), TransportError> {
    while let Some(request) = read_frame(&mut stream).await? {
        let response = match registry.get(&request.service) {
            Some(handler) => match handler.handle(&request.method, &request.payload).await {
                Ok(payload) => RpcEnvelope {
                    service: request.service.clone(),
                    method: request.method.clone(),
                    correlation_id: request.correlation_id.clone(),
                    payload,
                    error: None,
                },
                Err(application_fault) => {
                    error!(
                        "❌ [RPC_HANDLER_FAULT]: {}/{} -> {}",
                        request.service, request.method, application_fault
                    );
                    RpcEnvelope::fault_of(&request, &application_fault.to_string())
                }
            },
            None => RpcEnvelope::fault_of(
                &request,
                &format!("UNKNOWN_SERVICE: {}", request.service),
            ),
        };

        write_frame(&mut stream, &response).await?;
    }
    Ok(())
}
