// [apps/orchestrator/src/services/rpc.rs]
/*!
 * =================================================================
 * APARATO: INTERNAL RPC FACADE (V4.1 - SERVICE TRIAD)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: EXPOSICIÓN RPC DE DEVICE/TOPOLOGY/NAT SERVICES
 *
 * # Logic:
 * Tres servicios tipados sobre el transporte binario interno, para un
 * futuro despliegue multi-proceso sin tocar la superficie REST:
 *   - DeviceService   : GetDevice
 *   - TopologyService : GetPeers
 *   - NATService      : MatchDecision
 * =================================================================
 */

use crate::state::AppState;
use edgelink_domain_models::{ConnectionType, NatType, PeerConfiguration};
use edgelink_domain_traversal::match_decision;
use edgelink_infra_transport::{RpcServer, ServiceHandler, TransportError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

fn encode<T: Serialize>(payload: &T) -> Result<Vec<u8>, TransportError> {
    rmp_serde::to_vec_named(payload).map_err(|fault| TransportError::Codec(fault.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T, TransportError> {
    rmp_serde::from_slice(payload).map_err(|fault| TransportError::Codec(fault.to_string()))
}

// --- CONTRATOS ---

#[derive(Serialize, Deserialize)]
pub struct GetDeviceRequest {
    pub device_id: String,
}

#[derive(Serialize, Deserialize)]
pub struct GetPeersRequest {
    pub device_id: String,
}

#[derive(Serialize, Deserialize)]
pub struct GetPeersResponse {
    pub peers: Vec<PeerConfiguration>,
}

#[derive(Serialize, Deserialize)]
pub struct MatchDecisionRequest {
    pub nat_type_a: String,
    pub nat_type_b: String,
}

#[derive(Serialize, Deserialize)]
pub struct MatchDecisionResponse {
    pub connection_type: String,
}

// --- SERVICIOS ---

struct DeviceService {
    application_state: AppState,
}

#[async_trait::async_trait]
impl ServiceHandler for DeviceService {
    fn service_name(&self) -> &str {
        "DeviceService"
    }

    async fn handle(&self, method: &str, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        match method {
            "GetDevice" => {
                let request: GetDeviceRequest = decode(payload)?;
                let device = self
                    .application_state
                    .device_repository
                    .find_by_id(&request.device_id)
                    .await
                    .map_err(|fault| TransportError::Remote(fault.to_string()))?
                    .ok_or_else(|| {
                        TransportError::Remote(format!("UNKNOWN_DEVICE: {}", request.device_id))
                    })?;
                encode(&device)
            }
            unknown => Err(TransportError::UnknownTarget(unknown.to_string())),
        }
    }
}

struct TopologyService {
    application_state: AppState,
}

#[async_trait::async_trait]
impl ServiceHandler for TopologyService {
    fn service_name(&self) -> &str {
        "TopologyService"
    }

    async fn handle(&self, method: &str, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        match method {
            "GetPeers" => {
                let request: GetPeersRequest = decode(payload)?;
                let peers = self
                    .application_state
                    .topology
                    .resolve_peers(&request.device_id)
                    .await
                    .map_err(|fault| TransportError::Remote(fault.to_string()))?;
                encode(&GetPeersResponse { peers })
            }
            unknown => Err(TransportError::UnknownTarget(unknown.to_string())),
        }
    }
}

struct NatService;

#[async_trait::async_trait]
impl ServiceHandler for NatService {
    fn service_name(&self) -> &str {
        "NATService"
    }

    async fn handle(&self, method: &str, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        match method {
            "MatchDecision" => {
                let request: MatchDecisionRequest = decode(payload)?;
                let nat_a = NatType::from_str(&request.nat_type_a)
                    .map_err(TransportError::Remote)?;
                let nat_b = NatType::from_str(&request.nat_type_b)
                    .map_err(TransportError::Remote)?;

                let verdict: ConnectionType = match_decision(nat_a, nat_b);
                encode(&MatchDecisionResponse {
                    connection_type: verdict.as_wire().to_string(),
                })
            }
            unknown => Err(TransportError::UnknownTarget(unknown.to_string())),
        }
    }
}

/// Enciende el transporte interno si la dirección está configurada.
pub fn spawn_internal_rpc(application_state: AppState) {
    let Some(bind_address) = application_state.config.internal_rpc_bind.clone() else {
        return;
    };

    info!("🛰️ [RPC_FACADE]: Igniting internal transport at {}.", bind_address);

    tokio::spawn(async move {
        let server = RpcServer::new()
            .register(Arc::new(DeviceService {
                application_state: application_state.clone(),
            }))
            .register(Arc::new(TopologyService {
                application_state: application_state.clone(),
            }))
            .register(Arc::new(NatService));

        if let Err(transport_fault) = server.serve(&bind_address).await {
            warn!("⚠️ [RPC_FACADE]: Internal transport collapsed: {}", transport_fault);
        }
    });
}
