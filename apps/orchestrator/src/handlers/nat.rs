// [apps/orchestrator/src/handlers/nat.rs]
/*!
 * =================================================================
 * APARATO: NAT TRAVERSAL HANDLER (V4.2 - RENDEZVOUS GATE)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: CLASIFICACIÓN STUN E INTERCAMBIO DE ENDPOINTS
 * =================================================================
 */

use crate::errors::{data_envelope, ApiError};
use crate::middleware::DevicePrincipal;
use crate::services::nat_coordinator::TraversalError;
use crate::state::AppState;
use axum::extract::{Extension, Json, State};
use edgelink_domain_traversal::StunProbeReport;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct ClassifyPayload {
    #[serde(flatten)]
    pub report: StunProbeReport,
}

#[derive(Debug, Deserialize)]
pub struct RendezvousPayload {
    #[serde(rename = "peer_device_id")]
    pub peer_device_id: String,

    /// Endpoint propio observado; ausente en el sondeo puro.
    #[serde(rename = "public_endpoint")]
    pub public_endpoint: Option<String>,
}

pub struct NatTraversalHandler;

impl NatTraversalHandler {
    /**
     * Endpoint: POST /api/v1/nat/classify
     * Interpreta el reporte STUN del dispositivo y persiste el tipo NAT.
     */
    #[instrument(skip(application_state, device_principal, payload), fields(device = %device_principal.device_id))]
    pub async fn handle_classify(
        State(application_state): State<AppState>,
        Extension(device_principal): Extension<DevicePrincipal>,
        Json(payload): Json<ClassifyPayload>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        let observed_nat = application_state
            .nat_coordinator
            .classify_and_store(&device_principal.device_id, &payload.report)
            .await
            .map_err(map_traversal_fault)?;

        Ok(data_envelope(json!({ "nat_type": observed_nat })))
    }

    /**
     * Endpoint: POST /api/v1/nat/rendezvous
     *
     * Deposita el candidato propio (si viaja) y retorna el veredicto de
     * camino más el endpoint del contrario cuando ya está disponible.
     * Un sondeo sobre un encuentro caducado responde 'peer-unreachable'.
     */
    #[instrument(skip(application_state, device_principal, payload), fields(device = %device_principal.device_id, peer = %payload.peer_device_id))]
    pub async fn handle_rendezvous(
        State(application_state): State<AppState>,
        Extension(device_principal): Extension<DevicePrincipal>,
        Json(payload): Json<RendezvousPayload>,
    ) -> Result<axum::Json<serde_json::Value>, ApiError> {
        if payload.peer_device_id == device_principal.device_id {
            return Err(ApiError::bad_request("A device cannot rendezvous with itself."));
        }

        let outcome = application_state
            .nat_coordinator
            .rendezvous(
                &device_principal.device_id,
                &payload.peer_device_id,
                payload.public_endpoint,
            )
            .await
            .map_err(map_traversal_fault)?;

        Ok(data_envelope(json!({
            "connection_type": outcome.connection_type,
            "peer_endpoint": outcome.peer_endpoint,
            "session_id": outcome.session_id,
        })))
    }
}

fn map_traversal_fault(fault: TraversalError) -> ApiError {
    match fault {
        TraversalError::PeerUnreachable => ApiError::not_found("peer-unreachable"),
        TraversalError::Ledger(ledger_fault) => ledger_fault.into(),
        TraversalError::Cache(kv_fault) => kv_fault.into(),
    }
}
