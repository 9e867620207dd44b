// [apps/orchestrator/src/handlers/stream.rs]
/**
 * =================================================================
 * APARATO: MESH EVENT SOCKET (V4.3 - TRIPLE TASK)
 * CLASIFICACIÓN: API HANDLER (ESTRATO L4)
 * RESPONSABILIDAD: PUSH EN TIEMPO REAL A SESIONES ADMINISTRATIVAS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SUBJECT SUBSCRIPTION: El primer frame del cliente declara sus
 *    sujetos ({"subjects": ["device.*", "alert.*"]}); el filtrado
 *    ocurre en esta sesión, no en el bus.
 * 2. LIVENESS CONTRACT: Ping cada 30 s; un cliente sin actividad en
 *    60 s es expulsado.
 * 3. LAG POLICY: Un suscriptor rezagado pierde tramas (at-most-once) y
 *    debe re-sincronizar por pull; el emisor jamás se bloquea.
 *
 * # Mathematical Proof (Asynchronous Determinism):
 * El canal mpsc interno desacopla la recepción de red de la lógica:
 * el procesamiento de una directiva jamás bloquea el sifón del bus.
 * =================================================================
 */

use crate::middleware::admin_session_key;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Intervalo de ping del contrato de vida (30 s).
const KEEPALIVE_INTERVAL_SECONDS: u64 = 30;

/// Silencio máximo admitido antes de la expulsión (60 s).
const LIVENESS_DEADLINE_SECONDS: i64 = 60;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Token de sesión administrativa (la negociación WS no porta cabeceras propias).
    pub token: String,
}

/// Primer frame del cliente: declaración de sujetos y predicado.
#[derive(Debug, Deserialize)]
struct SubscriptionFrame {
    #[serde(default)]
    subjects: Vec<String>,

    /// Predicado opcional: solo señales de este dispositivo.
    #[serde(default)]
    device_id: Option<String>,

    /// Predicado opcional: solo señales de esta organización.
    #[serde(default)]
    organization_id: Option<String>,
}

/// Evalúa el predicado de la sesión contra el payload de la señal.
fn payload_satisfies_predicate(
    payload: &serde_json::Value,
    device_filter: &Option<String>,
    organization_filter: &Option<String>,
) -> bool {
    if let Some(device_id) = device_filter {
        let carried = payload.get("device_id").and_then(|value| value.as_str());
        if carried.is_some() && carried != Some(device_id.as_str()) {
            return false;
        }
    }
    if let Some(organization_id) = organization_filter {
        let carried = payload
            .get("organization_id")
            .and_then(|value| value.as_str());
        if carried.is_some() && carried != Some(organization_id.as_str()) {
            return false;
        }
    }
    true
}

/**
 * Punto de entrada de la negociación del socket de eventos.
 * La sesión administrativa se valida ANTES de la transición RFC 6455.
 */
#[instrument(skip(websocket_upgrade, application_state, query))]
pub async fn establish_event_stream(
    websocket_upgrade: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(application_state): State<AppState>,
) -> impl IntoResponse {
    let session_lookup = application_state
        .kv_store
        .get(&admin_session_key(&query.token))
        .await;

    match session_lookup {
        Ok(Some(_operator_id)) => {
            debug!("🔌 [STREAM_UPGRADE]: Negotiating protocol transition...");
            websocket_upgrade
                .on_upgrade(move |socket| drive_event_session(socket, application_state))
                .into_response()
        }
        _ => {
            warn!("🔒 [STREAM_REJECTED]: Invalid admin session token.");
            axum::http::StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

/// Orquestador de la sesión WebSocket: Downstream, Upstream y Liveness.
async fn drive_event_session(socket: WebSocket, application_state: AppState) {
    let (mut socket_sender, mut socket_receiver) = socket.split();
    let mut bus_subscriber = application_state.event_bus.subscribe();

    let session_identifier = Uuid::new_v4().to_string();
    info!("⚡ [STREAM_OPEN]: Event session {} established.", session_identifier);

    // --- FASE 0: DECLARACIÓN DE SUJETOS (primer frame, 10 s de gracia) ---
    let subscription: SubscriptionFrame = match tokio::time::timeout(
        Duration::from_secs(10),
        socket_receiver.next(),
    )
    .await
    {
        Ok(Some(Ok(Message::Text(raw_frame)))) => {
            serde_json::from_str::<SubscriptionFrame>(&raw_frame).unwrap_or(SubscriptionFrame {
                subjects: vec![],
                device_id: None,
                organization_id: None,
            })
        }
        _ => {
            warn!("🔌 [STREAM_ABORT]: Session {} sent no subscription frame.", session_identifier);
            return;
        }
    };

    let subscribed_subjects = if subscription.subjects.is_empty() {
        vec!["device.*".into(), "peer.updated".into(), "alert.*".into()]
    } else {
        subscription.subjects.clone()
    };
    let device_filter = subscription.device_id.clone();
    let organization_filter = subscription.organization_id.clone();
    debug!(
        "📋 [STREAM_SUBJECTS]: Session {} listening to {:?}.",
        session_identifier, subscribed_subjects
    );

    // Marca de última actividad del cliente (epoch segundos).
    let last_client_activity = Arc::new(AtomicI64::new(chrono::Utc::now().timestamp()));

    // --- TAREA 1: DOWNSTREAM (bus -> cliente) + LIVENESS ---
    let session_id_downstream = session_identifier.clone();
    let activity_for_downstream = last_client_activity.clone();
    let mut downstream_task = tokio::spawn(async move {
        let mut keepalive_timer = interval(Duration::from_secs(KEEPALIVE_INTERVAL_SECONDS));

        loop {
            tokio::select! {
                // Brazo 1: ping de vida + veredicto de silencio.
                _ = keepalive_timer.tick() => {
                    let silent_for = chrono::Utc::now().timestamp()
                        - activity_for_downstream.load(Ordering::Relaxed);
                    if silent_for > LIVENESS_DEADLINE_SECONDS {
                        warn!("⏱️ [STREAM_SILENT]: Session {} exceeded liveness deadline.", session_id_downstream);
                        break;
                    }
                    if socket_sender.send(Message::Ping(vec![])).await.is_err() {
                        break;
                    }
                },

                // Brazo 2: sifón del bus con filtrado por sujeto.
                bus_reception = bus_subscriber.recv() => {
                    match bus_reception {
                        Ok(event) => {
                            let is_subscribed = subscribed_subjects
                                .iter()
                                .any(|pattern| event.matches_pattern(pattern));
                            if !is_subscribed
                                || !payload_satisfies_predicate(
                                    &event.payload,
                                    &device_filter,
                                    &organization_filter,
                                )
                            {
                                continue;
                            }

                            let frame = serde_json::json!({
                                "subject": event.subject,
                                "payload": event.payload,
                            });
                            if socket_sender
                                .send(Message::Text(frame.to_string()))
                                .await
                                .is_err()
                            {
                                warn!("⚠️ [STREAM_SEVERED]: Session {} lost downstream.", session_id_downstream);
                                break;
                            }
                        },
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed_count)) => {
                            warn!(
                                "🐢 [STREAM_LAG]: Session {} skipped {} frames.",
                                session_id_downstream, missed_count
                            );
                        },
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                },
            }
        }
    });

    // --- TAREA 2: UPSTREAM (cliente -> servidor; pong y cierre) ---
    let session_id_upstream = session_identifier.clone();
    let activity_for_upstream = last_client_activity.clone();
    let mut upstream_task = tokio::spawn(async move {
        while let Some(network_read) = socket_receiver.next().await {
            match network_read {
                Ok(Message::Pong(_)) | Ok(Message::Text(_)) | Ok(Message::Binary(_)) => {
                    activity_for_upstream.store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
                }
                Ok(Message::Close(_)) => {
                    debug!("🔌 [STREAM_CLOSE]: Session {} closed by client.", session_id_upstream);
                    break;
                }
                Err(physical_fault) => {
                    warn!("❌ [STREAM_FAULT]: Session {} network error: {}.", session_id_upstream, physical_fault);
                    break;
                }
                _ => {}
            }
        }
    });

    // --- LIMPIEZA: el primer centinela en caer colapsa al otro. ---
    tokio::select! {
        _ = (&mut downstream_task) => upstream_task.abort(),
        _ = (&mut upstream_task) => downstream_task.abort(),
    };

    info!("💀 [STREAM_TERMINATED]: Session {} resources released.", session_identifier);
}
