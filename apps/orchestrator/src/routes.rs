// [apps/orchestrator/src/routes.rs]
/*!
 * =================================================================
 * APARATO: MESH ROUTING MATRIX (V4.2 - GUARDED TOPOLOGY)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L3)
 * RESPONSABILIDAD: TOPOLOGÍA DE RUTAS Y CAPAS DE GUARDIA
 *
 * VISION HIPER-HOLÍSTICA:
 * La topología separa tres estratos de ciudadanía:
 * 1. REST de dispositivo (PSK para el registro; firma para el resto).
 * 2. REST administrativo (sesión bearer con umbral de rol por grupo).
 * 3. Socket de eventos (sesión validada en la negociación).
 * =================================================================
 */

use crate::handlers::{
    admin::AdminCommandHandler, device::DeviceLifecycleHandler, nat::NatTraversalHandler, stream,
};
use crate::middleware::{
    admin_guard_admin, admin_guard_auditor, admin_guard_operator, device_guard, psk_guard,
};
use crate::state::AppState;
use axum::{
    http::{header, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

pub fn create_mesh_router(application_state: AppState) -> Router {
    // Escudo de red: CORS para el panel de operación y herramientas.
    let network_security_shield = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    // ESTRATO DE REGISTRO: único endpoint bajo la guardia PSK.
    let registration_stratum = Router::new()
        .route("/register", post(DeviceLifecycleHandler::handle_register))
        .layer(middleware::from_fn_with_state(
            application_state.clone(),
            psk_guard,
        ));

    // ESTRATO DE DISPOSITIVO: superficie firmada.
    let device_stratum = Router::new()
        .route("/heartbeat", post(DeviceLifecycleHandler::handle_heartbeat))
        .route("/peers", get(DeviceLifecycleHandler::handle_get_peers))
        .route("/config", get(DeviceLifecycleHandler::handle_get_config))
        .route("/deregister", post(DeviceLifecycleHandler::handle_deregister))
        .route("/rotate-key", post(DeviceLifecycleHandler::handle_rotate_key))
        .layer(middleware::from_fn_with_state(
            application_state.clone(),
            device_guard,
        ));

    // ESTRATO DE TRAVERSAL: también bajo firma de dispositivo.
    let traversal_stratum = Router::new()
        .route("/classify", post(NatTraversalHandler::handle_classify))
        .route("/rendezvous", post(NatTraversalHandler::handle_rendezvous))
        .layer(middleware::from_fn_with_state(
            application_state.clone(),
            device_guard,
        ));

    // ESTRATO ADMINISTRATIVO: umbral de rol por grupo de rutas.
    let admin_read_stratum = Router::new()
        .route("/alerts", get(AdminCommandHandler::handle_list_alerts))
        .route("/devices", get(AdminCommandHandler::handle_list_devices))
        .route("/audit", get(AdminCommandHandler::handle_list_audit))
        .layer(middleware::from_fn_with_state(
            application_state.clone(),
            admin_guard_auditor,
        ));

    let admin_operate_stratum = Router::new()
        .route(
            "/alerts/:id/acknowledge",
            post(AdminCommandHandler::handle_acknowledge_alert),
        )
        .route(
            "/alerts/:id/resolve",
            post(AdminCommandHandler::handle_resolve_alert),
        )
        .layer(middleware::from_fn_with_state(
            application_state.clone(),
            admin_guard_operator,
        ));

    let admin_mutate_stratum = Router::new()
        .route("/psk", post(AdminCommandHandler::handle_create_psk))
        .route("/devices/:id", delete(AdminCommandHandler::handle_delete_device))
        .layer(middleware::from_fn_with_state(
            application_state.clone(),
            admin_guard_admin,
        ));

    let rules_stratum = Router::new()
        .route("/reload", post(AdminCommandHandler::handle_rules_reload))
        .layer(middleware::from_fn_with_state(
            application_state.clone(),
            admin_guard_admin,
        ));

    // COMPOSICIÓN GLOBAL (Root Topology)
    Router::new()
        .route("/health", get(|| async { "STATUS_OK" }))
        .nest(
            "/api/v1",
            Router::new()
                .nest("/device", registration_stratum.merge(device_stratum))
                .nest("/nat", traversal_stratum)
                .nest(
                    "/admin",
                    Router::new()
                        .route(
                            "/session",
                            post(AdminCommandHandler::handle_session_bootstrap),
                        )
                        .merge(admin_read_stratum)
                        .merge(admin_operate_stratum)
                        .merge(admin_mutate_stratum),
                )
                .nest("/rules", rules_stratum),
        )
        // Socket de eventos (la sesión se valida en la negociación).
        .route("/ws", get(stream::establish_event_stream))
        .layer(network_security_shield)
        .with_state(application_state)
}
