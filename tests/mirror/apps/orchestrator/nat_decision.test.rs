// [tests/mirror/apps/orchestrator/nat_decision.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE TRAVERSAL NAT (V4.1 - MESH)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: TABLA DE DECISIÓN, RENDEZVOUS Y SESIÓN CANÓNICA
 * =================================================================
 */

use chrono::Utc;
use edgelink_domain_models::{
    ConnectionType, Device, NatType, Organization, Platform, VirtualNetwork,
};
use edgelink_domain_traversal::match_decision;
use edgelink_infra_db::repositories::device::forge_initial_key;
use edgelink_infra_db::DbClient;
use edgelink_orchestrator::config::OrchestratorConfig;
use edgelink_orchestrator::services::TraversalError;
use edgelink_orchestrator::state::AppState;
use std::sync::Arc;

async fn forge_control_plane(ledger_name: &str) -> AppState {
    let memory_url = format!("file:{ledger_name}?mode=memory&cache=shared");
    let database_client = DbClient::connect(&memory_url, None)
        .await
        .expect("RAM ledger ignition");
    AppState::new(Arc::new(OrchestratorConfig::from_env()), database_client)
}

async fn seed_device_with_nat(state: &AppState, id: &str, virtual_ip: &str, nat_type: NatType) {
    let now = Utc::now();
    let device = Device {
        id: id.into(),
        virtual_network_id: "net-1".into(),
        name: format!("unit-{id}"),
        virtual_ip: virtual_ip.into(),
        public_key: format!("PK-{id}"),
        platform: Platform::Linux,
        nat_type,
        public_endpoint: None,
        tags: vec![],
        online: true,
        last_seen_at: Some(now),
        created_at: now,
        updated_at: now,
    };
    state
        .device_repository
        .insert_registered(&device, &forge_initial_key(id, &format!("PK-{id}"), None))
        .await
        .expect("device seed");
}

async fn seed_topology(state: &AppState) {
    let now = Utc::now();
    state
        .organization_repository
        .insert(&Organization {
            id: "org-1".into(),
            slug: "acme".into(),
            name: "Acme".into(),
            max_devices: 50,
            max_virtual_networks: 4,
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("org seed");
    state
        .network_repository
        .insert(&VirtualNetwork {
            id: "net-1".into(),
            org_id: "org-1".into(),
            name: "backbone".into(),
            cidr: "10.99.0.0/24".into(),
            gateway_ip: "10.99.0.1".into(),
            dns_servers: vec![],
            flat_mesh: false,
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("network seed");
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tabla del coordinador: los tres veredictos del contrato.
    #[test]
    fn decision_table_matches_the_contract() {
        assert_eq!(
            match_decision(NatType::Symmetric, NatType::PortRestrictedCone),
            ConnectionType::TurnRelay
        );
        assert_eq!(
            match_decision(NatType::FullCone, NatType::Symmetric),
            ConnectionType::TurnRelay
        );
        assert_eq!(
            match_decision(NatType::FullCone, NatType::RestrictedCone),
            ConnectionType::P2pDirect
        );
    }

    /**
     * Rendezvous de ida y vuelta: A deposita, B deposita, ambos ven el
     * endpoint del contrario y la sesión queda sellada UNA vez con el
     * par canónico.
     */
    #[tokio::test]
    async fn rendezvous_exchange_seals_one_canonical_session() {
        let state = forge_control_plane("nat-exchange").await;
        seed_topology(&state).await;
        seed_device_with_nat(&state, "dev-a", "10.99.0.2", NatType::FullCone).await;
        seed_device_with_nat(&state, "dev-b", "10.99.0.3", NatType::RestrictedCone).await;

        // A deposita su candidato; el contrario aún no llegó.
        let first_leg = state
            .nat_coordinator
            .rendezvous("dev-a", "dev-b", Some("203.0.113.9:40001".into()))
            .await
            .unwrap();
        assert_eq!(first_leg.connection_type, ConnectionType::P2pDirect);
        assert!(first_leg.peer_endpoint.is_none());
        assert!(first_leg.session_id.is_none());

        // B deposita: el par se completa y la sesión se sella.
        let second_leg = state
            .nat_coordinator
            .rendezvous("dev-b", "dev-a", Some("198.51.100.3:51000".into()))
            .await
            .unwrap();
        assert_eq!(second_leg.peer_endpoint.as_deref(), Some("203.0.113.9:40001"));
        let session_id = second_leg.session_id.expect("session sealed on completion");

        // A sondea: observa el endpoint de B y la MISMA sesión.
        let poll = state
            .nat_coordinator
            .rendezvous("dev-a", "dev-b", None)
            .await
            .unwrap();
        assert_eq!(poll.peer_endpoint.as_deref(), Some("198.51.100.3:51000"));
        assert_eq!(poll.session_id.as_deref(), Some(session_id.as_str()));

        // Fila canónica única: device_a < device_b.
        let session = state
            .session_repository
            .find_active_for_pair("dev-b", "dev-a")
            .await
            .unwrap()
            .expect("canonical row");
        assert_eq!(session.device_a_id, "dev-a");
        assert_eq!(session.device_b_id, "dev-b");
    }

    /// Par simétrico + cono restringido: el veredicto persiste el relay.
    #[tokio::test]
    async fn symmetric_pair_is_ordered_through_relay() {
        let state = forge_control_plane("nat-relay").await;
        seed_topology(&state).await;
        seed_device_with_nat(&state, "dev-a", "10.99.0.2", NatType::Symmetric).await;
        seed_device_with_nat(&state, "dev-b", "10.99.0.3", NatType::PortRestrictedCone).await;

        let outcome = state
            .nat_coordinator
            .rendezvous("dev-a", "dev-b", Some("203.0.113.9:40001".into()))
            .await
            .unwrap();
        assert_eq!(outcome.connection_type, ConnectionType::TurnRelay);
    }

    /// Sondeo sobre un encuentro jamás abierto: 'peer-unreachable' y
    /// ninguna fila de sesión.
    #[tokio::test]
    async fn lapsed_rendezvous_is_peer_unreachable_without_session() {
        let state = forge_control_plane("nat-lapsed").await;
        seed_topology(&state).await;
        seed_device_with_nat(&state, "dev-a", "10.99.0.2", NatType::FullCone).await;
        seed_device_with_nat(&state, "dev-b", "10.99.0.3", NatType::FullCone).await;

        let poll = state.nat_coordinator.rendezvous("dev-a", "dev-b", None).await;
        assert!(matches!(poll, Err(TraversalError::PeerUnreachable)));

        let session = state
            .session_repository
            .find_active_for_pair("dev-a", "dev-b")
            .await
            .unwrap();
        assert!(session.is_none());
    }
}
