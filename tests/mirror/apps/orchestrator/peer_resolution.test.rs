// [tests/mirror/apps/orchestrator/peer_resolution.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE RESOLUCIÓN DE PARES (V4.0 - MESH)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: ORDEN DETERMINISTA, PRESENCIA Y POLÍTICA FLAT-MESH
 * =================================================================
 */

use chrono::Utc;
use edgelink_domain_models::{
    Device, NatType, Organization, Platform, VirtualNetwork,
};
use edgelink_infra_db::repositories::device::forge_initial_key;
use edgelink_infra_db::DbClient;
use edgelink_orchestrator::config::OrchestratorConfig;
use edgelink_orchestrator::state::AppState;
use std::sync::Arc;

async fn forge_control_plane(ledger_name: &str) -> AppState {
    let memory_url = format!("file:{ledger_name}?mode=memory&cache=shared");
    let database_client = DbClient::connect(&memory_url, None)
        .await
        .expect("RAM ledger ignition");
    AppState::new(Arc::new(OrchestratorConfig::from_env()), database_client)
}

async fn seed_network(state: &AppState, flat_mesh: bool) -> String {
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

    let network = VirtualNetwork {
        id: "net-1".into(),
        org_id: "org-1".into(),
        name: "backbone".into(),
        cidr: "10.99.0.0/24".into(),
        gateway_ip: "10.99.0.1".into(),
        dns_servers: vec![],
        flat_mesh,
        created_at: now,
        updated_at: now,
    };
    state.network_repository.insert(&network).await.expect("network seed");
    network.id
}

async fn seed_device(state: &AppState, id: &str, virtual_ip: &str, online: bool) {
    let now = Utc::now();
    let device = Device {
        id: id.into(),
        virtual_network_id: "net-1".into(),
        name: format!("unit-{id}"),
        virtual_ip: virtual_ip.into(),
        public_key: format!("PK-{id}"),
        platform: Platform::Linux,
        nat_type: NatType::Unknown,
        public_endpoint: None,
        tags: vec![],
        online,
        last_seen_at: Some(now),
        created_at: now,
        updated_at: now,
    };
    let key = forge_initial_key(id, &format!("PK-{id}"), None);
    state
        .device_repository
        .insert_registered(&device, &key)
        .await
        .expect("device seed");
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Orden estable por IP virtual ascendente (numérico, no léxico).
    #[tokio::test]
    async fn peer_set_orders_by_virtual_ip_ascending() {
        let state = forge_control_plane("peers-order").await;
        seed_network(&state, false).await;

        seed_device(&state, "dev-a", "10.99.0.2", true).await;
        seed_device(&state, "dev-b", "10.99.0.20", true).await;
        seed_device(&state, "dev-c", "10.99.0.3", true).await;
        seed_device(&state, "dev-d", "10.99.0.100", true).await;

        let peers = state.topology.resolve_peers("dev-a").await.unwrap();
        let observed: Vec<&str> = peers.iter().map(|p| p.peer_virtual_ip.as_str()).collect();
        assert_eq!(observed, vec!["10.99.0.3", "10.99.0.20", "10.99.0.100"]);
    }

    /// Los miembros fuera de línea no aparecen en ningún conjunto.
    #[tokio::test]
    async fn offline_members_are_excluded() {
        let state = forge_control_plane("peers-offline").await;
        seed_network(&state, false).await;

        seed_device(&state, "dev-a", "10.99.0.2", true).await;
        seed_device(&state, "dev-b", "10.99.0.3", false).await;
        seed_device(&state, "dev-c", "10.99.0.4", true).await;

        let peers = state.topology.resolve_peers("dev-a").await.unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].peer_device_id, "dev-c");
    }

    /// Política flat-mesh: el CIDR completo viaja como allowed-ips.
    #[tokio::test]
    async fn flat_mesh_advertises_whole_cidr() {
        let state = forge_control_plane("peers-flat").await;
        seed_network(&state, true).await;

        seed_device(&state, "dev-a", "10.99.0.2", true).await;
        seed_device(&state, "dev-b", "10.99.0.3", true).await;

        let peers = state.topology.resolve_peers("dev-a").await.unwrap();
        assert_eq!(peers[0].allowed_ips, vec!["10.99.0.0/24".to_string()]);
        assert_eq!(peers[0].persistent_keepalive, Some(25));
    }

    /// La materialización persiste: el Ledger refleja el conjunto.
    #[tokio::test]
    async fn peer_set_is_materialized_in_the_ledger() {
        let state = forge_control_plane("peers-ledger").await;
        seed_network(&state, false).await;

        seed_device(&state, "dev-a", "10.99.0.2", true).await;
        seed_device(&state, "dev-b", "10.99.0.3", true).await;

        state.topology.resolve_peers("dev-a").await.unwrap();
        let materialized = state.peer_repository.list_by_device("dev-a").await.unwrap();
        assert_eq!(materialized.len(), 1);
        assert_eq!(materialized[0].peer_public_key, "PK-dev-b");
    }
}
