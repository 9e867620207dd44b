// [tests/mirror/apps/orchestrator/registration_flow.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE FLUJO DE REGISTRO (V4.1 - MESH)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DEL ALTA CAS Y CONSUMO ATÓMICO DE PSK
 *
 * # Mathematical Proof (Registration Invariants):
 * Certifica sobre un Ledger en RAM que: (1) el contador de la PSK es
 * monótono y satura en maxUses, (2) ninguna IP virtual colisiona ni
 * pisa la pasarela, (3) la llave pública es única a nivel global y
 * (4) el conjunto de pares refleja el alta inmediatamente.
 * =================================================================
 */

use axum::extract::{Extension, Json, State};
use chrono::Utc;
use edgelink_domain_models::{Organization, PreSharedKey, VirtualNetwork};
use edgelink_infra_db::repositories::PskRepository;
use edgelink_infra_db::{DbClient, DbError};
use edgelink_orchestrator::config::OrchestratorConfig;
use edgelink_orchestrator::handlers::device::{DeviceLifecycleHandler, RegisterPayload};
use edgelink_orchestrator::middleware::PskPrincipal;
use edgelink_orchestrator::state::AppState;
use std::sync::Arc;

/// Forja un plano de control completo contra un Ledger en RAM.
/// El nombre aísla la base compartida de cada prueba del binario.
async fn forge_control_plane(ledger_name: &str) -> AppState {
    let memory_url = format!("file:{ledger_name}?mode=memory&cache=shared");
    let database_client = DbClient::connect(&memory_url, None)
        .await
        .expect("RAM ledger ignition");
    AppState::new(Arc::new(OrchestratorConfig::from_env()), database_client)
}

/// Siembra organización, red 10.99.0.0/24 (gw .1) y PSK con techo de usos.
async fn seed_tenancy(state: &AppState, max_uses: Option<u32>) -> (String, String, String) {
    let now = Utc::now();
    let organization = Organization {
        id: "org-acme".into(),
        slug: "acme".into(),
        name: "Acme Corp".into(),
        max_devices: 50,
        max_virtual_networks: 4,
        created_at: now,
        updated_at: now,
    };
    state
        .organization_repository
        .insert(&organization)
        .await
        .expect("org seed");

    let network = VirtualNetwork {
        id: "net-backbone".into(),
        org_id: organization.id.clone(),
        name: "backbone".into(),
        cidr: "10.99.0.0/24".into(),
        gateway_ip: "10.99.0.1".into(),
        dns_servers: vec!["1.1.1.1".into()],
        flat_mesh: false,
        created_at: now,
        updated_at: now,
    };
    state.network_repository.insert(&network).await.expect("network seed");

    let key_material = "field-psk-material-001".to_string();
    let credential = PreSharedKey {
        id: "psk-field".into(),
        org_id: organization.id.clone(),
        key_hash: PskRepository::hash_key_material(&key_material),
        name: Some("field-provisioning".into()),
        max_uses,
        used_count: 0,
        expires_at: None,
        created_at: now,
    };
    state.psk_repository.insert(&credential).await.expect("psk seed");

    (organization.slug, network.id, key_material)
}

/// Alta completa: consumo de PSK (guardia) + handler de registro.
async fn register_device(
    state: &AppState,
    key_material: &str,
    org_slug: &str,
    network_id: &str,
    name: &str,
    public_key: &str,
) -> Result<serde_json::Value, String> {
    let consumed = state
        .psk_repository
        .consume(key_material)
        .await
        .map_err(|fault| fault.to_string())?;

    let response = DeviceLifecycleHandler::handle_register(
        State(state.clone()),
        Extension(PskPrincipal { psk: consumed }),
        Json(RegisterPayload {
            public_key: public_key.to_string(),
            platform: "linux".into(),
            name: name.to_string(),
            org_slug: org_slug.to_string(),
            virtual_network_id: network_id.to_string(),
            tags: vec![],
        }),
    )
    .await
    .map_err(|fault| fault.message)?;

    Ok(response.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * ESCENARIO MAESTRO: dos altas consecutivas contra una PSK con
     * maxUses = 2, seguido del agotamiento en la tercera.
     */
    #[tokio::test]
    async fn register_then_pull_peers_with_psk_exhaustion() {
        let state = forge_control_plane("regflow-scenario").await;
        let (org_slug, network_id, key_material) = seed_tenancy(&state, Some(2)).await;

        // --- ALTA A ---
        let registration_a = register_device(
            &state, &key_material, &org_slug, &network_id, "edge-a", "PUBKEY-A",
        )
        .await
        .expect("device A admission");
        assert_eq!(registration_a["data"]["virtual_ip"], "10.99.0.2");

        // --- ALTA B ---
        let registration_b = register_device(
            &state, &key_material, &org_slug, &network_id, "edge-b", "PUBKEY-B",
        )
        .await
        .expect("device B admission");
        assert_eq!(registration_b["data"]["virtual_ip"], "10.99.0.3");

        // --- CONTADOR MONÓTONO ---
        let credential = state
            .psk_repository
            .find_by_hash(&PskRepository::hash_key_material(&key_material))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(credential.used_count, 2);

        // --- AGOTAMIENTO EN LA TERCERA ---
        let third_attempt = state.psk_repository.consume(&key_material).await;
        assert!(matches!(third_attempt, Err(DbError::PskExhausted)));

        // --- CONJUNTO DE PARES RECÍPROCO ---
        let device_a_id = registration_a["data"]["device_id"].as_str().unwrap();
        let device_b_id = registration_b["data"]["device_id"].as_str().unwrap();

        let peers_of_a = state.topology.resolve_peers(device_a_id).await.unwrap();
        assert_eq!(peers_of_a.len(), 1);
        assert_eq!(peers_of_a[0].peer_virtual_ip, "10.99.0.3");
        assert_eq!(peers_of_a[0].allowed_ips, vec!["10.99.0.3/32".to_string()]);

        let peers_of_b = state.topology.resolve_peers(device_b_id).await.unwrap();
        assert_eq!(peers_of_b.len(), 1);
        assert_eq!(peers_of_b[0].peer_virtual_ip, "10.99.0.2");
    }

    /// La llave pública es única a nivel global: la segunda alta muere.
    #[tokio::test]
    async fn duplicate_public_key_is_rejected() {
        let state = forge_control_plane("regflow-dupkey").await;
        let (org_slug, network_id, key_material) = seed_tenancy(&state, None).await;

        register_device(
            &state, &key_material, &org_slug, &network_id, "edge-a", "SHARED-KEY",
        )
        .await
        .expect("first admission");

        let duplicate = register_device(
            &state, &key_material, &org_slug, &network_id, "edge-b", "SHARED-KEY",
        )
        .await;
        assert!(duplicate.is_err());
        assert!(duplicate.unwrap_err().contains("already registered"));
    }

    /// Ninguna IP asignada coincide con otra ni con la pasarela.
    #[tokio::test]
    async fn virtual_ips_are_unique_and_skip_gateway() {
        let state = forge_control_plane("regflow-vip").await;
        let (org_slug, network_id, key_material) = seed_tenancy(&state, None).await;

        let mut assigned_ips = std::collections::HashSet::new();
        for device_index in 0..5 {
            let registration = register_device(
                &state,
                &key_material,
                &org_slug,
                &network_id,
                &format!("edge-{device_index}"),
                &format!("PUBKEY-{device_index}"),
            )
            .await
            .expect("admission");

            let assigned_ip = registration["data"]["virtual_ip"].as_str().unwrap().to_string();
            assert_ne!(assigned_ip, "10.99.0.1", "gateway must never be assigned");
            assert!(assigned_ips.insert(assigned_ip), "virtual IP collision");
        }
    }

    /// Cada dispositivo registrado porta exactamente una llave activa.
    #[tokio::test]
    async fn registration_births_exactly_one_active_key() {
        let state = forge_control_plane("regflow-keys").await;
        let (org_slug, network_id, key_material) = seed_tenancy(&state, None).await;

        let registration = register_device(
            &state, &key_material, &org_slug, &network_id, "edge-a", "PUBKEY-A",
        )
        .await
        .expect("admission");
        let device_id = registration["data"]["device_id"].as_str().unwrap();

        let active_key = state
            .device_key_repository
            .find_active(device_id)
            .await
            .unwrap()
            .expect("active key must exist");
        assert_eq!(active_key.public_key, "PUBKEY-A");

        // La rotación preserva la unicidad: la sucesora firma, la
        // anterior queda en gracia.
        let successor = state
            .device_key_repository
            .rotate(device_id, "PUBKEY-A2", None)
            .await
            .unwrap();
        let active_after_rotation = state
            .device_key_repository
            .find_active(device_id)
            .await
            .unwrap()
            .expect("active key after rotation");
        assert_eq!(active_after_rotation.id, successor.id);
        assert_eq!(active_after_rotation.public_key, "PUBKEY-A2");
    }
}
