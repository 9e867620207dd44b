// [apps/orchestrator/src/services/topology.rs]
/*!
 * =================================================================
 * APARATO: TOPOLOGY PEER RESOLVER (V4.2 - DETERMINISTIC SET)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: MATERIALIZACIÓN DEL CONJUNTO DE PARES POR DISPOSITIVO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ONLINE MESH ONLY: El conjunto de pares de un dispositivo son los
 *    demás miembros EN LÍNEA de su red virtual.
 * 2. ALLOWED-IPS POLICY: /32 del par por defecto; el CIDR completo de
 *    la red cuando la topología es flat-mesh.
 * 3. STABLE ORDER: IP virtual ascendente; los clientes que difieren la
 *    lista observan altas y bajas limpias.
 * 4. PUSH + PULL: Toda mutación de topología publica 'peer.updated';
 *    el pull de 30 s acota la obsolescencia ante pérdida de push.
 * =================================================================
 */

use crate::services::event_bus::EventBus;
use edgelink_domain_models::{
    Device, PeerConfiguration, VirtualNetwork, DEFAULT_PERSISTENT_KEEPALIVE_SECONDS,
};
use edgelink_infra_db::repositories::{DeviceRepository, NetworkRepository, PeerRepository};
use edgelink_infra_db::DbError;
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct TopologyResolver {
    device_repository: Arc<DeviceRepository>,
    network_repository: Arc<NetworkRepository>,
    peer_repository: Arc<PeerRepository>,
    event_bus: Arc<EventBus>,
}

impl TopologyResolver {
    #[must_use]
    pub fn new(
        device_repository: Arc<DeviceRepository>,
        network_repository: Arc<NetworkRepository>,
        peer_repository: Arc<PeerRepository>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            device_repository,
            network_repository,
            peer_repository,
            event_bus,
        }
    }

    /**
     * Resuelve el conjunto de pares vigente del dispositivo, lo
     * materializa en el Ledger y lo retorna ordenado.
     *
     * # Errors:
     * `NotFound` si el dispositivo o su red ya no existen.
     */
    #[instrument(skip(self), fields(device = %device_id))]
    pub async fn resolve_peers(&self, device_id: &str) -> Result<Vec<PeerConfiguration>, DbError> {
        let device = self
            .device_repository
            .find_by_id(device_id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("device:{device_id}")))?;

        let network = self
            .network_repository
            .find_by_id(&device.virtual_network_id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("network:{}", device.virtual_network_id)))?;

        let online_members = self
            .device_repository
            .list_online_by_network(&network.id)
            .await?;

        let mut peer_set: Vec<PeerConfiguration> = online_members
            .iter()
            .filter(|member| member.id != device.id)
            .map(|member| Self::materialize_peer(&device, member, &network))
            .collect();

        PeerConfiguration::sort_stable(&mut peer_set);
        self.peer_repository
            .replace_for_device(&device.id, &peer_set)
            .await?;

        debug!("🕸️ [TOPOLOGY]: Device {} sees {} peers.", device.id, peer_set.len());
        Ok(peer_set)
    }

    fn materialize_peer(
        device: &Device,
        peer: &Device,
        network: &VirtualNetwork,
    ) -> PeerConfiguration {
        let allowed_ips = if network.flat_mesh {
            vec![network.cidr.clone()]
        } else {
            vec![format!("{}/32", peer.virtual_ip)]
        };

        PeerConfiguration {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device.id.clone(),
            peer_device_id: peer.id.clone(),
            peer_public_key: peer.public_key.clone(),
            peer_virtual_ip: peer.virtual_ip.clone(),
            allowed_ips,
            persistent_keepalive: Some(DEFAULT_PERSISTENT_KEEPALIVE_SECONDS),
        }
    }

    /// Invalidación de topología: publicada ante toda transición de
    /// dispositivo (alta, baja, presencia, rotación de llave).
    pub fn invalidate_network(&self, network_id: &str) {
        self.event_bus.publish_peer_updated(network_id);
    }
}
