// [libs/domain/models/src/peer.rs]

use serde::{Deserialize, Serialize};

/// Keepalive persistente por defecto para atravesar NATs con mapeos
/// volátiles (segundos).
pub const DEFAULT_PERSISTENT_KEEPALIVE_SECONDS: u16 = 25;

/// Vista derivada por par (dispositivo, par): todo lo que el dispositivo
/// necesita para levantar el túnel hacia ese par. Se materializa por el
/// resolutor de topología y nunca se edita a mano.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfiguration {
    pub id: String,

    #[serde(rename = "device_id")]
    pub device_id: String,

    #[serde(rename = "peer_device_id")]
    pub peer_device_id: String,

    /// Llave pública WireGuard del par.
    #[serde(rename = "peer_public_key")]
    pub peer_public_key: String,

    #[serde(rename = "peer_virtual_ip")]
    pub peer_virtual_ip: String,

    /// Prefijos enrutables a través del par: su /32 por defecto, o el
    /// CIDR completo de la red cuando la topología es flat-mesh.
    #[serde(rename = "allowed_ips")]
    pub allowed_ips: Vec<String>,

    #[serde(rename = "persistent_keepalive")]
    pub persistent_keepalive: Option<u16>,
}

impl PeerConfiguration {
    /// Orden determinista del listado de pares: IP virtual ascendente.
    /// Los clientes que difieren la lista observan altas y bajas limpias.
    pub fn sort_stable(peer_set: &mut [PeerConfiguration]) {
        peer_set.sort_by(|left, right| {
            let left_ip = left
                .peer_virtual_ip
                .parse::<std::net::Ipv4Addr>()
                .map(u32::from)
                .unwrap_or(u32::MAX);
            let right_ip = right
                .peer_virtual_ip
                .parse::<std::net::Ipv4Addr>()
                .map(u32::from)
                .unwrap_or(u32::MAX);
            left_ip.cmp(&right_ip)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_peer(virtual_ip: &str) -> PeerConfiguration {
        PeerConfiguration {
            id: format!("peer-{virtual_ip}"),
            device_id: "dev-1".into(),
            peer_device_id: "dev-2".into(),
            peer_public_key: "pk".into(),
            peer_virtual_ip: virtual_ip.into(),
            allowed_ips: vec![format!("{virtual_ip}/32")],
            persistent_keepalive: Some(DEFAULT_PERSISTENT_KEEPALIVE_SECONDS),
        }
    }

    #[test]
    fn ordering_is_numeric_not_lexicographic() {
        let mut peers = vec![
            build_peer("10.99.0.20"),
            build_peer("10.99.0.3"),
            build_peer("10.99.0.100"),
        ];
        PeerConfiguration::sort_stable(&mut peers);

        let ordered: Vec<&str> = peers.iter().map(|p| p.peer_virtual_ip.as_str()).collect();
        assert_eq!(ordered, vec!["10.99.0.3", "10.99.0.20", "10.99.0.100"]);
    }
}
