// [libs/domain/models/src/network.rs]
/*!
 * =================================================================
 * APARATO: VIRTUAL NETWORK ENTITY (V4.0 - CIDR SEALED)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: TOPOLOGÍA LÓGICA Y MATEMÁTICA DE DIRECCIONAMIENTO
 *
 * # Mathematical Proof (Address Space Integrity):
 * El invariante `gateway_ip ∈ cidr` se verifica con aritmética de
 * prefijos de 'ipnetwork', garantizando que ninguna pasarela quede
 * fuera del espacio direccionable de su propia red.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NetworkModelError {
    /// El CIDR declarado no es interpretable como prefijo IPv4.
    #[error("[L2_NET_FAULT]: CIDR_MALFORMED -> {0}")]
    CidrMalformed(String),

    /// La IP de pasarela queda fuera del espacio CIDR de la red.
    #[error("[L2_NET_FAULT]: GATEWAY_OUTSIDE_CIDR -> {0}")]
    GatewayOutsideCidr(String),
}

/// Red virtual bajo una organización. El CIDR es único dentro de la
/// organización; la pasarela pertenece siempre al CIDR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualNetwork {
    pub id: String,

    #[serde(rename = "organization_id")]
    pub org_id: String,

    pub name: String,

    /// Espacio de direccionamiento en notación CIDR (ej: 10.99.0.0/24).
    pub cidr: String,

    #[serde(rename = "gateway_ip")]
    pub gateway_ip: String,

    /// Resolutores DNS anunciados a los dispositivos del mesh.
    #[serde(rename = "dns_servers")]
    pub dns_servers: Vec<String>,

    /// Si está activo, los pares anuncian el CIDR completo como
    /// allowed-ips en lugar de su /32 individual (topología flat-mesh).
    #[serde(rename = "flat_mesh", default)]
    pub flat_mesh: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VirtualNetwork {
    /**
     * Interpreta el CIDR persistido como prefijo IPv4 operable.
     *
     * # Errors:
     * `CidrMalformed` si la forma textual no es un prefijo válido.
     */
    pub fn parsed_cidr(&self) -> Result<Ipv4Network, NetworkModelError> {
        self.cidr
            .parse::<Ipv4Network>()
            .map_err(|fault| NetworkModelError::CidrMalformed(fault.to_string()))
    }

    /// Verifica el invariante estructural `gateway_ip ∈ cidr`.
    pub fn validate_gateway(&self) -> Result<(), NetworkModelError> {
        let prefix = self.parsed_cidr()?;
        let gateway: Ipv4Addr = self
            .gateway_ip
            .parse()
            .map_err(|_| NetworkModelError::GatewayOutsideCidr(self.gateway_ip.clone()))?;

        if prefix.contains(gateway) {
            Ok(())
        } else {
            Err(NetworkModelError::GatewayOutsideCidr(self.gateway_ip.clone()))
        }
    }

    /// Determina si una IP virtual candidata pertenece al espacio de la red.
    pub fn contains_ip(&self, candidate: Ipv4Addr) -> bool {
        self.parsed_cidr()
            .map(|prefix| prefix.contains(candidate))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_network(cidr: &str, gateway: &str) -> VirtualNetwork {
        VirtualNetwork {
            id: "net-1".into(),
            org_id: "org-1".into(),
            name: "backbone".into(),
            cidr: cidr.into(),
            gateway_ip: gateway.into(),
            dns_servers: vec!["1.1.1.1".into()],
            flat_mesh: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn gateway_inside_cidr_is_accepted() {
        let network = build_network("10.99.0.0/24", "10.99.0.1");
        assert!(network.validate_gateway().is_ok());
    }

    #[test]
    fn gateway_outside_cidr_is_rejected() {
        let network = build_network("10.99.0.0/24", "10.100.0.1");
        assert_eq!(
            network.validate_gateway(),
            Err(NetworkModelError::GatewayOutsideCidr("10.100.0.1".into()))
        );
    }

    #[test]
    fn malformed_cidr_is_rejected() {
        let network = build_network("10.99.0.0/240", "10.99.0.1");
        assert!(matches!(
            network.validate_gateway(),
            Err(NetworkModelError::CidrMalformed(_))
        ));
    }

    #[test]
    fn membership_check_covers_hosts_only_by_prefix() {
        let network = build_network("10.99.0.0/24", "10.99.0.1");
        assert!(network.contains_ip("10.99.0.200".parse().unwrap()));
        assert!(!network.contains_ip("10.98.0.200".parse().unwrap()));
    }
}
