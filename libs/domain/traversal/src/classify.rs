// [libs/domain/traversal/src/classify.rs]
/*!
 * =================================================================
 * APARATO: STUN CLASSIFICATION ENGINE (V4.1 - DETERMINISTIC)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: MAPEO DE SONDAS STUN A TIPO NAT OBSERVADO
 *
 * # Logic:
 * El dispositivo ejecuta las sondas contra dos destinos STUN y reporta
 * los mapeos observados; el plano de control NO habla STUN, solo
 * interpreta el reporte:
 *   1. Mapeo primario ausente            -> unknown.
 *   2. Mapeo primario igual al local     -> none (sin NAT).
 *   3. Mapeos primario/secundario divergen -> symmetric.
 *   4. Mapeo estable: el filtrado decide el cono
 *      (IP ajena ok -> full-cone; puerto ajeno ok -> restricted-cone;
 *       ninguno -> port-restricted-cone).
 * =================================================================
 */

use edgelink_domain_models::NatType;
use serde::{Deserialize, Serialize};

/// Resultado crudo de las sondas STUN ejecutadas por el dispositivo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StunProbeReport {
    /// Dirección local (ip:puerto) desde la que se emitieron las sondas.
    #[serde(rename = "local_address")]
    pub local_address: String,

    /// Mapeo público observado por el destino STUN primario.
    #[serde(rename = "mapped_address_primary")]
    pub mapped_address_primary: Option<String>,

    /// Mapeo público observado por el destino STUN secundario
    /// (IP/puerto distintos al primario).
    #[serde(rename = "mapped_address_secondary")]
    pub mapped_address_secondary: Option<String>,

    /// El dispositivo recibió respuesta emitida desde una IP ajena al
    /// destino original (test de filtrado de dirección).
    #[serde(rename = "response_from_foreign_address", default)]
    pub response_from_foreign_address: bool,

    /// El dispositivo recibió respuesta desde el mismo destino pero un
    /// puerto ajeno (test de filtrado de puerto).
    #[serde(rename = "response_from_foreign_port", default)]
    pub response_from_foreign_port: bool,
}

/// Clasificación determinista del NAT observado. Pura: mismo reporte,
/// mismo veredicto.
pub fn classify_nat(report: &StunProbeReport) -> NatType {
    let mapped_primary = match &report.mapped_address_primary {
        Some(address) => address,
        None => return NatType::Unknown,
    };

    if *mapped_primary == report.local_address {
        return NatType::None;
    }

    if let Some(mapped_secondary) = &report.mapped_address_secondary {
        // Mapeo dependiente del destino: NAT simétrico.
        if mapped_secondary != mapped_primary {
            return NatType::Symmetric;
        }
    }

    if report.response_from_foreign_address {
        NatType::FullCone
    } else if report.response_from_foreign_port {
        NatType::RestrictedCone
    } else {
        NatType::PortRestrictedCone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_report() -> StunProbeReport {
        StunProbeReport {
            local_address: "192.168.1.20:51820".into(),
            mapped_address_primary: Some("203.0.113.9:40001".into()),
            mapped_address_secondary: Some("203.0.113.9:40001".into()),
            response_from_foreign_address: false,
            response_from_foreign_port: false,
        }
    }

    #[test]
    fn missing_primary_mapping_is_unknown() {
        let mut report = base_report();
        report.mapped_address_primary = None;
        assert_eq!(classify_nat(&report), NatType::Unknown);
    }

    #[test]
    fn identity_mapping_means_no_nat() {
        let mut report = base_report();
        report.mapped_address_primary = Some(report.local_address.clone());
        assert_eq!(classify_nat(&report), NatType::None);
    }

    #[test]
    fn divergent_mappings_mean_symmetric() {
        let mut report = base_report();
        report.mapped_address_secondary = Some("203.0.113.9:40777".into());
        assert_eq!(classify_nat(&report), NatType::Symmetric);
    }

    #[test]
    fn filtering_tests_grade_the_cone() {
        let mut report = base_report();
        report.response_from_foreign_address = true;
        assert_eq!(classify_nat(&report), NatType::FullCone);

        report.response_from_foreign_address = false;
        report.response_from_foreign_port = true;
        assert_eq!(classify_nat(&report), NatType::RestrictedCone);

        report.response_from_foreign_port = false;
        assert_eq!(classify_nat(&report), NatType::PortRestrictedCone);
    }

    #[test]
    fn missing_secondary_probe_still_grades_by_filtering() {
        let mut report = base_report();
        report.mapped_address_secondary = None;
        assert_eq!(classify_nat(&report), NatType::PortRestrictedCone);
    }
}
