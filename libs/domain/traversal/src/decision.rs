// [libs/domain/traversal/src/decision.rs]
/*!
 * =================================================================
 * APARATO: PATH DECISION POLICY (V4.0 - PURE TABLE)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: VEREDICTO DIRECTO VS RELAY SOBRE (NAT_A, NAT_B)
 *
 * # Mathematical Proof (Decision Totality):
 * La función es total y simétrica: para cualquier par de tipos NAT
 * produce exactamente un veredicto, y match_decision(a, b) ==
 * match_decision(b, a). El fallback a relay jamás falla cerrado: si el
 * camino directo es imposible, el veredicto es 'turn-relay' y el error
 * de relay (si lo hay) aflora en el cliente.
 * =================================================================
 */

use edgelink_domain_models::{ConnectionType, NatType};

/**
 * Decide el tipo de conexión para un par de dispositivos.
 *
 * Política por defecto: intentar P2P directo salvo que un extremo sea
 * simétrico Y el contrario no sea full-cone, en cuyo caso se ordena
 * 'turn-relay'. Los tipos híbridos no listados heredan el veredicto de
 * esta tabla; una política alternativa es un reemplazo de esta función.
 */
pub fn match_decision(nat_a: NatType, nat_b: NatType) -> ConnectionType {
    let relay_required = (nat_a == NatType::Symmetric && nat_b != NatType::FullCone)
        || (nat_b == NatType::Symmetric && nat_a != NatType::FullCone);

    if relay_required {
        ConnectionType::TurnRelay
    } else {
        ConnectionType::P2pDirect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_against_port_restricted_mandates_relay() {
        assert_eq!(
            match_decision(NatType::Symmetric, NatType::PortRestrictedCone),
            ConnectionType::TurnRelay
        );
    }

    #[test]
    fn full_cone_against_symmetric_mandates_relay() {
        assert_eq!(
            match_decision(NatType::FullCone, NatType::Symmetric),
            ConnectionType::TurnRelay
        );
    }

    #[test]
    fn full_cone_against_restricted_goes_direct() {
        assert_eq!(
            match_decision(NatType::FullCone, NatType::RestrictedCone),
            ConnectionType::P2pDirect
        );
    }

    #[test]
    fn decision_is_symmetric_in_arguments() {
        for nat_a in [
            NatType::None,
            NatType::FullCone,
            NatType::RestrictedCone,
            NatType::PortRestrictedCone,
            NatType::Symmetric,
            NatType::Unknown,
        ] {
            for nat_b in [
                NatType::None,
                NatType::FullCone,
                NatType::RestrictedCone,
                NatType::PortRestrictedCone,
                NatType::Symmetric,
                NatType::Unknown,
            ] {
                assert_eq!(match_decision(nat_a, nat_b), match_decision(nat_b, nat_a));
            }
        }
    }

    #[test]
    fn double_symmetric_mandates_relay() {
        assert_eq!(
            match_decision(NatType::Symmetric, NatType::Symmetric),
            ConnectionType::TurnRelay
        );
    }

    #[test]
    fn open_internet_pair_goes_direct() {
        assert_eq!(
            match_decision(NatType::None, NatType::None),
            ConnectionType::P2pDirect
        );
    }
}
