// [libs/domain/models/src/psk.rs]
/*!
 * =================================================================
 * APARATO: PRE-SHARED KEY ENTITY (V4.0 - ZERO PLAINTEXT)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: CREDENCIAL DE REGISTRO Y CONTABILIDAD DE USOS
 *
 * # Mathematical Proof (Monotonic Consumption):
 * El contador 'used_count' solo crece mediante el incremento atómico
 * condicionado del estrato L3. Tras N registros contra maxUses=M el
 * contador vale min(N, M); el registro M+1 colapsa en 'psk-exhausted'.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credencial de portador que autoriza el registro de dispositivos bajo
/// una organización. El material en claro jamás se persiste: únicamente
/// viaja en la cabecera de registro y se compara por hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreSharedKey {
    pub id: String,

    #[serde(rename = "organization_id")]
    pub org_id: String,

    /// SHA-256 hex del material de la llave. Único a nivel global.
    #[serde(rename = "key_hash")]
    pub key_hash: String,

    pub name: Option<String>,

    /// Techo de usos; `None` equivale a usos ilimitados.
    #[serde(rename = "max_uses")]
    pub max_uses: Option<u32>,

    #[serde(rename = "used_count")]
    pub used_count: u32,

    #[serde(rename = "expires_at")]
    pub expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl PreSharedKey {
    /// Una PSK es utilizable si no ha caducado y conserva usos restantes.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && !self.is_exhausted()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map(|deadline| now >= deadline)
            .unwrap_or(false)
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_uses
            .map(|ceiling| self.used_count >= ceiling)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn build_psk(max_uses: Option<u32>, used_count: u32) -> PreSharedKey {
        PreSharedKey {
            id: "psk-1".into(),
            org_id: "org-1".into(),
            key_hash: "ab".repeat(32),
            name: Some("field-provisioning".into()),
            max_uses,
            used_count,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn unlimited_psk_never_exhausts() {
        let psk = build_psk(None, 10_000);
        assert!(psk.is_usable(Utc::now()));
    }

    #[test]
    fn exhaustion_boundary_is_inclusive() {
        let psk = build_psk(Some(2), 2);
        assert!(psk.is_exhausted());
        assert!(!psk.is_usable(Utc::now()));

        let psk_with_margin = build_psk(Some(2), 1);
        assert!(psk_with_margin.is_usable(Utc::now()));
    }

    #[test]
    fn expired_psk_is_unusable_even_with_uses_left() {
        let mut psk = build_psk(Some(10), 0);
        psk.expires_at = Some(Utc::now() - Duration::minutes(1));
        assert!(!psk.is_usable(Utc::now()));
    }
}
