// [libs/domain/traversal/src/rendezvous.rs]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Vida del registro de rendezvous en el KV (segundos). Pasado este
/// plazo sin contraparte, el intercambio colapsa en 'peer-unreachable'.
pub const RENDEZVOUS_TTL_SECONDS: u64 = 60;

/// Candidato de endpoint publicado por un extremo del par.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCandidate {
    #[serde(rename = "device_id")]
    pub device_id: String,

    /// Endpoint público observado (ip:puerto) tras las sondas STUN.
    #[serde(rename = "public_endpoint")]
    pub public_endpoint: String,

    #[serde(rename = "published_at")]
    pub published_at: DateTime<Utc>,
}

/// Registro efímero del encuentro, materializado en el KV bajo la llave
/// canónica del par. Cada extremo deposita su candidato y sondea (o se
/// suscribe al bus) hasta observar el del contrario.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RendezvousRecord {
    #[serde(rename = "candidate_a")]
    pub candidate_a: Option<EndpointCandidate>,

    #[serde(rename = "candidate_b")]
    pub candidate_b: Option<EndpointCandidate>,
}

impl RendezvousRecord {
    /// Llave KV canónica del par: el orden de llegada es irrelevante.
    pub fn kv_key(first_device_id: &str, second_device_id: &str) -> String {
        if first_device_id <= second_device_id {
            format!("nat:rendezvous:{first_device_id}:{second_device_id}")
        } else {
            format!("nat:rendezvous:{second_device_id}:{first_device_id}")
        }
    }

    /// Deposita el candidato en la ranura del dispositivo emisor.
    /// La ranura A corresponde al menor identificador del par canónico.
    pub fn deposit(&mut self, candidate: EndpointCandidate, counterpart_device_id: &str) {
        if candidate.device_id.as_str() <= counterpart_device_id {
            self.candidate_a = Some(candidate);
        } else {
            self.candidate_b = Some(candidate);
        }
    }

    /// Candidato del contrario, si ya fue depositado.
    pub fn counterpart_of(&self, device_id: &str) -> Option<&EndpointCandidate> {
        match (&self.candidate_a, &self.candidate_b) {
            (Some(candidate), _) if candidate.device_id != device_id => Some(candidate),
            (_, Some(candidate)) if candidate.device_id != device_id => Some(candidate),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.candidate_a.is_some() && self.candidate_b.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(device_id: &str, endpoint: &str) -> EndpointCandidate {
        EndpointCandidate {
            device_id: device_id.into(),
            public_endpoint: endpoint.into(),
            published_at: Utc::now(),
        }
    }

    #[test]
    fn kv_key_is_canonical() {
        assert_eq!(
            RendezvousRecord::kv_key("dev-b", "dev-a"),
            RendezvousRecord::kv_key("dev-a", "dev-b")
        );
    }

    #[test]
    fn deposit_and_counterpart_exchange() {
        let mut record = RendezvousRecord::default();
        record.deposit(candidate("dev-a", "203.0.113.9:40001"), "dev-b");

        assert!(record.counterpart_of("dev-a").is_none());
        assert_eq!(
            record.counterpart_of("dev-b").map(|c| c.public_endpoint.as_str()),
            Some("203.0.113.9:40001")
        );

        record.deposit(candidate("dev-b", "198.51.100.3:51000"), "dev-a");
        assert!(record.is_complete());
        assert_eq!(
            record.counterpart_of("dev-a").map(|c| c.public_endpoint.as_str()),
            Some("198.51.100.3:51000")
        );
    }
}
