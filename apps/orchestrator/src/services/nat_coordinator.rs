// [apps/orchestrator/src/services/nat_coordinator.rs]
/*!
 * =================================================================
 * APARATO: NAT TRAVERSAL COORDINATOR (V4.2 - RENDEZVOUS SEALED)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: CLASIFICACIÓN, RENDEZVOUS EFÍMERO Y SESIÓN
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. PURE CORE, STATEFUL SHELL: La decisión directo/relay es la tabla
 *    pura del estrato L2; este coordinador aporta KV, Ledger y bus.
 * 2. 60s RENDEZVOUS: El registro del par vive en el KV con TTL de 60 s
 *    bajo la llave canónica; expirar sin contraparte es
 *    'peer-unreachable' y NO deja fila de sesión.
 * 3. FAIL-OPEN RELAY: Si el directo es imposible el veredicto es
 *    'turn-relay' incondicional; el error de relay (si existe) aflora
 *    en el cliente.
 * =================================================================
 */

use crate::services::event_bus::EventBus;
use chrono::Utc;
use edgelink_domain_models::{ConnectionType, NatType, Session};
use edgelink_domain_traversal::{
    classify_nat, match_decision, EndpointCandidate, RendezvousRecord, StunProbeReport,
    RENDEZVOUS_TTL_SECONDS,
};
use edgelink_infra_db::repositories::{DeviceRepository, SessionRepository};
use edgelink_infra_db::DbError;
use edgelink_infra_kv::{DistributedLock, KeyValueStore, KvError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum TraversalError {
    /// El rendezvous expiró sin candidato del contrario.
    #[error("[L4_NAT_FAULT]: PEER_UNREACHABLE")]
    PeerUnreachable,

    #[error(transparent)]
    Ledger(#[from] DbError),

    #[error(transparent)]
    Cache(#[from] KvError),
}

/// Resultado de un intercambio de rendezvous.
#[derive(Debug, Clone)]
pub struct RendezvousOutcome {
    pub connection_type: ConnectionType,
    /// Endpoint del contrario, si ya depositó su candidato.
    pub peer_endpoint: Option<String>,
    /// Sesión sellada en el Ledger al completarse el par.
    pub session_id: Option<String>,
}

pub struct NatCoordinator {
    kv_store: Arc<dyn KeyValueStore>,
    device_repository: Arc<DeviceRepository>,
    session_repository: Arc<SessionRepository>,
    event_bus: Arc<EventBus>,
}

impl NatCoordinator {
    #[must_use]
    pub fn new(
        kv_store: Arc<dyn KeyValueStore>,
        device_repository: Arc<DeviceRepository>,
        session_repository: Arc<SessionRepository>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            kv_store,
            device_repository,
            session_repository,
            event_bus,
        }
    }

    /**
     * Clasifica el NAT del dispositivo desde su reporte STUN y lo
     * persiste junto al endpoint público observado.
     */
    #[instrument(skip(self, report), fields(device = %device_id))]
    pub async fn classify_and_store(
        &self,
        device_id: &str,
        report: &StunProbeReport,
    ) -> Result<NatType, TraversalError> {
        let observed_nat = classify_nat(report);
        self.device_repository
            .update_nat_classification(
                device_id,
                observed_nat,
                report.mapped_address_primary.as_deref(),
            )
            .await?;

        info!("🧭 [NAT_CLASSIFIED]: Device {} observed as {}.", device_id, observed_nat);
        Ok(observed_nat)
    }

    /**
     * Intercambio de endpoints vía rendezvous efímero.
     *
     * # Logic:
     * 1. Con endpoint propio: deposita el candidato bajo el cerrojo del
     *    par y publica 'nat.endpoint'; el registro (re)nace con TTL 60 s.
     * 2. Sin endpoint (sondeo puro): si el registro ya no existe, el
     *    encuentro caducó -> 'PeerUnreachable', sin fila de sesión.
     * 3. Al completarse ambos candidatos se sella la sesión con el
     *    veredicto de la tabla pura.
     */
    #[instrument(skip(self), fields(device = %device_id, peer = %peer_device_id))]
    pub async fn rendezvous(
        &self,
        device_id: &str,
        peer_device_id: &str,
        own_public_endpoint: Option<String>,
    ) -> Result<RendezvousOutcome, TraversalError> {
        let device = self
            .device_repository
            .find_by_id(device_id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("device:{device_id}")))?;
        let peer = self
            .device_repository
            .find_by_id(peer_device_id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("device:{peer_device_id}")))?;

        let connection_type = match_decision(device.nat_type, peer.nat_type);
        let record_key = RendezvousRecord::kv_key(device_id, peer_device_id);
        let record_ttl = Duration::from_secs(RENDEZVOUS_TTL_SECONDS);

        // Sección crítica por par: lectura-modificación-escritura del registro.
        let lock_key = format!("{record_key}:lock");
        let pair_lock =
            DistributedLock::try_acquire(self.kv_store.clone(), &lock_key, Duration::from_secs(2))
                .await?;
        let Some(pair_lock) = pair_lock else {
            // Contención con el contrario: reintento inmediato del cliente.
            return Ok(RendezvousOutcome {
                connection_type,
                peer_endpoint: None,
                session_id: None,
            });
        };

        let outcome = self
            .exchange_under_lock(
                &record_key,
                record_ttl,
                device_id,
                peer_device_id,
                own_public_endpoint,
                connection_type,
            )
            .await;

        if let Err(release_fault) = pair_lock.release().await {
            warn!("⚠️ [NAT_LOCK_RELEASE]: {}", release_fault);
        }
        outcome
    }

    async fn exchange_under_lock(
        &self,
        record_key: &str,
        record_ttl: Duration,
        device_id: &str,
        peer_device_id: &str,
        own_public_endpoint: Option<String>,
        connection_type: ConnectionType,
    ) -> Result<RendezvousOutcome, TraversalError> {
        let existing_record = match self.kv_store.get(record_key).await? {
            Some(raw) => Some(
                serde_json::from_str::<RendezvousRecord>(&raw)
                    .map_err(|fault| KvError::Codec(fault.to_string()))?,
            ),
            None => None,
        };

        let mut record = match (existing_record, &own_public_endpoint) {
            (Some(record), _) => record,
            // Sondeo puro sobre un registro inexistente: el encuentro caducó.
            (None, None) => {
                debug!("⌛ [RENDEZVOUS_LAPSED]: Key {} expired without counterpart.", record_key);
                return Err(TraversalError::PeerUnreachable);
            }
            (None, Some(_)) => RendezvousRecord::default(),
        };

        let was_complete = record.is_complete();

        if let Some(endpoint) = own_public_endpoint {
            record.deposit(
                EndpointCandidate {
                    device_id: device_id.to_string(),
                    public_endpoint: endpoint.clone(),
                    published_at: Utc::now(),
                },
                peer_device_id,
            );

            let serialized = serde_json::to_string(&record)
                .map_err(|fault| KvError::Codec(fault.to_string()))?;
            self.kv_store.set(record_key, &serialized, Some(record_ttl)).await?;

            self.event_bus.publish_nat_endpoint(record_key, device_id, &endpoint);
        }

        let peer_endpoint = record
            .counterpart_of(device_id)
            .map(|candidate| candidate.public_endpoint.clone());

        // El par se completó en ESTE intercambio: sellamos la sesión una vez.
        let session_id = if record.is_complete() && !was_complete {
            let session = self
                .session_repository
                .record_established(device_id, peer_device_id, connection_type)
                .await?;
            info!(
                "🔗 [TRAVERSAL_SEALED]: Pair ({}, {}) agreed on {}.",
                device_id, peer_device_id, connection_type
            );
            Some(session.id)
        } else {
            self.find_existing_session(device_id, peer_device_id).await?
        };

        Ok(RendezvousOutcome {
            connection_type,
            peer_endpoint,
            session_id,
        })
    }

    async fn find_existing_session(
        &self,
        device_id: &str,
        peer_device_id: &str,
    ) -> Result<Option<String>, TraversalError> {
        if Session::canonical_pair(device_id, peer_device_id).is_none() {
            return Ok(None);
        }
        Ok(self
            .session_repository
            .find_active_for_pair(device_id, peer_device_id)
            .await?
            .map(|session| session.id))
    }
}
