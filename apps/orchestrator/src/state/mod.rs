// [apps/orchestrator/src/state/mod.rs]
/*!
 * =================================================================
 * APARATO: MESH STATE ORCHESTRATOR (V4.2 - CONSTRUCTOR COMPOSED)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L1-APP)
 * RESPONSABILIDAD: COMPOSICIÓN POR CONSTRUCTOR DE TODO EL GRAFO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. NO HIDDEN GLOBALS: El grafo completo (repositorios, KV, bus,
 *    dedup, Herald, topología, traversal) se compone aquí por
 *    constructor con el registro de configuración congelado.
 * 2. ARC DISCIPLINE: Inmutabilidad compartida vía 'Arc<T>'; los
 *    únicos estados mutables portan su propio cerrojo interno.
 * =================================================================
 */

/// Ventanas rodantes de telemetría de sesión.
pub mod telemetry_window;

use crate::config::OrchestratorConfig;
use crate::services::event_bus::EventBus;
use crate::services::notify_channels::{
    ChannelExecutor, DiscardEmailProvider, SmtpConfig, SmtpEmailProvider,
};
use crate::services::{AlertEngine, NatCoordinator, TopologyResolver};
use edgelink_domain_alerting::{DedupStore, HealthRulesEngine};
use edgelink_domain_models::DeviceHeartbeat;
use edgelink_domain_notification::{
    EmailProvider, EmailQueue, NotificationDispatcher, RuleSet,
};
use edgelink_infra_db::repositories::{
    AdminUserRepository, AlertRepository, AuditRepository, DeviceKeyRepository, DeviceRepository,
    NetworkRepository, OrganizationRepository, PeerRepository, PskRepository, SessionRepository,
};
use edgelink_infra_db::DbClient;
use edgelink_infra_kv::{KeyValueStore, MemoryKvStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Contenedor de estado compartido (thread-safe) del Orquestador.
#[derive(Clone)]
pub struct AppState {
    /// Registro congelado de configuración.
    pub config: Arc<OrchestratorConfig>,

    /// Cliente del Ledger relacional.
    pub database_client: DbClient,

    /// Almacén clave-valor tras el contrato de capacidad.
    pub kv_store: Arc<dyn KeyValueStore>,
    /// Referencia concreta al motor en RAM (barridos de higiene).
    pub memory_kv: Arc<MemoryKvStore>,

    /// Bus de eventos del plano de control.
    pub event_bus: Arc<EventBus>,

    // --- MATRIZ DE REPOSITORIOS (L3) ---
    pub organization_repository: Arc<OrganizationRepository>,
    pub network_repository: Arc<NetworkRepository>,
    pub device_repository: Arc<DeviceRepository>,
    pub device_key_repository: Arc<DeviceKeyRepository>,
    pub psk_repository: Arc<PskRepository>,
    pub peer_repository: Arc<PeerRepository>,
    pub session_repository: Arc<SessionRepository>,
    pub alert_repository: Arc<AlertRepository>,
    pub audit_repository: Arc<AuditRepository>,
    pub admin_user_repository: Arc<AdminUserRepository>,

    // --- MOTORES DE DOMINIO (L2/L4) ---
    pub health_rules: Arc<HealthRulesEngine>,
    pub alert_engine: Arc<AlertEngine>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub email_queue: Arc<EmailQueue>,
    pub topology: Arc<TopologyResolver>,
    pub nat_coordinator: Arc<NatCoordinator>,

    // --- MEMORIA DE CORTO PLAZO ---
    pub telemetry_window: Arc<telemetry_window::TelemetryWindowManager>,
    /// Buffer write-behind de latidos (drenado cada 5 s).
    pub heartbeat_buffer: Arc<Mutex<HashMap<String, DeviceHeartbeat>>>,
}

impl AppState {
    /**
     * Forja el grafo completo de dependencias del Orquestador.
     * Toda la composición es explícita: ningún componente alcanza el
     * entorno por su cuenta.
     */
    pub fn new(config: Arc<OrchestratorConfig>, database_client: DbClient) -> Self {
        debug!("🧬 [APP_STATE]: Executing mesh ignition sequence V4.2...");

        // --- ESTRATO EFÍMERO ---
        let memory_kv = Arc::new(MemoryKvStore::new());
        let kv_store: Arc<dyn KeyValueStore> = memory_kv.clone();
        let event_bus = Arc::new(EventBus::new());

        // --- MATRIZ DE REPOSITORIOS ---
        let organization_repository =
            Arc::new(OrganizationRepository::new(database_client.clone()));
        let network_repository = Arc::new(NetworkRepository::new(database_client.clone()));
        let device_repository = Arc::new(DeviceRepository::new(database_client.clone()));
        let device_key_repository = Arc::new(DeviceKeyRepository::new(database_client.clone()));
        let psk_repository = Arc::new(PskRepository::new(database_client.clone()));
        let peer_repository = Arc::new(PeerRepository::new(database_client.clone()));
        let session_repository = Arc::new(SessionRepository::new(database_client.clone()));
        let alert_repository = Arc::new(AlertRepository::new(database_client.clone()));
        let audit_repository = Arc::new(AuditRepository::new(database_client.clone()));
        let admin_user_repository = Arc::new(AdminUserRepository::new(database_client.clone()));

        // --- CANAL DE CORREO ---
        let email_provider: Arc<dyn EmailProvider> = if config.smtp_host.is_empty() {
            Arc::new(DiscardEmailProvider)
        } else {
            Arc::new(SmtpEmailProvider::new(SmtpConfig {
                host: config.smtp_host.clone(),
                port: config.smtp_port,
                username: config.smtp_username.clone(),
                password: config.smtp_password.clone(),
                sender: config.smtp_sender.clone(),
            }))
        };
        let (email_queue, _email_workers) =
            EmailQueue::ignite(config.email_queue.clone(), email_provider);

        // --- MOTOR HERALD ---
        let channel_executor = Arc::new(ChannelExecutor::new(
            config.action_timeout,
            email_queue.clone(),
            config.email_recipients.clone(),
        ));

        let initial_rule_set = match &config.rule_file_path {
            Some(path) => match std::fs::read_to_string(path)
                .map_err(|io_fault| io_fault.to_string())
                .and_then(|raw| {
                    RuleSet::from_json(&raw).map_err(|validation| validation.to_string())
                }) {
                Ok(rule_set) => {
                    info!("📜 [APP_STATE]: Rule file loaded ({} rules).", rule_set.len());
                    Arc::new(rule_set)
                }
                Err(load_fault) => {
                    // Fallback garantizado: el mapa severidad -> canal.
                    warn!("⚠️ [APP_STATE]: Rule file rejected ({}). Fallback map active.", load_fault);
                    Arc::new(RuleSet::empty())
                }
            },
            None => Arc::new(RuleSet::empty()),
        };

        let dispatcher = Arc::new(NotificationDispatcher::new(
            channel_executor,
            initial_rule_set,
            config.notification_engine_enabled,
        ));

        // --- EMBUDO DE ALERTAS ---
        let dedup_store = Arc::new(DedupStore::new(kv_store.clone(), config.dedup.clone()));
        let alert_engine = Arc::new(AlertEngine::new(
            dedup_store,
            alert_repository.clone(),
            device_repository.clone(),
            dispatcher.clone(),
            event_bus.clone(),
        ));

        // --- TOPOLOGÍA Y TRAVERSAL ---
        let topology = Arc::new(TopologyResolver::new(
            device_repository.clone(),
            network_repository.clone(),
            peer_repository.clone(),
            event_bus.clone(),
        ));
        let nat_coordinator = Arc::new(NatCoordinator::new(
            kv_store.clone(),
            device_repository.clone(),
            session_repository.clone(),
            event_bus.clone(),
        ));

        Self {
            health_rules: Arc::new(HealthRulesEngine::new(config.health_rules.clone())),
            config,
            database_client,
            kv_store,
            memory_kv,
            event_bus,
            organization_repository,
            network_repository,
            device_repository,
            device_key_repository,
            psk_repository,
            peer_repository,
            session_repository,
            alert_repository,
            audit_repository,
            admin_user_repository,
            alert_engine,
            dispatcher,
            email_queue,
            topology,
            nat_coordinator,
            telemetry_window: Arc::new(telemetry_window::TelemetryWindowManager::new()),
            heartbeat_buffer: Arc::new(Mutex::new(HashMap::with_capacity(512))),
        }
    }
}
