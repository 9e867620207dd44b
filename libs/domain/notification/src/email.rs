// [libs/domain/notification/src/email.rs]
/*!
 * =================================================================
 * APARATO: EMAIL DISPATCH QUEUE (V4.2 - BACKPRESSURE SEALED)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: COLA ACOTADA, POOL DE WORKERS Y TOKEN BUCKET
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. BOUNDED PRODUCTION: 'enqueue' jamás bloquea; con la cola llena
 *    retorna 'QueueFull' y el productor decide (backpressure honesto).
 * 2. TOKEN BUCKET PACING: Los workers drenan bajo un cubo de tokens
 *    (default 100 envíos/min) que amortigua ráfagas sin starvation.
 * 3. RETRY WITH RE-ENQUEUE: Un fallo transitorio re-encola el mensaje
 *    hasta 'max_retries'; uno permanente lo descarta con contabilidad.
 * 4. PROVIDER CAPABILITY: El transporte es un trait {send, name}; SMTP
 *    es la implementación de referencia en el estrato L4.
 * =================================================================
 */

use crate::actions::ActionError;
use crate::errors::NotifyError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Mensaje de correo en tránsito por la cola.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,

    /// Intentos ya consumidos (0 en la producción inicial).
    #[serde(default)]
    pub attempts: u32,
}

impl EmailMessage {
    pub fn new(to: Vec<String>, subject: String, body: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            to,
            subject,
            body,
            attempts: 0,
        }
    }
}

/// Capacidad polimórfica de transporte de correo.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Entrega el mensaje; el adaptador clasifica el fallo.
    async fn send(&self, message: &EmailMessage) -> Result<(), ActionError>;

    /// Nombre nominal del proveedor para el rastro de observabilidad.
    fn name(&self) -> &str;
}

/// Configuración de la cola de correo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailQueueConfig {
    /// Capacidad de la cola acotada. Default 1000.
    pub capacity: usize,

    /// Workers consumidores. Default 3.
    #[serde(rename = "worker_count")]
    pub worker_count: usize,

    /// Techo de envíos por minuto (token bucket). Default 100.
    #[serde(rename = "sends_per_minute")]
    pub sends_per_minute: u32,

    /// Reintentos máximos por mensaje ante fallo transitorio. Default 3.
    #[serde(rename = "max_retries")]
    pub max_retries: u32,

    /// Espera entre reintentos (segundos). Default 5.
    #[serde(rename = "retry_delay_seconds")]
    pub retry_delay_seconds: u64,
}

impl Default for EmailQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            worker_count: 3,
            sends_per_minute: 100,
            max_retries: 3,
            retry_delay_seconds: 5,
        }
    }
}

/// Instantánea de contabilidad expuesta a diagnóstico.
#[derive(Debug, Clone, Serialize)]
pub struct EmailQueueStats {
    pub enqueued_total: u64,
    pub sent_total: u64,
    pub failed_total: u64,
    pub retried_total: u64,
    pub queue_depth: usize,
}

#[derive(Default)]
struct StatsLedger {
    enqueued_total: AtomicU64,
    sent_total: AtomicU64,
    failed_total: AtomicU64,
    retried_total: AtomicU64,
}

/// Cubo de tokens de reposición continua.
struct TokenBucket {
    state: Mutex<TokenBucketState>,
    capacity: f64,
    refill_per_second: f64,
}

struct TokenBucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(sends_per_minute: u32) -> Self {
        let capacity = sends_per_minute.max(1) as f64;
        Self {
            state: Mutex::new(TokenBucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_per_second: capacity / 60.0,
        }
    }

    fn try_take(&self) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => return true,
        };

        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.capacity);
        state.last_refill = Instant::now();

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Cola de correo acotada con pool de workers.
pub struct EmailQueue {
    producer: mpsc::Sender<EmailMessage>,
    stats: Arc<StatsLedger>,
    config: EmailQueueConfig,
    bucket: Arc<TokenBucket>,
}

impl EmailQueue {
    /**
     * Forja la cola y enciende el pool de workers contra el proveedor.
     * Retorna la cola y los handles de los workers (para el drenado en
     * el apagado ordenado).
     */
    pub fn ignite(
        config: EmailQueueConfig,
        provider: Arc<dyn EmailProvider>,
    ) -> (Arc<EmailQueue>, Vec<JoinHandle<()>>) {
        let (producer, consumer) = mpsc::channel::<EmailMessage>(config.capacity.max(1));
        let shared_consumer = Arc::new(tokio::sync::Mutex::new(consumer));

        let queue = Arc::new(EmailQueue {
            producer,
            stats: Arc::new(StatsLedger::default()),
            config: config.clone(),
            bucket: Arc::new(TokenBucket::new(config.sends_per_minute)),
        });

        let mut worker_handles = Vec::with_capacity(config.worker_count.max(1));
        for worker_index in 0..config.worker_count.max(1) {
            let worker_queue = queue.clone();
            let worker_provider = provider.clone();
            let worker_consumer = shared_consumer.clone();

            worker_handles.push(tokio::spawn(async move {
                info!(
                    "📧 [EMAIL_WORKER_{}]: Online against provider [{}].",
                    worker_index,
                    worker_provider.name()
                );
                loop {
                    let next_message = {
                        let mut consumer_guard = worker_consumer.lock().await;
                        consumer_guard.recv().await
                    };

                    let message = match next_message {
                        Some(message) => message,
                        None => break, // Cola cerrada: apagado ordenado.
                    };

                    worker_queue.drive_delivery(worker_provider.as_ref(), message).await;
                }
                debug!("📧 [EMAIL_WORKER_{}]: Drained and terminated.", worker_index);
            }));
        }

        (queue, worker_handles)
    }

    /**
     * Producción sin bloqueo.
     *
     * # Errors:
     * - `QueueFull` con la cola a capacidad: el llamador decide.
     * - `QueueClosed` durante el apagado.
     */
    #[instrument(skip(self, message), fields(message = %message.id))]
    pub fn enqueue(&self, message: EmailMessage) -> Result<(), NotifyError> {
        match self.producer.try_send(message) {
            Ok(()) => {
                self.stats.enqueued_total.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("🚫 [EMAIL_QUEUE]: Capacity saturated; message rejected.");
                Err(NotifyError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(NotifyError::QueueClosed),
        }
    }

    async fn drive_delivery(&self, provider: &dyn EmailProvider, mut message: EmailMessage) {
        // Pacing por token bucket: cedemos el turno hasta obtener cupo.
        while !self.bucket.try_take() {
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        message.attempts += 1;
        match provider.send(&message).await {
            Ok(()) => {
                self.stats.sent_total.fetch_add(1, Ordering::Relaxed);
                debug!("✅ [EMAIL_SENT]: Message {} via {}.", message.id, provider.name());
            }
            Err(fault) if fault.is_permanent() => {
                self.stats.failed_total.fetch_add(1, Ordering::Relaxed);
                error!("❌ [EMAIL_REJECTED]: Message {} permanent fault: {}", message.id, fault);
            }
            Err(transient_fault) => {
                if message.attempts > self.config.max_retries {
                    self.stats.failed_total.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "❌ [EMAIL_EXHAUSTED]: Message {} dropped after {} attempts: {}",
                        message.id, message.attempts, transient_fault
                    );
                    return;
                }

                self.stats.retried_total.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "🔁 [EMAIL_RETRY]: Message {} attempt {} failed transiently: {}",
                    message.id, message.attempts, transient_fault
                );

                tokio::time::sleep(Duration::from_secs(self.config.retry_delay_seconds)).await;
                if self.producer.try_send(message).is_err() {
                    // Cola llena o cerrada durante el reintento.
                    self.stats.failed_total.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    pub fn stats(&self) -> EmailQueueStats {
        EmailQueueStats {
            enqueued_total: self.stats.enqueued_total.load(Ordering::Relaxed),
            sent_total: self.stats.sent_total.load(Ordering::Relaxed),
            failed_total: self.stats.failed_total.load(Ordering::Relaxed),
            retried_total: self.stats.retried_total.load(Ordering::Relaxed),
            queue_depth: self.producer.max_capacity() - self.producer.capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Proveedor de prueba con guion de respuestas.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<(), ActionError>>>,
        delivered: AtomicU64,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<(), ActionError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                delivered: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl EmailProvider for ScriptedProvider {
        async fn send(&self, _message: &EmailMessage) -> Result<(), ActionError> {
            let scripted = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
            if scripted.is_ok() {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            scripted
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn fast_config() -> EmailQueueConfig {
        EmailQueueConfig {
            capacity: 4,
            worker_count: 2,
            sends_per_minute: 6000,
            max_retries: 2,
            retry_delay_seconds: 0,
        }
    }

    fn sample_message() -> EmailMessage {
        EmailMessage::new(
            vec!["ops@example.com".into()],
            "alert".into(),
            "body".into(),
        )
    }

    #[tokio::test]
    async fn happy_path_delivers_and_accounts() {
        let provider = ScriptedProvider::new(vec![Ok(()), Ok(())]);
        let (queue, _workers) = EmailQueue::ignite(fast_config(), provider.clone());

        queue.enqueue(sample_message()).unwrap();
        queue.enqueue(sample_message()).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let stats = queue.stats();
        assert_eq!(stats.sent_total, 2);
        assert_eq!(stats.failed_total, 0);
        assert_eq!(provider.delivered.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn transient_fault_retries_then_succeeds() {
        let provider = ScriptedProvider::new(vec![
            Err(ActionError::Transient("smtp 451".into())),
            Ok(()),
        ]);
        let (queue, _workers) = EmailQueue::ignite(fast_config(), provider);

        queue.enqueue(sample_message()).unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        let stats = queue.stats();
        assert_eq!(stats.sent_total, 1);
        assert_eq!(stats.retried_total, 1);
        assert_eq!(stats.failed_total, 0);
    }

    #[tokio::test]
    async fn permanent_fault_drops_without_retry() {
        let provider = ScriptedProvider::new(vec![Err(ActionError::Permanent("550".into()))]);
        let (queue, _workers) = EmailQueue::ignite(fast_config(), provider);

        queue.enqueue(sample_message()).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let stats = queue.stats();
        assert_eq!(stats.failed_total, 1);
        assert_eq!(stats.retried_total, 0);
    }

    #[tokio::test]
    async fn saturated_queue_rejects_producer() {
        // Proveedor que jamás resuelve: los mensajes quedan en cola.
        struct StalledProvider;

        #[async_trait]
        impl EmailProvider for StalledProvider {
            async fn send(&self, _message: &EmailMessage) -> Result<(), ActionError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
            fn name(&self) -> &str {
                "stalled"
            }
        }

        let config = EmailQueueConfig {
            capacity: 2,
            worker_count: 1,
            ..fast_config()
        };
        let (queue, _workers) = EmailQueue::ignite(config, Arc::new(StalledProvider));

        // Dejamos que el worker retire un mensaje y quede atascado.
        queue.enqueue(sample_message()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        queue.enqueue(sample_message()).unwrap();
        queue.enqueue(sample_message()).unwrap();
        let overflow = queue.enqueue(sample_message());
        assert!(matches!(overflow, Err(NotifyError::QueueFull)));
    }
}
