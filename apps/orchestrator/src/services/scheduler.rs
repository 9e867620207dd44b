// [apps/orchestrator/src/services/scheduler.rs]
/*!
 * =================================================================
 * APARATO: MESH JOB SCHEDULER (V4.2 - LOCKED & DEADLINED)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: EJECUCIÓN CRON CON CERROJO DISTRIBUIDO Y DEADLINE
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ONE RUNNER PER CLUSTER: Cada job toma el cerrojo 'job:lock:{name}'
 *    (NX + TTL) antes de ejecutar; la contención cede el turno a la
 *    instancia ganadora sin reintento.
 * 2. HALF-PERIOD DEADLINE: El presupuesto de un job es la mitad de su
 *    periodo; excederlo registra y cancela, jamás bloquea el siguiente
 *    tick.
 * 3. BOUNDED POOL: Un semáforo acota los jobs concurrentes; los ticks
 *    excedentes esperan su permiso sin apilar ejecuciones.
 * 4. NEVER PROPAGATE: Un job fallido registra y espera su próximo
 *    tick; ningún error asciende al kernel.
 * =================================================================
 */

use crate::services::cron::CronSchedule;
use chrono::Utc;
use edgelink_infra_kv::{DistributedLock, KeyValueStore};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

/// Cuerpo ejecutable de un job: future sin retorno; el job reporta por
/// métricas y trazas, nunca por error propagado.
pub type JobBody = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Job registrado en el planificador.
pub struct ScheduledJob {
    pub name: &'static str,
    pub schedule: CronSchedule,
    pub body: JobBody,
}

impl ScheduledJob {
    pub fn new(name: &'static str, expression: &str, body: JobBody) -> Result<Self, String> {
        Ok(Self {
            name,
            schedule: CronSchedule::parse(expression)?,
            body,
        })
    }
}

pub struct SchedulerService {
    kv_store: Arc<dyn KeyValueStore>,
    execution_permits: Arc<Semaphore>,
}

impl SchedulerService {
    #[must_use]
    pub fn new(kv_store: Arc<dyn KeyValueStore>, pool_size: usize) -> Self {
        Self {
            kv_store,
            execution_permits: Arc::new(Semaphore::new(pool_size.max(1))),
        }
    }

    /**
     * Enciende un daemon por job registrado. Cada daemon duerme hasta
     * el próximo disparo cron, toma su permiso del pool y ejecuta bajo
     * cerrojo distribuido con deadline de medio periodo.
     */
    #[instrument(skip(self, jobs), fields(count = jobs.len()))]
    pub fn ignite(&self, jobs: Vec<ScheduledJob>) {
        info!("⏰ [SCHEDULER]: Igniting {} job daemons.", jobs.len());

        for job in jobs {
            let kv_store = self.kv_store.clone();
            let execution_permits = self.execution_permits.clone();

            tokio::spawn(async move {
                debug!(
                    "⏰ [JOB_DAEMON]: '{}' armed with expression '{}'.",
                    job.name,
                    job.schedule.expression()
                );

                loop {
                    let now = Utc::now();
                    let next_fire = match job.schedule.next_after(now) {
                        Some(instant) => instant,
                        None => {
                            error!("⏰ [JOB_DEAD]: '{}' has no future fire; daemon retired.", job.name);
                            break;
                        }
                    };

                    let sleep_for = (next_fire - now)
                        .to_std()
                        .unwrap_or_else(|_| Duration::from_secs(1));
                    tokio::time::sleep(sleep_for).await;

                    // Deadline = ½ periodo nominal (mínimo 1 s).
                    let deadline = job
                        .schedule
                        .estimated_period(next_fire)
                        .and_then(|period| (period / 2).to_std().ok())
                        .unwrap_or(Duration::from_secs(30))
                        .max(Duration::from_secs(1));

                    let permit = match execution_permits.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break, // Pool cerrado: apagado del proceso.
                    };

                    run_job_guarded(&kv_store, &job, deadline).await;
                    drop(permit);
                }
            });
        }
    }
}

/// Ejecuta un disparo del job bajo cerrojo distribuido y deadline.
async fn run_job_guarded(
    kv_store: &Arc<dyn KeyValueStore>,
    job: &ScheduledJob,
    deadline: Duration,
) {
    let lock_key = format!("job:lock:{}", job.name);

    // TTL del cerrojo = deadline + margen: si el proceso muere a mitad
    // de ejecución, el cluster recupera el job en el siguiente tick.
    let lock = match DistributedLock::try_acquire(
        kv_store.clone(),
        &lock_key,
        deadline + Duration::from_secs(5),
    )
    .await
    {
        Ok(Some(lock)) => lock,
        Ok(None) => {
            debug!("⏳ [JOB_YIELD]: '{}' held by another instance.", job.name);
            return;
        }
        Err(kv_fault) => {
            // Fallo del KV: ejecutamos igualmente; preferimos un doble
            // disparo ocasional a un cluster sin mantenimiento.
            warn!("⚠️ [JOB_LOCK_FAULT]: '{}' -> {}. Running unguarded.", job.name, kv_fault);
            execute_with_deadline(job, deadline).await;
            return;
        }
    };

    execute_with_deadline(job, deadline).await;

    if let Err(release_fault) = lock.release().await {
        warn!("⚠️ [JOB_LOCK_RELEASE]: '{}' -> {}.", job.name, release_fault);
    }
}

async fn execute_with_deadline(job: &ScheduledJob, deadline: Duration) {
    let started = std::time::Instant::now();
    match tokio::time::timeout(deadline, (job.body)()).await {
        Ok(()) => {
            debug!(
                "✅ [JOB_DONE]: '{}' completed in {} ms.",
                job.name,
                started.elapsed().as_millis()
            );
        }
        Err(_) => {
            error!(
                "⏱️ [JOB_OVERRUN]: '{}' exceeded its {} ms deadline and was cancelled.",
                job.name,
                deadline.as_millis()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgelink_infra_kv::MemoryKvStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn guarded_run_executes_once_under_contention() {
        let kv_store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let executions = Arc::new(AtomicU32::new(0));

        let counter = executions.clone();
        let job = ScheduledJob::new(
            "probe",
            "* * * * *",
            Arc::new(move || {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                })
            }),
        )
        .unwrap();

        // Dos disparos simultáneos del mismo job (dos "instancias").
        let first = run_job_guarded(&kv_store, &job, Duration::from_secs(5));
        let second = run_job_guarded(&kv_store, &job, Duration::from_secs(5));
        tokio::join!(first, second);

        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn overrun_is_cancelled_at_deadline() {
        let kv_store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let completed = Arc::new(AtomicU32::new(0));

        let flag = completed.clone();
        let job = ScheduledJob::new(
            "sluggish",
            "* * * * *",
            Arc::new(move || {
                let flag = flag.clone();
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    flag.fetch_add(1, Ordering::SeqCst);
                })
            }),
        )
        .unwrap();

        run_job_guarded(&kv_store, &job, Duration::from_millis(50)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }
}
