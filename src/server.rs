//! Process wiring: open clients once, run API and workers, shut down cleanly

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cli::{ServerArgs, WorkerArgs};
use stemsplit::api::{self, AppState};
use stemsplit::config::{Config, QueueBackend};
use stemsplit::observability::Metrics;
use stemsplit::processing::DemucsSeparator;
use stemsplit::queue::{self, JobQueue};
use stemsplit::storage::StorageClient;
use stemsplit::worker::{CallbackClient, CallbackConfig, Worker};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Clients shared by the API and every worker of this process
struct Services {
    queue: Arc<dyn JobQueue>,
    storage: Arc<StorageClient>,
    metrics: Arc<Metrics>,
}

impl Services {
    async fn open(config: &Config) -> Result<Self, AnyError> {
        info!(backend = ?config.queue.backend, "Opening job queue");
        let queue = queue::open(&config.queue)
            .await
            .map_err(|e| format!("Failed to open queue: {e}"))?;

        info!(provider = ?config.storage.provider, bucket = %config.storage.bucket, "Opening object storage");
        let storage = StorageClient::from_config(&config.storage)
            .map_err(|e| format!("Failed to open storage: {e}"))?;
        if let Err(e) = storage.ensure_container().await {
            // submissions retry this; a missing bucket must not block startup
            warn!(error = %e, "Storage container not ready");
        }

        Ok(Self {
            queue,
            storage: Arc::new(storage),
            metrics: Arc::new(Metrics::new()),
        })
    }

    fn spawn_workers(
        &self,
        config: &Config,
        count: usize,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>, AnyError> {
        let separator = Arc::new(DemucsSeparator::new(&config.separator));
        let callbacks = CallbackClient::new(CallbackConfig {
            request_timeout: config.worker.callback_timeout(),
            ..Default::default()
        })?;

        info!(count, "Starting workers");

        Ok((0..count)
            .map(|id| {
                Worker::builder()
                    .id(id)
                    .queue(self.queue.clone())
                    .storage(self.storage.clone())
                    .separator(separator.clone())
                    .callbacks(callbacks.clone())
                    .metrics(self.metrics.clone())
                    .work_dir(config.worker.work_dir.clone())
                    .poll_interval(config.worker.poll_interval())
                    .processing_timeout(config.worker.processing_timeout())
                    .build()
                    .spawn(shutdown.clone())
            })
            .collect())
    }

    /// Stop workers after their current job, then flush the queue
    async fn shutdown(self, tx: watch::Sender<bool>, workers: Vec<JoinHandle<()>>) -> Result<(), AnyError> {
        let _ = tx.send(true);
        info!(count = workers.len(), "Waiting for workers to finish");

        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
            }
        }

        self.queue.close().await?;

        let snapshot = self.metrics.snapshot();
        info!(
            submitted = snapshot.jobs_submitted,
            completed = snapshot.jobs_completed,
            failed = snapshot.jobs_failed,
            callbacks_failed = snapshot.callbacks_failed,
            "Shutdown complete"
        );
        Ok(())
    }
}

pub async fn run(args: ServerArgs) -> Result<(), AnyError> {
    info!("Loading configuration");
    let mut config = Config::load()?;
    if let Some(address) = args.address {
        config.server.bind_addr = address;
    }
    let worker_count = args.workers.unwrap_or(config.worker.concurrency);

    let services = Services::open(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = services.spawn_workers(&config, worker_count, &shutdown_rx)?;

    let listener = TcpListener::bind(config.server.bind_addr).await?;
    let state = AppState::new(
        config,
        services.storage.clone(),
        services.queue.clone(),
        services.metrics.clone(),
    );

    let served = api::serve(listener, state, shutdown_signal()).await;
    services.shutdown(shutdown_tx, workers).await?;

    Ok(served?)
}

pub async fn run_workers(args: WorkerArgs) -> Result<(), AnyError> {
    info!("Loading configuration");
    let config = Config::load()?;
    if config.queue.backend == QueueBackend::Fjall {
        warn!("Fjall queue is local to this process; an API server cannot share it");
    }
    let worker_count = args.workers.unwrap_or(config.worker.concurrency);

    let services = Services::open(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = services.spawn_workers(&config, worker_count, &shutdown_rx)?;

    shutdown_signal().await;
    services.shutdown(shutdown_tx, workers).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
