//! Application context - dependency injection container

use std::sync::Arc;
use std::time::Duration;

use fieldsync_common::{RetryPolicy, SystemClock};
use fieldsync_core::{
    ConnectivityMonitor, NotificationEmitter, NotificationSink, OperationRegistry,
    ResolutionPolicy, SyncCoordinator, WriteStore, WriteSubmitter,
};
use fieldsync_domain::{Config, FieldSyncError, Notification, Result};
use fieldsync_infra::observability::metrics::SyncMetrics;
use fieldsync_infra::{
    BroadcastNotificationSink, DbManager, FanoutNotificationSink, FlushHandle, HttpClient,
    HttpConnectivityProbe, HttpWriteTransport, InstanceLock, SqlitePendingWriteStore, SyncWorker,
    SyncWorkerConfig, TracingNotificationSink,
};
use tokio::sync::broadcast;

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub store: Arc<dyn WriteStore>,
    pub registry: Arc<OperationRegistry>,
    pub emitter: Arc<NotificationEmitter>,
    pub submitter: Arc<WriteSubmitter>,
    pub coordinator: Arc<SyncCoordinator>,
    pub metrics: Arc<SyncMetrics>,
    notifications: BroadcastNotificationSink,
    probe: HttpConnectivityProbe,
    runtime: Option<SyncRuntime>,
    /// Present when this process owns replay for the database.
    instance_lock: Option<InstanceLock>,
}

/// Background pieces that only exist while `run` is active.
struct SyncRuntime {
    monitor: ConnectivityMonitor,
    worker: SyncWorker,
}

impl AppContext {
    /// Wire every service from `config`.
    ///
    /// Opens the database and runs migrations. When no other live process owns
    /// the queue, takes ownership and returns interrupted replays to the queue
    /// before anything else touches it. Otherwise `submitting` rows belong to
    /// the owner's in-flight requests and are left alone.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(DbManager::open(&config.storage.path, config.storage.pool_size)?);
        let store: Arc<dyn WriteStore> = Arc::new(SqlitePendingWriteStore::new(Arc::clone(&db)));

        let instance_lock =
            InstanceLock::try_acquire(InstanceLock::path_for_database(&config.storage.path))?;
        if instance_lock.is_some() {
            let recovered = store.recover_interrupted().await?;
            if recovered > 0 {
                tracing::info!(recovered, "re-queued writes interrupted by the last shutdown");
            }
        } else {
            tracing::info!("another fieldsync process owns this queue; replay disabled here");
        }

        let request_timeout = Duration::from_secs(config.server.request_timeout_secs);
        let client = HttpClient::builder(config.server.base_url.clone())
            .timeout(request_timeout)
            .user_agent(config.server.user_agent.clone())
            .build()?;
        let transport = Arc::new(HttpWriteTransport::new(client.clone(), request_timeout));

        let registry = Arc::new(OperationRegistry::from_config(&config.operations)?);
        if registry.is_empty() {
            tracing::warn!("no operations configured; every submission will be rejected");
        }

        let notifications = BroadcastNotificationSink::new();
        let sink: Arc<dyn NotificationSink> = Arc::new(FanoutNotificationSink::new(vec![
            Arc::new(TracingNotificationSink),
            Arc::new(notifications.clone()),
        ]));
        let emitter = Arc::new(NotificationEmitter::new(sink));

        let probe_interval = Duration::from_secs(config.connectivity.probe_interval_secs.max(1));
        let probe =
            HttpConnectivityProbe::new(client, config.server.health_path.clone(), probe_interval);

        let clock = Arc::new(SystemClock);
        let submitter = WriteSubmitter::new(
            Arc::clone(&store),
            transport.clone(),
            Arc::clone(&registry),
            Arc::clone(&emitter),
            probe.signal(),
            clock.clone(),
        )
        .with_request_timeout(request_timeout);

        let coordinator = SyncCoordinator::new(
            Arc::clone(&store),
            transport,
            Arc::clone(&registry),
            Arc::clone(&emitter),
            retry_policy(&config)?,
            clock,
        )
        .with_request_timeout(request_timeout)
        .with_resolution_policy(
            ResolutionPolicy::default().with_module_hold(config.sync.hold_module_on_failure),
        );

        tracing::info!(
            db_path = %db.path().display(),
            base_url = %config.server.base_url,
            operations = registry.len(),
            "application context ready"
        );

        Ok(Self {
            config,
            db,
            store,
            registry,
            emitter,
            submitter: Arc::new(submitter),
            coordinator: Arc::new(coordinator),
            metrics: Arc::new(SyncMetrics::new()),
            notifications,
            probe,
            runtime: None,
            instance_lock,
        })
    }

    /// Receive every user-facing notification emitted from now on.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Probe the backend once and publish the result to the online signal.
    pub async fn check_connectivity(&self) -> bool {
        self.probe.check().await
    }

    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }

    /// Whether this process may recover and replay queued writes.
    pub fn owns_queue(&self) -> bool {
        self.instance_lock.is_some()
    }

    /// Start the probe, the connectivity monitor and the sync worker.
    ///
    /// A zero probe interval leaves the online signal to whatever
    /// [`Self::check_connectivity`] last observed. Fails when another process
    /// owns the queue.
    pub async fn start_sync(&mut self) -> Result<FlushHandle> {
        if let Some(runtime) = &self.runtime {
            return Ok(runtime.worker.flush_handle());
        }
        if !self.owns_queue() {
            return Err(FieldSyncError::Storage(
                "another fieldsync process owns this queue; stop it before running sync"
                    .to_string(),
            ));
        }

        let debounce = Duration::from_millis(self.config.connectivity.debounce_ms);
        let mut monitor = ConnectivityMonitor::new(self.probe.signal(), debounce);
        let mut worker = SyncWorker::new(
            Arc::clone(&self.coordinator),
            monitor.subscribe(),
            self.probe.signal(),
            SyncWorkerConfig {
                poll_interval: Duration::from_secs(self.config.sync.poll_interval_secs),
                ..SyncWorkerConfig::default()
            },
            Arc::clone(&self.metrics),
        );

        monitor.start().map_err(FieldSyncError::Internal)?;
        worker.start().map_err(FieldSyncError::Internal)?;
        if self.config.connectivity.probe_interval_secs > 0 {
            self.probe.start().map_err(FieldSyncError::Internal)?;
        } else {
            self.check_connectivity().await;
        }

        let handle = worker.flush_handle();
        self.runtime = Some(SyncRuntime { monitor, worker });
        Ok(handle)
    }

    /// Stop background tasks. In-flight replays finish or time out first.
    pub async fn shutdown(&mut self) -> Result<()> {
        let Some(mut runtime) = self.runtime.take() else {
            return Ok(());
        };

        if self.probe.is_running() {
            self.probe.stop().await.map_err(FieldSyncError::Internal)?;
        }
        runtime.monitor.stop().await.map_err(FieldSyncError::Internal)?;
        runtime.worker.stop().await.map_err(FieldSyncError::Internal)?;
        tracing::info!("sync runtime stopped");
        Ok(())
    }
}

fn retry_policy(config: &Config) -> Result<RetryPolicy> {
    RetryPolicy::builder()
        .max_attempts(config.sync.max_attempts)
        .base_delay(Duration::from_millis(config.sync.base_backoff_ms))
        .max_delay(Duration::from_secs(config.sync.max_backoff_secs))
        .jitter_factor(config.sync.jitter_factor)
        .build()
        .map_err(|err| FieldSyncError::Config(format!("invalid retry policy: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_follows_sync_config() {
        let mut config = Config::default();
        config.sync.max_attempts = 3;
        config.sync.base_backoff_ms = 250;

        let policy = retry_policy(&config).unwrap();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay(), Duration::from_millis(250));
        assert_eq!(policy.max_delay(), Duration::from_secs(300));
    }

    #[test]
    fn retry_policy_rejects_base_above_cap() {
        let mut config = Config::default();
        config.sync.base_backoff_ms = 600_000;
        assert!(matches!(retry_policy(&config), Err(FieldSyncError::Config(_))));
    }
}
