//! Debounced connectivity monitor.
//!
//! The raw online signal (a `watch` channel fed by the platform or by a
//! reachability probe) flaps on weak networks. The monitor only reports
//! `Online` once the signal has stayed up for the whole debounce window, and
//! reports `Offline` only after a stable `Online` was announced.

use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 16;
const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

pub struct ConnectivityMonitor {
    signal: watch::Receiver<bool>,
    debounce: Duration,
    events: broadcast::Sender<ConnectivityEvent>,
    cancel: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl ConnectivityMonitor {
    pub fn new(signal: watch::Receiver<bool>, debounce: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            signal,
            debounce,
            events,
            cancel: CancellationToken::new(),
            task_handle: None,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }

    /// Raw, undebounced reading of the signal.
    pub fn is_online(&self) -> bool {
        *self.signal.borrow()
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn start(&mut self) -> Result<(), String> {
        if self.is_running() {
            return Err("Connectivity monitor already running".to_string());
        }

        self.cancel = CancellationToken::new();
        let signal = self.signal.clone();
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        let debounce = self.debounce;

        self.task_handle = Some(tokio::spawn(async move {
            watch_loop(signal, events, debounce, cancel).await;
        }));

        info!(debounce_ms = self.debounce.as_millis() as u64, "Connectivity monitor started");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), String> {
        self.cancel.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(self.join_timeout, handle).await {
                Ok(Ok(())) => info!("Connectivity monitor stopped"),
                Ok(Err(err)) => return Err(format!("Connectivity monitor panicked: {err}")),
                Err(_) => {
                    warn!("Connectivity monitor did not stop within timeout");
                    return Err("Connectivity monitor stop timed out".to_string());
                }
            }
        }
        Ok(())
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn watch_loop(
    mut signal: watch::Receiver<bool>,
    events: broadcast::Sender<ConnectivityEvent>,
    debounce: Duration,
    cancel: CancellationToken,
) {
    let mut stable = false;
    let mut pending: Option<Instant> = if *signal.borrow_and_update() {
        Some(Instant::now() + debounce)
    } else {
        None
    };

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            changed = signal.changed() => {
                if changed.is_err() {
                    debug!("Connectivity signal closed");
                    break;
                }
                let online = *signal.borrow_and_update();
                if online {
                    if !stable {
                        // Every online edge restarts the window
                        pending = Some(Instant::now() + debounce);
                    }
                } else {
                    pending = None;
                    if stable {
                        stable = false;
                        info!("Connectivity lost");
                        let _ = events.send(ConnectivityEvent::Offline);
                    }
                }
            }
            () = tokio::time::sleep_until(pending.unwrap_or_else(Instant::now)),
                if pending.is_some() =>
            {
                pending = None;
                if *signal.borrow() {
                    stable = true;
                    info!("Connectivity restored");
                    let _ = events.send(ConnectivityEvent::Online);
                }
            }
        }
    }
}
