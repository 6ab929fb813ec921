//! Reachability probe for hosts without a platform connectivity API.
//!
//! Polls the backend health endpoint and publishes the result into a `watch`
//! channel, which is the signal source the connectivity monitor debounces.

use std::time::Duration;

use reqwest::Method;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::http::HttpClient;

const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpConnectivityProbe {
    client: HttpClient,
    health_path: String,
    interval: Duration,
    signal: watch::Sender<bool>,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl HttpConnectivityProbe {
    /// Probe `health_path` every `interval`. The signal starts offline.
    pub fn new(client: HttpClient, health_path: impl Into<String>, interval: Duration) -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            client,
            health_path: health_path.into(),
            interval,
            signal,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Receiver for the raw online signal.
    pub fn signal(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }

    /// One probe; publishes and returns the result.
    pub async fn check(&self) -> bool {
        probe_once(&self.client, &self.health_path, &self.signal).await
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    #[instrument(skip(self), fields(health_path = %self.health_path))]
    pub fn start(&mut self) -> Result<(), String> {
        if self.is_running() {
            return Err("Connectivity probe already running".to_string());
        }

        self.cancellation = CancellationToken::new();
        let client = self.client.clone();
        let health_path = self.health_path.clone();
        let interval = self.interval;
        let signal = self.signal.clone();
        let cancel = self.cancellation.clone();

        self.task_handle = Some(tokio::spawn(async move {
            loop {
                probe_once(&client, &health_path, &signal).await;
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("Connectivity probe cancelled");
                        break;
                    }
                    () = tokio::time::sleep(interval) => {}
                }
            }
        }));

        info!(interval_secs = self.interval.as_secs(), "Connectivity probe started");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), String> {
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(DEFAULT_JOIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Probe task panicked: {}", e);
                    return Err("Probe task panicked".to_string());
                }
                Err(_) => {
                    warn!("Probe task did not complete within timeout");
                    return Err("Probe task timeout".to_string());
                }
            }
        }
        Ok(())
    }
}

impl Drop for HttpConnectivityProbe {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

async fn probe_once(client: &HttpClient, health_path: &str, signal: &watch::Sender<bool>) -> bool {
    let online = match client.send(client.request(Method::GET, health_path)).await {
        Ok(response) => response.status().is_success(),
        Err(err) => {
            debug!(error = %err, "Health probe failed");
            false
        }
    };
    signal.send_if_modified(|current| {
        if *current == online {
            false
        } else {
            *current = online;
            true
        }
    });
    online
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn publishes_reachability_changes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = HttpClient::builder(server.uri()).build().unwrap();
        let probe = HttpConnectivityProbe::new(client, "/health", Duration::from_secs(60));
        let mut rx = probe.signal();
        assert!(!*rx.borrow());

        assert!(probe.check().await);
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());

        assert!(!probe.check().await);
        assert!(!*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn background_probe_starts_and_stops() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

        let client = HttpClient::builder(server.uri()).build().unwrap();
        let mut probe = HttpConnectivityProbe::new(client, "/health", Duration::from_millis(20));
        let mut rx = probe.signal();

        probe.start().unwrap();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|online| *online))
            .await
            .unwrap()
            .unwrap();
        probe.stop().await.unwrap();
        assert!(!probe.is_running());
    }
}
