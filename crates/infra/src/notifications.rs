//! Notification sink implementations.

use std::sync::Arc;

use fieldsync_core::NotificationSink;
use fieldsync_domain::{Notification, NotificationLevel};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const DEFAULT_CAPACITY: usize = 64;

/// Fans notifications out to any number of UI subscribers.
///
/// Notifications emitted while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastNotificationSink {
    sender: broadcast::Sender<Notification>,
}

impl Default for BroadcastNotificationSink {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl BroadcastNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl NotificationSink for BroadcastNotificationSink {
    fn notify(&self, notification: Notification) {
        let _ = self.sender.send(notification);
    }
}

/// Writes notifications to the log; used by the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, n: Notification) {
        match n.level {
            NotificationLevel::Info => {
                info!(target: "fieldsync::notify", title = %n.title, "{}", n.description);
            }
            NotificationLevel::Warning => {
                warn!(target: "fieldsync::notify", title = %n.title, "{}", n.description);
            }
            NotificationLevel::Error => {
                error!(target: "fieldsync::notify", title = %n.title, "{}", n.description);
            }
        }
    }
}

/// Forwards every notification to each inner sink in order.
#[derive(Clone, Default)]
pub struct FanoutNotificationSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutNotificationSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

impl NotificationSink for FanoutNotificationSink {
    fn notify(&self, notification: Notification) {
        for sink in &self.sinks {
            sink.notify(notification.clone());
        }
    }
}
