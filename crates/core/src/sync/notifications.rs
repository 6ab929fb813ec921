//! Turns sync outcomes into user-facing notifications.
//!
//! The emitter remembers which write ids the user has already been told
//! about, so a write that was confirmed as "saved" at submission time does
//! not produce a second success message when it finally syncs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fieldsync_domain::{ConflictInfo, ConflictKind, Notification, PendingWrite};
use serde_json::{json, Value};
use tracing::debug;

use crate::sync::ports::NotificationSink;

pub const SAVED_OFFLINE_TITLE: &str = "Saved — will sync when online";

/// The write a conflict notification refers to.
///
/// Conflicts on the immediate attempt have no queue id yet.
#[derive(Debug, Clone, Copy)]
pub struct ConflictSubject<'a> {
    pub write_id: Option<&'a str>,
    pub operation_type: &'a str,
    pub payload: &'a Value,
}

impl<'a> From<&'a PendingWrite> for ConflictSubject<'a> {
    fn from(write: &'a PendingWrite) -> Self {
        Self {
            write_id: Some(&write.id),
            operation_type: &write.operation_type,
            payload: &write.payload,
        }
    }
}

pub struct NotificationEmitter {
    sink: Arc<dyn NotificationSink>,
    confirmed: Mutex<HashSet<String>>,
}

impl NotificationEmitter {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink, confirmed: Mutex::new(HashSet::new()) }
    }

    pub fn is_confirmed(&self, write_id: &str) -> bool {
        self.confirmed().contains(write_id)
    }

    /// "Saved, will sync" notice; counts as confirmation for `write_id`.
    pub fn saved_offline(&self, write_id: &str, operation_type: &str, item_count: Option<u32>) {
        let description = match item_count {
            Some(count) => format!(
                "{} saved on this device. It will sync automatically when you are back online.",
                items_phrase(count)
            ),
            None => format!(
                "Your {} was saved on this device. It will sync automatically when you are back \
                 online.",
                label(operation_type)
            ),
        };

        let mut detail = json!({ "writeId": write_id, "operationType": operation_type });
        if let Some(count) = item_count {
            detail["itemCount"] = json!(count);
            detail["summary"] = json!(format!("{} waiting to sync", items_phrase(count)));
        }

        self.confirmed().insert(write_id.to_string());
        self.emit(Notification::info(SAVED_OFFLINE_TITLE, description).with_detail(detail));
    }

    /// Success after replay, shown only if the write was never confirmed.
    ///
    /// Returns whether a notification was emitted.
    pub fn synced(&self, write: &PendingWrite) -> bool {
        if self.confirmed().remove(&write.id) {
            debug!(write_id = %write.id, "Write already confirmed; suppressing success notice");
            return false;
        }
        let description = format!("Your {} was delivered.", label(&write.operation_type));
        self.emit(
            Notification::info("Synced", description).with_detail(json!({ "writeId": write.id })),
        );
        true
    }

    /// Notification for a classified conflict.
    pub fn conflict(&self, subject: ConflictSubject<'_>, kind: ConflictKind, info: &ConflictInfo) {
        let op = label(subject.operation_type);
        let notification = match kind {
            ConflictKind::Duplicate => {
                let who_when = match (&info.actor, &info.at) {
                    (Some(actor), Some(at)) => format!(" by {actor} at {at}"),
                    (Some(actor), None) => format!(" by {actor}"),
                    (None, Some(at)) => format!(" at {at}"),
                    (None, None) => String::new(),
                };
                Notification::info(
                    "Already recorded",
                    format!(
                        "This {op} was already completed{who_when}. No further action is needed."
                    ),
                )
                .with_detail(json!({
                    "writeId": subject.write_id,
                    "actor": info.actor,
                    "at": info.at,
                }))
            }
            ConflictKind::Version => Notification::warning(
                "Changed on the server",
                format!(
                    "Someone else changed this record before your {op} synced. The server version \
                     was kept."
                ),
            )
            .with_detail(json!({
                "kind": "version",
                "writeId": subject.write_id,
                "operationType": subject.operation_type,
                "payload": subject.payload,
                "server": info.detail,
                "actor": info.actor,
                "at": info.at,
            })),
            ConflictKind::Deleted => Notification::error(
                "No longer available",
                format!(
                    "The record this {op} refers to was deleted. Dismiss it to clear it from the \
                     queue."
                ),
            )
            .with_detail(json!({ "writeId": subject.write_id, "message": info.message })),
            ConflictKind::Unauthorized => Notification::error(
                "Permission required",
                format!(
                    "You do not have permission to perform this {op}. Ask a supervisor or \
                     administrator for access."
                ),
            )
            .with_detail(json!({ "writeId": subject.write_id, "message": info.message })),
            ConflictKind::Unknown => return,
        };
        self.emit(notification);
    }

    /// Immediate validation failure; nothing was queued.
    pub fn rejected(&self, operation_type: &str, message: &str) {
        self.emit(Notification::error(
            "Not saved",
            format!("Your {} was rejected: {message}", label(operation_type)),
        ));
    }

    /// Validation failure during replay; the entry is now `failed`.
    pub fn replay_rejected(&self, write: &PendingWrite, message: &str) {
        self.forget(&write.id);
        let description =
            format!("Your {} was rejected by the server: {message}", label(&write.operation_type));
        self.emit(
            Notification::error("Could not sync", description)
                .with_detail(json!({ "writeId": write.id })),
        );
    }

    pub fn retries_exhausted(&self, write: &PendingWrite, attempts: u32) {
        self.forget(&write.id);
        self.emit(
            Notification::error(
                "Sync failed",
                format!(
                    "Your {} could not be delivered after {attempts} attempts. It stays in the \
                     queue until you dismiss it.",
                    label(&write.operation_type)
                ),
            )
            .with_detail(json!({ "writeId": write.id, "attempts": attempts })),
        );
    }

    pub fn storage_failure(&self, context: &str, error: &str) {
        self.emit(Notification::error(
            "Could not save on this device",
            format!("{context}: {error}"),
        ));
    }

    /// Drop confirmation state for an entry that left the queue.
    pub fn forget(&self, write_id: &str) {
        self.confirmed().remove(write_id);
    }

    fn emit(&self, notification: Notification) {
        debug!(level = %notification.level, title = %notification.title, "Emitting notification");
        self.sink.notify(notification);
    }

    fn confirmed(&self) -> MutexGuard<'_, HashSet<String>> {
        self.confirmed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn label(operation_type: &str) -> String {
    operation_type.replace('_', " ")
}

fn items_phrase(count: u32) -> String {
    if count == 1 {
        "1 item".to_string()
    } else {
        format!("{count} items")
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use fieldsync_domain::{NewWrite, NotificationLevel};

    use super::*;
    use crate::sync::testing::RecordingSink;

    fn setup() -> (Arc<RecordingSink>, NotificationEmitter) {
        let sink = Arc::new(RecordingSink::new());
        let emitter = NotificationEmitter::new(sink.clone());
        (sink, emitter)
    }

    fn pending(id: &str) -> PendingWrite {
        PendingWrite::from_new(
            id.to_string(),
            NewWrite::new("submit_stock_count", "/api/stock-counts", "inventory", json!({})),
            Utc::now(),
        )
    }

    #[test]
    fn saved_offline_mentions_item_count_and_confirms() {
        let (sink, emitter) = setup();
        emitter.saved_offline("w-1", "submit_stock_count", Some(5));

        let n = sink.last().unwrap();
        assert_eq!(n.level, NotificationLevel::Info);
        assert_eq!(n.title, SAVED_OFFLINE_TITLE);
        assert!(n.description.contains("5 items"));
        let detail = n.detail.unwrap();
        assert_eq!(detail["itemCount"], 5);
        assert_eq!(detail["summary"], "5 items waiting to sync");
        assert!(emitter.is_confirmed("w-1"));
    }

    #[test]
    fn success_is_shown_at_most_once() {
        let (sink, emitter) = setup();
        emitter.saved_offline("w-1", "submit_stock_count", None);
        assert!(!emitter.synced(&pending("w-1")));
        assert_eq!(sink.notifications().len(), 1);

        assert!(emitter.synced(&pending("w-2")));
        assert_eq!(sink.last().unwrap().title, "Synced");
    }

    #[test]
    fn duplicate_is_info_and_names_actor() {
        let (sink, emitter) = setup();
        let write = pending("w-1");
        let info = ConflictInfo {
            actor: Some("Alice".into()),
            at: Some("2024-05-01T09:30:00Z".into()),
            ..Default::default()
        };
        emitter.conflict((&write).into(), ConflictKind::Duplicate, &info);

        let n = sink.last().unwrap();
        assert_eq!(n.level, NotificationLevel::Info);
        assert!(n.description.contains("Alice"));
        assert!(n.description.contains("2024-05-01T09:30:00Z"));
    }

    #[test]
    fn conflict_levels() {
        let (sink, emitter) = setup();
        let write = pending("w-1");
        let info = ConflictInfo::default();

        emitter.conflict((&write).into(), ConflictKind::Version, &info);
        emitter.conflict((&write).into(), ConflictKind::Deleted, &info);
        emitter.conflict((&write).into(), ConflictKind::Unauthorized, &info);
        emitter.conflict((&write).into(), ConflictKind::Unknown, &info);

        assert_eq!(sink.count_at(NotificationLevel::Warning), 1);
        assert_eq!(sink.count_at(NotificationLevel::Error), 2);
        assert_eq!(sink.notifications().len(), 3);

        let version = &sink.notifications()[0];
        let detail = version.detail.as_ref().unwrap();
        assert_eq!(detail["writeId"], "w-1");
        assert_eq!(detail["operationType"], "submit_stock_count");
        assert!(sink.notifications()[2].description.contains("supervisor"));
    }
}
