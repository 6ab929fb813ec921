//! Domain types and models

pub mod conflict;
pub mod notification;
pub mod write;

pub use conflict::{ConflictInfo, ConflictKind};
pub use notification::{Notification, NotificationLevel};
pub use write::{
    NewWrite, PendingWrite, QueueSummary, SubmitRequest, WriteFilter, WritePatch, WriteStatus,
};
