//! Structured user-facing messages. Rendering belongs to the host UI.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

crate::impl_domain_status_conversions!(NotificationLevel {
    Info => "info",
    Warning => "warning",
    Error => "error",
});

/// `{ level, title, description, detail? }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl Notification {
    pub fn new(
        level: NotificationLevel,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self { level, title: title.into(), description: description.into(), detail: None }
    }

    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, description)
    }

    pub fn warning(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, title, description)
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, description)
    }

    #[must_use]
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_message_contract() {
        let n = Notification::warning("Changed elsewhere", "Someone edited this")
            .with_detail(json!({"writeId": "w-1"}));
        let json = serde_json::to_value(&n).unwrap();

        assert_eq!(json["level"], "warning");
        assert_eq!(json["title"], "Changed elsewhere");
        assert_eq!(json["detail"]["writeId"], "w-1");

        let bare = serde_json::to_value(Notification::info("a", "b")).unwrap();
        assert!(bare.get("detail").is_none());
    }
}
