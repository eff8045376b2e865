use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
}

/// User-visible toast output. Fire-and-forget.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, kind: NotificationKind, title: &str, message: &str);

    fn success(&self, message: &str) {
        self.notify(NotificationKind::Success, "Success", message);
    }

    fn error(&self, message: &str) {
        self.notify(NotificationKind::Error, "Error", message);
    }
}

/// Sink for headless hosts: every toast becomes a log line.
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, kind: NotificationKind, title: &str, message: &str) {
        match kind {
            NotificationKind::Success => info!(title, message, "notification"),
            NotificationKind::Error => error!(title, message, "notification"),
        }
    }
}
