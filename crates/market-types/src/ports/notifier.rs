use async_trait::async_trait;

use crate::domain::notification::Notification;

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("notification channel closed")]
    Closed,
    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Outbound port to the notification collaborator.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}
