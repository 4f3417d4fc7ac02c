use async_trait::async_trait;
use market_types::domain::notification::Notification;
use market_types::ports::notifier::{Notifier, NotifyError};
use tokio::sync::mpsc;

/// Emits every notification request as a structured log event. The default
/// adapter when no delivery collaborator is wired in.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            recipient_id = %notification.recipient_id,
            kind = %notification.kind,
            order_id = %notification.order_id,
            store_id = ?notification.store_id,
            shipment_id = ?notification.shipment_id,
            message = %notification.message,
            "notification requested"
        );
        Ok(())
    }
}

/// Hands notifications to an in-process consumer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.tx.send(notification).map_err(|_| NotifyError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_types::domain::notification::NotificationKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn channel_delivers_in_order_and_reports_closed() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let order_id = Uuid::new_v4();
        for kind in [NotificationKind::NewOrder, NotificationKind::OrderCancelled] {
            notifier
                .notify(Notification::new(Uuid::new_v4(), kind, order_id, "x"))
                .await
                .unwrap();
        }
        assert_eq!(rx.recv().await.unwrap().kind, NotificationKind::NewOrder);
        assert_eq!(rx.recv().await.unwrap().kind, NotificationKind::OrderCancelled);

        drop(rx);
        let err = notifier
            .notify(Notification::new(Uuid::new_v4(), NotificationKind::NewOrder, order_id, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Closed));
    }

    #[tokio::test]
    async fn tracing_notifier_never_fails() {
        let n = Notification::new(Uuid::new_v4(), NotificationKind::PaymentUpdated, Uuid::new_v4(), "paid");
        assert!(TracingNotifier.notify(n).await.is_ok());
    }
}
