use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

labelled_enum! {
    pub enum NotificationKind {
        NewOrder => "new_order",
        OrderCancelled => "order_cancelled",
        OrderStatusChanged => "order_status_changed",
        DriverAssigned => "driver_assigned",
        ShipmentUpdated => "shipment_updated",
        PaymentUpdated => "payment_updated",
    }
}

/// A delivery request for the notification collaborator. The core only
/// builds these; sending is someone else's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub order_id: Uuid,
    pub store_id: Option<Uuid>,
    pub shipment_id: Option<Uuid>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient_id: Uuid,
        kind: NotificationKind,
        order_id: Uuid,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            kind,
            order_id,
            store_id: None,
            shipment_id: None,
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_store(mut self, store_id: Uuid) -> Self {
        self.store_id = Some(store_id);
        self
    }

    pub fn with_shipment(mut self, shipment_id: Uuid) -> Self {
        self.shipment_id = Some(shipment_id);
        self
    }
}
