//! Application services: the core operations of the marketplace, each taking
//! the calling [`Actor`](market_types::domain::actor::Actor) explicitly.

use std::sync::Arc;

use market_types::domain::notification::Notification;
use market_types::ports::notifier::Notifier;
use market_types::ports::repository::MarketRepository;

pub mod cart;
pub mod delivery_service;
pub mod order_service;
pub mod payment_service;
pub mod seed;
pub mod shipment_service;

#[cfg(test)]
pub(crate) mod fixtures;

use delivery_service::DeliveryService;
use order_service::OrderService;
use payment_service::PaymentService;
use shipment_service::ShipmentService;

/// Every service over one repository and one notifier. This is the state the
/// HTTP adapter runs on.
pub struct Marketplace<R: MarketRepository> {
    pub orders: OrderService<R>,
    pub delivery: DeliveryService<R>,
    pub shipments: ShipmentService<R>,
    pub payments: PaymentService<R>,
}

impl<R: MarketRepository> Marketplace<R> {
    pub fn new(repo: R, notifier: Arc<dyn Notifier>, callback_token: Option<String>) -> Self {
        let repo = Arc::new(repo);
        Self {
            orders: OrderService::new(repo.clone(), notifier.clone()),
            delivery: DeliveryService::new(repo.clone()),
            shipments: ShipmentService::new(repo.clone(), notifier.clone()),
            payments: PaymentService::new(repo, notifier, callback_token),
        }
    }
}

/// Hands notifications to the collaborator once the write has committed.
/// A failed hand-off is logged and never undoes the operation.
pub(crate) async fn dispatch(notifier: &dyn Notifier, notifications: Vec<Notification>) {
    for n in notifications {
        let (recipient, kind) = (n.recipient_id, n.kind);
        if let Err(e) = notifier.notify(n).await {
            tracing::warn!(recipient_id = %recipient, %kind, error = %e, "notification dropped");
        }
    }
}
