use std::sync::Arc;

use market_types::api::{CreateOrderRequest, OrderSearchParams, StoreOrderSearchParams, StoreRevenue};
use market_types::domain::actor::{Actor, Capability, Role};
use market_types::domain::error::DomainError;
use market_types::domain::notification::{Notification, NotificationKind};
use market_types::domain::order::{Order, OrderDraft, StoreOrderDraft};
use market_types::domain::payment::Payment;
use market_types::domain::query::{Page, StoreOrderView};
use market_types::domain::status::OrderStatus;
use market_types::ports::notifier::Notifier;
use market_types::ports::repository::MarketRepository;
use uuid::Uuid;

use crate::application::{cart, dispatch};
use crate::errors::AppError;

pub struct OrderService<R: MarketRepository> {
    repo: Arc<R>,
    notifier: Arc<dyn Notifier>,
}

impl<R: MarketRepository> OrderService<R> {
    pub fn new(repo: Arc<R>, notifier: Arc<dyn Notifier>) -> Self {
        Self { repo, notifier }
    }

    /// Checkout: prices the cart, quotes one delivery fee per store and
    /// reserves stock for everything in one repository transaction.
    pub async fn create_order(
        &self,
        actor: &Actor,
        request: CreateOrderRequest,
    ) -> Result<Order, AppError> {
        actor.authorize(Capability::PlaceOrder)?;
        let data = request.order_data;
        let destination = cart::destination(&*self.repo, actor, data.destination_address_id).await?;
        let carts = cart::resolve(&*self.repo, &request.items).await?;
        let rules = self.repo.list_rules(true).await?;

        let mut stores = Vec::with_capacity(carts.len());
        for c in &carts {
            let quote = c.quote(
                &rules,
                destination.coordinates,
                data.delivery_type,
                data.vehicle_type,
            )?;
            tracing::debug!(
                store_id = %c.store.id,
                rule_id = %quote.rule_id,
                distance_km = quote.distance_km,
                weight_grams = quote.weight_grams,
                fee = quote.fee,
                "delivery fee quoted"
            );
            stores.push(StoreOrderDraft {
                quote,
                delivery_notes: data.delivery_notes.clone(),
                items: c.item_drafts(),
            });
        }

        let order = Order::place(OrderDraft {
            buyer_id: destination.user_id,
            destination_address_id: destination.id,
            delivery_type: data.delivery_type,
            vehicle_type: data.vehicle_type,
            payment_method: data.payment_method,
            stores,
        })?;
        let payment = Payment::for_order(&order);
        self.repo.place_order(&order, &payment).await?;
        tracing::info!(
            order_id = %order.id,
            buyer_id = %order.buyer_id,
            stores = order.store_orders.len(),
            total_amount = order.total_amount,
            "order placed"
        );

        let notes = carts
            .iter()
            .map(|c| {
                Notification::new(
                    c.store.owner_id,
                    NotificationKind::NewOrder,
                    order.id,
                    format!("new order received for {}", c.store.name),
                )
                .with_store(c.store.id)
            })
            .collect();
        dispatch(self.notifier.as_ref(), notes).await;
        Ok(order)
    }

    pub async fn get_order(&self, actor: &Actor, id: Uuid) -> Result<Order, AppError> {
        actor.authorize(Capability::ViewOrder)?;
        self.owned_order(actor, id).await
    }

    pub async fn search_orders(
        &self,
        actor: &Actor,
        params: OrderSearchParams,
    ) -> Result<Page<Order>, AppError> {
        actor.authorize(Capability::ViewOrder)?;
        let mut query = params.into_query()?;
        if !actor.is_staff() {
            query.buyer_id = Some(actor.user_id);
        }
        Ok(self.repo.search_orders(&query).await?)
    }

    pub async fn cancel_order(&self, actor: &Actor, id: Uuid) -> Result<Order, AppError> {
        actor.authorize(Capability::CancelOrder)?;
        self.owned_order(actor, id).await?;
        let order = self.repo.cancel_order(id).await?;
        tracing::info!(order_id = %id, by = %actor.user_id, "order cancelled");
        self.notify_stores(&order, NotificationKind::OrderCancelled, "order cancelled")
            .await;
        Ok(order)
    }

    /// Staff status change. `cancelled` releases stock like a cancellation.
    pub async fn update_order_status(
        &self,
        actor: &Actor,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<Order, AppError> {
        actor.authorize(Capability::UpdateOrderStatus)?;
        let order = self.repo.set_order_status(id, status).await?;
        tracing::info!(order_id = %id, %status, by = %actor.user_id, "order status changed");

        let note = Notification::new(
            order.buyer_id,
            NotificationKind::OrderStatusChanged,
            order.id,
            format!("your order is now {status}"),
        );
        dispatch(self.notifier.as_ref(), vec![note]).await;
        if status == OrderStatus::Cancelled {
            self.notify_stores(&order, NotificationKind::OrderCancelled, "order cancelled")
                .await;
        }
        Ok(order)
    }

    pub async fn search_store_orders(
        &self,
        actor: &Actor,
        params: StoreOrderSearchParams,
    ) -> Result<Page<StoreOrderView>, AppError> {
        actor.authorize(Capability::SearchStoreOrders)?;
        let mut query = params.into_query()?;
        query.store_ids = self
            .repo
            .stores_owned_by(actor.user_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        if query.store_ids.is_empty() {
            return Ok(Page::slice(Vec::new(), query.pagination));
        }
        Ok(self.repo.search_store_orders(&query).await?)
    }

    pub async fn store_revenue(&self, actor: &Actor, store_id: Uuid) -> Result<StoreRevenue, AppError> {
        actor.authorize(Capability::ViewStoreRevenue)?;
        let store = self
            .repo
            .get_store(store_id)
            .await?
            .ok_or_else(|| DomainError::not_found("store", store_id))?;
        if actor.role == Role::Store && store.owner_id != actor.user_id {
            return Err(DomainError::forbidden("store belongs to another user").into());
        }
        let revenue = self.repo.store_revenue(store_id).await?;
        Ok(StoreRevenue { store_id, revenue })
    }

    async fn owned_order(&self, actor: &Actor, id: Uuid) -> Result<Order, AppError> {
        let order = self
            .repo
            .get_order(id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", id))?;
        if !actor.is_staff() && order.buyer_id != actor.user_id {
            return Err(DomainError::forbidden("order belongs to another buyer").into());
        }
        Ok(order)
    }

    /// Runs after the write has committed, so a failed owner lookup only
    /// costs that store its notification.
    async fn notify_stores(&self, order: &Order, kind: NotificationKind, message: &str) {
        let mut notes = Vec::with_capacity(order.store_orders.len());
        for store_id in order.store_ids() {
            match self.repo.get_store(store_id).await {
                Ok(Some(store)) => notes.push(
                    Notification::new(store.owner_id, kind, order.id, message).with_store(store_id),
                ),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(order_id = %order.id, store_id = %store_id, error = %e, "store lookup for notification failed");
                }
            }
        }
        dispatch(self.notifier.as_ref(), notes).await;
    }
}
