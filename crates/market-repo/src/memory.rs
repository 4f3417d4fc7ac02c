use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use dashmap::DashMap;
use market_types::domain::address::Address;
use market_types::domain::catalog::{Driver, Product, ProductVariant, StockMovement, Store};
use market_types::domain::delivery::DeliveryFeeRule;
use market_types::domain::error::DomainError;
use market_types::domain::order::{Order, StockEffect, StoreOrder};
use market_types::domain::payment::Payment;
use market_types::domain::query::{
    OrderQuery, Page, ShipmentQuery, StoreOrderQuery, StoreOrderView,
};
use market_types::domain::shipment::{Shipment, ShipmentPatch, TrackingPing};
use market_types::domain::status::{OrderStatus, PaymentStatus, ShipmentStatus, StatusMachine};
use market_types::ports::repository::{
    CatalogRepository, OrderRepository, PaymentRepository, RepoError, ShipmentRepository,
};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    addresses: DashMap<Uuid, Address>,
    stores: DashMap<Uuid, Store>,
    products: DashMap<Uuid, Product>,
    variants: DashMap<Uuid, ProductVariant>,
    drivers: DashMap<Uuid, Driver>,
    rules: DashMap<Uuid, DeliveryFeeRule>,
    orders: DashMap<Uuid, Order>,
    /// store order id -> order id
    store_order_index: DashMap<Uuid, Uuid>,
    /// keyed by order id
    payments: DashMap<Uuid, Payment>,
    shipments: DashMap<Uuid, Shipment>,
    tracking: DashMap<Uuid, Vec<TrackingPing>>,
    /// Held for every multi-row write; stands in for a transaction.
    write: Mutex<()>,
}

#[derive(Clone, Default)]
pub struct InMemoryRepo {
    tables: Arc<Tables>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_lock(&self) -> Result<MutexGuard<'_, ()>, RepoError> {
        self.tables
            .write
            .lock()
            .map_err(|e| RepoError::DbError(e.to_string()))
    }

    fn order_snapshot(&self, id: Uuid) -> Result<Order, RepoError> {
        self.tables
            .orders
            .get(&id)
            .map(|o| o.clone())
            .ok_or_else(|| DomainError::not_found("order", id).into())
    }

    /// Checks every movement against available stock before touching any row.
    fn reserve(&self, movements: &[StockMovement]) -> Result<(), RepoError> {
        let mut wanted: HashMap<Uuid, u64> = HashMap::new();
        for m in movements {
            *wanted.entry(m.product_id).or_default() += u64::from(m.quantity);
        }
        let mut reserved = Vec::with_capacity(wanted.len());
        for (product_id, total) in wanted {
            let product = self
                .tables
                .products
                .get(&product_id)
                .ok_or(DomainError::ProductNotFound(product_id))?;
            let qty = u32::try_from(total)
                .ok()
                .filter(|qty| *qty <= product.available_stock)
                .ok_or(DomainError::InsufficientStock {
                    product_id,
                    requested: u32::try_from(total).unwrap_or(u32::MAX),
                    available: product.available_stock,
                })?;
            reserved.push((product_id, qty));
        }
        for (product_id, qty) in reserved {
            if let Some(mut p) = self.tables.products.get_mut(&product_id) {
                p.available_stock -= qty;
                p.reserved_stock = p.reserved_stock.saturating_add(qty);
            }
        }
        Ok(())
    }

    fn apply_stock(&self, effect: &StockEffect) {
        for m in &effect.release {
            if let Some(mut p) = self.tables.products.get_mut(&m.product_id) {
                p.available_stock = p.available_stock.saturating_add(m.quantity);
                p.reserved_stock = p.reserved_stock.saturating_sub(m.quantity);
            }
        }
        for m in &effect.settle {
            if let Some(mut p) = self.tables.products.get_mut(&m.product_id) {
                p.reserved_stock = p.reserved_stock.saturating_sub(m.quantity);
            }
        }
    }

    fn set_available(&self, driver_id: Uuid, available: bool) {
        if let Some(mut d) = self.tables.drivers.get_mut(&driver_id) {
            d.is_available = available;
        }
    }

    fn check_claimable(&self, driver_id: Uuid) -> Result<(), RepoError> {
        let driver = self
            .tables
            .drivers
            .get(&driver_id)
            .ok_or_else(|| DomainError::not_found("driver", driver_id))?;
        if !driver.is_available {
            return Err(DomainError::DriverUnavailable(driver_id).into());
        }
        Ok(())
    }

    /// Moves every open shipment of `order_id` to `status` and frees its
    /// driver.
    /// Closes the active shipments of an order that staff closed; the
    /// drivers go back to available.
    fn close_shipments(&self, order_id: Uuid, order_status: OrderStatus) -> Result<(), RepoError> {
        let open: Vec<(Uuid, ShipmentStatus)> = self
            .tables
            .shipments
            .iter()
            .filter(|s| s.order_id == order_id && s.is_active())
            .map(|s| s.status.closed_with(order_status).map(|next| (s.id, next)))
            .collect::<Result<_, DomainError>>()?;
        for (id, next) in open {
            let driver = self.tables.shipments.get_mut(&id).and_then(|mut s| {
                s.status = next;
                s.updated_at = chrono::Utc::now();
                s.driver_id
            });
            if let Some(driver_id) = driver {
                self.set_available(driver_id, true);
            }
        }
        Ok(())
    }

    fn latest_shipment_status(&self, store_order_id: Uuid) -> Option<ShipmentStatus> {
        self.tables
            .shipments
            .iter()
            .filter(|s| s.store_order_id == store_order_id)
            .max_by_key(|s| s.created_at)
            .map(|s| s.status)
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepo {
    async fn get_address(&self, id: Uuid) -> Result<Option<Address>, RepoError> {
        Ok(self.tables.addresses.get(&id).map(|r| r.clone()))
    }

    async fn insert_address(&self, address: Address) -> Result<Address, RepoError> {
        self.tables.addresses.insert(address.id, address.clone());
        Ok(address)
    }

    async fn get_store(&self, id: Uuid) -> Result<Option<Store>, RepoError> {
        Ok(self.tables.stores.get(&id).map(|r| r.clone()))
    }

    async fn stores_owned_by(&self, owner_id: Uuid) -> Result<Vec<Store>, RepoError> {
        Ok(self
            .tables
            .stores
            .iter()
            .filter(|s| s.owner_id == owner_id)
            .map(|s| s.value().clone())
            .collect())
    }

    async fn insert_store(&self, store: Store) -> Result<Store, RepoError> {
        self.tables.stores.insert(store.id, store.clone());
        Ok(store)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepoError> {
        Ok(self.tables.products.get(&id).map(|r| r.clone()))
    }

    async fn insert_product(&self, product: Product) -> Result<Product, RepoError> {
        self.tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get_variant(&self, id: Uuid) -> Result<Option<ProductVariant>, RepoError> {
        Ok(self.tables.variants.get(&id).map(|r| r.clone()))
    }

    async fn insert_variant(&self, variant: ProductVariant) -> Result<ProductVariant, RepoError> {
        self.tables.variants.insert(variant.id, variant.clone());
        Ok(variant)
    }

    async fn get_driver(&self, id: Uuid) -> Result<Option<Driver>, RepoError> {
        Ok(self.tables.drivers.get(&id).map(|r| r.clone()))
    }

    async fn driver_for_user(&self, user_id: Uuid) -> Result<Option<Driver>, RepoError> {
        Ok(self
            .tables
            .drivers
            .iter()
            .find(|d| d.user_id == user_id)
            .map(|d| d.value().clone()))
    }

    async fn insert_driver(&self, driver: Driver) -> Result<Driver, RepoError> {
        self.tables.drivers.insert(driver.id, driver.clone());
        Ok(driver)
    }

    async fn set_driver_availability(
        &self,
        id: Uuid,
        available: bool,
    ) -> Result<Option<Driver>, RepoError> {
        let _guard = self.write_lock()?;
        if let Some(mut d) = self.tables.drivers.get_mut(&id) {
            d.is_available = available;
            return Ok(Some(d.clone()));
        }
        Ok(None)
    }

    async fn list_rules(&self, active_only: bool) -> Result<Vec<DeliveryFeeRule>, RepoError> {
        let mut rules: Vec<DeliveryFeeRule> = self
            .tables
            .rules
            .iter()
            .filter(|r| !active_only || r.active)
            .map(|r| r.value().clone())
            .collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rules)
    }

    async fn insert_rule(&self, rule: DeliveryFeeRule) -> Result<DeliveryFeeRule, RepoError> {
        self.tables.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }
}

#[async_trait]
impl OrderRepository for InMemoryRepo {
    async fn place_order(&self, order: &Order, payment: &Payment) -> Result<(), RepoError> {
        let _guard = self.write_lock()?;
        self.reserve(&order.movements())?;
        for so in &order.store_orders {
            self.tables.store_order_index.insert(so.id, order.id);
        }
        self.tables.orders.insert(order.id, order.clone());
        self.tables.payments.insert(order.id, payment.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        Ok(self.tables.orders.get(&id).map(|r| r.clone()))
    }

    async fn get_store_order(&self, id: Uuid) -> Result<Option<StoreOrder>, RepoError> {
        let Some(order_id) = self.tables.store_order_index.get(&id).map(|r| *r) else {
            return Ok(None);
        };
        Ok(self
            .tables
            .orders
            .get(&order_id)
            .and_then(|o| o.store_order(id).cloned()))
    }

    async fn search_orders(&self, query: &OrderQuery) -> Result<Page<Order>, RepoError> {
        let mut hits: Vec<Order> = self
            .tables
            .orders
            .iter()
            .filter(|o| query.matches(o))
            .map(|o| o.value().clone())
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::slice(hits, query.pagination))
    }

    async fn search_store_orders(
        &self,
        query: &StoreOrderQuery,
    ) -> Result<Page<StoreOrderView>, RepoError> {
        let orders: Vec<Order> = self
            .tables
            .orders
            .iter()
            .map(|o| o.value().clone())
            .collect();
        let mut hits: Vec<StoreOrderView> = orders
            .into_iter()
            .flat_map(|o| {
                let (buyer_id, payment_method) = (o.buyer_id, o.payment_method);
                o.store_orders.into_iter().map(move |so| (buyer_id, payment_method, so))
            })
            .filter(|(_, _, so)| query.store_ids.contains(&so.store_id))
            .map(|(buyer_id, payment_method, so)| StoreOrderView {
                shipment_status: self.latest_shipment_status(so.id),
                store_order: so,
                buyer_id,
                payment_method,
            })
            .filter(|v| query.matches(v))
            .collect();
        hits.sort_by(|a, b| b.store_order.created_at.cmp(&a.store_order.created_at));
        Ok(Page::slice(hits, query.pagination))
    }

    async fn cancel_order(&self, id: Uuid) -> Result<Order, RepoError> {
        self.set_order_status(id, OrderStatus::Cancelled).await
    }

    async fn set_order_status(&self, id: Uuid, status: OrderStatus) -> Result<Order, RepoError> {
        let _guard = self.write_lock()?;
        let mut order = self.order_snapshot(id)?;
        let effect = order.transition_to(status)?;
        if status.is_terminal() {
            self.close_shipments(id, status)?;
        }
        self.apply_stock(&effect);
        self.tables.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn store_revenue(&self, store_id: Uuid) -> Result<i64, RepoError> {
        Ok(self
            .tables
            .orders
            .iter()
            .filter(|o| o.payment_status == PaymentStatus::Paid)
            .flat_map(|o| {
                o.store_orders
                    .iter()
                    .filter(|s| s.store_id == store_id && s.status == OrderStatus::Delivered)
                    .map(|s| s.items_total)
                    .collect::<Vec<_>>()
            })
            .sum())
    }
}

#[async_trait]
impl PaymentRepository for InMemoryRepo {
    async fn get_payment_for_order(&self, order_id: Uuid) -> Result<Option<Payment>, RepoError> {
        Ok(self.tables.payments.get(&order_id).map(|p| p.clone()))
    }

    async fn settle_payment(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
        transaction_id: Option<String>,
    ) -> Result<Payment, RepoError> {
        let _guard = self.write_lock()?;
        let mut payment = self
            .tables
            .payments
            .get(&order_id)
            .map(|p| p.clone())
            .ok_or_else(|| DomainError::not_found("payment for order", order_id))?;
        let mut order = self.order_snapshot(order_id)?;
        payment.settle(status, transaction_id)?;
        order.mirror_payment(payment.status);
        self.tables.orders.insert(order_id, order);
        self.tables.payments.insert(order_id, payment.clone());
        Ok(payment)
    }
}

#[async_trait]
impl ShipmentRepository for InMemoryRepo {
    async fn insert_shipment(&self, shipment: Shipment) -> Result<Shipment, RepoError> {
        let _guard = self.write_lock()?;
        let mut order = self.order_snapshot(shipment.order_id)?;
        order
            .store_order(shipment.store_order_id)
            .ok_or_else(|| DomainError::not_found("store order", shipment.store_order_id))?
            .ensure_shippable()?;
        let active = self
            .tables
            .shipments
            .iter()
            .any(|s| s.store_order_id == shipment.store_order_id && s.is_active());
        if active {
            return Err(DomainError::ShipmentAlreadyActive(shipment.store_order_id).into());
        }
        if let Some(driver_id) = shipment.driver_id {
            self.check_claimable(driver_id)?;
        }
        let effect = order.apply_shipment_status(shipment.store_order_id, shipment.status)?;

        if let Some(driver_id) = shipment.driver_id {
            self.set_available(driver_id, false);
        }
        self.apply_stock(&effect);
        self.tables.orders.insert(order.id, order);
        self.tables.shipments.insert(shipment.id, shipment.clone());
        Ok(shipment)
    }

    async fn get_shipment(&self, id: Uuid) -> Result<Option<Shipment>, RepoError> {
        Ok(self.tables.shipments.get(&id).map(|s| s.clone()))
    }

    async fn update_shipment(&self, id: Uuid, patch: ShipmentPatch) -> Result<Shipment, RepoError> {
        let _guard = self.write_lock()?;
        let mut shipment = self
            .tables
            .shipments
            .get(&id)
            .map(|s| s.clone())
            .ok_or_else(|| DomainError::not_found("shipment", id))?;
        let change = shipment.apply(patch)?;
        if let Some(driver_id) = change.claim_driver {
            self.check_claimable(driver_id)?;
        }
        let mut order = self.order_snapshot(shipment.order_id)?;
        let effect = match change.status_changed {
            Some(status) => order.apply_shipment_status(shipment.store_order_id, status)?,
            None => StockEffect::default(),
        };

        if let Some(driver_id) = change.release_driver {
            self.set_available(driver_id, true);
        }
        if let Some(driver_id) = change.claim_driver {
            self.set_available(driver_id, false);
        }
        self.apply_stock(&effect);
        self.tables.orders.insert(order.id, order);
        self.tables.shipments.insert(id, shipment.clone());
        Ok(shipment)
    }

    async fn search_shipments(&self, query: &ShipmentQuery) -> Result<Page<Shipment>, RepoError> {
        let mut hits: Vec<Shipment> = self
            .tables
            .shipments
            .iter()
            .filter(|s| query.matches(s))
            .map(|s| s.value().clone())
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::slice(hits, query.pagination))
    }

    async fn add_tracking(&self, ping: TrackingPing) -> Result<TrackingPing, RepoError> {
        if !self.tables.shipments.contains_key(&ping.shipment_id) {
            return Err(DomainError::not_found("shipment", ping.shipment_id).into());
        }
        self.tables
            .tracking
            .entry(ping.shipment_id)
            .or_default()
            .push(ping.clone());
        Ok(ping)
    }

    async fn list_tracking(&self, shipment_id: Uuid) -> Result<Vec<TrackingPing>, RepoError> {
        let mut pings = self
            .tables
            .tracking
            .get(&shipment_id)
            .map(|p| p.clone())
            .unwrap_or_default();
        pings.sort_by_key(|p| p.recorded_at);
        Ok(pings)
    }
}
