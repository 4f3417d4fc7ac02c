use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::address::Address;
use crate::domain::catalog::{Driver, Product, ProductVariant, Store};
use crate::domain::delivery::DeliveryFeeRule;
use crate::domain::error::DomainError;
use crate::domain::order::{Order, StoreOrder};
use crate::domain::payment::Payment;
use crate::domain::query::{OrderQuery, Page, ShipmentQuery, StoreOrderQuery, StoreOrderView};
use crate::domain::shipment::{Shipment, ShipmentPatch, TrackingPing};
use crate::domain::status::{OrderStatus, PaymentStatus};

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("db error: {0}")]
    DbError(String),

    /// A business rule rejected the write inside the adapter's transaction
    /// (stock race, driver already taken, illegal transition).
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Reference data the fulfillment core reads: addresses, stores, products,
/// drivers and fee rules. The inserts exist for seeding.
#[async_trait]
pub trait CatalogRepository: Send + Sync + 'static {
    async fn get_address(&self, id: Uuid) -> Result<Option<Address>, RepoError>;
    async fn insert_address(&self, address: Address) -> Result<Address, RepoError>;

    async fn get_store(&self, id: Uuid) -> Result<Option<Store>, RepoError>;
    async fn stores_owned_by(&self, owner_id: Uuid) -> Result<Vec<Store>, RepoError>;
    async fn insert_store(&self, store: Store) -> Result<Store, RepoError>;

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepoError>;
    async fn insert_product(&self, product: Product) -> Result<Product, RepoError>;
    async fn get_variant(&self, id: Uuid) -> Result<Option<ProductVariant>, RepoError>;
    async fn insert_variant(&self, variant: ProductVariant) -> Result<ProductVariant, RepoError>;

    async fn get_driver(&self, id: Uuid) -> Result<Option<Driver>, RepoError>;
    async fn driver_for_user(&self, user_id: Uuid) -> Result<Option<Driver>, RepoError>;
    async fn insert_driver(&self, driver: Driver) -> Result<Driver, RepoError>;
    async fn set_driver_availability(
        &self,
        id: Uuid,
        available: bool,
    ) -> Result<Option<Driver>, RepoError>;

    async fn list_rules(&self, active_only: bool) -> Result<Vec<DeliveryFeeRule>, RepoError>;
    async fn insert_rule(&self, rule: DeliveryFeeRule) -> Result<DeliveryFeeRule, RepoError>;
}

/// Orders, sub-orders and their payment record. Every mutating call is one
/// transaction in the adapter.
#[async_trait]
pub trait OrderRepository: Send + Sync + 'static {
    /// Reserves stock for every item (conditional decrement) and persists the
    /// order, its sub-orders, items and payment. All or nothing; a lost stock
    /// race yields `DomainError::InsufficientStock`.
    async fn place_order(&self, order: &Order, payment: &Payment) -> Result<(), RepoError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepoError>;
    async fn get_store_order(&self, id: Uuid) -> Result<Option<StoreOrder>, RepoError>;
    async fn search_orders(&self, query: &OrderQuery) -> Result<Page<Order>, RepoError>;
    async fn search_store_orders(
        &self,
        query: &StoreOrderQuery,
    ) -> Result<Page<StoreOrderView>, RepoError>;

    /// Cancels the order, releases reserved stock, fails open shipments and
    /// frees their drivers.
    async fn cancel_order(&self, id: Uuid) -> Result<Order, RepoError>;

    /// Staff status change. `Cancelled` behaves like `cancel_order`.
    async fn set_order_status(&self, id: Uuid, status: OrderStatus) -> Result<Order, RepoError>;

    /// Sum of item totals of delivered sub-orders of `store_id` whose order
    /// payment is `paid`.
    async fn store_revenue(&self, store_id: Uuid) -> Result<i64, RepoError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync + 'static {
    async fn get_payment_for_order(&self, order_id: Uuid) -> Result<Option<Payment>, RepoError>;

    /// Moves the payment along its state machine and mirrors the new status
    /// onto the order and its sub-orders.
    async fn settle_payment(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
        transaction_id: Option<String>,
    ) -> Result<Payment, RepoError>;
}

#[async_trait]
pub trait ShipmentRepository: Send + Sync + 'static {
    /// Fails with `ShipmentAlreadyActive` when the sub-order has a
    /// non-terminal shipment and with `DriverUnavailable` when the driver
    /// cannot be claimed.
    async fn insert_shipment(&self, shipment: Shipment) -> Result<Shipment, RepoError>;

    async fn get_shipment(&self, id: Uuid) -> Result<Option<Shipment>, RepoError>;

    /// Applies `patch`, claims/releases drivers and propagates the status to
    /// the sub-order and order in one transaction.
    async fn update_shipment(&self, id: Uuid, patch: ShipmentPatch) -> Result<Shipment, RepoError>;

    async fn search_shipments(&self, query: &ShipmentQuery) -> Result<Page<Shipment>, RepoError>;

    async fn add_tracking(&self, ping: TrackingPing) -> Result<TrackingPing, RepoError>;
    async fn list_tracking(&self, shipment_id: Uuid) -> Result<Vec<TrackingPing>, RepoError>;
}

/// Everything the services need from persistence.
pub trait MarketRepository:
    CatalogRepository + OrderRepository + PaymentRepository + ShipmentRepository
{
}

impl<T> MarketRepository for T where
    T: CatalogRepository + OrderRepository + PaymentRepository + ShipmentRepository
{
}
