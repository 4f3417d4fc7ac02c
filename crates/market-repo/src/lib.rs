#[cfg(not(any(feature = "memory", feature = "sqlite")))]
compile_error!("Enable a repo feature: `memory` or `sqlite`.");

use std::time::Duration;

use async_trait::async_trait;
use market_types::domain::address::Address;
use market_types::domain::catalog::{Driver, Product, ProductVariant, Store};
use market_types::domain::delivery::DeliveryFeeRule;
use market_types::domain::order::{Order, StoreOrder};
use market_types::domain::payment::Payment;
use market_types::domain::query::{
    OrderQuery, Page, ShipmentQuery, StoreOrderQuery, StoreOrderView,
};
use market_types::domain::shipment::{Shipment, ShipmentPatch, TrackingPing};
use market_types::domain::status::{OrderStatus, PaymentStatus};
use market_types::ports::repository::{
    CatalogRepository, OrderRepository, PaymentRepository, RepoError, ShipmentRepository,
};
use uuid::Uuid;

#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Used when the sqlite backend is the only one compiled in and no URL is
/// configured.
pub const DEFAULT_SQLITE_URL: &str = "sqlite://data/market.db";

/// The backend picked at startup. Every port call is forwarded to exactly
/// one adapter.
pub enum Repo {
    #[cfg(feature = "memory")]
    Memory(memory::InMemoryRepo),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteRepo),
}

/// `sqlite:` URLs select the sqlite backend, `None` or `"memory"` the
/// in-memory one. With only sqlite compiled in, `None` falls back to
/// [`DEFAULT_SQLITE_URL`].
pub async fn build_repo(url: Option<&str>, busy_timeout: Duration) -> anyhow::Result<Repo> {
    #[cfg(feature = "sqlite")]
    {
        if let Some(url) = url.filter(|u| u.starts_with("sqlite:")) {
            tracing::info!(url, "using sqlite repository");
            return Ok(Repo::Sqlite(
                sqlite::SqliteRepo::connect(url, busy_timeout).await?,
            ));
        }
    }
    #[cfg(feature = "memory")]
    {
        if url.map_or(true, |u| u == "memory") {
            tracing::info!("using in-memory repository");
            return Ok(Repo::Memory(memory::InMemoryRepo::new()));
        }
    }
    #[cfg(all(feature = "sqlite", not(feature = "memory")))]
    {
        if url.is_none() {
            tracing::info!(url = DEFAULT_SQLITE_URL, "using sqlite repository");
            return Ok(Repo::Sqlite(
                sqlite::SqliteRepo::connect(DEFAULT_SQLITE_URL, busy_timeout).await?,
            ));
        }
    }
    let _ = busy_timeout;
    anyhow::bail!("DATABASE_URL {url:?} does not match an enabled repo backend")
}

macro_rules! dispatch {
    ($self:ident, $repo:ident => $call:expr) => {
        match $self {
            #[cfg(feature = "memory")]
            Repo::Memory($repo) => $call,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite($repo) => $call,
        }
    };
}

#[async_trait]
impl CatalogRepository for Repo {
    async fn get_address(&self, id: Uuid) -> Result<Option<Address>, RepoError> {
        dispatch!(self, r => r.get_address(id).await)
    }

    async fn insert_address(&self, address: Address) -> Result<Address, RepoError> {
        dispatch!(self, r => r.insert_address(address).await)
    }

    async fn get_store(&self, id: Uuid) -> Result<Option<Store>, RepoError> {
        dispatch!(self, r => r.get_store(id).await)
    }

    async fn stores_owned_by(&self, owner_id: Uuid) -> Result<Vec<Store>, RepoError> {
        dispatch!(self, r => r.stores_owned_by(owner_id).await)
    }

    async fn insert_store(&self, store: Store) -> Result<Store, RepoError> {
        dispatch!(self, r => r.insert_store(store).await)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepoError> {
        dispatch!(self, r => r.get_product(id).await)
    }

    async fn insert_product(&self, product: Product) -> Result<Product, RepoError> {
        dispatch!(self, r => r.insert_product(product).await)
    }

    async fn get_variant(&self, id: Uuid) -> Result<Option<ProductVariant>, RepoError> {
        dispatch!(self, r => r.get_variant(id).await)
    }

    async fn insert_variant(&self, variant: ProductVariant) -> Result<ProductVariant, RepoError> {
        dispatch!(self, r => r.insert_variant(variant).await)
    }

    async fn get_driver(&self, id: Uuid) -> Result<Option<Driver>, RepoError> {
        dispatch!(self, r => r.get_driver(id).await)
    }

    async fn driver_for_user(&self, user_id: Uuid) -> Result<Option<Driver>, RepoError> {
        dispatch!(self, r => r.driver_for_user(user_id).await)
    }

    async fn insert_driver(&self, driver: Driver) -> Result<Driver, RepoError> {
        dispatch!(self, r => r.insert_driver(driver).await)
    }

    async fn set_driver_availability(
        &self,
        id: Uuid,
        available: bool,
    ) -> Result<Option<Driver>, RepoError> {
        dispatch!(self, r => r.set_driver_availability(id, available).await)
    }

    async fn list_rules(&self, active_only: bool) -> Result<Vec<DeliveryFeeRule>, RepoError> {
        dispatch!(self, r => r.list_rules(active_only).await)
    }

    async fn insert_rule(&self, rule: DeliveryFeeRule) -> Result<DeliveryFeeRule, RepoError> {
        dispatch!(self, r => r.insert_rule(rule).await)
    }
}

#[async_trait]
impl OrderRepository for Repo {
    async fn place_order(&self, order: &Order, payment: &Payment) -> Result<(), RepoError> {
        dispatch!(self, r => r.place_order(order, payment).await)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        dispatch!(self, r => r.get_order(id).await)
    }

    async fn get_store_order(&self, id: Uuid) -> Result<Option<StoreOrder>, RepoError> {
        dispatch!(self, r => r.get_store_order(id).await)
    }

    async fn search_orders(&self, query: &OrderQuery) -> Result<Page<Order>, RepoError> {
        dispatch!(self, r => r.search_orders(query).await)
    }

    async fn search_store_orders(
        &self,
        query: &StoreOrderQuery,
    ) -> Result<Page<StoreOrderView>, RepoError> {
        dispatch!(self, r => r.search_store_orders(query).await)
    }

    async fn cancel_order(&self, id: Uuid) -> Result<Order, RepoError> {
        dispatch!(self, r => r.cancel_order(id).await)
    }

    async fn set_order_status(&self, id: Uuid, status: OrderStatus) -> Result<Order, RepoError> {
        dispatch!(self, r => r.set_order_status(id, status).await)
    }

    async fn store_revenue(&self, store_id: Uuid) -> Result<i64, RepoError> {
        dispatch!(self, r => r.store_revenue(store_id).await)
    }
}

#[async_trait]
impl PaymentRepository for Repo {
    async fn get_payment_for_order(&self, order_id: Uuid) -> Result<Option<Payment>, RepoError> {
        dispatch!(self, r => r.get_payment_for_order(order_id).await)
    }

    async fn settle_payment(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
        transaction_id: Option<String>,
    ) -> Result<Payment, RepoError> {
        dispatch!(self, r => r.settle_payment(order_id, status, transaction_id).await)
    }
}

#[async_trait]
impl ShipmentRepository for Repo {
    async fn insert_shipment(&self, shipment: Shipment) -> Result<Shipment, RepoError> {
        dispatch!(self, r => r.insert_shipment(shipment).await)
    }

    async fn get_shipment(&self, id: Uuid) -> Result<Option<Shipment>, RepoError> {
        dispatch!(self, r => r.get_shipment(id).await)
    }

    async fn update_shipment(&self, id: Uuid, patch: ShipmentPatch) -> Result<Shipment, RepoError> {
        dispatch!(self, r => r.update_shipment(id, patch).await)
    }

    async fn search_shipments(&self, query: &ShipmentQuery) -> Result<Page<Shipment>, RepoError> {
        dispatch!(self, r => r.search_shipments(query).await)
    }

    async fn add_tracking(&self, ping: TrackingPing) -> Result<TrackingPing, RepoError> {
        dispatch!(self, r => r.add_tracking(ping).await)
    }

    async fn list_tracking(&self, shipment_id: Uuid) -> Result<Vec<TrackingPing>, RepoError> {
        dispatch!(self, r => r.list_tracking(shipment_id).await)
    }
}
