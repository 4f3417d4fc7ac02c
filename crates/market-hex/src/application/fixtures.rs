//! Two-store catalogue shared by the service unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use market_repo::memory::InMemoryRepo;
use market_types::api::{CartLine, CreateOrderRequest, OrderData};
use market_types::domain::actor::{Actor, Role};
use market_types::domain::address::{Address, AddressLocation, Coordinates};
use market_types::domain::catalog::{Driver, Product, ProductVariant, Store};
use market_types::domain::delivery::{DeliveryFeeRule, DeliveryType, VehicleType};
use market_types::domain::notification::Notification;
use market_types::domain::order::{Order, StoreOrder};
use market_types::domain::payment::Payment;
use market_types::domain::query::{OrderQuery, Page, ShipmentQuery, StoreOrderQuery, StoreOrderView};
use market_types::domain::shipment::{Shipment, ShipmentPatch, TrackingPing};
use market_types::domain::status::{OrderStatus, PaymentStatus};
use market_types::ports::repository::{
    CatalogRepository, OrderRepository, PaymentRepository, RepoError, ShipmentRepository,
};
use rust_decimal::Decimal;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use crate::application::Marketplace;
use crate::outbound::notifier::ChannelNotifier;

pub const CALLBACK_TOKEN: &str = "s3cret";

pub struct World {
    pub market: Marketplace<InMemoryRepo>,
    pub repo: InMemoryRepo,
    pub inbox: UnboundedReceiver<Notification>,
    pub buyer: Actor,
    pub admin: Actor,
    pub manager: Actor,
    pub near_owner: Actor,
    pub far_owner: Actor,
    pub driver_user: Actor,
    pub home: Uuid,
    pub nowhere: Uuid,
    pub near_store: Uuid,
    pub far_store: Uuid,
    /// 1000 g, price 1000, stock 5, sold by the near store.
    pub widget: Uuid,
    /// 3000 g, price 2000, stock 10, sold by the far store.
    pub crate_: Uuid,
    pub driver_id: Uuid,
    pub near_rule: DeliveryFeeRule,
    pub far_rule: DeliveryFeeRule,
}

fn address(user_id: Uuid, lat: f64, lng: f64) -> Address {
    Address {
        id: Uuid::new_v4(),
        user_id,
        location: AddressLocation::Urban {
            commune: "Ratoma".into(),
            district: "Kipé".into(),
            landmark: None,
            street: None,
        },
        coordinates: Coordinates::new(lat, lng),
        region: "Conakry".into(),
        postal_code: None,
        formatted: "Kipé, Ratoma".into(),
    }
}

pub fn rule(weight_max_grams: u32, distance_max_km: f64, base_fee: i64) -> DeliveryFeeRule {
    DeliveryFeeRule {
        id: Uuid::new_v4(),
        delivery_type: DeliveryType::Standard,
        vehicle_type: None,
        weight_max_grams,
        distance_max_km,
        included_weight_grams: 500,
        included_distance_km: 2.0,
        base_fee,
        weight_surcharge_rate: Decimal::new(5, 1),
        distance_surcharge_rate: Decimal::from(100),
        min_fee: base_fee,
        max_fee: base_fee * 10,
        active: true,
    }
}

pub async fn world() -> World {
    let repo = InMemoryRepo::new();
    let actor = |role| Actor::new(Uuid::new_v4(), role);
    let (buyer, near_owner, far_owner, driver_user) = (
        actor(Role::Buyer),
        actor(Role::Store),
        actor(Role::Store),
        actor(Role::Driver),
    );

    let home = repo
        .insert_address(address(buyer.user_id, 9.5370, -13.6785))
        .await
        .unwrap();
    let nowhere = repo
        .insert_address(address(buyer.user_id, 0.0, 0.0))
        .await
        .unwrap();
    // About 5 km and 40 km north of `home`.
    let near_origin = repo
        .insert_address(address(near_owner.user_id, 9.5820, -13.6785))
        .await
        .unwrap();
    let far_origin = repo
        .insert_address(address(far_owner.user_id, 9.8967, -13.6785))
        .await
        .unwrap();

    let near_store = repo
        .insert_store(Store {
            id: Uuid::new_v4(),
            owner_id: near_owner.user_id,
            name: "Boutique Kipé".into(),
            address_id: near_origin.id,
        })
        .await
        .unwrap();
    let far_store = repo
        .insert_store(Store {
            id: Uuid::new_v4(),
            owner_id: far_owner.user_id,
            name: "Dépôt Coyah".into(),
            address_id: far_origin.id,
        })
        .await
        .unwrap();

    let product = |store_id, name: &str, weight_grams, price, stock| Product {
        id: Uuid::new_v4(),
        store_id,
        name: name.into(),
        price,
        weight_grams,
        available_stock: stock,
        reserved_stock: 0,
    };
    let widget = repo
        .insert_product(product(near_store.id, "Widget", 1_000, 1_000, 5))
        .await
        .unwrap();
    let crate_ = repo
        .insert_product(product(far_store.id, "Crate", 3_000, 2_000, 10))
        .await
        .unwrap();

    let driver = repo
        .insert_driver(Driver {
            id: Uuid::new_v4(),
            user_id: driver_user.user_id,
            name: "Mamadou".into(),
            vehicle_type: VehicleType::Moto,
            is_available: true,
        })
        .await
        .unwrap();

    let near_rule = repo.insert_rule(rule(2_000, 10.0, 3_000)).await.unwrap();
    let far_rule = repo.insert_rule(rule(10_000, 50.0, 5_000)).await.unwrap();

    let (notifier, inbox) = ChannelNotifier::new();
    let market = Marketplace::new(
        repo.clone(),
        Arc::new(notifier),
        Some(CALLBACK_TOKEN.to_string()),
    );

    World {
        market,
        repo,
        inbox,
        buyer,
        admin: actor(Role::Admin),
        manager: actor(Role::Manager),
        near_owner,
        far_owner,
        driver_user,
        home: home.id,
        nowhere: nowhere.id,
        near_store: near_store.id,
        far_store: far_store.id,
        widget: widget.id,
        crate_: crate_.id,
        driver_id: driver.id,
        near_rule,
        far_rule,
    }
}

pub fn line(product_id: Uuid, quantity: u32) -> CartLine {
    CartLine {
        product_id,
        quantity,
        variant_id: None,
    }
}

pub fn cart(destination: Uuid, items: Vec<CartLine>) -> CreateOrderRequest {
    CreateOrderRequest {
        order_data: OrderData {
            destination_address_id: destination,
            delivery_type: DeliveryType::Standard,
            vehicle_type: None,
            payment_method: Default::default(),
            delivery_notes: Some("call on arrival".into()),
        },
        items,
    }
}

impl World {
    /// One widget from the near store and two crates from the far store.
    pub async fn two_store_order(&self) -> Order {
        self.market
            .orders
            .create_order(
                &self.buyer,
                cart(self.home, vec![line(self.widget, 1), line(self.crate_, 2)]),
            )
            .await
            .unwrap()
    }

    pub fn drain(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.inbox.try_recv() {
            out.push(n);
        }
        out
    }
}

/// Shares the in-memory tables but fails every store lookup, as a database
/// that drops the connection between a commit and the follow-up reads would.
pub struct StoreLookupDown(pub InMemoryRepo);

#[async_trait]
impl CatalogRepository for StoreLookupDown {
    async fn get_address(&self, id: Uuid) -> Result<Option<Address>, RepoError> {
        self.0.get_address(id).await
    }
    async fn insert_address(&self, address: Address) -> Result<Address, RepoError> {
        self.0.insert_address(address).await
    }
    async fn get_store(&self, _id: Uuid) -> Result<Option<Store>, RepoError> {
        Err(RepoError::DbError("connection reset".into()))
    }
    async fn stores_owned_by(&self, owner_id: Uuid) -> Result<Vec<Store>, RepoError> {
        self.0.stores_owned_by(owner_id).await
    }
    async fn insert_store(&self, store: Store) -> Result<Store, RepoError> {
        self.0.insert_store(store).await
    }
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepoError> {
        self.0.get_product(id).await
    }
    async fn insert_product(&self, product: Product) -> Result<Product, RepoError> {
        self.0.insert_product(product).await
    }
    async fn get_variant(&self, id: Uuid) -> Result<Option<ProductVariant>, RepoError> {
        self.0.get_variant(id).await
    }
    async fn insert_variant(&self, variant: ProductVariant) -> Result<ProductVariant, RepoError> {
        self.0.insert_variant(variant).await
    }
    async fn get_driver(&self, id: Uuid) -> Result<Option<Driver>, RepoError> {
        self.0.get_driver(id).await
    }
    async fn driver_for_user(&self, user_id: Uuid) -> Result<Option<Driver>, RepoError> {
        self.0.driver_for_user(user_id).await
    }
    async fn insert_driver(&self, driver: Driver) -> Result<Driver, RepoError> {
        self.0.insert_driver(driver).await
    }
    async fn set_driver_availability(
        &self,
        id: Uuid,
        available: bool,
    ) -> Result<Option<Driver>, RepoError> {
        self.0.set_driver_availability(id, available).await
    }
    async fn list_rules(&self, active_only: bool) -> Result<Vec<DeliveryFeeRule>, RepoError> {
        self.0.list_rules(active_only).await
    }
    async fn insert_rule(&self, rule: DeliveryFeeRule) -> Result<DeliveryFeeRule, RepoError> {
        self.0.insert_rule(rule).await
    }
}

#[async_trait]
impl OrderRepository for StoreLookupDown {
    async fn place_order(&self, order: &Order, payment: &Payment) -> Result<(), RepoError> {
        self.0.place_order(order, payment).await
    }
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        self.0.get_order(id).await
    }
    async fn get_store_order(&self, id: Uuid) -> Result<Option<StoreOrder>, RepoError> {
        self.0.get_store_order(id).await
    }
    async fn search_orders(&self, query: &OrderQuery) -> Result<Page<Order>, RepoError> {
        self.0.search_orders(query).await
    }
    async fn search_store_orders(
        &self,
        query: &StoreOrderQuery,
    ) -> Result<Page<StoreOrderView>, RepoError> {
        self.0.search_store_orders(query).await
    }
    async fn cancel_order(&self, id: Uuid) -> Result<Order, RepoError> {
        self.0.cancel_order(id).await
    }
    async fn set_order_status(&self, id: Uuid, status: OrderStatus) -> Result<Order, RepoError> {
        self.0.set_order_status(id, status).await
    }
    async fn store_revenue(&self, store_id: Uuid) -> Result<i64, RepoError> {
        self.0.store_revenue(store_id).await
    }
}

#[async_trait]
impl PaymentRepository for StoreLookupDown {
    async fn get_payment_for_order(&self, order_id: Uuid) -> Result<Option<Payment>, RepoError> {
        self.0.get_payment_for_order(order_id).await
    }
    async fn settle_payment(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
        transaction_id: Option<String>,
    ) -> Result<Payment, RepoError> {
        self.0.settle_payment(order_id, status, transaction_id).await
    }
}

#[async_trait]
impl ShipmentRepository for StoreLookupDown {
    async fn insert_shipment(&self, shipment: Shipment) -> Result<Shipment, RepoError> {
        self.0.insert_shipment(shipment).await
    }
    async fn get_shipment(&self, id: Uuid) -> Result<Option<Shipment>, RepoError> {
        self.0.get_shipment(id).await
    }
    async fn update_shipment(&self, id: Uuid, patch: ShipmentPatch) -> Result<Shipment, RepoError> {
        self.0.update_shipment(id, patch).await
    }
    async fn search_shipments(&self, query: &ShipmentQuery) -> Result<Page<Shipment>, RepoError> {
        self.0.search_shipments(query).await
    }
    async fn add_tracking(&self, ping: TrackingPing) -> Result<TrackingPing, RepoError> {
        self.0.add_tracking(ping).await
    }
    async fn list_tracking(&self, shipment_id: Uuid) -> Result<Vec<TrackingPing>, RepoError> {
        self.0.list_tracking(shipment_id).await
    }
}
