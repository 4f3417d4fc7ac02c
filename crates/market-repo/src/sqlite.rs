use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use market_types::domain::address::{Address, AddressLocation, Coordinates};
use market_types::domain::catalog::{Driver, Product, ProductVariant, StockMovement, Store};
use market_types::domain::delivery::DeliveryFeeRule;
use market_types::domain::error::DomainError;
use market_types::domain::order::{Order, OrderItem, StockEffect, StoreOrder};
use market_types::domain::payment::Payment;
use market_types::domain::query::{
    OrderQuery, Page, Pagination, ShipmentQuery, StoreOrderQuery, StoreOrderView,
};
use market_types::domain::shipment::{Shipment, ShipmentPatch, TrackingPing};
use market_types::domain::status::{OrderStatus, PaymentStatus, ShipmentStatus, StatusMachine};
use market_types::ports::repository::{
    CatalogRepository, OrderRepository, PaymentRepository, RepoError, ShipmentRepository,
};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteRepo {
    pool: SqlitePool,
}

fn db(e: impl ToString) -> RepoError {
    RepoError::DbError(e.to_string())
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, RepoError> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(db)?
        .with_timezone(&Utc))
}

fn parse_id(raw: &str) -> Result<Uuid, RepoError> {
    Uuid::parse_str(raw).map_err(db)
}

fn parse_opt_id(raw: Option<String>) -> Result<Option<Uuid>, RepoError> {
    raw.as_deref().map(parse_id).transpose()
}

fn label<T>(raw: &str) -> Result<T, RepoError>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse().map_err(|e: DomainError| db(e))
}

fn count(v: i64) -> Result<u32, RepoError> {
    u32::try_from(v).map_err(db)
}

#[derive(FromRow)]
struct DbAddress {
    id: String,
    user_id: String,
    location_json: String,
    latitude: f64,
    longitude: f64,
    region: String,
    postal_code: Option<String>,
    formatted: String,
}

impl DbAddress {
    fn into_address(self) -> Result<Address, RepoError> {
        let location: AddressLocation = serde_json::from_str(&self.location_json).map_err(db)?;
        Ok(Address {
            id: parse_id(&self.id)?,
            user_id: parse_id(&self.user_id)?,
            location,
            coordinates: Coordinates::new(self.latitude, self.longitude),
            region: self.region,
            postal_code: self.postal_code,
            formatted: self.formatted,
        })
    }
}

#[derive(FromRow)]
struct DbStore {
    id: String,
    owner_id: String,
    name: String,
    address_id: String,
}

impl DbStore {
    fn into_store(self) -> Result<Store, RepoError> {
        Ok(Store {
            id: parse_id(&self.id)?,
            owner_id: parse_id(&self.owner_id)?,
            name: self.name,
            address_id: parse_id(&self.address_id)?,
        })
    }
}

#[derive(FromRow)]
struct DbProduct {
    id: String,
    store_id: String,
    name: String,
    price: i64,
    weight_grams: i64,
    available_stock: i64,
    reserved_stock: i64,
}

impl DbProduct {
    fn into_product(self) -> Result<Product, RepoError> {
        Ok(Product {
            id: parse_id(&self.id)?,
            store_id: parse_id(&self.store_id)?,
            name: self.name,
            price: self.price,
            weight_grams: count(self.weight_grams)?,
            available_stock: count(self.available_stock)?,
            reserved_stock: count(self.reserved_stock)?,
        })
    }
}

#[derive(FromRow)]
struct DbVariant {
    id: String,
    product_id: String,
    name: String,
    price: Option<i64>,
}

impl DbVariant {
    fn into_variant(self) -> Result<ProductVariant, RepoError> {
        Ok(ProductVariant {
            id: parse_id(&self.id)?,
            product_id: parse_id(&self.product_id)?,
            name: self.name,
            price: self.price,
        })
    }
}

#[derive(FromRow)]
struct DbDriver {
    id: String,
    user_id: String,
    name: String,
    vehicle_type: String,
    is_available: bool,
}

impl DbDriver {
    fn into_driver(self) -> Result<Driver, RepoError> {
        Ok(Driver {
            id: parse_id(&self.id)?,
            user_id: parse_id(&self.user_id)?,
            name: self.name,
            vehicle_type: label(&self.vehicle_type)?,
            is_available: self.is_available,
        })
    }
}

#[derive(FromRow)]
struct DbRule {
    id: String,
    delivery_type: String,
    vehicle_type: Option<String>,
    weight_max_grams: i64,
    distance_max_km: f64,
    included_weight_grams: i64,
    included_distance_km: f64,
    base_fee: i64,
    weight_surcharge_rate: String,
    distance_surcharge_rate: String,
    min_fee: i64,
    max_fee: i64,
    active: bool,
}

impl DbRule {
    fn into_rule(self) -> Result<DeliveryFeeRule, RepoError> {
        Ok(DeliveryFeeRule {
            id: parse_id(&self.id)?,
            delivery_type: label(&self.delivery_type)?,
            vehicle_type: self.vehicle_type.as_deref().map(label).transpose()?,
            weight_max_grams: count(self.weight_max_grams)?,
            distance_max_km: self.distance_max_km,
            included_weight_grams: count(self.included_weight_grams)?,
            included_distance_km: self.included_distance_km,
            base_fee: self.base_fee,
            weight_surcharge_rate: Decimal::from_str(&self.weight_surcharge_rate).map_err(db)?,
            distance_surcharge_rate: Decimal::from_str(&self.distance_surcharge_rate)
                .map_err(db)?,
            min_fee: self.min_fee,
            max_fee: self.max_fee,
            active: self.active,
        })
    }
}

const ORDER_COLUMNS: &str = "id, buyer_id, destination_address_id, status, payment_status, \
     delivery_type, vehicle_type, payment_method, items_total, total_delivery_fee, total_amount, \
     created_at, updated_at";

#[derive(FromRow)]
struct DbOrder {
    id: String,
    buyer_id: String,
    destination_address_id: String,
    status: String,
    payment_status: String,
    delivery_type: String,
    vehicle_type: Option<String>,
    payment_method: String,
    items_total: i64,
    total_delivery_fee: i64,
    total_amount: i64,
    created_at: String,
    updated_at: String,
}

impl DbOrder {
    fn into_order(self, store_orders: Vec<StoreOrder>) -> Result<Order, RepoError> {
        Ok(Order {
            id: parse_id(&self.id)?,
            buyer_id: parse_id(&self.buyer_id)?,
            destination_address_id: parse_id(&self.destination_address_id)?,
            status: label(&self.status)?,
            payment_status: label(&self.payment_status)?,
            delivery_type: label(&self.delivery_type)?,
            vehicle_type: self.vehicle_type.as_deref().map(label).transpose()?,
            payment_method: label(&self.payment_method)?,
            items_total: self.items_total,
            total_delivery_fee: self.total_delivery_fee,
            total_amount: self.total_amount,
            store_orders,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

const STORE_ORDER_COLUMNS: &str = "id, order_id, store_id, status, payment_status, delivery_fee, \
     items_total, rule_id, distance_km, weight_grams, delivery_notes, created_at, updated_at";

#[derive(FromRow)]
struct DbStoreOrder {
    id: String,
    order_id: String,
    store_id: String,
    status: String,
    payment_status: String,
    delivery_fee: i64,
    items_total: i64,
    rule_id: Option<String>,
    distance_km: f64,
    weight_grams: i64,
    delivery_notes: Option<String>,
    created_at: String,
    updated_at: String,
}

impl DbStoreOrder {
    fn into_store_order(self, items: Vec<OrderItem>) -> Result<StoreOrder, RepoError> {
        Ok(StoreOrder {
            id: parse_id(&self.id)?,
            order_id: parse_id(&self.order_id)?,
            store_id: parse_id(&self.store_id)?,
            status: label(&self.status)?,
            payment_status: label(&self.payment_status)?,
            delivery_fee: self.delivery_fee,
            items_total: self.items_total,
            rule_id: parse_opt_id(self.rule_id)?,
            distance_km: self.distance_km,
            weight_grams: count(self.weight_grams)?,
            delivery_notes: self.delivery_notes,
            items,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

/// A sub-order row joined with the parent order fields and the status of
/// its most recent shipment.
#[derive(FromRow)]
struct DbStoreOrderView {
    id: String,
    order_id: String,
    store_id: String,
    status: String,
    payment_status: String,
    delivery_fee: i64,
    items_total: i64,
    rule_id: Option<String>,
    distance_km: f64,
    weight_grams: i64,
    delivery_notes: Option<String>,
    created_at: String,
    updated_at: String,
    buyer_id: String,
    payment_method: String,
    shipment_status: Option<String>,
}

impl DbStoreOrderView {
    fn split(self) -> (DbStoreOrder, String, String, Option<String>) {
        let store_order = DbStoreOrder {
            id: self.id,
            order_id: self.order_id,
            store_id: self.store_id,
            status: self.status,
            payment_status: self.payment_status,
            delivery_fee: self.delivery_fee,
            items_total: self.items_total,
            rule_id: self.rule_id,
            distance_km: self.distance_km,
            weight_grams: self.weight_grams,
            delivery_notes: self.delivery_notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        (store_order, self.buyer_id, self.payment_method, self.shipment_status)
    }
}

#[derive(FromRow)]
struct DbItem {
    id: String,
    store_order_id: String,
    product_id: String,
    variant_id: Option<String>,
    quantity: i64,
    unit_price: i64,
}

impl DbItem {
    fn into_item(self) -> Result<OrderItem, RepoError> {
        Ok(OrderItem {
            id: parse_id(&self.id)?,
            store_order_id: parse_id(&self.store_order_id)?,
            product_id: parse_id(&self.product_id)?,
            variant_id: parse_opt_id(self.variant_id)?,
            quantity: count(self.quantity)?,
            unit_price: self.unit_price,
        })
    }
}

#[derive(FromRow)]
struct DbPayment {
    id: String,
    order_id: String,
    amount: i64,
    method: String,
    status: String,
    transaction_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl DbPayment {
    fn into_payment(self) -> Result<Payment, RepoError> {
        Ok(Payment {
            id: parse_id(&self.id)?,
            order_id: parse_id(&self.order_id)?,
            amount: self.amount,
            method: label(&self.method)?,
            status: label(&self.status)?,
            transaction_id: self.transaction_id,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

const SHIPMENT_COLUMNS: &str = "id, store_order_id, order_id, store_id, driver_id, status, \
     priority, managed_by_store, delivery_notes, created_at, updated_at";

#[derive(FromRow)]
struct DbShipment {
    id: String,
    store_order_id: String,
    order_id: String,
    store_id: String,
    driver_id: Option<String>,
    status: String,
    priority: String,
    managed_by_store: bool,
    delivery_notes: Option<String>,
    created_at: String,
    updated_at: String,
}

impl DbShipment {
    fn into_shipment(self) -> Result<Shipment, RepoError> {
        Ok(Shipment {
            id: parse_id(&self.id)?,
            store_order_id: parse_id(&self.store_order_id)?,
            order_id: parse_id(&self.order_id)?,
            store_id: parse_id(&self.store_id)?,
            driver_id: parse_opt_id(self.driver_id)?,
            status: label(&self.status)?,
            priority: label(&self.priority)?,
            managed_by_store: self.managed_by_store,
            delivery_notes: self.delivery_notes,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[derive(FromRow)]
struct DbPing {
    id: String,
    shipment_id: String,
    latitude: f64,
    longitude: f64,
    recorded_at: String,
}

impl DbPing {
    fn into_ping(self) -> Result<TrackingPing, RepoError> {
        Ok(TrackingPing {
            id: parse_id(&self.id)?,
            shipment_id: parse_id(&self.shipment_id)?,
            latitude: self.latitude,
            longitude: self.longitude,
            recorded_at: parse_ts(&self.recorded_at)?,
        })
    }
}

impl SqliteRepo {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        Self::connect(database_url, DEFAULT_BUSY_TIMEOUT).await
    }

    pub async fn connect(database_url: &str, busy_timeout: Duration) -> anyhow::Result<Self> {
        // Make sure the directory of an on-disk database exists.
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let ddl = include_str!("../migrations/0001_create_market.sql");
        for statement in ddl.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&pool).await?;
        }
        tracing::debug!(url = database_url, "sqlite schema ready");

        Ok(Self { pool })
    }
}

/// Bumps nothing but takes the database write lock as the first statement of
/// the transaction. Returns false when the row does not exist.
async fn lock_row(
    conn: &mut SqliteConnection,
    table: &'static str,
    id: Uuid,
) -> Result<bool, RepoError> {
    let sql = format!("UPDATE {table} SET updated_at = updated_at WHERE id = ?");
    let res = sqlx::query(&sql)
        .bind(id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(db)?;
    Ok(res.rows_affected() > 0)
}

async fn load_items(
    conn: &mut SqliteConnection,
    store_order_id: &str,
) -> Result<Vec<OrderItem>, RepoError> {
    let rows: Vec<DbItem> = sqlx::query_as(
        "SELECT id, store_order_id, product_id, variant_id, quantity, unit_price
         FROM order_items WHERE store_order_id = ? ORDER BY rowid",
    )
    .bind(store_order_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db)?;
    rows.into_iter().map(DbItem::into_item).collect()
}

async fn hydrate_store_order(
    conn: &mut SqliteConnection,
    row: DbStoreOrder,
) -> Result<StoreOrder, RepoError> {
    let items = load_items(conn, &row.id).await?;
    row.into_store_order(items)
}

async fn hydrate_order(conn: &mut SqliteConnection, row: DbOrder) -> Result<Order, RepoError> {
    let sql = format!(
        "SELECT {STORE_ORDER_COLUMNS} FROM store_orders WHERE order_id = ? ORDER BY rowid"
    );
    let sub_rows: Vec<DbStoreOrder> = sqlx::query_as(&sql)
        .bind(&row.id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db)?;
    let mut store_orders = Vec::with_capacity(sub_rows.len());
    for sub in sub_rows {
        store_orders.push(hydrate_store_order(conn, sub).await?);
    }
    row.into_order(store_orders)
}

async fn load_order(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Order>, RepoError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?");
    let row: Option<DbOrder> = sqlx::query_as(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?;
    match row {
        Some(row) => Ok(Some(hydrate_order(conn, row).await?)),
        None => Ok(None),
    }
}

async fn load_shipment(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<Shipment>, RepoError> {
    let sql = format!("SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE id = ?");
    let row: Option<DbShipment> = sqlx::query_as(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?;
    row.map(DbShipment::into_shipment).transpose()
}

/// Conditional decrement per product. Products are visited in id order so
/// concurrent writers touch rows in the same sequence.
async fn reserve_stock(
    conn: &mut SqliteConnection,
    movements: &[StockMovement],
) -> Result<(), RepoError> {
    let mut wanted: BTreeMap<Uuid, i64> = BTreeMap::new();
    for m in movements {
        *wanted.entry(m.product_id).or_default() += i64::from(m.quantity);
    }
    for (product_id, qty) in wanted {
        let res = sqlx::query(
            "UPDATE products
             SET available_stock = available_stock - ?, reserved_stock = reserved_stock + ?
             WHERE id = ? AND available_stock >= ?",
        )
        .bind(qty)
        .bind(qty)
        .bind(product_id.to_string())
        .bind(qty)
        .execute(&mut *conn)
        .await
        .map_err(db)?;
        if res.rows_affected() == 0 {
            let available: Option<i64> =
                sqlx::query_scalar("SELECT available_stock FROM products WHERE id = ?")
                    .bind(product_id.to_string())
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(db)?;
            let err = match available {
                None => DomainError::ProductNotFound(product_id),
                Some(available) => DomainError::InsufficientStock {
                    product_id,
                    requested: u32::try_from(qty).unwrap_or(u32::MAX),
                    available: count(available)?,
                },
            };
            return Err(err.into());
        }
    }
    Ok(())
}

async fn apply_stock(conn: &mut SqliteConnection, effect: &StockEffect) -> Result<(), RepoError> {
    for m in &effect.release {
        sqlx::query(
            "UPDATE products
             SET available_stock = available_stock + ?, reserved_stock = MAX(reserved_stock - ?, 0)
             WHERE id = ?",
        )
        .bind(i64::from(m.quantity))
        .bind(i64::from(m.quantity))
        .bind(m.product_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(db)?;
    }
    for m in &effect.settle {
        sqlx::query(
            "UPDATE products SET reserved_stock = MAX(reserved_stock - ?, 0) WHERE id = ?",
        )
        .bind(i64::from(m.quantity))
        .bind(m.product_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(db)?;
    }
    Ok(())
}

async fn claim_driver(conn: &mut SqliteConnection, driver_id: Uuid) -> Result<(), RepoError> {
    let res = sqlx::query("UPDATE drivers SET is_available = 0 WHERE id = ? AND is_available = 1")
        .bind(driver_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(db)?;
    if res.rows_affected() > 0 {
        return Ok(());
    }
    let exists: Option<String> = sqlx::query_scalar("SELECT id FROM drivers WHERE id = ?")
        .bind(driver_id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?;
    Err(match exists {
        Some(_) => DomainError::DriverUnavailable(driver_id),
        None => DomainError::not_found("driver", driver_id),
    }
    .into())
}

async fn release_driver(conn: &mut SqliteConnection, driver_id: Uuid) -> Result<(), RepoError> {
    sqlx::query("UPDATE drivers SET is_available = 1 WHERE id = ?")
        .bind(driver_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(db)?;
    Ok(())
}

/// Writes back the statuses of an order and all its sub-orders.
async fn save_order_statuses(conn: &mut SqliteConnection, order: &Order) -> Result<(), RepoError> {
    sqlx::query("UPDATE orders SET status = ?, payment_status = ?, updated_at = ? WHERE id = ?")
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(ts(order.updated_at))
        .bind(order.id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(db)?;
    for so in &order.store_orders {
        sqlx::query(
            "UPDATE store_orders SET status = ?, payment_status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(so.status.as_str())
        .bind(so.payment_status.as_str())
        .bind(ts(so.updated_at))
        .bind(so.id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(db)?;
    }
    Ok(())
}

/// Moves every open shipment of the order to `status` and frees its driver.
/// Closes the active shipments of an order that staff closed; the drivers
/// go back to available.
async fn close_shipments(
    conn: &mut SqliteConnection,
    order_id: Uuid,
    order_status: OrderStatus,
) -> Result<(), RepoError> {
    let open: Vec<(String, String, Option<String>)> = sqlx::query_as(
        "SELECT id, status, driver_id FROM shipments
         WHERE order_id = ? AND status IN ('pending', 'in_progress')",
    )
    .bind(order_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .map_err(db)?;
    let now = ts(Utc::now());
    for (id, status, driver_id) in open {
        let next = label::<ShipmentStatus>(&status)?.closed_with(order_status)?;
        sqlx::query("UPDATE shipments SET status = ?, updated_at = ? WHERE id = ?")
            .bind(next.as_str())
            .bind(&now)
            .bind(&id)
            .execute(&mut *conn)
            .await
            .map_err(db)?;
        if let Some(driver_id) = driver_id {
            release_driver(conn, parse_id(&driver_id)?).await?;
        }
    }
    Ok(())
}

async fn insert_order_rows(conn: &mut SqliteConnection, order: &Order) -> Result<(), RepoError> {
    sqlx::query(
        "INSERT INTO orders (id, buyer_id, destination_address_id, status, payment_status,
             delivery_type, vehicle_type, payment_method, items_total, total_delivery_fee,
             total_amount, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(order.id.to_string())
    .bind(order.buyer_id.to_string())
    .bind(order.destination_address_id.to_string())
    .bind(order.status.as_str())
    .bind(order.payment_status.as_str())
    .bind(order.delivery_type.as_str())
    .bind(order.vehicle_type.map(|v| v.as_str()))
    .bind(order.payment_method.as_str())
    .bind(order.items_total)
    .bind(order.total_delivery_fee)
    .bind(order.total_amount)
    .bind(ts(order.created_at))
    .bind(ts(order.updated_at))
    .execute(&mut *conn)
    .await
    .map_err(db)?;

    for so in &order.store_orders {
        sqlx::query(
            "INSERT INTO store_orders (id, order_id, store_id, status, payment_status,
                 delivery_fee, items_total, rule_id, distance_km, weight_grams, delivery_notes,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(so.id.to_string())
        .bind(so.order_id.to_string())
        .bind(so.store_id.to_string())
        .bind(so.status.as_str())
        .bind(so.payment_status.as_str())
        .bind(so.delivery_fee)
        .bind(so.items_total)
        .bind(so.rule_id.map(|id| id.to_string()))
        .bind(so.distance_km)
        .bind(i64::from(so.weight_grams))
        .bind(so.delivery_notes.as_deref())
        .bind(ts(so.created_at))
        .bind(ts(so.updated_at))
        .execute(&mut *conn)
        .await
        .map_err(db)?;

        for item in &so.items {
            sqlx::query(
                "INSERT INTO order_items (id, store_order_id, product_id, variant_id, quantity,
                     unit_price)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(item.id.to_string())
            .bind(item.store_order_id.to_string())
            .bind(item.product_id.to_string())
            .bind(item.variant_id.map(|id| id.to_string()))
            .bind(i64::from(item.quantity))
            .bind(item.unit_price)
            .execute(&mut *conn)
            .await
            .map_err(db)?;
        }
    }
    Ok(())
}

fn push_date_range(
    qb: &mut QueryBuilder<'_, Sqlite>,
    column: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) {
    if let Some(start) = start {
        qb.push(format!(" AND {column} >= ")).push_bind(ts(start));
    }
    if let Some(end) = end {
        qb.push(format!(" AND {column} <= ")).push_bind(ts(end));
    }
}

fn push_amount_range(
    qb: &mut QueryBuilder<'_, Sqlite>,
    expr: &str,
    min: Option<i64>,
    max: Option<i64>,
) {
    if let Some(min) = min {
        qb.push(format!(" AND {expr} >= ")).push_bind(min);
    }
    if let Some(max) = max {
        qb.push(format!(" AND {expr} <= ")).push_bind(max);
    }
}

fn push_order_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &OrderQuery) {
    if let Some(buyer_id) = query.buyer_id {
        qb.push(" AND buyer_id = ").push_bind(buyer_id.to_string());
    }
    if let Some(status) = query.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(payment_status) = query.payment_status {
        qb.push(" AND payment_status = ")
            .push_bind(payment_status.as_str());
    }
    push_date_range(qb, "created_at", query.created.start, query.created.end);
    push_amount_range(qb, "total_amount", query.amount.min, query.amount.max);
}

const STORE_ORDER_VIEW: &str = "SELECT s.id, s.order_id, s.store_id, s.status, s.payment_status, \
     s.delivery_fee, s.items_total, s.rule_id, s.distance_km, s.weight_grams, s.delivery_notes, \
     s.created_at, s.updated_at, o.buyer_id, o.payment_method, \
     (SELECT sh.status FROM shipments sh WHERE sh.store_order_id = s.id \
      ORDER BY sh.created_at DESC, sh.rowid DESC LIMIT 1) AS shipment_status \
     FROM store_orders s JOIN orders o ON o.id = s.order_id";

fn push_store_order_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &StoreOrderQuery) {
    qb.push(" AND store_id IN (");
    let mut ids = qb.separated(", ");
    for id in &query.store_ids {
        ids.push_bind(id.to_string());
    }
    ids.push_unseparated(")");
    if let Some(status) = query.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(payment_status) = query.payment_status {
        qb.push(" AND payment_status = ")
            .push_bind(payment_status.as_str());
    }
    if let Some(method) = query.payment_method {
        qb.push(" AND payment_method = ").push_bind(method.as_str());
    }
    if let Some(shipment_status) = query.shipment_status {
        qb.push(" AND shipment_status = ")
            .push_bind(shipment_status.as_str());
    }
    push_date_range(qb, "created_at", query.created.start, query.created.end);
    push_amount_range(
        qb,
        "(items_total + delivery_fee)",
        query.amount.min,
        query.amount.max,
    );
}

fn push_shipment_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &ShipmentQuery) {
    if let Some(store_ids) = &query.store_ids {
        qb.push(" AND store_id IN (");
        let mut ids = qb.separated(", ");
        for id in store_ids {
            ids.push_bind(id.to_string());
        }
        ids.push_unseparated(")");
    }
    if let Some(store_id) = query.store_id {
        qb.push(" AND store_id = ").push_bind(store_id.to_string());
    }
    if let Some(status) = query.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(driver_id) = query.driver_id {
        qb.push(" AND driver_id = ").push_bind(driver_id.to_string());
    }
    if let Some(priority) = query.priority {
        qb.push(" AND priority = ").push_bind(priority.as_str());
    }
    push_date_range(qb, "created_at", query.created.start, query.created.end);
}

fn push_page(qb: &mut QueryBuilder<'_, Sqlite>, page: &Pagination) {
    qb.push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
        .push_bind(i64::from(page.per_page))
        .push(" OFFSET ")
        .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
}

async fn fetch_total(
    qb: &mut QueryBuilder<'_, Sqlite>,
    pool: &SqlitePool,
) -> Result<u64, RepoError> {
    let row = qb.build().fetch_one(pool).await.map_err(db)?;
    let total: i64 = row.try_get(0).map_err(db)?;
    u64::try_from(total).map_err(db)
}

#[async_trait]
impl CatalogRepository for SqliteRepo {
    async fn get_address(&self, id: Uuid) -> Result<Option<Address>, RepoError> {
        let row: Option<DbAddress> = sqlx::query_as(
            "SELECT id, user_id, location_json, latitude, longitude, region, postal_code, formatted
             FROM addresses WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        row.map(DbAddress::into_address).transpose()
    }

    async fn insert_address(&self, address: Address) -> Result<Address, RepoError> {
        let location_json = serde_json::to_string(&address.location).map_err(db)?;
        sqlx::query(
            "INSERT INTO addresses (id, user_id, location_json, latitude, longitude, region,
                 postal_code, formatted)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(address.id.to_string())
        .bind(address.user_id.to_string())
        .bind(location_json)
        .bind(address.coordinates.latitude)
        .bind(address.coordinates.longitude)
        .bind(&address.region)
        .bind(address.postal_code.as_deref())
        .bind(&address.formatted)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(address)
    }

    async fn get_store(&self, id: Uuid) -> Result<Option<Store>, RepoError> {
        let row: Option<DbStore> =
            sqlx::query_as("SELECT id, owner_id, name, address_id FROM stores WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?;
        row.map(DbStore::into_store).transpose()
    }

    async fn stores_owned_by(&self, owner_id: Uuid) -> Result<Vec<Store>, RepoError> {
        let rows: Vec<DbStore> = sqlx::query_as(
            "SELECT id, owner_id, name, address_id FROM stores WHERE owner_id = ? ORDER BY name",
        )
        .bind(owner_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.into_iter().map(DbStore::into_store).collect()
    }

    async fn insert_store(&self, store: Store) -> Result<Store, RepoError> {
        sqlx::query("INSERT INTO stores (id, owner_id, name, address_id) VALUES (?, ?, ?, ?)")
            .bind(store.id.to_string())
            .bind(store.owner_id.to_string())
            .bind(&store.name)
            .bind(store.address_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(store)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepoError> {
        let row: Option<DbProduct> = sqlx::query_as(
            "SELECT id, store_id, name, price, weight_grams, available_stock, reserved_stock
             FROM products WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        row.map(DbProduct::into_product).transpose()
    }

    async fn insert_product(&self, product: Product) -> Result<Product, RepoError> {
        sqlx::query(
            "INSERT INTO products (id, store_id, name, price, weight_grams, available_stock,
                 reserved_stock)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(product.id.to_string())
        .bind(product.store_id.to_string())
        .bind(&product.name)
        .bind(product.price)
        .bind(i64::from(product.weight_grams))
        .bind(i64::from(product.available_stock))
        .bind(i64::from(product.reserved_stock))
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(product)
    }

    async fn get_variant(&self, id: Uuid) -> Result<Option<ProductVariant>, RepoError> {
        let row: Option<DbVariant> =
            sqlx::query_as("SELECT id, product_id, name, price FROM product_variants WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?;
        row.map(DbVariant::into_variant).transpose()
    }

    async fn insert_variant(&self, variant: ProductVariant) -> Result<ProductVariant, RepoError> {
        sqlx::query("INSERT INTO product_variants (id, product_id, name, price) VALUES (?, ?, ?, ?)")
            .bind(variant.id.to_string())
            .bind(variant.product_id.to_string())
            .bind(&variant.name)
            .bind(variant.price)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(variant)
    }

    async fn get_driver(&self, id: Uuid) -> Result<Option<Driver>, RepoError> {
        let row: Option<DbDriver> = sqlx::query_as(
            "SELECT id, user_id, name, vehicle_type, is_available FROM drivers WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        row.map(DbDriver::into_driver).transpose()
    }

    async fn driver_for_user(&self, user_id: Uuid) -> Result<Option<Driver>, RepoError> {
        let row: Option<DbDriver> = sqlx::query_as(
            "SELECT id, user_id, name, vehicle_type, is_available FROM drivers WHERE user_id = ?",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        row.map(DbDriver::into_driver).transpose()
    }

    async fn insert_driver(&self, driver: Driver) -> Result<Driver, RepoError> {
        sqlx::query(
            "INSERT INTO drivers (id, user_id, name, vehicle_type, is_available)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(driver.id.to_string())
        .bind(driver.user_id.to_string())
        .bind(&driver.name)
        .bind(driver.vehicle_type.as_str())
        .bind(driver.is_available)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(driver)
    }

    async fn set_driver_availability(
        &self,
        id: Uuid,
        available: bool,
    ) -> Result<Option<Driver>, RepoError> {
        let updated = sqlx::query("UPDATE drivers SET is_available = ? WHERE id = ?")
            .bind(available)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_driver(id).await
    }

    async fn list_rules(&self, active_only: bool) -> Result<Vec<DeliveryFeeRule>, RepoError> {
        let rows: Vec<DbRule> = sqlx::query_as(
            "SELECT id, delivery_type, vehicle_type, weight_max_grams, distance_max_km,
                 included_weight_grams, included_distance_km, base_fee, weight_surcharge_rate,
                 distance_surcharge_rate, min_fee, max_fee, active
             FROM delivery_fee_rules WHERE active = 1 OR ? = 0
             ORDER BY weight_max_grams, distance_max_km, id",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.into_iter().map(DbRule::into_rule).collect()
    }

    async fn insert_rule(&self, rule: DeliveryFeeRule) -> Result<DeliveryFeeRule, RepoError> {
        sqlx::query(
            "INSERT INTO delivery_fee_rules (id, delivery_type, vehicle_type, weight_max_grams,
                 distance_max_km, included_weight_grams, included_distance_km, base_fee,
                 weight_surcharge_rate, distance_surcharge_rate, min_fee, max_fee, active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(rule.id.to_string())
        .bind(rule.delivery_type.as_str())
        .bind(rule.vehicle_type.map(|v| v.as_str()))
        .bind(i64::from(rule.weight_max_grams))
        .bind(rule.distance_max_km)
        .bind(i64::from(rule.included_weight_grams))
        .bind(rule.included_distance_km)
        .bind(rule.base_fee)
        .bind(rule.weight_surcharge_rate.to_string())
        .bind(rule.distance_surcharge_rate.to_string())
        .bind(rule.min_fee)
        .bind(rule.max_fee)
        .bind(rule.active)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(rule)
    }
}

#[async_trait]
impl OrderRepository for SqliteRepo {
    async fn place_order(&self, order: &Order, payment: &Payment) -> Result<(), RepoError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        reserve_stock(&mut tx, &order.movements()).await?;
        insert_order_rows(&mut tx, order).await?;
        sqlx::query(
            "INSERT INTO payments (id, order_id, amount, method, status, transaction_id,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(payment.id.to_string())
        .bind(payment.order_id.to_string())
        .bind(payment.amount)
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(payment.transaction_id.as_deref())
        .bind(ts(payment.created_at))
        .bind(ts(payment.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        tx.commit().await.map_err(db)?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        load_order(&mut conn, id).await
    }

    async fn get_store_order(&self, id: Uuid) -> Result<Option<StoreOrder>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        let sql = format!("SELECT {STORE_ORDER_COLUMNS} FROM store_orders WHERE id = ?");
        let row: Option<DbStoreOrder> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(db)?;
        match row {
            Some(row) => Ok(Some(hydrate_store_order(&mut conn, row).await?)),
            None => Ok(None),
        }
    }

    async fn search_orders(&self, query: &OrderQuery) -> Result<Page<Order>, RepoError> {
        let mut counted = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM orders WHERE 1 = 1");
        push_order_filters(&mut counted, query);
        let total = fetch_total(&mut counted, &self.pool).await?;

        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1 = 1"));
        push_order_filters(&mut qb, query);
        push_page(&mut qb, &query.pagination);

        let mut conn = self.pool.acquire().await.map_err(db)?;
        let rows: Vec<DbOrder> = qb
            .build_query_as::<DbOrder>()
            .fetch_all(&mut *conn)
            .await
            .map_err(db)?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(hydrate_order(&mut conn, row).await?);
        }
        Ok(Page {
            items,
            total,
            page: query.pagination.page,
            per_page: query.pagination.per_page,
        })
    }

    async fn search_store_orders(
        &self,
        query: &StoreOrderQuery,
    ) -> Result<Page<StoreOrderView>, RepoError> {
        if query.store_ids.is_empty() {
            return Ok(Page::slice(Vec::new(), query.pagination));
        }
        let mut counted =
            QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM ({STORE_ORDER_VIEW}) WHERE 1 = 1"));
        push_store_order_filters(&mut counted, query);
        let total = fetch_total(&mut counted, &self.pool).await?;

        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT * FROM ({STORE_ORDER_VIEW}) WHERE 1 = 1"));
        push_store_order_filters(&mut qb, query);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(query.pagination.per_page))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.pagination.offset()).unwrap_or(i64::MAX));

        let mut conn = self.pool.acquire().await.map_err(db)?;
        let rows: Vec<DbStoreOrderView> = qb
            .build_query_as::<DbStoreOrderView>()
            .fetch_all(&mut *conn)
            .await
            .map_err(db)?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let (store_order, buyer_id, payment_method, shipment_status) = row.split();
            let buyer_id = parse_id(&buyer_id)?;
            let payment_method = label(&payment_method)?;
            let shipment_status = shipment_status.as_deref().map(label).transpose()?;
            items.push(StoreOrderView {
                store_order: hydrate_store_order(&mut conn, store_order).await?,
                buyer_id,
                payment_method,
                shipment_status,
            });
        }
        Ok(Page {
            items,
            total,
            page: query.pagination.page,
            per_page: query.pagination.per_page,
        })
    }

    async fn cancel_order(&self, id: Uuid) -> Result<Order, RepoError> {
        self.set_order_status(id, OrderStatus::Cancelled).await
    }

    async fn set_order_status(&self, id: Uuid, status: OrderStatus) -> Result<Order, RepoError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        if !lock_row(&mut tx, "orders", id).await? {
            return Err(DomainError::not_found("order", id).into());
        }
        let mut order = load_order(&mut tx, id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", id))?;
        let effect = order.transition_to(status)?;
        apply_stock(&mut tx, &effect).await?;
        if status.is_terminal() {
            close_shipments(&mut tx, id, status).await?;
        }
        save_order_statuses(&mut tx, &order).await?;
        tx.commit().await.map_err(db)?;
        Ok(order)
    }

    async fn store_revenue(&self, store_id: Uuid) -> Result<i64, RepoError> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(s.items_total), 0)
             FROM store_orders s JOIN orders o ON o.id = s.order_id
             WHERE s.store_id = ? AND s.status = 'delivered' AND o.payment_status = 'paid'",
        )
        .bind(store_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(db)
    }
}

#[async_trait]
impl PaymentRepository for SqliteRepo {
    async fn get_payment_for_order(&self, order_id: Uuid) -> Result<Option<Payment>, RepoError> {
        let row: Option<DbPayment> = sqlx::query_as(
            "SELECT id, order_id, amount, method, status, transaction_id, created_at, updated_at
             FROM payments WHERE order_id = ?",
        )
        .bind(order_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        row.map(DbPayment::into_payment).transpose()
    }

    async fn settle_payment(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
        transaction_id: Option<String>,
    ) -> Result<Payment, RepoError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        if !lock_row(&mut tx, "orders", order_id).await? {
            return Err(DomainError::not_found("order", order_id).into());
        }
        let row: Option<DbPayment> = sqlx::query_as(
            "SELECT id, order_id, amount, method, status, transaction_id, created_at, updated_at
             FROM payments WHERE order_id = ?",
        )
        .bind(order_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db)?;
        let mut payment = row
            .map(DbPayment::into_payment)
            .transpose()?
            .ok_or_else(|| DomainError::not_found("payment for order", order_id))?;
        let mut order = load_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;

        payment.settle(status, transaction_id)?;
        order.mirror_payment(payment.status);

        sqlx::query("UPDATE payments SET status = ?, transaction_id = ?, updated_at = ? WHERE id = ?")
            .bind(payment.status.as_str())
            .bind(payment.transaction_id.as_deref())
            .bind(ts(payment.updated_at))
            .bind(payment.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        save_order_statuses(&mut tx, &order).await?;
        tx.commit().await.map_err(db)?;
        Ok(payment)
    }
}

#[async_trait]
impl ShipmentRepository for SqliteRepo {
    async fn insert_shipment(&self, shipment: Shipment) -> Result<Shipment, RepoError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        if !lock_row(&mut tx, "orders", shipment.order_id).await? {
            return Err(DomainError::not_found("order", shipment.order_id).into());
        }
        let mut order = load_order(&mut tx, shipment.order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", shipment.order_id))?;
        order
            .store_order(shipment.store_order_id)
            .ok_or_else(|| DomainError::not_found("store order", shipment.store_order_id))?
            .ensure_shippable()?;
        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shipments
             WHERE store_order_id = ? AND status IN ('pending', 'in_progress')",
        )
        .bind(shipment.store_order_id.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(db)?;
        if active > 0 {
            return Err(DomainError::ShipmentAlreadyActive(shipment.store_order_id).into());
        }
        if let Some(driver_id) = shipment.driver_id {
            claim_driver(&mut tx, driver_id).await?;
        }
        let effect = order.apply_shipment_status(shipment.store_order_id, shipment.status)?;
        apply_stock(&mut tx, &effect).await?;
        save_order_statuses(&mut tx, &order).await?;

        sqlx::query(
            "INSERT INTO shipments (id, store_order_id, order_id, store_id, driver_id, status,
                 priority, managed_by_store, delivery_notes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(shipment.id.to_string())
        .bind(shipment.store_order_id.to_string())
        .bind(shipment.order_id.to_string())
        .bind(shipment.store_id.to_string())
        .bind(shipment.driver_id.map(|id| id.to_string()))
        .bind(shipment.status.as_str())
        .bind(shipment.priority.as_str())
        .bind(shipment.managed_by_store)
        .bind(shipment.delivery_notes.as_deref())
        .bind(ts(shipment.created_at))
        .bind(ts(shipment.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        tx.commit().await.map_err(db)?;
        Ok(shipment)
    }

    async fn get_shipment(&self, id: Uuid) -> Result<Option<Shipment>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        load_shipment(&mut conn, id).await
    }

    async fn update_shipment(&self, id: Uuid, patch: ShipmentPatch) -> Result<Shipment, RepoError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        if !lock_row(&mut tx, "shipments", id).await? {
            return Err(DomainError::not_found("shipment", id).into());
        }
        let mut shipment = load_shipment(&mut tx, id)
            .await?
            .ok_or_else(|| DomainError::not_found("shipment", id))?;
        let change = shipment.apply(patch)?;

        if let Some(driver_id) = change.release_driver {
            release_driver(&mut tx, driver_id).await?;
        }
        if let Some(driver_id) = change.claim_driver {
            claim_driver(&mut tx, driver_id).await?;
        }
        if let Some(status) = change.status_changed {
            let mut order = load_order(&mut tx, shipment.order_id)
                .await?
                .ok_or_else(|| DomainError::not_found("order", shipment.order_id))?;
            let effect = order.apply_shipment_status(shipment.store_order_id, status)?;
            apply_stock(&mut tx, &effect).await?;
            save_order_statuses(&mut tx, &order).await?;
        }

        sqlx::query(
            "UPDATE shipments SET driver_id = ?, status = ?, priority = ?, delivery_notes = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(shipment.driver_id.map(|d| d.to_string()))
        .bind(shipment.status.as_str())
        .bind(shipment.priority.as_str())
        .bind(shipment.delivery_notes.as_deref())
        .bind(ts(shipment.updated_at))
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        tx.commit().await.map_err(db)?;
        Ok(shipment)
    }

    async fn search_shipments(&self, query: &ShipmentQuery) -> Result<Page<Shipment>, RepoError> {
        if query.store_ids.as_ref().is_some_and(|ids| ids.is_empty()) {
            return Ok(Page::slice(Vec::new(), query.pagination));
        }
        let mut counted =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM shipments WHERE 1 = 1");
        push_shipment_filters(&mut counted, query);
        let total = fetch_total(&mut counted, &self.pool).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE 1 = 1"
        ));
        push_shipment_filters(&mut qb, query);
        push_page(&mut qb, &query.pagination);
        let rows: Vec<DbShipment> = qb
            .build_query_as::<DbShipment>()
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        Ok(Page {
            items: rows
                .into_iter()
                .map(DbShipment::into_shipment)
                .collect::<Result<Vec<_>, _>>()?,
            total,
            page: query.pagination.page,
            per_page: query.pagination.per_page,
        })
    }

    async fn add_tracking(&self, ping: TrackingPing) -> Result<TrackingPing, RepoError> {
        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM shipments WHERE id = ?")
            .bind(ping.shipment_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        if exists.is_none() {
            return Err(DomainError::not_found("shipment", ping.shipment_id).into());
        }
        sqlx::query(
            "INSERT INTO tracking_pings (id, shipment_id, latitude, longitude, recorded_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(ping.id.to_string())
        .bind(ping.shipment_id.to_string())
        .bind(ping.latitude)
        .bind(ping.longitude)
        .bind(ts(ping.recorded_at))
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(ping)
    }

    async fn list_tracking(&self, shipment_id: Uuid) -> Result<Vec<TrackingPing>, RepoError> {
        let rows: Vec<DbPing> = sqlx::query_as(
            "SELECT id, shipment_id, latitude, longitude, recorded_at
             FROM tracking_pings WHERE shipment_id = ? ORDER BY recorded_at, rowid",
        )
        .bind(shipment_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.into_iter().map(DbPing::into_ping).collect()
    }
}
