use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::{Order, StoreOrder};
use crate::domain::payment::PaymentMethod;
use crate::domain::shipment::{Priority, Shipment};
use crate::domain::status::{OrderStatus, PaymentStatus, ShipmentStatus};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    /// 1-based page; `per_page` clamped to `1..=MAX_PER_PAGE`.
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    /// Cuts one page out of an already filtered and sorted result set.
    pub fn slice(all: Vec<T>, pagination: Pagination) -> Self {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.per_page as usize)
            .collect();
        Self {
            items,
            total,
            page: pagination.page,
            per_page: pagination.per_page,
        }
    }
}

/// Inclusive bounds on a timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at <= e)
    }
}

/// Inclusive bounds on an amount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AmountRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl AmountRange {
    pub fn contains(&self, amount: i64) -> bool {
        self.min.map_or(true, |m| amount >= m) && self.max.map_or(true, |m| amount <= m)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderQuery {
    /// Restricts to one buyer; set for buyer callers.
    pub buyer_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub created: DateRange,
    pub amount: AmountRange,
    pub pagination: Pagination,
}

impl OrderQuery {
    pub fn matches(&self, order: &Order) -> bool {
        self.buyer_id.map_or(true, |b| order.buyer_id == b)
            && self.status.map_or(true, |s| order.status == s)
            && self.payment_status.map_or(true, |s| order.payment_status == s)
            && self.created.contains(order.created_at)
            && self.amount.contains(order.total_amount)
    }
}

/// A sub-order as seen by the store that fulfils it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOrderView {
    #[serde(flatten)]
    pub store_order: StoreOrder,
    pub buyer_id: Uuid,
    pub payment_method: PaymentMethod,
    /// Status of the most recent shipment, if any.
    pub shipment_status: Option<ShipmentStatus>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreOrderQuery {
    /// Stores owned by the caller; never empty for a real search.
    pub store_ids: Vec<Uuid>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub shipment_status: Option<ShipmentStatus>,
    pub created: DateRange,
    pub amount: AmountRange,
    pub pagination: Pagination,
}

impl StoreOrderQuery {
    pub fn matches(&self, view: &StoreOrderView) -> bool {
        let so = &view.store_order;
        self.store_ids.contains(&so.store_id)
            && self.status.map_or(true, |s| so.status == s)
            && self.payment_status.map_or(true, |s| so.payment_status == s)
            && self.payment_method.map_or(true, |m| view.payment_method == m)
            && self
                .shipment_status
                .map_or(true, |s| view.shipment_status == Some(s))
            && self.created.contains(so.created_at)
            && self.amount.contains(so.total())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShipmentQuery {
    /// Visibility scope; `None` means unrestricted.
    pub store_ids: Option<Vec<Uuid>>,
    pub store_id: Option<Uuid>,
    pub status: Option<ShipmentStatus>,
    pub driver_id: Option<Uuid>,
    pub priority: Option<Priority>,
    pub created: DateRange,
    pub pagination: Pagination,
}

impl ShipmentQuery {
    pub fn matches(&self, shipment: &Shipment) -> bool {
        self.store_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&shipment.store_id))
            && self.store_id.map_or(true, |id| shipment.store_id == id)
            && self.status.map_or(true, |s| shipment.status == s)
            && self.driver_id.map_or(true, |d| shipment.driver_id == Some(d))
            && self.priority.map_or(true, |p| shipment.priority == p)
            && self.created.contains(shipment.created_at)
    }
}
