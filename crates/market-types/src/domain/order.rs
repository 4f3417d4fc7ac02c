use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::StockMovement;
use crate::domain::delivery::{DeliveryQuote, DeliveryType, VehicleType};
use crate::domain::error::DomainError;
use crate::domain::payment::PaymentMethod;
use crate::domain::status::{OrderStatus, PaymentStatus, ShipmentStatus, StatusMachine};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub store_order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
    /// Catalog price frozen at checkout.
    pub unit_price: i64,
}

impl OrderItem {
    pub fn line_total(&self) -> i64 {
        self.unit_price.saturating_mul(i64::from(self.quantity))
    }
}

/// The slice of an order fulfilled by one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOrder {
    pub id: Uuid,
    pub order_id: Uuid,
    pub store_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub delivery_fee: i64,
    pub items_total: i64,
    pub rule_id: Option<Uuid>,
    pub distance_km: f64,
    pub weight_grams: u32,
    pub delivery_notes: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoreOrder {
    pub fn total(&self) -> i64 {
        self.items_total + self.delivery_fee
    }

    /// Shipments can only be opened for sub-orders still being fulfilled.
    pub fn ensure_shippable(&self) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid(format!(
                "store order {} is {}; no shipment can be created",
                self.id, self.status
            )));
        }
        Ok(())
    }

    pub fn movements(&self) -> Vec<StockMovement> {
        self.items
            .iter()
            .map(|it| StockMovement {
                product_id: it.product_id,
                quantity: it.quantity,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub destination_address_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub delivery_type: DeliveryType,
    pub vehicle_type: Option<VehicleType>,
    pub payment_method: PaymentMethod,
    pub items_total: i64,
    pub total_delivery_fee: i64,
    pub total_amount: i64,
    pub store_orders: Vec<StoreOrder>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
    pub unit_price: i64,
}

#[derive(Debug, Clone)]
pub struct StoreOrderDraft {
    pub quote: DeliveryQuote,
    pub delivery_notes: Option<String>,
    pub items: Vec<ItemDraft>,
}

/// A priced checkout, ready to become an [`Order`].
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub buyer_id: Uuid,
    pub destination_address_id: Uuid,
    pub delivery_type: DeliveryType,
    pub vehicle_type: Option<VehicleType>,
    pub payment_method: PaymentMethod,
    pub stores: Vec<StoreOrderDraft>,
}

/// Inventory side effects of an aggregate mutation, applied by the adapter
/// in the same transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockEffect {
    /// reserved -> available
    pub release: Vec<StockMovement>,
    /// reserved -> gone
    pub settle: Vec<StockMovement>,
}

/// The grand total bounds every partial sum, so once it fits in `i64` no
/// line, sub-order or order total can overflow.
fn check_amounts(stores: &[StoreOrderDraft]) -> Result<(), DomainError> {
    let mut total: i64 = 0;
    for store in stores {
        for it in &store.items {
            total = it
                .unit_price
                .checked_mul(i64::from(it.quantity))
                .and_then(|line| total.checked_add(line))
                .ok_or_else(|| {
                    DomainError::invalid(format!(
                        "amount for product {} is out of range",
                        it.product_id
                    ))
                })?;
        }
        total = total
            .checked_add(store.quote.fee)
            .ok_or_else(|| DomainError::invalid("order total is out of range"))?;
    }
    Ok(())
}

impl Order {
    pub fn place(draft: OrderDraft) -> Result<Self, DomainError> {
        if draft.stores.iter().all(|s| s.items.is_empty()) {
            return Err(DomainError::EmptyOrder);
        }
        if let Some(it) = draft
            .stores
            .iter()
            .flat_map(|s| &s.items)
            .find(|it| it.quantity == 0)
        {
            return Err(DomainError::invalid(format!(
                "quantity for product {} must be > 0",
                it.product_id
            )));
        }
        check_amounts(&draft.stores)?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let store_orders: Vec<StoreOrder> = draft
            .stores
            .into_iter()
            .filter(|s| !s.items.is_empty())
            .map(|s| {
                let store_order_id = Uuid::new_v4();
                let items: Vec<OrderItem> = s
                    .items
                    .into_iter()
                    .map(|it| OrderItem {
                        id: Uuid::new_v4(),
                        store_order_id,
                        product_id: it.product_id,
                        variant_id: it.variant_id,
                        quantity: it.quantity,
                        unit_price: it.unit_price,
                    })
                    .collect();
                StoreOrder {
                    id: store_order_id,
                    order_id,
                    store_id: s.quote.store_id,
                    status: OrderStatus::Pending,
                    payment_status: PaymentStatus::Pending,
                    delivery_fee: s.quote.fee,
                    items_total: items.iter().map(OrderItem::line_total).sum(),
                    rule_id: Some(s.quote.rule_id),
                    distance_km: s.quote.distance_km,
                    weight_grams: s.quote.weight_grams,
                    delivery_notes: s.delivery_notes,
                    items,
                    created_at: now,
                    updated_at: now,
                }
            })
            .collect();

        let items_total = store_orders.iter().map(|s| s.items_total).sum();
        let total_delivery_fee = store_orders.iter().map(|s| s.delivery_fee).sum();
        Ok(Self {
            id: order_id,
            buyer_id: draft.buyer_id,
            destination_address_id: draft.destination_address_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            delivery_type: draft.delivery_type,
            vehicle_type: draft.vehicle_type,
            payment_method: draft.payment_method,
            items_total,
            total_delivery_fee,
            total_amount: items_total + total_delivery_fee,
            store_orders,
            created_at: now,
            updated_at: now,
        })
    }

    /// Sub-order totals plus fees add up to the order total.
    pub fn reconciles(&self) -> bool {
        let subs: i64 = self.store_orders.iter().map(StoreOrder::total).sum();
        let items_ok = self
            .store_orders
            .iter()
            .all(|s| s.items.iter().map(OrderItem::line_total).sum::<i64>() == s.items_total);
        items_ok && subs == self.total_amount
    }

    pub fn store_order(&self, id: Uuid) -> Option<&StoreOrder> {
        self.store_orders.iter().find(|s| s.id == id)
    }

    pub fn store_ids(&self) -> Vec<Uuid> {
        self.store_orders.iter().map(|s| s.store_id).collect()
    }

    pub fn movements(&self) -> Vec<StockMovement> {
        self.store_orders.iter().flat_map(StoreOrder::movements).collect()
    }

    /// Direct status change requested by staff. Cancellation goes through
    /// [`Order::cancel`] so that stock is released.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<StockEffect, DomainError> {
        if next == OrderStatus::Cancelled {
            return self.cancel();
        }
        self.status = self.status.transition_to(next)?;
        let now = Utc::now();
        self.updated_at = now;

        let mut effect = StockEffect::default();
        if next == OrderStatus::Delivered {
            for sub in self.store_orders.iter_mut().filter(|s| !s.status.is_terminal()) {
                sub.status = OrderStatus::Delivered;
                sub.updated_at = now;
                effect.settle.extend(sub.movements());
            }
        }
        Ok(effect)
    }

    /// Cancels the order and every open sub-order. Sub-orders already
    /// delivered keep their status; their stock has been settled.
    pub fn cancel(&mut self) -> Result<StockEffect, DomainError> {
        self.status = self.status.transition_to(OrderStatus::Cancelled)?;
        let now = Utc::now();
        self.updated_at = now;

        let mut effect = StockEffect::default();
        for sub in self.store_orders.iter_mut().filter(|s| !s.status.is_terminal()) {
            sub.status = OrderStatus::Cancelled;
            sub.updated_at = now;
            effect.release.extend(sub.movements());
        }
        Ok(effect)
    }

    /// Derived transitions caused by a shipment of `store_order_id` moving
    /// to `status`.
    pub fn apply_shipment_status(
        &mut self,
        store_order_id: Uuid,
        status: ShipmentStatus,
    ) -> Result<StockEffect, DomainError> {
        let now = Utc::now();
        let sub = self
            .store_orders
            .iter_mut()
            .find(|s| s.id == store_order_id)
            .ok_or_else(|| DomainError::not_found("store order", store_order_id))?;

        let mut effect = StockEffect::default();
        match status {
            ShipmentStatus::Pending | ShipmentStatus::Failed => return Ok(effect),
            ShipmentStatus::InProgress => {
                if sub.status != OrderStatus::InProgress {
                    sub.status = sub.status.transition_to(OrderStatus::InProgress)?;
                }
            }
            ShipmentStatus::Delivered => {
                if sub.status == OrderStatus::Pending {
                    sub.status = OrderStatus::InProgress;
                }
                sub.status = sub.status.transition_to(OrderStatus::Delivered)?;
                effect.settle = sub.movements();
            }
        }
        sub.updated_at = now;
        self.roll_up(now);
        Ok(effect)
    }

    fn roll_up(&mut self, now: DateTime<Utc>) {
        let live: Vec<OrderStatus> = self
            .store_orders
            .iter()
            .map(|s| s.status)
            .filter(|s| *s != OrderStatus::Cancelled)
            .collect();

        if self.status == OrderStatus::Pending
            && live
                .iter()
                .any(|s| matches!(s, OrderStatus::InProgress | OrderStatus::Delivered))
        {
            self.status = OrderStatus::InProgress;
            self.updated_at = now;
        }
        if self.status == OrderStatus::InProgress
            && !live.is_empty()
            && live.iter().all(|s| *s == OrderStatus::Delivered)
        {
            self.status = OrderStatus::Delivered;
            self.updated_at = now;
        }
    }

    /// Order and sub-orders follow the payment record.
    pub fn mirror_payment(&mut self, status: PaymentStatus) {
        let now = Utc::now();
        self.payment_status = status;
        self.updated_at = now;
        for sub in &mut self.store_orders {
            sub.payment_status = status;
            sub.updated_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(per_store: &[&[(u32, i64)]]) -> OrderDraft {
        OrderDraft {
            buyer_id: Uuid::new_v4(),
            destination_address_id: Uuid::new_v4(),
            delivery_type: DeliveryType::Standard,
            vehicle_type: None,
            payment_method: PaymentMethod::CashOnDelivery,
            stores: per_store
                .iter()
                .enumerate()
                .map(|(i, lines)| StoreOrderDraft {
                    quote: DeliveryQuote {
                        store_id: Uuid::new_v4(),
                        rule_id: Uuid::new_v4(),
                        delivery_type: DeliveryType::Standard,
                        vehicle_type: None,
                        distance_km: 5.0,
                        weight_grams: 1_000,
                        fee: 3_000 + i as i64 * 1_000,
                    },
                    delivery_notes: None,
                    items: lines
                        .iter()
                        .map(|(qty, price)| ItemDraft {
                            product_id: Uuid::new_v4(),
                            variant_id: None,
                            quantity: *qty,
                            unit_price: *price,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn place_splits_and_totals() {
        let order = Order::place(draft(&[&[(2, 1_500), (1, 4_000)], &[(3, 2_000)]])).unwrap();
        assert_eq!(order.store_orders.len(), 2);
        assert_eq!(order.items_total, 7_000 + 6_000);
        assert_eq!(order.total_delivery_fee, 3_000 + 4_000);
        assert_eq!(order.total_amount, 20_000);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.reconciles());
        assert!(order
            .store_orders
            .iter()
            .all(|s| s.order_id == order.id && s.items.iter().all(|i| i.store_order_id == s.id)));
    }

    #[test]
    fn out_of_range_amounts_are_rejected() {
        let err = Order::place(draft(&[&[(u32::MAX, 3_000_000_000)]])).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = Order::place(draft(&[&[(1, i64::MAX - 1_000)]])).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let big = Order::place(draft(&[&[(u32::MAX, 1_000_000)]])).unwrap();
        assert_eq!(big.items_total, i64::from(u32::MAX) * 1_000_000);
        assert!(big.reconciles());
    }

    #[test]
    fn empty_and_zero_quantity_rejected() {
        assert_eq!(Order::place(draft(&[])).unwrap_err(), DomainError::EmptyOrder);
        assert_eq!(Order::place(draft(&[&[]])).unwrap_err(), DomainError::EmptyOrder);
        let err = Order::place(draft(&[&[(0, 100)]])).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn cancel_releases_every_open_line() {
        let mut order = Order::place(draft(&[&[(2, 100)], &[(1, 100), (4, 50)]])).unwrap();
        let effect = order.cancel().unwrap();
        assert_eq!(effect.release.len(), 3);
        assert_eq!(effect.release.iter().map(|m| m.quantity).sum::<u32>(), 7);
        assert!(effect.settle.is_empty());
        assert!(order
            .store_orders
            .iter()
            .all(|s| s.status == OrderStatus::Cancelled));
        let err = order.cancel().unwrap_err();
        assert_eq!(err.code(), "ILLEGAL_STATE_TRANSITION");
    }

    #[test]
    fn shipment_progress_rolls_up() {
        let mut order = Order::place(draft(&[&[(1, 100)], &[(2, 100)]])).unwrap();
        let (a, b) = (order.store_orders[0].id, order.store_orders[1].id);

        order.apply_shipment_status(a, ShipmentStatus::InProgress).unwrap();
        assert_eq!(order.status, OrderStatus::InProgress);
        assert_eq!(order.store_orders[1].status, OrderStatus::Pending);

        let effect = order.apply_shipment_status(a, ShipmentStatus::Delivered).unwrap();
        assert_eq!(effect.settle.len(), 1);
        assert_eq!(order.status, OrderStatus::InProgress);

        order.apply_shipment_status(b, ShipmentStatus::Failed).unwrap();
        assert_eq!(order.store_orders[1].status, OrderStatus::Pending);

        order.apply_shipment_status(b, ShipmentStatus::Delivered).unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
    }

    #[test]
    fn shipment_on_cancelled_sub_order_is_illegal() {
        let mut order = Order::place(draft(&[&[(1, 100)]])).unwrap();
        let a = order.store_orders[0].id;
        order.cancel().unwrap();
        let err = order
            .apply_shipment_status(a, ShipmentStatus::InProgress)
            .unwrap_err();
        assert_eq!(err.code(), "ILLEGAL_STATE_TRANSITION");
    }

    #[test]
    fn staff_delivery_settles_open_sub_orders() {
        let mut order = Order::place(draft(&[&[(1, 100)], &[(2, 100)]])).unwrap();
        assert!(order.transition_to(OrderStatus::Delivered).is_err());
        order.transition_to(OrderStatus::InProgress).unwrap();
        let effect = order.transition_to(OrderStatus::Delivered).unwrap();
        assert_eq!(effect.settle.len(), 2);
        assert!(order
            .store_orders
            .iter()
            .all(|s| s.status == OrderStatus::Delivered));
    }

    #[test]
    fn payment_mirrors_onto_sub_orders() {
        let mut order = Order::place(draft(&[&[(1, 100)], &[(2, 100)]])).unwrap();
        order.mirror_payment(PaymentStatus::Paid);
        assert!(order
            .store_orders
            .iter()
            .all(|s| s.payment_status == PaymentStatus::Paid));
    }
}
