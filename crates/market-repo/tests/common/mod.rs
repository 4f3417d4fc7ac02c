//! Scenarios shared by the memory and sqlite adapter tests.
#![allow(dead_code)]

use std::sync::Arc;

use market_types::domain::address::{Address, AddressLocation, Coordinates};
use market_types::domain::catalog::{Driver, Product, Store};
use market_types::domain::delivery::{DeliveryQuote, DeliveryType, VehicleType};
use market_types::domain::error::DomainError;
use market_types::domain::order::{ItemDraft, Order, OrderDraft, StoreOrderDraft};
use market_types::domain::payment::{Payment, PaymentMethod};
use market_types::domain::query::{OrderQuery, Pagination, ShipmentQuery, StoreOrderQuery};
use market_types::domain::shipment::{Priority, Shipment, ShipmentPatch, TrackingPing};
use market_types::domain::status::{OrderStatus, PaymentStatus, ShipmentStatus};
use market_types::ports::repository::{MarketRepository, RepoError};
use uuid::Uuid;

pub struct Fixture {
    pub store_id: Uuid,
    pub widget: Uuid,
    pub gadget: Uuid,
    pub driver_id: Uuid,
}

pub async fn seed<R: MarketRepository>(repo: &R) -> Fixture {
    let owner = Uuid::new_v4();
    let address = repo
        .insert_address(Address {
            id: Uuid::new_v4(),
            user_id: owner,
            location: AddressLocation::Urban {
                commune: "Kaloum".into(),
                district: "Boulbinet".into(),
                landmark: None,
                street: None,
            },
            coordinates: Coordinates::new(9.5092, -13.7122),
            region: "Conakry".into(),
            postal_code: None,
            formatted: "Boulbinet, Kaloum".into(),
        })
        .await
        .unwrap();
    let store = repo
        .insert_store(Store {
            id: Uuid::new_v4(),
            owner_id: owner,
            name: "Marché Niger".into(),
            address_id: address.id,
        })
        .await
        .unwrap();
    let widget = repo
        .insert_product(product(store.id, "Widget", 5))
        .await
        .unwrap();
    let gadget = repo
        .insert_product(product(store.id, "Gadget", 2))
        .await
        .unwrap();
    let driver = repo
        .insert_driver(Driver {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Mamadou".into(),
            vehicle_type: VehicleType::Moto,
            is_available: true,
        })
        .await
        .unwrap();
    Fixture {
        store_id: store.id,
        widget: widget.id,
        gadget: gadget.id,
        driver_id: driver.id,
    }
}

fn product(store_id: Uuid, name: &str, stock: u32) -> Product {
    Product {
        id: Uuid::new_v4(),
        store_id,
        name: name.into(),
        price: 1_000,
        weight_grams: 500,
        available_stock: stock,
        reserved_stock: 0,
    }
}

pub fn order_for(fx: &Fixture, lines: &[(Uuid, u32)]) -> (Order, Payment) {
    let quote = DeliveryQuote {
        store_id: fx.store_id,
        rule_id: Uuid::new_v4(),
        delivery_type: DeliveryType::Standard,
        vehicle_type: Some(VehicleType::Moto),
        distance_km: 4.2,
        weight_grams: 1_500,
        fee: 2_500,
    };
    let order = Order::place(OrderDraft {
        buyer_id: Uuid::new_v4(),
        destination_address_id: Uuid::new_v4(),
        delivery_type: DeliveryType::Standard,
        vehicle_type: Some(VehicleType::Moto),
        payment_method: PaymentMethod::MobileMoney,
        stores: vec![StoreOrderDraft {
            quote,
            delivery_notes: Some("gate B".into()),
            items: lines
                .iter()
                .map(|(product_id, quantity)| ItemDraft {
                    product_id: *product_id,
                    variant_id: None,
                    quantity: *quantity,
                    unit_price: 1_000,
                })
                .collect(),
        }],
    })
    .unwrap();
    let payment = Payment::for_order(&order);
    (order, payment)
}

async fn stock<R: MarketRepository>(repo: &R, id: Uuid) -> (u32, u32) {
    let p = repo.get_product(id).await.unwrap().unwrap();
    (p.available_stock, p.reserved_stock)
}

pub async fn place_then_cancel_restores_stock<R: MarketRepository>(repo: &R) {
    let fx = seed(repo).await;
    let (order, payment) = order_for(&fx, &[(fx.widget, 3)]);
    repo.place_order(&order, &payment).await.unwrap();
    assert_eq!(stock(repo, fx.widget).await, (2, 3));

    let stored = repo.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.store_orders.len(), 1);
    assert_eq!(stored.store_orders[0].items.len(), 1);
    assert!(stored.reconciles());
    let pay = repo.get_payment_for_order(order.id).await.unwrap().unwrap();
    assert_eq!(pay.amount, stored.total_amount);

    let cancelled = repo.cancel_order(order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.store_orders[0].status, OrderStatus::Cancelled);
    assert_eq!(stock(repo, fx.widget).await, (5, 0));

    let again = repo.cancel_order(order.id).await.unwrap_err();
    assert!(matches!(
        again,
        RepoError::Domain(DomainError::IllegalStateTransition { .. })
    ));
    assert_eq!(stock(repo, fx.widget).await, (5, 0));
}

pub async fn place_is_all_or_nothing<R: MarketRepository>(repo: &R) {
    let fx = seed(repo).await;
    let (order, payment) = order_for(&fx, &[(fx.widget, 1), (fx.gadget, 3)]);
    let err = repo.place_order(&order, &payment).await.unwrap_err();
    match err {
        RepoError::Domain(DomainError::InsufficientStock {
            product_id,
            requested,
            available,
        }) => {
            assert_eq!(product_id, fx.gadget);
            assert_eq!((requested, available), (3, 2));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(stock(repo, fx.widget).await, (5, 0));
    assert_eq!(stock(repo, fx.gadget).await, (2, 0));
    assert!(repo.get_order(order.id).await.unwrap().is_none());
    assert!(repo.get_payment_for_order(order.id).await.unwrap().is_none());
}

pub async fn unknown_product_is_rejected<R: MarketRepository>(repo: &R) {
    let fx = seed(repo).await;
    let ghost = Uuid::new_v4();
    let (order, payment) = order_for(&fx, &[(fx.widget, 1), (ghost, 1)]);
    let err = repo.place_order(&order, &payment).await.unwrap_err();
    assert!(matches!(
        err,
        RepoError::Domain(DomainError::ProductNotFound(id)) if id == ghost
    ));
    assert_eq!(stock(repo, fx.widget).await, (5, 0));
}

pub async fn illegal_status_change_leaves_order_untouched<R: MarketRepository>(repo: &R) {
    let fx = seed(repo).await;
    let (order, payment) = order_for(&fx, &[(fx.widget, 1)]);
    repo.place_order(&order, &payment).await.unwrap();

    let err = repo
        .set_order_status(order.id, OrderStatus::Delivered)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Domain(DomainError::IllegalStateTransition { .. })
    ));
    let stored = repo.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stock(repo, fx.widget).await, (4, 1));

    let missing = repo
        .set_order_status(Uuid::new_v4(), OrderStatus::InProgress)
        .await
        .unwrap_err();
    assert!(matches!(
        missing,
        RepoError::Domain(DomainError::NotFound { .. })
    ));
}

pub async fn shipment_drives_order_and_revenue<R: MarketRepository>(repo: &R) {
    let fx = seed(repo).await;
    let (order, payment) = order_for(&fx, &[(fx.widget, 2)]);
    repo.place_order(&order, &payment).await.unwrap();
    let sub = order.store_orders[0].clone();

    let shipment = Shipment::open(&sub, Some(fx.driver_id), Priority::High, true, None);
    let shipment = repo.insert_shipment(shipment).await.unwrap();
    assert_eq!(shipment.status, ShipmentStatus::InProgress);
    assert_eq!(shipment.delivery_notes.as_deref(), Some("gate B"));

    let stored = repo.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::InProgress);
    assert_eq!(stored.store_orders[0].status, OrderStatus::InProgress);
    let driver = repo.get_driver(fx.driver_id).await.unwrap().unwrap();
    assert!(!driver.is_available);

    let dup = Shipment::open(&sub, None, Priority::Normal, true, None);
    let err = repo.insert_shipment(dup).await.unwrap_err();
    assert!(matches!(
        err,
        RepoError::Domain(DomainError::ShipmentAlreadyActive(id)) if id == sub.id
    ));

    let delivered = repo
        .update_shipment(
            shipment.id,
            ShipmentPatch {
                status: Some(ShipmentStatus::Delivered),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(delivered.status, ShipmentStatus::Delivered);

    let stored = repo.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Delivered);
    assert_eq!(stored.store_orders[0].status, OrderStatus::Delivered);
    assert_eq!(stock(repo, fx.widget).await, (3, 0));
    let driver = repo.get_driver(fx.driver_id).await.unwrap().unwrap();
    assert!(driver.is_available);

    assert_eq!(repo.store_revenue(fx.store_id).await.unwrap(), 0);
    let paid = repo
        .settle_payment(order.id, PaymentStatus::Paid, Some("OM-7731".into()))
        .await
        .unwrap();
    assert_eq!(paid.status, PaymentStatus::Paid);
    assert_eq!(paid.transaction_id.as_deref(), Some("OM-7731"));
    let stored = repo.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.store_orders[0].payment_status, PaymentStatus::Paid);
    assert_eq!(repo.store_revenue(fx.store_id).await.unwrap(), 2_000);

    let err = repo
        .update_shipment(shipment.id, ShipmentPatch::assign(fx.driver_id))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Domain(DomainError::Validation(_))));
}

pub async fn cancel_fails_open_shipments<R: MarketRepository>(repo: &R) {
    let fx = seed(repo).await;
    let (order, payment) = order_for(&fx, &[(fx.widget, 1)]);
    repo.place_order(&order, &payment).await.unwrap();
    let shipment = Shipment::open(&order.store_orders[0], Some(fx.driver_id), Priority::Normal, false, None);
    repo.insert_shipment(shipment.clone()).await.unwrap();

    repo.cancel_order(order.id).await.unwrap();
    let stored = repo.get_shipment(shipment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ShipmentStatus::Failed);
    assert!(repo.get_driver(fx.driver_id).await.unwrap().unwrap().is_available);
    assert_eq!(stock(repo, fx.widget).await, (5, 0));
}

/// Two lines of one product whose quantities only overflow once added up.
pub async fn oversized_cart_is_insufficient_stock<R: MarketRepository>(repo: &R) {
    let fx = seed(repo).await;
    let (order, payment) = order_for(&fx, &[(fx.widget, 1 << 31), (fx.widget, 1 << 31)]);
    let err = repo.place_order(&order, &payment).await.unwrap_err();
    match err {
        RepoError::Domain(DomainError::InsufficientStock {
            product_id,
            requested,
            available,
        }) => {
            assert_eq!(product_id, fx.widget);
            assert_eq!((requested, available), (u32::MAX, 5));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(stock(repo, fx.widget).await, (5, 0));
    assert!(repo.get_order(order.id).await.unwrap().is_none());
}

/// Staff delivering an order only delivers shipments already under way;
/// shipments that never left fail.
pub async fn staff_delivery_closes_shipments_by_progress<R: MarketRepository>(repo: &R) {
    let fx = seed(repo).await;

    let (waiting, payment) = order_for(&fx, &[(fx.widget, 1)]);
    repo.place_order(&waiting, &payment).await.unwrap();
    let idle = Shipment::open(&waiting.store_orders[0], None, Priority::Normal, true, None);
    repo.insert_shipment(idle.clone()).await.unwrap();
    repo.set_order_status(waiting.id, OrderStatus::InProgress)
        .await
        .unwrap();
    let done = repo
        .set_order_status(waiting.id, OrderStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(done.status, OrderStatus::Delivered);
    let idle = repo.get_shipment(idle.id).await.unwrap().unwrap();
    assert_eq!(idle.status, ShipmentStatus::Failed);

    let (moving, payment) = order_for(&fx, &[(fx.widget, 1)]);
    repo.place_order(&moving, &payment).await.unwrap();
    let riding = Shipment::open(&moving.store_orders[0], Some(fx.driver_id), Priority::High, true, None);
    repo.insert_shipment(riding.clone()).await.unwrap();
    repo.set_order_status(moving.id, OrderStatus::Delivered)
        .await
        .unwrap();
    let riding = repo.get_shipment(riding.id).await.unwrap().unwrap();
    assert_eq!(riding.status, ShipmentStatus::Delivered);
    assert!(repo.get_driver(fx.driver_id).await.unwrap().unwrap().is_available);
    assert_eq!(stock(repo, fx.widget).await, (3, 0));
}

/// Two shipments race for one driver. Exactly one wins.
pub async fn concurrent_assignment_claims_driver_once<R: MarketRepository>(repo: Arc<R>) {
    let fx = seed(repo.as_ref()).await;
    let mut shipments = Vec::new();
    for _ in 0..2 {
        let (order, payment) = order_for(&fx, &[(fx.widget, 1)]);
        repo.place_order(&order, &payment).await.unwrap();
        let shipment = Shipment::open(&order.store_orders[0], None, Priority::Normal, true, None);
        shipments.push(repo.insert_shipment(shipment).await.unwrap());
    }

    let handles: Vec<_> = shipments
        .iter()
        .map(|s| {
            let repo = repo.clone();
            let (id, driver) = (s.id, fx.driver_id);
            tokio::spawn(async move { repo.update_shipment(id, ShipmentPatch::assign(driver)).await })
        })
        .collect();
    let mut won = 0;
    let mut lost = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(s) => {
                assert_eq!(s.status, ShipmentStatus::InProgress);
                won += 1;
            }
            Err(RepoError::Domain(DomainError::DriverUnavailable(id))) => {
                assert_eq!(id, fx.driver_id);
                lost += 1;
            }
            Err(other) => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!((won, lost), (1, 1));

    let page = repo
        .search_shipments(&ShipmentQuery {
            driver_id: Some(fx.driver_id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

pub async fn searches_filter_and_paginate<R: MarketRepository>(repo: &R) {
    let fx = seed(repo).await;
    let mut placed = Vec::new();
    for _ in 0..3 {
        let (order, payment) = order_for(&fx, &[(fx.widget, 1)]);
        repo.place_order(&order, &payment).await.unwrap();
        placed.push(order);
    }
    let buyer = placed[0].buyer_id;

    let page = repo
        .search_orders(&OrderQuery {
            buyer_id: Some(buyer),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, placed[0].id);

    let page = repo
        .search_orders(&OrderQuery {
            status: Some(OrderStatus::Pending),
            pagination: Pagination::new(Some(2), Some(2)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 1);

    let shipment = Shipment::open(&placed[1].store_orders[0], None, Priority::Low, true, None);
    repo.insert_shipment(shipment).await.unwrap();
    let page = repo
        .search_store_orders(&StoreOrderQuery {
            store_ids: vec![fx.store_id],
            shipment_status: Some(ShipmentStatus::Pending),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].store_order.id, placed[1].store_orders[0].id);
    assert_eq!(page.items[0].buyer_id, placed[1].buyer_id);
    assert_eq!(page.items[0].payment_method, PaymentMethod::MobileMoney);

    let none = repo
        .search_store_orders(&StoreOrderQuery {
            store_ids: vec![Uuid::new_v4()],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(none.total, 0);
}

pub async fn tracking_is_append_only<R: MarketRepository>(repo: &R) {
    let fx = seed(repo).await;
    let (order, payment) = order_for(&fx, &[(fx.widget, 1)]);
    repo.place_order(&order, &payment).await.unwrap();
    let shipment = repo
        .insert_shipment(Shipment::open(&order.store_orders[0], Some(fx.driver_id), Priority::Normal, true, None))
        .await
        .unwrap();

    for (lat, lon) in [(9.51, -13.71), (9.53, -13.68)] {
        let ping = TrackingPing::new(shipment.id, Coordinates::new(lat, lon)).unwrap();
        repo.add_tracking(ping).await.unwrap();
    }
    let pings = repo.list_tracking(shipment.id).await.unwrap();
    assert_eq!(pings.len(), 2);
    assert!(pings[0].recorded_at <= pings[1].recorded_at);
    assert_eq!(pings[1].latitude, 9.53);

    let orphan = TrackingPing::new(Uuid::new_v4(), Coordinates::new(9.5, -13.7)).unwrap();
    let err = repo.add_tracking(orphan).await.unwrap_err();
    assert!(matches!(err, RepoError::Domain(DomainError::NotFound { .. })));
}
