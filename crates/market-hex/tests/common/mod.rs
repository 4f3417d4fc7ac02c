//! Two-store catalogue loaded through the seed loader.
#![allow(dead_code)]

use market_hex::application::seed;
use market_hex::domain::address::{Address, AddressLocation, Coordinates};
use market_hex::domain::catalog::{CatalogSeed, Driver, Product, Store};
use market_hex::domain::delivery::{DeliveryFeeRule, DeliveryType, VehicleType};
use market_hex::ports::repository::CatalogRepository;
use rust_decimal::Decimal;
use uuid::Uuid;

pub struct Shop {
    pub buyer: Uuid,
    pub admin: Uuid,
    pub near_owner: Uuid,
    pub far_owner: Uuid,
    pub driver_user: Uuid,
    pub home: Uuid,
    pub nowhere: Uuid,
    pub near_store: Uuid,
    pub far_store: Uuid,
    pub widget: Uuid,
    pub crate_: Uuid,
    pub driver_id: Uuid,
    pub near_rule: DeliveryFeeRule,
    pub far_rule: DeliveryFeeRule,
}

fn address(user_id: Uuid, lat: f64, lng: f64, formatted: &str) -> Address {
    Address {
        id: Uuid::new_v4(),
        user_id,
        location: AddressLocation::Rural {
            sub_prefecture: "Manéah".into(),
            prefecture: "Coyah".into(),
            district: None,
            landmark: Some("station Total".into()),
        },
        coordinates: Coordinates::new(lat, lng),
        region: "Kindia".into(),
        postal_code: None,
        formatted: formatted.into(),
    }
}

/// R1: up to 2 kg / 10 km, base 3000. R2: up to 10 kg / 50 km, base 5000.
fn rule(weight_max_grams: u32, distance_max_km: f64, base_fee: i64) -> DeliveryFeeRule {
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

pub async fn open_shop<R: CatalogRepository>(repo: &R) -> Shop {
    let (buyer, near_owner, far_owner, driver_user) =
        (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let home = address(buyer, 9.5370, -13.6785, "home");
    let nowhere = address(buyer, 0.0, 0.0, "never geocoded");
    let near_origin = address(near_owner, 9.5820, -13.6785, "near depot");
    let far_origin = address(far_owner, 9.8967, -13.6785, "far depot");
    let near_store = Store {
        id: Uuid::new_v4(),
        owner_id: near_owner,
        name: "Boutique Kipé".into(),
        address_id: near_origin.id,
    };
    let far_store = Store {
        id: Uuid::new_v4(),
        owner_id: far_owner,
        name: "Dépôt Coyah".into(),
        address_id: far_origin.id,
    };
    let widget = Product {
        id: Uuid::new_v4(),
        store_id: near_store.id,
        name: "Widget".into(),
        price: 1_000,
        weight_grams: 1_000,
        available_stock: 5,
        reserved_stock: 0,
    };
    let crate_ = Product {
        id: Uuid::new_v4(),
        store_id: far_store.id,
        name: "Crate".into(),
        price: 2_000,
        weight_grams: 3_000,
        available_stock: 10,
        reserved_stock: 0,
    };
    let driver = Driver {
        id: Uuid::new_v4(),
        user_id: driver_user,
        name: "Mamadou".into(),
        vehicle_type: VehicleType::Moto,
        is_available: true,
    };
    let near_rule = rule(2_000, 10.0, 3_000);
    let far_rule = rule(10_000, 50.0, 5_000);

    let shop = Shop {
        buyer,
        admin: Uuid::new_v4(),
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
        near_rule: near_rule.clone(),
        far_rule: far_rule.clone(),
    };
    seed::load(
        repo,
        CatalogSeed {
            addresses: vec![home, nowhere, near_origin, far_origin],
            stores: vec![near_store, far_store],
            products: vec![widget, crate_],
            variants: vec![],
            drivers: vec![driver],
            rules: vec![near_rule, far_rule],
        },
    )
    .await
    .unwrap();
    shop
}
