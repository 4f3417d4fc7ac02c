use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::address::Address;
use crate::domain::delivery::{DeliveryFeeRule, VehicleType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: Uuid,
    /// The store-role user that manages this store.
    pub owner_id: Uuid,
    pub name: String,
    /// Pickup location used as the origin of delivery fees.
    pub address_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub store_id: Uuid,
    pub name: String,
    pub price: i64,
    pub weight_grams: u32,
    pub available_stock: u32,
    #[serde(default)]
    pub reserved_stock: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    /// Overrides the product price when set.
    pub price: Option<i64>,
}

impl Product {
    pub fn unit_price(&self, variant: Option<&ProductVariant>) -> i64 {
        variant.and_then(|v| v.price).unwrap_or(self.price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub vehicle_type: VehicleType,
    pub is_available: bool,
}

/// Units moved between `available`, `reserved` and out of inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockMovement {
    pub product_id: Uuid,
    pub quantity: u32,
}

/// Reference data loaded into a fresh store (fixtures, demo data).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogSeed {
    pub addresses: Vec<Address>,
    pub stores: Vec<Store>,
    pub products: Vec<Product>,
    pub variants: Vec<ProductVariant>,
    pub drivers: Vec<Driver>,
    pub rules: Vec<DeliveryFeeRule>,
}
