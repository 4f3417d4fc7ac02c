use market_types::api::{CartLine, DeliveryEstimate};
use market_types::domain::actor::{Actor, Role};
use market_types::domain::address::{Address, Coordinates};
use market_types::domain::catalog::{Product, Store};
use market_types::domain::delivery::{
    quote, DeliveryFeeRule, DeliveryQuote, DeliveryType, QuoteRequest, VehicleType,
};
use market_types::domain::error::DomainError;
use market_types::domain::order::ItemDraft;
use market_types::ports::repository::CatalogRepository;
use uuid::Uuid;

use crate::errors::AppError;

/// One cart line with its catalog data and frozen price.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product: Product,
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
    pub unit_price: i64,
}

/// The lines of a cart that ship from one store.
#[derive(Debug, Clone)]
pub struct StoreCart {
    pub store: Store,
    pub origin: Coordinates,
    pub lines: Vec<PricedLine>,
}

impl StoreCart {
    pub fn weight_grams(&self) -> Result<u32, DomainError> {
        let total: u64 = self
            .lines
            .iter()
            .map(|l| u64::from(l.product.weight_grams) * u64::from(l.quantity))
            .sum();
        u32::try_from(total)
            .map_err(|_| DomainError::invalid(format!("cart weight {total} g is out of range")))
    }

    pub fn quote(
        &self,
        rules: &[DeliveryFeeRule],
        destination: Coordinates,
        delivery_type: DeliveryType,
        vehicle_type: Option<VehicleType>,
    ) -> Result<DeliveryQuote, DomainError> {
        quote(
            rules,
            &QuoteRequest {
                store_id: self.store.id,
                origin: self.origin,
                destination,
                delivery_type,
                vehicle_type,
                weight_grams: self.weight_grams()?,
            },
        )
    }

    pub fn estimate(
        &self,
        rules: &[DeliveryFeeRule],
        destination: Coordinates,
        delivery_type: DeliveryType,
        vehicle_type: Option<VehicleType>,
    ) -> Result<DeliveryEstimate, DomainError> {
        let q = self.quote(rules, destination, delivery_type, vehicle_type)?;
        Ok(DeliveryEstimate {
            store_id: q.store_id,
            store_name: self.store.name.clone(),
            rule_id: q.rule_id,
            delivery_type: q.delivery_type,
            vehicle_type: q.vehicle_type,
            distance_km: q.distance_km,
            weight_grams: q.weight_grams,
            fee: q.fee,
        })
    }

    pub fn item_drafts(&self) -> Vec<ItemDraft> {
        self.lines
            .iter()
            .map(|l| ItemDraft {
                product_id: l.product.id,
                variant_id: l.variant_id,
                quantity: l.quantity,
                unit_price: l.unit_price,
            })
            .collect()
    }
}

/// Loads the destination address. Buyers may only use their own addresses.
pub async fn destination<R: CatalogRepository>(
    repo: &R,
    actor: &Actor,
    address_id: Uuid,
) -> Result<Address, AppError> {
    let address = repo
        .get_address(address_id)
        .await?
        .ok_or_else(|| DomainError::not_found("address", address_id))?;
    if actor.role == Role::Buyer && address.user_id != actor.user_id {
        return Err(DomainError::forbidden("destination address belongs to another user").into());
    }
    Ok(address)
}

/// Prices the cart and groups it by store, stores in order of first
/// appearance.
pub async fn resolve<R: CatalogRepository>(
    repo: &R,
    lines: &[CartLine],
) -> Result<Vec<StoreCart>, AppError> {
    if lines.is_empty() {
        return Err(DomainError::EmptyOrder.into());
    }

    let mut carts: Vec<StoreCart> = Vec::new();
    for line in lines {
        if line.quantity == 0 {
            return Err(DomainError::invalid(format!(
                "quantity for product {} must be > 0",
                line.product_id
            ))
            .into());
        }
        let product = repo
            .get_product(line.product_id)
            .await?
            .ok_or(DomainError::ProductNotFound(line.product_id))?;
        let variant = match line.variant_id {
            Some(id) => {
                let variant = repo
                    .get_variant(id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("variant", id))?;
                if variant.product_id != product.id {
                    return Err(DomainError::invalid(format!(
                        "variant {id} does not belong to product {}",
                        product.id
                    ))
                    .into());
                }
                Some(variant)
            }
            None => None,
        };
        let priced = PricedLine {
            unit_price: product.unit_price(variant.as_ref()),
            variant_id: line.variant_id,
            quantity: line.quantity,
            product,
        };

        let store_id = priced.product.store_id;
        if let Some(i) = carts.iter().position(|c| c.store.id == store_id) {
            carts[i].lines.push(priced);
            continue;
        }
        let store = repo
            .get_store(store_id)
            .await?
            .ok_or_else(|| DomainError::not_found("store", store_id))?;
        let origin = repo
            .get_address(store.address_id)
            .await?
            .ok_or_else(|| DomainError::not_found("address", store.address_id))?;
        carts.push(StoreCart {
            store,
            origin: origin.coordinates,
            lines: vec![priced],
        });
    }
    Ok(carts)
}
