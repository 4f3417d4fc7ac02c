use std::sync::Arc;

use market_types::api::{DeliveryEstimate, DeliveryOption, EstimateRequest, OptionsRequest};
use market_types::domain::actor::{Actor, Capability};
use market_types::domain::address::Coordinates;
use market_types::domain::delivery::{DeliveryFeeRule, DeliveryType, VehicleType};
use market_types::domain::error::DomainError;
use market_types::ports::repository::MarketRepository;

use crate::application::cart::{self, StoreCart};
use crate::errors::AppError;

pub struct DeliveryService<R: MarketRepository> {
    repo: Arc<R>,
}

fn estimate_all(
    carts: &[StoreCart],
    rules: &[DeliveryFeeRule],
    destination: Coordinates,
    delivery_type: DeliveryType,
    vehicle_type: Option<VehicleType>,
) -> Result<Vec<DeliveryEstimate>, DomainError> {
    carts
        .iter()
        .map(|c| c.estimate(rules, destination, delivery_type, vehicle_type))
        .collect()
}

impl<R: MarketRepository> DeliveryService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// One fee per store of the cart. Any store without a fitting rule fails
    /// the whole estimate.
    pub async fn estimate(
        &self,
        actor: &Actor,
        request: EstimateRequest,
    ) -> Result<Vec<DeliveryEstimate>, AppError> {
        actor.authorize(Capability::EstimateDelivery)?;
        let destination =
            cart::destination(&*self.repo, actor, request.destination_address_id).await?;
        let carts = cart::resolve(&*self.repo, &request.items).await?;
        let rules = self.repo.list_rules(true).await?;
        Ok(estimate_all(
            &carts,
            &rules,
            destination.coordinates,
            request.delivery_type,
            request.vehicle_type,
        )?)
    }

    /// Every delivery type / vehicle combination the whole cart can ship
    /// with, cheapest first. A vehicle that only falls back to the same
    /// rules as an unspecified vehicle is not listed twice.
    pub async fn options(
        &self,
        actor: &Actor,
        request: OptionsRequest,
    ) -> Result<Vec<DeliveryOption>, AppError> {
        actor.authorize(Capability::EstimateDelivery)?;
        let destination =
            cart::destination(&*self.repo, actor, request.destination_address_id).await?;
        destination.coordinates.require_known()?;
        let carts = cart::resolve(&*self.repo, &request.items).await?;
        let rules = self.repo.list_rules(true).await?;

        let vehicles = std::iter::once(None).chain(VehicleType::VARIANTS.iter().copied().map(Some));
        let combos: Vec<(DeliveryType, Option<VehicleType>)> = DeliveryType::VARIANTS
            .iter()
            .flat_map(|dt| vehicles.clone().map(move |vt| (*dt, vt)))
            .collect();

        let mut options: Vec<DeliveryOption> = Vec::new();
        for (delivery_type, vehicle_type) in combos {
            let estimates = match estimate_all(
                &carts,
                &rules,
                destination.coordinates,
                delivery_type,
                vehicle_type,
            ) {
                Ok(estimates) => estimates,
                Err(DomainError::NoApplicableRule { .. }) => continue,
                Err(e) => return Err(e.into()),
            };
            let duplicate = options.iter().any(|o| {
                o.delivery_type == delivery_type
                    && o.estimates
                        .iter()
                        .map(|e| e.rule_id)
                        .eq(estimates.iter().map(|e| e.rule_id))
            });
            if duplicate {
                continue;
            }
            options.push(DeliveryOption {
                delivery_type,
                vehicle_type,
                total_fee: estimates.iter().map(|e| e.fee).sum(),
                estimates,
            });
        }
        options.sort_by_key(|o| o.total_fee);
        Ok(options)
    }

    pub async fn add_rule(
        &self,
        actor: &Actor,
        rule: DeliveryFeeRule,
    ) -> Result<DeliveryFeeRule, AppError> {
        actor.authorize(Capability::ManageFeeRules)?;
        rule.validate()?;
        let rule = self.repo.insert_rule(rule).await?;
        tracing::info!(
            rule_id = %rule.id,
            delivery_type = %rule.delivery_type,
            vehicle_type = ?rule.vehicle_type,
            "delivery fee rule added"
        );
        Ok(rule)
    }

    /// Active rules; staff may ask for inactive ones too.
    pub async fn list_rules(
        &self,
        actor: &Actor,
        include_inactive: bool,
    ) -> Result<Vec<DeliveryFeeRule>, AppError> {
        let active_only = !(include_inactive && actor.is_staff());
        Ok(self.repo.list_rules(active_only).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fixtures::{line, rule, world};
    use market_types::api::CartLine;
    use market_types::domain::actor::Role;
    use market_types::domain::delivery::compute_fee;
    use market_types::ports::repository::CatalogRepository;
    use uuid::Uuid;

    fn estimate_request(destination: Uuid, items: Vec<CartLine>) -> EstimateRequest {
        EstimateRequest {
            destination_address_id: destination,
            delivery_type: DeliveryType::Standard,
            vehicle_type: None,
            items,
        }
    }

    #[tokio::test]
    async fn estimate_quotes_every_store() {
        let w = world().await;
        let estimates = w
            .market
            .delivery
            .estimate(
                &w.buyer,
                estimate_request(w.home, vec![line(w.widget, 1), line(w.crate_, 2)]),
            )
            .await
            .unwrap();
        assert_eq!(estimates.len(), 2);
        assert_eq!(estimates[0].store_name, "Boutique Kipé");
        assert_eq!(estimates[1].rule_id, w.far_rule.id);
        assert_eq!(
            estimates[1].fee,
            compute_fee(&w.far_rule, estimates[1].distance_km, 6_000)
        );
    }

    #[tokio::test]
    async fn unknown_destination_fails_closed() {
        let w = world().await;
        let err = w
            .market
            .delivery
            .estimate(&w.buyer, estimate_request(w.nowhere, vec![line(w.widget, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.body().code, "INVALID_COORDINATES");
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn one_unserviceable_store_fails_the_estimate() {
        let w = world().await;
        // 4 crates = 12 kg, above every rule.
        let err = w
            .market
            .delivery
            .estimate(
                &w.buyer,
                estimate_request(w.home, vec![line(w.widget, 1), line(w.crate_, 4)]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.body().code, "NO_APPLICABLE_RULE");
    }

    #[tokio::test]
    async fn options_list_serviceable_combinations_cheapest_first() {
        let w = world().await;
        let mut express = rule(20_000, 60.0, 9_000);
        express.delivery_type = DeliveryType::Express;
        w.repo.insert_rule(express).await.unwrap();
        let mut truck = rule(20_000, 60.0, 4_000);
        truck.vehicle_type = Some(VehicleType::Truck);
        let truck = w.repo.insert_rule(truck).await.unwrap();

        let options = w
            .market
            .delivery
            .options(
                &w.buyer,
                OptionsRequest {
                    destination_address_id: w.home,
                    items: vec![line(w.widget, 1), line(w.crate_, 2)],
                },
            )
            .await
            .unwrap();

        let combos: Vec<_> = options
            .iter()
            .map(|o| (o.delivery_type, o.vehicle_type))
            .collect();
        assert_eq!(combos.len(), 3);
        assert!(combos.contains(&(DeliveryType::Standard, None)));
        assert!(combos.contains(&(DeliveryType::Standard, Some(VehicleType::Truck))));
        assert!(combos.contains(&(DeliveryType::Express, None)));
        assert!(options.windows(2).all(|p| p[0].total_fee <= p[1].total_fee));
        let by_truck = options
            .iter()
            .find(|o| o.vehicle_type == Some(VehicleType::Truck))
            .unwrap();
        assert!(by_truck.estimates.iter().all(|e| e.rule_id == truck.id));
    }

    #[tokio::test]
    async fn rules_are_validated_and_staff_only() {
        let w = world().await;
        let err = w
            .market
            .delivery
            .add_rule(&w.buyer, rule(1_000, 1.0, 100))
            .await
            .unwrap_err();
        assert_eq!(err.body().code, "AUTHORIZATION_ERROR");

        let mut bad = rule(1_000, 1.0, 100);
        bad.min_fee = bad.max_fee + 1;
        let err = w.market.delivery.add_rule(&w.manager, bad).await.unwrap_err();
        assert_eq!(err.body().code, "VALIDATION_ERROR");

        let mut dormant = rule(1_000, 1.0, 100);
        dormant.active = false;
        w.market.delivery.add_rule(&w.admin, dormant).await.unwrap();

        let buyer_view = w.market.delivery.list_rules(&w.buyer, true).await.unwrap();
        assert_eq!(buyer_view.len(), 2);
        let staff_view = w.market.delivery.list_rules(&w.admin, true).await.unwrap();
        assert_eq!(staff_view.len(), 3);
    }

    #[tokio::test]
    async fn buyers_quote_only_their_own_addresses() {
        let w = world().await;
        let other = Actor::new(Uuid::new_v4(), Role::Buyer);
        let err = w
            .market
            .delivery
            .estimate(&other, estimate_request(w.home, vec![line(w.widget, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.body().code, "AUTHORIZATION_ERROR");

        let store_view = w
            .market
            .delivery
            .estimate(&w.near_owner, estimate_request(w.home, vec![line(w.widget, 1)]))
            .await
            .unwrap();
        assert_eq!(store_view.len(), 1);
    }
}
