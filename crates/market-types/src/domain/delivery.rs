use std::cmp::Ordering;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::address::Coordinates;
use crate::domain::error::DomainError;
use crate::domain::geo::compute_distance;

labelled_enum! {
    pub enum DeliveryType {
        Standard => "STANDARD",
        Express => "EXPRESS",
    }
}

impl Default for DeliveryType {
    fn default() -> Self {
        DeliveryType::Standard
    }
}

labelled_enum! {
    pub enum VehicleType {
        Moto => "MOTO",
        Car => "CAR",
        Truck => "TRUCK",
    }
}

fn default_active() -> bool {
    true
}

/// A configured pricing band. Weights are grams, distances kilometres, fees
/// whole currency units (GNF has no minor unit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFeeRule {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub delivery_type: DeliveryType,
    /// `None` matches any vehicle.
    pub vehicle_type: Option<VehicleType>,
    pub weight_max_grams: u32,
    pub distance_max_km: f64,
    /// Weight covered by the base fee before the weight surcharge starts.
    #[serde(default)]
    pub included_weight_grams: u32,
    /// Distance covered by the base fee before the distance surcharge starts.
    #[serde(default)]
    pub included_distance_km: f64,
    pub base_fee: i64,
    /// Per gram above `included_weight_grams`.
    pub weight_surcharge_rate: Decimal,
    /// Per kilometre above `included_distance_km`.
    pub distance_surcharge_rate: Decimal,
    pub min_fee: i64,
    pub max_fee: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl DeliveryFeeRule {
    pub fn validate(&self) -> Result<(), DomainError> {
        let finite_non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !finite_non_negative(self.distance_max_km) || !finite_non_negative(self.included_distance_km)
        {
            return Err(DomainError::invalid("rule distances must be finite and >= 0"));
        }
        if self.weight_surcharge_rate.is_sign_negative()
            || self.distance_surcharge_rate.is_sign_negative()
        {
            return Err(DomainError::invalid("surcharge rates must be >= 0"));
        }
        if self.base_fee < 0 || self.min_fee < 0 {
            return Err(DomainError::invalid("fees must be >= 0"));
        }
        if self.min_fee > self.max_fee {
            return Err(DomainError::invalid("minFee must not exceed maxFee"));
        }
        Ok(())
    }

    pub fn accommodates(&self, weight_grams: u32, distance_km: f64) -> bool {
        weight_grams <= self.weight_max_grams && distance_km <= self.distance_max_km
    }

    fn tightness_cmp(&self, other: &Self) -> Ordering {
        self.weight_max_grams
            .cmp(&other.weight_max_grams)
            .then(self.distance_max_km.total_cmp(&other.distance_max_km))
            .then(self.id.cmp(&other.id))
    }
}

fn tightest_fit(
    rules: &[DeliveryFeeRule],
    delivery_type: DeliveryType,
    vehicle_type: Option<VehicleType>,
    weight_grams: u32,
    distance_km: f64,
) -> Option<&DeliveryFeeRule> {
    rules
        .iter()
        .filter(|r| r.active && r.delivery_type == delivery_type && r.vehicle_type == vehicle_type)
        .filter(|r| r.accommodates(weight_grams, distance_km))
        .min_by(|a, b| a.tightness_cmp(b))
}

/// Picks the active rule for the tuple. An exact vehicle match beats a
/// vehicle-agnostic rule; within a tier the smallest band that still holds
/// the parcel wins. Without a vehicle only agnostic rules are eligible.
pub fn resolve_rule(
    rules: &[DeliveryFeeRule],
    delivery_type: DeliveryType,
    vehicle_type: Option<VehicleType>,
    weight_grams: u32,
    distance_km: f64,
) -> Result<&DeliveryFeeRule, DomainError> {
    let exact = match vehicle_type {
        Some(v) => tightest_fit(rules, delivery_type, Some(v), weight_grams, distance_km),
        None => None,
    };
    exact
        .or_else(|| tightest_fit(rules, delivery_type, None, weight_grams, distance_km))
        .ok_or(DomainError::NoApplicableRule {
            delivery_type,
            vehicle_type,
            weight_grams,
            distance_km,
        })
}

/// `clamp(base + wRate * excessWeight + dRate * excessKm, min, max)`, rounded
/// half up to a whole amount. A surcharge too large to represent saturates
/// at `max_fee`.
pub fn compute_fee(rule: &DeliveryFeeRule, distance_km: f64, weight_grams: u32) -> i64 {
    let excess_weight = Decimal::from(weight_grams.saturating_sub(rule.included_weight_grams));
    let excess_km = Decimal::from_f64((distance_km - rule.included_distance_km).max(0.0))
        .unwrap_or(Decimal::ZERO);

    let raw = rule
        .weight_surcharge_rate
        .checked_mul(excess_weight)
        .zip(rule.distance_surcharge_rate.checked_mul(excess_km))
        .and_then(|(w, d)| Decimal::from(rule.base_fee).checked_add(w)?.checked_add(d));
    let rounded = raw
        .and_then(|raw| {
            raw.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
        })
        .unwrap_or(rule.max_fee);
    rounded.max(rule.min_fee).min(rule.max_fee)
}

/// Fee breakdown for one store's parcel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryQuote {
    pub store_id: Uuid,
    pub rule_id: Uuid,
    pub delivery_type: DeliveryType,
    pub vehicle_type: Option<VehicleType>,
    pub distance_km: f64,
    pub weight_grams: u32,
    pub fee: i64,
}

pub struct QuoteRequest {
    pub store_id: Uuid,
    pub origin: Coordinates,
    pub destination: Coordinates,
    pub delivery_type: DeliveryType,
    pub vehicle_type: Option<VehicleType>,
    pub weight_grams: u32,
}

/// Distance, rule and fee in one step.
pub fn quote(rules: &[DeliveryFeeRule], req: &QuoteRequest) -> Result<DeliveryQuote, DomainError> {
    let distance_km = compute_distance(req.origin, req.destination)?;
    let rule = resolve_rule(
        rules,
        req.delivery_type,
        req.vehicle_type,
        req.weight_grams,
        distance_km,
    )?;
    Ok(DeliveryQuote {
        store_id: req.store_id,
        rule_id: rule.id,
        delivery_type: rule.delivery_type,
        vehicle_type: rule.vehicle_type,
        distance_km,
        weight_grams: req.weight_grams,
        fee: compute_fee(rule, distance_km, req.weight_grams),
    })
}
