use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::delivery::{DeliveryType, VehicleType};

/// Business-rule violations raised by the core. Every variant carries a
/// stable code that survives all the way to the HTTP envelope.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("illegal {entity} transition from {from} to {to}")]
    IllegalStateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: u32,
        available: u32,
    },

    #[error(
        "no {} delivery rule for vehicle {} covering {} g over {:.2} km",
        .delivery_type,
        vehicle_label(.vehicle_type),
        .weight_grams,
        .distance_km
    )]
    NoApplicableRule {
        delivery_type: DeliveryType,
        vehicle_type: Option<VehicleType>,
        weight_grams: u32,
        distance_km: f64,
    },

    #[error("driver {0} is not available")]
    DriverUnavailable(Uuid),

    #[error("store order {0} already has an active shipment")]
    ShipmentAlreadyActive(Uuid),

    #[error("invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("order has no items")]
    EmptyOrder,

    #[error("product {0} not found")]
    ProductNotFound(Uuid),
}

fn vehicle_label(vehicle: &Option<VehicleType>) -> &'static str {
    vehicle.map(VehicleType::as_str).unwrap_or("any")
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        DomainError::Authorization(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        DomainError::Validation(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "VALIDATION_ERROR",
            DomainError::Authorization(_) => "AUTHORIZATION_ERROR",
            DomainError::NotFound { .. } => "NOT_FOUND",
            DomainError::IllegalStateTransition { .. } => "ILLEGAL_STATE_TRANSITION",
            DomainError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            DomainError::NoApplicableRule { .. } => "NO_APPLICABLE_RULE",
            DomainError::DriverUnavailable(_) => "DRIVER_UNAVAILABLE",
            DomainError::ShipmentAlreadyActive(_) => "SHIPMENT_ALREADY_ACTIVE",
            DomainError::InvalidCoordinates { .. } => "INVALID_COORDINATES",
            DomainError::EmptyOrder => "EMPTY_ORDER",
            DomainError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
        }
    }

    /// Structured payload for the `details` field of the error envelope.
    pub fn details(&self) -> Option<Value> {
        match self {
            DomainError::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
            DomainError::IllegalStateTransition { entity, from, to } => {
                Some(json!({ "entity": entity, "from": from, "to": to }))
            }
            DomainError::InsufficientStock {
                product_id,
                requested,
                available,
            } => Some(json!({
                "productId": product_id,
                "requested": requested,
                "available": available,
            })),
            DomainError::NoApplicableRule {
                delivery_type,
                vehicle_type,
                weight_grams,
                distance_km,
            } => Some(json!({
                "deliveryType": delivery_type,
                "vehicleType": vehicle_type,
                "weightGrams": weight_grams,
                "distanceKm": distance_km,
            })),
            DomainError::DriverUnavailable(id) => Some(json!({ "driverId": id })),
            DomainError::ShipmentAlreadyActive(id) => Some(json!({ "storeOrderId": id })),
            DomainError::InvalidCoordinates {
                latitude,
                longitude,
            } => Some(json!({ "latitude": latitude, "longitude": longitude })),
            DomainError::ProductNotFound(id) => Some(json!({ "productId": id })),
            DomainError::Validation(_) | DomainError::Authorization(_) | DomainError::EmptyOrder => {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(DomainError::EmptyOrder.code(), "EMPTY_ORDER");
        assert_eq!(
            DomainError::invalid("transactionId is required").code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            DomainError::InvalidCoordinates {
                latitude: 0.0,
                longitude: 0.0
            }
            .code(),
            "INVALID_COORDINATES"
        );
    }

    #[test]
    fn no_rule_message_names_any_vehicle() {
        let err = DomainError::NoApplicableRule {
            delivery_type: DeliveryType::Express,
            vehicle_type: None,
            weight_grams: 1200,
            distance_km: 3.456,
        };
        assert_eq!(
            err.to_string(),
            "no EXPRESS delivery rule for vehicle any covering 1200 g over 3.46 km"
        );
        assert_eq!(err.details().unwrap()["deliveryType"], "EXPRESS");
    }

    #[test]
    fn transition_details_name_both_states() {
        let err = DomainError::IllegalStateTransition {
            entity: "order",
            from: "delivered".into(),
            to: "cancelled".into(),
        };
        let details = err.details().unwrap();
        assert_eq!(details["from"], "delivered");
        assert_eq!(details["to"], "cancelled");
    }
}
