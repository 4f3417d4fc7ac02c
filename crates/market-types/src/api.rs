//! Wire shapes of the REST surface, shared by the HTTP adapter and the
//! client so both sides agree on field names.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::delivery::{DeliveryType, VehicleType};
use crate::domain::error::DomainError;
use crate::domain::payment::PaymentMethod;
use crate::domain::query::{
    AmountRange, DateRange, OrderQuery, Pagination, ShipmentQuery, StoreOrderQuery,
};
use crate::domain::shipment::{Priority, ShipmentPatch};
use crate::domain::status::{OrderStatus, PaymentStatus, ShipmentStatus};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<&DomainError> for ErrorBody {
    fn from(err: &DomainError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

/// `{ success: true, data }` or `{ success: false, error }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: ErrorBody) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<T, ErrorBody> {
        match (self.success, self.data, self.error) {
            (true, Some(data), _) => Ok(data),
            (_, _, Some(error)) => Err(error),
            _ => Err(ErrorBody {
                code: "INTERNAL_SERVER_ERROR".into(),
                message: "malformed envelope".into(),
                details: None,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: u32,
    #[serde(default)]
    pub variant_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    pub destination_address_id: Uuid,
    #[serde(default)]
    pub delivery_type: DeliveryType,
    #[serde(default)]
    pub vehicle_type: Option<VehicleType>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub delivery_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub order_data: OrderData,
    #[serde(default)]
    pub items: Vec<CartLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentRequest {
    pub status: PaymentStatus,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

/// Body posted by the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCallback {
    pub order_id: Uuid,
    pub status: PaymentStatus,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateRequest {
    pub destination_address_id: Uuid,
    #[serde(default)]
    pub delivery_type: DeliveryType,
    #[serde(default)]
    pub vehicle_type: Option<VehicleType>,
    #[serde(default)]
    pub items: Vec<CartLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsRequest {
    pub destination_address_id: Uuid,
    #[serde(default)]
    pub items: Vec<CartLine>,
}

/// Fee for one store of the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryEstimate {
    pub store_id: Uuid,
    pub store_name: String,
    pub rule_id: Uuid,
    pub delivery_type: DeliveryType,
    pub vehicle_type: Option<VehicleType>,
    pub distance_km: f64,
    pub weight_grams: u32,
    pub fee: i64,
}

/// A delivery type / vehicle combination that every store of the cart can
/// serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOption {
    pub delivery_type: DeliveryType,
    pub vehicle_type: Option<VehicleType>,
    pub total_fee: i64,
    pub estimates: Vec<DeliveryEstimate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentData {
    /// Needed when the order has more than one sub-order the caller may ship.
    #[serde(default)]
    pub store_order_id: Option<Uuid>,
    #[serde(default)]
    pub driver_id: Option<Uuid>,
    #[serde(default)]
    pub priority_level: Option<Priority>,
    #[serde(default)]
    pub delivery_notes: Option<String>,
    #[serde(default)]
    pub managed_by_store: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShipmentRequest {
    pub order_id: Uuid,
    #[serde(default)]
    pub shipment_data: ShipmentData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignDriverRequest {
    pub shipment_id: Uuid,
    pub driver_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentUpdate {
    pub shipment_id: Uuid,
    #[serde(default)]
    pub status: Option<ShipmentStatus>,
    #[serde(default)]
    pub driver_id: Option<Uuid>,
    #[serde(default)]
    pub priority_level: Option<Priority>,
    #[serde(default)]
    pub delivery_notes: Option<String>,
}

impl ShipmentUpdate {
    pub fn patch(&self) -> ShipmentPatch {
        ShipmentPatch {
            status: self.status,
            driver_id: self.driver_id,
            priority: self.priority_level,
            delivery_notes: self.delivery_notes.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateShipmentRequest {
    pub shipment_data: ShipmentUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingData {
    pub shipment_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRequest {
    pub tracking_data: TrackingData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverAvailabilityRequest {
    /// Drivers may omit it; admins must name the driver.
    #[serde(default)]
    pub driver_id: Option<Uuid>,
    pub is_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRevenue {
    pub store_id: Uuid,
    pub revenue: i64,
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates. A plain date
/// used as an upper bound covers the whole day.
pub fn parse_date_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, DomainError> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let invalid = || DomainError::invalid(format!("invalid date `{raw}`"));
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())?;
    let naive = if end_of_day {
        day.and_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        day.and_hms_opt(0, 0, 0)
    }
    .ok_or_else(invalid)?;
    Ok(Utc.from_utc_datetime(&naive))
}

fn date_range(start: Option<&str>, end: Option<&str>) -> Result<DateRange, DomainError> {
    let range = DateRange {
        start: start.map(|s| parse_date_bound(s, false)).transpose()?,
        end: end.map(|s| parse_date_bound(s, true)).transpose()?,
    };
    if let (Some(start), Some(end)) = (range.start, range.end) {
        if start > end {
            return Err(DomainError::invalid("start date is after end date"));
        }
    }
    Ok(range)
}

fn amount_range(min: Option<i64>, max: Option<i64>) -> Result<AmountRange, DomainError> {
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(DomainError::invalid("min_amount is greater than max_amount"));
        }
    }
    Ok(AmountRange { min, max })
}

/// `GET /orders` query string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderSearchParams {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl OrderSearchParams {
    pub fn into_query(self) -> Result<OrderQuery, DomainError> {
        Ok(OrderQuery {
            buyer_id: None,
            status: self.status,
            payment_status: self.payment_status,
            created: date_range(self.date_start.as_deref(), self.date_end.as_deref())?,
            amount: amount_range(self.min_amount, self.max_amount)?,
            pagination: Pagination::new(self.page, self.per_page),
        })
    }
}

/// `GET /logistics/search` query string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentSearchParams {
    pub status: Option<ShipmentStatus>,
    pub driver_id: Option<Uuid>,
    pub priority_level: Option<Priority>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub store_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ShipmentSearchParams {
    pub fn into_query(self) -> Result<ShipmentQuery, DomainError> {
        Ok(ShipmentQuery {
            store_ids: None,
            store_id: self.store_id,
            status: self.status,
            driver_id: self.driver_id,
            priority: self.priority_level,
            created: date_range(self.start_date.as_deref(), self.end_date.as_deref())?,
            pagination: Pagination::new(self.page, self.per_page),
        })
    }
}

/// `GET /store-orders/search` query string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOrderSearchParams {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub shipment_status: Option<ShipmentStatus>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl StoreOrderSearchParams {
    pub fn into_query(self) -> Result<StoreOrderQuery, DomainError> {
        Ok(StoreOrderQuery {
            store_ids: Vec::new(),
            status: self.status,
            payment_status: self.payment_status,
            payment_method: self.payment_method,
            shipment_status: self.shipment_status,
            created: date_range(self.start_date.as_deref(), self.end_date.as_deref())?,
            amount: amount_range(self.min_amount, self.max_amount)?,
            pagination: Pagination::new(self.page, self.per_page),
        })
    }
}
