use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use market_types::api::{
    AssignDriverRequest, CreateOrderRequest, CreateShipmentRequest, DeliveryEstimate,
    DeliveryOption, DriverAvailabilityRequest, Envelope, EstimateRequest, OptionsRequest,
    OrderSearchParams, PaymentCallback, ShipmentSearchParams, StoreOrderSearchParams, StoreRevenue,
    TrackingRequest, UpdateOrderStatusRequest, UpdatePaymentRequest, UpdateShipmentRequest,
};
use market_types::domain::catalog::Driver;
use market_types::domain::delivery::DeliveryFeeRule;
use market_types::domain::error::DomainError;
use market_types::domain::order::Order;
use market_types::domain::payment::Payment;
use market_types::domain::query::{Page, StoreOrderView};
use market_types::domain::shipment::{Shipment, TrackingPing};
use market_types::ports::repository::MarketRepository;
use serde::Deserialize;
use uuid::Uuid;

use super::extractors::{ApiJson, ApiQuery, CallbackToken, Caller};
use crate::application::Marketplace;
use crate::errors::AppError;

type Market<R> = State<Arc<Marketplace<R>>>;
type ApiResult<T> = Result<Json<Envelope<T>>, AppError>;
type Created<T> = Result<(StatusCode, Json<Envelope<T>>), AppError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope::ok(data)))
}

fn created<T>(data: T) -> Created<T> {
    Ok((StatusCode::CREATED, Json(Envelope::ok(data))))
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw)
        .map_err(|_| DomainError::invalid(format!("{what} `{raw}` is not a valid id")).into())
}

pub async fn health() -> Json<Envelope<serde_json::Value>> {
    Json(Envelope::ok(serde_json::json!({ "status": "ok" })))
}

pub async fn create_order<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    ApiJson(body): ApiJson<CreateOrderRequest>,
) -> Created<Order> {
    created(market.orders.create_order(&actor, body).await?)
}

pub async fn search_orders<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    ApiQuery(params): ApiQuery<OrderSearchParams>,
) -> ApiResult<Page<Order>> {
    ok(market.orders.search_orders(&actor, params).await?)
}

pub async fn get_order<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<Order> {
    let id = parse_id(&id, "order")?;
    ok(market.orders.get_order(&actor, id).await?)
}

/// Orders are never removed; deleting one cancels it.
pub async fn cancel_order<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<Order> {
    let id = parse_id(&id, "order")?;
    ok(market.orders.cancel_order(&actor, id).await?)
}

pub async fn update_order_status<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateOrderStatusRequest>,
) -> ApiResult<Order> {
    let id = parse_id(&id, "order")?;
    ok(market
        .orders
        .update_order_status(&actor, id, body.status)
        .await?)
}

pub async fn get_payment<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<Payment> {
    let id = parse_id(&id, "order")?;
    ok(market.payments.get_payment(&actor, id).await?)
}

pub async fn update_payment<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdatePaymentRequest>,
) -> ApiResult<Payment> {
    let id = parse_id(&id, "order")?;
    ok(market
        .payments
        .update_payment_status(&actor, id, body)
        .await?)
}

pub async fn payment_callback<R: MarketRepository>(
    State(market): Market<R>,
    CallbackToken(token): CallbackToken,
    ApiJson(body): ApiJson<PaymentCallback>,
) -> ApiResult<Payment> {
    ok(market
        .payments
        .apply_callback(token.as_deref(), body)
        .await?)
}

pub async fn estimate_delivery<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    ApiJson(body): ApiJson<EstimateRequest>,
) -> ApiResult<Vec<DeliveryEstimate>> {
    ok(market.delivery.estimate(&actor, body).await?)
}

pub async fn delivery_options<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    ApiJson(body): ApiJson<OptionsRequest>,
) -> ApiResult<Vec<DeliveryOption>> {
    ok(market.delivery.options(&actor, body).await?)
}

#[derive(Debug, Default, Deserialize)]
pub struct RuleListParams {
    #[serde(default)]
    all: bool,
}

pub async fn list_rules<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    ApiQuery(params): ApiQuery<RuleListParams>,
) -> ApiResult<Vec<DeliveryFeeRule>> {
    ok(market.delivery.list_rules(&actor, params.all).await?)
}

pub async fn add_rule<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    ApiJson(body): ApiJson<DeliveryFeeRule>,
) -> Created<DeliveryFeeRule> {
    created(market.delivery.add_rule(&actor, body).await?)
}

pub async fn create_shipment<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    ApiJson(body): ApiJson<CreateShipmentRequest>,
) -> Created<Shipment> {
    created(market.shipments.create_shipment(&actor, body).await?)
}

pub async fn assign_driver<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    ApiJson(body): ApiJson<AssignDriverRequest>,
) -> ApiResult<Shipment> {
    ok(market.shipments.assign_driver(&actor, body).await?)
}

pub async fn update_shipment<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    ApiJson(body): ApiJson<UpdateShipmentRequest>,
) -> ApiResult<Shipment> {
    ok(market.shipments.update_shipment(&actor, body).await?)
}

pub async fn add_tracking<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    ApiJson(body): ApiJson<TrackingRequest>,
) -> Created<TrackingPing> {
    created(market.shipments.add_tracking(&actor, body).await?)
}

pub async fn list_tracking<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    Path(shipment_id): Path<String>,
) -> ApiResult<Vec<TrackingPing>> {
    let id = parse_id(&shipment_id, "shipment")?;
    ok(market.shipments.list_tracking(&actor, id).await?)
}

pub async fn search_shipments<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    ApiQuery(params): ApiQuery<ShipmentSearchParams>,
) -> ApiResult<Page<Shipment>> {
    ok(market.shipments.search_shipments(&actor, params).await?)
}

pub async fn set_driver_availability<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    ApiJson(body): ApiJson<DriverAvailabilityRequest>,
) -> ApiResult<Driver> {
    ok(market
        .shipments
        .set_driver_availability(&actor, body)
        .await?)
}

pub async fn search_store_orders<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    ApiQuery(params): ApiQuery<StoreOrderSearchParams>,
) -> ApiResult<Page<StoreOrderView>> {
    ok(market.orders.search_store_orders(&actor, params).await?)
}

pub async fn store_revenue<R: MarketRepository>(
    State(market): Market<R>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<StoreRevenue> {
    let id = parse_id(&id, "store")?;
    ok(market.orders.store_revenue(&actor, id).await?)
}
