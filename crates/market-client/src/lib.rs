//! Typed client for the marketplace REST surface.

use std::time::Duration;

use anyhow::Context;
use market_types::api::{
    AssignDriverRequest, CreateOrderRequest, CreateShipmentRequest, DeliveryEstimate,
    DeliveryOption, DriverAvailabilityRequest, Envelope, ErrorBody, EstimateRequest,
    OptionsRequest, OrderSearchParams, PaymentCallback, ShipmentSearchParams, StoreOrderSearchParams,
    StoreRevenue, TrackingRequest, UpdateOrderStatusRequest, UpdatePaymentRequest,
    UpdateShipmentRequest, CALLBACK_TOKEN_HEADER, USER_ID_HEADER, USER_ROLE_HEADER,
};
use market_types::domain::actor::Actor;
use market_types::domain::catalog::Driver;
use market_types::domain::delivery::DeliveryFeeRule;
use market_types::domain::order::Order;
use market_types::domain::payment::Payment;
use market_types::domain::query::{Page, StoreOrderView};
use market_types::domain::shipment::{Shipment, TrackingPing};
use market_types::domain::status::OrderStatus;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// An error envelope returned by the server.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status}: {} ({})", .body.message, .body.code)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn code(&self) -> &str {
        &self.body.code
    }
}

#[derive(Clone)]
pub struct MarketClientBuilder {
    base: Url,
    headers: HeaderMap,
    timeout: Option<Duration>,
    client: Option<reqwest::Client>,
}

#[derive(Clone)]
pub struct MarketClient {
    base: Url,
    client: reqwest::Client,
}

impl MarketClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Self::builder(base_url)?.build()
    }

    pub fn builder(base_url: &str) -> anyhow::Result<MarketClientBuilder> {
        let mut base = Url::parse(base_url).context("invalid base url")?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(MarketClientBuilder {
            base,
            headers: HeaderMap::new(),
            timeout: None,
            client: None,
        })
    }

    fn url(&self, path: &str) -> anyhow::Result<Url> {
        self.base.join(path).context("failed to join url")
    }

    /// Sends `req` and unwraps the response envelope. Error envelopes come
    /// back as [`ApiError`] inside the `anyhow::Error`.
    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> anyhow::Result<T> {
        let res = req.send().await?;
        let status = res.status();
        let text = res.text().await?;
        let envelope: Envelope<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(e).context("malformed response envelope");
            }
            Err(_) => anyhow::bail!("request failed with {status}: {text}"),
        };
        envelope
            .into_result()
            .map_err(|body| ApiError { status, body }.into())
    }

    pub async fn health(&self) -> anyhow::Result<serde_json::Value> {
        self.send(self.client.get(self.url("health")?)).await
    }

    pub async fn create_order(&self, req: &CreateOrderRequest) -> anyhow::Result<Order> {
        self.send(self.client.post(self.url("orders")?).json(req))
            .await
    }

    pub async fn search_orders(&self, params: &OrderSearchParams) -> anyhow::Result<Page<Order>> {
        self.send(self.client.get(self.url("orders")?).query(params))
            .await
    }

    pub async fn get_order(&self, id: Uuid) -> anyhow::Result<Order> {
        self.send(self.client.get(self.url(&format!("orders/{id}"))?))
            .await
    }

    pub async fn cancel_order(&self, id: Uuid) -> anyhow::Result<Order> {
        self.send(self.client.delete(self.url(&format!("orders/{id}"))?))
            .await
    }

    pub async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> anyhow::Result<Order> {
        self.send(
            self.client
                .patch(self.url(&format!("orders/{id}/status"))?)
                .json(&UpdateOrderStatusRequest { status }),
        )
        .await
    }

    pub async fn get_payment(&self, order_id: Uuid) -> anyhow::Result<Payment> {
        self.send(self.client.get(self.url(&format!("orders/{order_id}/payment"))?))
            .await
    }

    pub async fn update_payment(
        &self,
        order_id: Uuid,
        req: &UpdatePaymentRequest,
    ) -> anyhow::Result<Payment> {
        self.send(
            self.client
                .patch(self.url(&format!("orders/{order_id}/payment"))?)
                .json(req),
        )
        .await
    }

    pub async fn payment_callback(
        &self,
        token: &str,
        callback: &PaymentCallback,
    ) -> anyhow::Result<Payment> {
        self.send(
            self.client
                .post(self.url("payments/callback")?)
                .header(CALLBACK_TOKEN_HEADER, token)
                .json(callback),
        )
        .await
    }

    pub async fn estimate(&self, req: &EstimateRequest) -> anyhow::Result<Vec<DeliveryEstimate>> {
        self.send(self.client.post(self.url("delivery/estimate")?).json(req))
            .await
    }

    pub async fn options(&self, req: &OptionsRequest) -> anyhow::Result<Vec<DeliveryOption>> {
        self.send(self.client.post(self.url("delivery/options")?).json(req))
            .await
    }

    pub async fn list_rules(&self, include_inactive: bool) -> anyhow::Result<Vec<DeliveryFeeRule>> {
        self.send(
            self.client
                .get(self.url("delivery/rules")?)
                .query(&[("all", include_inactive)]),
        )
        .await
    }

    pub async fn add_rule(&self, rule: &DeliveryFeeRule) -> anyhow::Result<DeliveryFeeRule> {
        self.send(self.client.post(self.url("delivery/rules")?).json(rule))
            .await
    }

    pub async fn create_shipment(&self, req: &CreateShipmentRequest) -> anyhow::Result<Shipment> {
        self.send(self.client.post(self.url("logistics/shipments")?).json(req))
            .await
    }

    pub async fn assign_driver(&self, req: &AssignDriverRequest) -> anyhow::Result<Shipment> {
        self.send(
            self.client
                .patch(self.url("logistics/shipments/asign-driver")?)
                .json(req),
        )
        .await
    }

    pub async fn update_shipment(&self, req: &UpdateShipmentRequest) -> anyhow::Result<Shipment> {
        self.send(
            self.client
                .put(self.url("logistics/shipments/update")?)
                .json(req),
        )
        .await
    }

    pub async fn add_tracking(&self, req: &TrackingRequest) -> anyhow::Result<TrackingPing> {
        self.send(self.client.post(self.url("logistics/tracking")?).json(req))
            .await
    }

    pub async fn list_tracking(&self, shipment_id: Uuid) -> anyhow::Result<Vec<TrackingPing>> {
        self.send(
            self.client
                .get(self.url(&format!("logistics/tracking/{shipment_id}"))?),
        )
        .await
    }

    pub async fn search_shipments(
        &self,
        params: &ShipmentSearchParams,
    ) -> anyhow::Result<Page<Shipment>> {
        self.send(self.client.get(self.url("logistics/search")?).query(params))
            .await
    }

    pub async fn set_driver_availability(
        &self,
        req: &DriverAvailabilityRequest,
    ) -> anyhow::Result<Driver> {
        self.send(
            self.client
                .patch(self.url("logistics/drivers/availability")?)
                .json(req),
        )
        .await
    }

    pub async fn search_store_orders(
        &self,
        params: &StoreOrderSearchParams,
    ) -> anyhow::Result<Page<StoreOrderView>> {
        self.send(self.client.get(self.url("store-orders/search")?).query(params))
            .await
    }

    pub async fn store_revenue(&self, store_id: Uuid) -> anyhow::Result<StoreRevenue> {
        self.send(self.client.get(self.url(&format!("stores/{store_id}/revenue"))?))
            .await
    }
}

impl MarketClientBuilder {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_header(
        mut self,
        key: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        let header_name =
            HeaderName::from_bytes(key.as_ref().as_bytes()).context("invalid header name")?;
        let header_value = HeaderValue::from_str(value.as_ref()).context("invalid header value")?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Sends every request as `actor` via the identity headers.
    pub fn with_identity(self, actor: Actor) -> anyhow::Result<Self> {
        self.with_header(USER_ID_HEADER, actor.user_id.to_string())?
            .with_header(USER_ROLE_HEADER, actor.role.as_str())
    }

    pub fn with_reqwest_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> anyhow::Result<MarketClient> {
        if let Some(client) = self.client {
            return Ok(MarketClient {
                base: self.base,
                client,
            });
        }

        let mut builder = reqwest::Client::builder();
        if !self.headers.is_empty() {
            builder = builder.default_headers(self.headers);
        }
        if let Some(t) = self.timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build()?;
        tracing::debug!(base = %self.base, "market client ready");
        Ok(MarketClient {
            base: self.base,
            client,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use market_types::api::{CartLine, OrderData};
    use market_types::domain::actor::Role;
    use market_types::domain::shipment::Priority;
    use market_types::domain::status::{PaymentStatus, ShipmentStatus};
    use serde_json::json;

    fn order_json(id: Uuid, buyer: Uuid) -> serde_json::Value {
        json!({
            "id": id,
            "buyerId": buyer,
            "destinationAddressId": Uuid::new_v4(),
            "status": "pending",
            "paymentStatus": "pending",
            "deliveryType": "STANDARD",
            "vehicleType": null,
            "paymentMethod": "cash_on_delivery",
            "itemsTotal": 1000,
            "totalDeliveryFee": 3550,
            "totalAmount": 4550,
            "storeOrders": [],
            "createdAt": "2024-06-11T08:30:00Z",
            "updatedAt": "2024-06-11T08:30:00Z"
        })
    }

    #[tokio::test]
    async fn sends_identity_and_unwraps_envelope() {
        let server = MockServer::start();
        let buyer = Actor::new(Uuid::new_v4(), Role::Buyer);
        let order_id = Uuid::new_v4();
        let product_id = Uuid::new_v4();

        let create_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/orders")
                .header(USER_ID_HEADER, buyer.user_id.to_string())
                .header(USER_ROLE_HEADER, "buyer")
                .json_body_partial(
                    json!({ "items": [{ "productId": product_id, "quantity": 2 }] }).to_string(),
                );
            then.status(201)
                .json_body(json!({ "success": true, "data": order_json(order_id, buyer.user_id) }));
        });

        let client = MarketClient::builder(&server.base_url())
            .unwrap()
            .with_identity(buyer)
            .unwrap()
            .build()
            .unwrap();
        let order = client
            .create_order(&CreateOrderRequest {
                order_data: OrderData {
                    destination_address_id: Uuid::new_v4(),
                    delivery_type: Default::default(),
                    vehicle_type: None,
                    payment_method: Default::default(),
                    delivery_notes: None,
                },
                items: vec![CartLine {
                    product_id,
                    quantity: 2,
                    variant_id: None,
                }],
            })
            .await
            .unwrap();
        assert_eq!(order.id, order_id);
        assert_eq!(order.total_amount, 4550);
        create_mock.assert();
    }

    #[tokio::test]
    async fn error_envelopes_surface_as_api_errors() {
        let server = MockServer::start();
        let order_id = Uuid::new_v4();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::PATCH)
                .path(format!("/orders/{order_id}/payment"))
                .json_body(json!({ "status": "paid", "transactionId": null }));
            then.status(400).json_body(json!({
                "success": false,
                "error": {
                    "code": "VALIDATION_ERROR",
                    "message": "transactionId is required when marking a payment paid"
                }
            }));
        });

        let client = MarketClient::new(&server.base_url()).unwrap();
        let err = client
            .update_payment(
                order_id,
                &UpdatePaymentRequest {
                    status: PaymentStatus::Paid,
                    transaction_id: None,
                },
            )
            .await
            .unwrap_err();
        let api = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.code(), "VALIDATION_ERROR");
        mock.assert();
    }

    #[tokio::test]
    async fn search_params_go_in_the_query_string() {
        let server = MockServer::start();
        let driver_id = Uuid::new_v4();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/logistics/search")
                .query_param("status", "in_progress")
                .query_param("driverId", driver_id.to_string())
                .query_param("priorityLevel", "high")
                .query_param("perPage", "5");
            then.status(200).json_body(json!({
                "success": true,
                "data": { "items": [], "total": 0, "page": 1, "perPage": 5 }
            }));
        });

        let client = MarketClient::new(&format!("{}/", server.base_url())).unwrap();
        let page = client
            .search_shipments(&ShipmentSearchParams {
                status: Some(ShipmentStatus::InProgress),
                driver_id: Some(driver_id),
                priority_level: Some(Priority::High),
                per_page: Some(5),
                ..ShipmentSearchParams::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(page.per_page, 5);
        mock.assert();
    }

    #[tokio::test]
    async fn non_envelope_failures_keep_the_status() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/health");
            then.status(502).body("bad gateway");
        });
        let client = MarketClient::new(&server.base_url()).unwrap();
        let err = client.health().await.unwrap_err();
        assert!(err.to_string().contains("502"));
        mock.assert();
    }
}
