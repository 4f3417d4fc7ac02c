use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, Method};
use axum::routing::{get, patch, post, put};
use axum::{serve, Router};
use market_types::api::{CALLBACK_TOKEN_HEADER, USER_ID_HEADER, USER_ROLE_HEADER};
use market_types::ports::repository::MarketRepository;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::handlers::*;
use crate::application::Marketplace;

#[derive(Clone)]
pub struct HttpServerConfig {
    pub port: String,
}

pub struct HttpServer<R: MarketRepository> {
    pub market: Arc<Marketplace<R>>,
    pub config: HttpServerConfig,
}

/// Every route of the REST surface over `market`.
pub fn router<R: MarketRepository>(market: Arc<Marketplace<R>>) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::extract::Request<_>| {
            let uri = request.uri().to_string();
            let request_id = Uuid::new_v4();
            tracing::info_span!(
                "http_request",
                %request_id,
                method = %request.method(),
                uri
            )
        })
        .on_request(|request: &axum::extract::Request<_>, span: &tracing::Span| {
            tracing::info!(
                parent: span,
                method = %request.method(),
                uri = %request.uri(),
                "request"
            );
        })
        .on_response(
            |response: &axum::response::Response, latency: Duration, span: &tracing::Span| {
                tracing::info!(
                    parent: span,
                    status = %response.status(),
                    latency_ms = %latency.as_millis(),
                    "response"
                );
            },
        );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(USER_ROLE_HEADER),
            HeaderName::from_static(CALLBACK_TOKEN_HEADER),
        ]);

    Router::new()
        .route("/health", get(health))
        .route("/orders", post(create_order::<R>).get(search_orders::<R>))
        .route("/orders/{id}", get(get_order::<R>).delete(cancel_order::<R>))
        .route("/orders/{id}/status", patch(update_order_status::<R>))
        .route(
            "/orders/{id}/payment",
            get(get_payment::<R>).patch(update_payment::<R>),
        )
        .route("/payments/callback", post(payment_callback::<R>))
        .route("/delivery/estimate", post(estimate_delivery::<R>))
        .route("/delivery/options", post(delivery_options::<R>))
        .route("/delivery/rules", get(list_rules::<R>).post(add_rule::<R>))
        .route("/logistics/shipments", post(create_shipment::<R>))
        .route(
            "/logistics/shipments/asign-driver",
            patch(assign_driver::<R>),
        )
        .route("/logistics/shipments/update", put(update_shipment::<R>))
        .route("/logistics/tracking", post(add_tracking::<R>))
        .route(
            "/logistics/tracking/{shipment_id}",
            get(list_tracking::<R>),
        )
        .route("/logistics/search", get(search_shipments::<R>))
        .route(
            "/logistics/drivers/availability",
            patch(set_driver_availability::<R>),
        )
        .route("/store-orders/search", get(search_store_orders::<R>))
        .route("/stores/{id}/revenue", get(store_revenue::<R>))
        .layer(cors)
        .layer(trace_layer)
        .with_state(market)
}

impl<R: MarketRepository> HttpServer<R> {
    pub async fn new(market: Marketplace<R>, config: HttpServerConfig) -> anyhow::Result<Self> {
        Ok(Self {
            market: Arc::new(market),
            config,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let app = router(self.market.clone());
        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.port).parse()?;
        tracing::info!("starting server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        serve(listener, app.into_make_service()).await?;
        Ok(())
    }
}
