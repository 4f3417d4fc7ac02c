///  To run :
///  cargo r --example client_example
///
/// Walks one two-store checkout through the HTTP API against the seeded
/// Conakry catalogue.
use std::sync::Arc;

use market_client::MarketClient;
use market_hex::application::{seed, Marketplace};
use market_hex::inbound::http::{HttpServer, HttpServerConfig};
use market_hex::outbound::notifier::TracingNotifier;
use market_repo::build_repo;
use market_types::api::{
    CartLine, CreateOrderRequest, CreateShipmentRequest, OptionsRequest, OrderData,
    ShipmentData, ShipmentUpdate, TrackingData, TrackingRequest, UpdatePaymentRequest,
    UpdateShipmentRequest,
};
use market_types::domain::actor::{Actor, Role};
use market_types::domain::delivery::DeliveryType;
use market_types::domain::status::{PaymentStatus, ShipmentStatus};
use tempfile::tempdir;
use uuid::Uuid;

const BUYER: &str = "7e1d4f3a-0000-4000-8000-000000000001";
const HOME: &str = "0b6c1a52-5d0e-4d55-9c1e-1f0a00000001";
const FAR_OWNER: &str = "7e1d4f3a-0000-4000-8000-000000000003";
const FAR_STORE: &str = "5a1e0c00-0000-4000-8000-000000000002";
const DRIVER: &str = "d0000000-0000-4000-8000-000000000001";
const SOAP: &str = "9c0d0000-0000-4000-8000-000000000001";
const SCENTED_SOAP: &str = "9c0d0000-0000-4000-8000-0000000000a1";
const RICE: &str = "9c0d0000-0000-4000-8000-000000000002";

fn find_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn client_for(base: &str, user_id: &str, role: Role) -> anyhow::Result<MarketClient> {
    MarketClient::builder(base)?
        .with_identity(Actor::new(user_id.parse()?, role))?
        .build()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let port = find_free_port();
    let base = format!("http://127.0.0.1:{port}/");

    // Use a temp file-backed SQLite DB so multiple connections see the same data.
    let tmp = tempdir()?;
    let db_url = format!("sqlite://{}", tmp.path().join("market.db").display());
    let repo = build_repo(Some(&db_url), std::time::Duration::from_secs(5)).await?;
    seed::load_file(
        &repo,
        concat!(env!("CARGO_MANIFEST_DIR"), "/seed/conakry.json"),
    )
    .await?;

    let market = Marketplace::new(repo, Arc::new(TracingNotifier), None);
    let server = HttpServer::new(
        market,
        HttpServerConfig {
            port: port.to_string(),
        },
    )
    .await?;
    let handle = tokio::spawn(async move {
        server.run().await.expect("server run");
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let buyer = client_for(&base, BUYER, Role::Buyer)?;
    let store = client_for(&base, FAR_OWNER, Role::Store)?;
    let admin = client_for(&base, &Uuid::new_v4().to_string(), Role::Admin)?;

    let items = vec![
        CartLine {
            product_id: SOAP.parse()?,
            quantity: 1,
            variant_id: Some(SCENTED_SOAP.parse()?),
        },
        CartLine {
            product_id: RICE.parse()?,
            quantity: 2,
            variant_id: None,
        },
    ];

    let options = buyer
        .options(&OptionsRequest {
            destination_address_id: HOME.parse()?,
            items: items.clone(),
        })
        .await?;
    for option in &options {
        println!(
            "option {} / {:?}: {} GNF",
            option.delivery_type, option.vehicle_type, option.total_fee
        );
    }

    let order = buyer
        .create_order(&CreateOrderRequest {
            order_data: OrderData {
                destination_address_id: HOME.parse()?,
                delivery_type: DeliveryType::Standard,
                vehicle_type: None,
                payment_method: Default::default(),
                delivery_notes: Some("call on arrival".into()),
            },
            items,
        })
        .await?;
    println!(
        "Created order id={} items={} delivery={} total={}",
        order.id, order.items_total, order.total_delivery_fee, order.total_amount
    );

    let payment = admin
        .update_payment(
            order.id,
            &UpdatePaymentRequest {
                status: PaymentStatus::Paid,
                transaction_id: Some("OM-2024-0001".into()),
            },
        )
        .await?;
    println!("Payment {} is {}", payment.id, payment.status);

    let shipment = store
        .create_shipment(&CreateShipmentRequest {
            order_id: order.id,
            shipment_data: ShipmentData {
                driver_id: Some(DRIVER.parse()?),
                ..ShipmentData::default()
            },
        })
        .await?;
    println!("Shipment {} is {}", shipment.id, shipment.status);

    store
        .add_tracking(&TrackingRequest {
            tracking_data: TrackingData {
                shipment_id: shipment.id,
                latitude: 9.70,
                longitude: -13.6785,
            },
        })
        .await?;

    let delivered = store
        .update_shipment(&UpdateShipmentRequest {
            shipment_data: ShipmentUpdate {
                shipment_id: shipment.id,
                status: Some(ShipmentStatus::Delivered),
                driver_id: None,
                priority_level: None,
                delivery_notes: None,
            },
        })
        .await?;
    println!("Shipment {} is {}", delivered.id, delivered.status);

    let revenue = store.store_revenue(FAR_STORE.parse()?).await?;
    println!("Revenue of {}: {} GNF", revenue.store_id, revenue.revenue);

    let refreshed = buyer.get_order(order.id).await?;
    println!("Order {} is now {}", refreshed.id, refreshed.status);

    handle.abort();
    Ok(())
}
