use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use std::sync::Arc;
use uuid::Uuid;

use fulfillment_engine::config::{EngineConfig, ScyllaConfig};
use fulfillment_engine::domain::delivery::{DeliveryDraft, DeliveryMethod};
use fulfillment_engine::domain::measurements::Measurements;
use fulfillment_engine::domain::order::OrderDraft;
use fulfillment_engine::domain::package::PackageItem;
use fulfillment_engine::domain::payment::GatewayId;
use fulfillment_engine::domain::shipment::{ShipmentItem, ShipmentStatus};
use fulfillment_engine::history::{HistoryLedger, InMemoryHistoryLedger, ScyllaHistoryLedger};
use fulfillment_engine::lifecycle::{CommandContext, EntityRef};
use fulfillment_engine::metrics::Metrics;
use fulfillment_engine::{logging, Engine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;
    logging::init_tracing(config.log_json);

    tracing::info!("🚀 Starting fulfillment engine demo");

    // === 1. Metrics and history ledger ===
    let metrics = Arc::new(Metrics::new()?);
    let ledger: Arc<dyn HistoryLedger> = match &config.scylla {
        Some(scylla) => Arc::new(connect_ledger(scylla, &config).await?),
        None => {
            tracing::info!("No ScyllaDB node configured, keeping history in memory");
            Arc::new(InMemoryHistoryLedger::new())
        }
    };

    // === 2. Engine ===
    let engine = Engine::builder()
        .history_ledger(ledger)
        .metrics(metrics.clone())
        .gateways(config.gateway_registry()?)
        .retry(config.retry.clone())
        .carrier_breaker(config.carrier_breaker.clone())
        .reconciler(config.reconciler_settings())
        .build()?;

    // === 3. Order lifecycle ===
    let operator = CommandContext::new(Some(Uuid::now_v7()));
    let fulfillment = &engine.fulfillment;

    let order = fulfillment
        .create_order(
            OrderDraft {
                customer_id: Uuid::now_v7(),
                basket_id: Uuid::now_v7(),
                cost: 5_400,
                price: 4_900,
                delivery_cost: 350,
                payment_gateway: GatewayId::Local,
            },
            operator,
        )
        .await?;
    tracing::info!(order_id = %order.id, "✅ Order created");

    let delivery = fulfillment
        .add_delivery(
            order.id,
            DeliveryDraft {
                method: DeliveryMethod::Courier,
                carrier_service_id: Uuid::now_v7(),
                delivery_cost: order.delivery_cost,
            },
            operator,
        )
        .await?;

    let kettle = demo_item(1_200, 1, 3_200);
    let mugs = demo_item(350, 2, 850);
    let packed = fulfillment.add_shipment(delivery.id, vec![kettle.clone()], operator).await?;
    let pending = fulfillment.add_shipment(delivery.id, vec![mugs], operator).await?;

    fulfillment
        .add_package(
            packed.id,
            Measurements::new(300, 320, 280, 300),
            vec![PackageItem {
                offer_id: kettle.offer_id,
                quantity: kettle.quantity,
                unit: kettle.unit,
                unit_cost: kettle.unit_cost,
            }],
            operator,
        )
        .await?;
    fulfillment
        .change_shipment_status(packed.id, ShipmentStatus::Assembled, operator)
        .await?;

    let cargo = fulfillment.create_cargo(delivery.carrier_service_id, operator).await?;
    fulfillment
        .assign_shipment_to_cargo(packed.id, Some(cargo.id), operator)
        .await?;

    let delivery = fulfillment.delivery(delivery.id).await?;
    tracing::info!(
        delivery_id = %delivery.id,
        weight = delivery.measurements.weight,
        cost = delivery.cost,
        "📦 Delivery rolled up from packed and estimated shipments"
    );

    fulfillment
        .set_shipment_problem(pending.id, true, operator)
        .await?;
    fulfillment
        .add_comment(EntityRef::shipment(pending.id), "Mug set out of stock at the warehouse", operator)
        .await?;
    tracing::info!(is_problem = fulfillment.order(order.id).await?.is_problem, "⚠️ Problem flag raised");

    // === 4. Payment ===
    let payment = engine
        .payments
        .start_payment(order.id, order.total_due(), None, None, operator)
        .await?;
    tracing::info!(payment_id = %payment.id, link = ?payment.payment_link, "💳 Payment started");

    let push = serde_json::json!({ "external_id": payment.external_id, "status": "paid" });
    let outcome = engine
        .payments
        .handle_push(GatewayId::Local, push.to_string().as_bytes())
        .await?;
    let order = fulfillment.order(order.id).await?;
    tracing::info!(
        outcome = outcome.as_str(),
        payment_status = %order.payment_status,
        status = %order.status,
        "Gateway notification applied"
    );

    // === 5. Partial cancellation and refund ===
    let report = fulfillment
        .cancel_shipment(pending.id, Uuid::now_v7(), operator)
        .await?;
    for return_id in &report.returns {
        let refunded = engine.payments.refund_return(*return_id, operator).await?;
        tracing::info!(return_id = %return_id, refunded_sum = refunded.refunded_sum, "💸 Return refunded");
    }

    // === 6. Corrective pass and expiry sweep ===
    let retried = fulfillment.retry_failed_side_effects(CommandContext::system()).await;
    tracing::info!(
        attempted = retried.attempted,
        still_failing = retried.still_failing,
        "Side-effect corrective pass"
    );
    let expired = engine.payments.expire_overdue_payments(chrono::Utc::now()).await?;
    tracing::info!(expired = expired.expired.len(), "Payment expiry sweep");

    println!("{}", metrics.encode_text()?);
    tracing::info!("🎉 Demo complete!");
    Ok(())
}

async fn connect_ledger(scylla: &ScyllaConfig, config: &EngineConfig) -> anyhow::Result<ScyllaHistoryLedger> {
    tracing::info!(node = %scylla.node, keyspace = %scylla.keyspace, "Connecting to ScyllaDB...");
    let session: Session = SessionBuilder::new().known_node(&scylla.node).build().await?;

    session
        .query_unpaged(
            format!(
                "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                 {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                scylla.keyspace
            ),
            &[],
        )
        .await?;
    session.use_keyspace(&scylla.keyspace, false).await?;

    let ledger = ScyllaHistoryLedger::new(Arc::new(session), config.retry.clone());
    ledger.ensure_schema().await?;
    Ok(ledger)
}

fn demo_item(unit_weight: u64, quantity: u32, unit_cost: i64) -> ShipmentItem {
    ShipmentItem {
        basket_item_id: Uuid::now_v7(),
        offer_id: Uuid::now_v7(),
        quantity,
        unit: Measurements::new(unit_weight, 150, 150, 200),
        unit_cost,
        unit_commission: unit_cost / 20,
    }
}
