//! End-to-end turns against a scripted LLM: the engine, stores, and tool
//! loop run for real; only the model is fake.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;

use plaza_core::config::EngineConfig;
use plaza_core::types::{BusinessType, OrderStatus, Platform, PrincipalKind, SessionState};
use plaza_engine::context::Stores;
use plaza_engine::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError, ToolCall};
use plaza_engine::{Engine, InboundMessage};
use plaza_identity::types::{ADDON_BASE_BOT, ADDON_TABLE_RESERVATIONS};
use plaza_identity::{AddonGate, IdentityStore};
use plaza_orders::{CartManager, OrderLogStore, OrderStore};

/// Replays a fixed sequence of responses and records every request.
struct ScriptedProvider {
    script: Mutex<VecDeque<ChatResponse>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Parse("script exhausted".into()))
    }
}

fn text(content: &str) -> ChatResponse {
    ChatResponse {
        content: content.to_string(),
        model: "scripted".into(),
        tokens_in: 0,
        tokens_out: 0,
        stop_reason: "end_turn".into(),
        tool_calls: vec![],
    }
}

fn call(name: &str, input: serde_json::Value) -> ChatResponse {
    calls(vec![(name, input)])
}

fn calls(list: Vec<(&str, serde_json::Value)>) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        model: "scripted".into(),
        tokens_in: 0,
        tokens_out: 0,
        stop_reason: "tool_use".into(),
        tool_calls: list
            .into_iter()
            .enumerate()
            .map(|(i, (name, input))| ToolCall {
                id: format!("tc-{i}"),
                name: name.to_string(),
                input,
            })
            .collect(),
    }
}

struct Fixture {
    stores: Stores,
    business_id: String,
    item_id: String,
}

/// One F&B tenant with an open-all-week schedule, a WhatsApp integration,
/// one pizza, and one table.
fn fixture() -> Fixture {
    let conn = Connection::open_in_memory().unwrap();
    plaza_identity::db::init_db(&conn).unwrap();
    plaza_catalog::db::init_db(&conn).unwrap();
    plaza_orders::db::init_db(&conn).unwrap();
    plaza_reservations::db::init_db(&conn).unwrap();
    plaza_sessions::db::init_db(&conn).unwrap();
    plaza_tickets::db::init_db(&conn).unwrap();
    let db = Arc::new(Mutex::new(conn));

    let identity = Arc::new(IdentityStore::new(db.clone()));
    let addons = Arc::new(AddonGate::new(db.clone()));
    let catalog = Arc::new(plaza_catalog::CatalogStore::new(db.clone()));
    let stores = Stores {
        identity: identity.clone(),
        addons: addons.clone(),
        catalog: catalog.clone(),
        carts: Arc::new(CartManager::new(db.clone())),
        orders: Arc::new(OrderStore::new(db.clone())),
        order_logs: Arc::new(OrderLogStore::new(Connection::open_in_memory().unwrap()).unwrap()),
        reservations: Arc::new(plaza_reservations::ReservationStore::new(db.clone())),
        sessions: Arc::new(plaza_sessions::SessionManager::new(db.clone())),
        tickets: Arc::new(plaza_tickets::TicketManager::new(db.clone())),
    };

    let business = identity
        .create_principal(
            PrincipalKind::BusinessOwner,
            "Mario's Pizza",
            None,
            Some(BusinessType::FoodAndBeverage),
        )
        .unwrap();
    identity
        .upsert_integration(&business.id, Platform::Whatsapp, "token", "15550001")
        .unwrap();
    addons
        .set_active(&business.id, ADDON_BASE_BOT, true, None)
        .unwrap();
    addons
        .set_active(&business.id, ADDON_TABLE_RESERVATIONS, true, None)
        .unwrap();

    for dow in 0..7u8 {
        catalog
            .upsert_opening_hours(&plaza_catalog::types::OpeningHours {
                owner_id: business.id.clone(),
                day_of_week: dow,
                open_time: Some("00:00".into()),
                close_time: Some("23:59".into()),
                is_closed: false,
                last_order_time: None,
            })
            .unwrap();
    }

    let item = catalog
        .create_item(plaza_catalog::store::NewItem::new(
            &business.id,
            "Margherita Pizza",
            12.0,
        ))
        .unwrap();

    Fixture {
        stores,
        business_id: business.id,
        item_id: item.id,
    }
}

fn engine_with(fixture: &Fixture, provider: Arc<ScriptedProvider>) -> Engine {
    Engine::new(
        provider,
        fixture.stores.clone(),
        EngineConfig::default(),
        "scripted".into(),
    )
}

fn inbound(text: &str) -> InboundMessage {
    InboundMessage {
        platform: Platform::Whatsapp,
        tenant_external_id: "15550001".into(),
        customer_phone: "+96170000001".into(),
        text: text.to_string(),
        language: None,
    }
}

#[tokio::test]
async fn happy_path_order_lands_accepted() {
    let fx = fixture();
    let provider = Arc::new(ScriptedProvider::new(vec![
        call("search_menu", serde_json::json!({"query": "margherita"})),
        call("add_to_cart", serde_json::json!({"item_id": fx.item_id, "quantity": 2})),
        call("set_delivery_type", serde_json::json!({"delivery_type": "takeaway"})),
        call("validate_cart_for_confirmation", serde_json::json!({})),
        call("confirm_order", serde_json::json!({})),
        text("Done! Your order is confirmed, pickup in 20 minutes."),
    ]));
    let engine = engine_with(&fx, provider.clone());

    let outcome = engine
        .handle_inbound(inbound("2 margheritas, takeaway please"))
        .await
        .unwrap();
    assert_eq!(
        outcome.reply.as_deref(),
        Some("Done! Your order is confirmed, pickup in 20 minutes.")
    );

    let orders = fx
        .stores
        .orders
        .list_for_customer(&fx.business_id, "+96170000001", 10)
        .unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Accepted);
    assert_eq!(orders[0].total, 24.0);

    // Cart slot is free again after confirmation.
    let cart = fx
        .stores
        .carts
        .snapshot(&plaza_orders::types::CartKey::new(
            &fx.business_id,
            &fx.business_id,
            "+96170000001",
        ))
        .unwrap();
    assert!(cart.is_none());
}

#[tokio::test]
async fn unvalidated_confirm_is_refused() {
    let fx = fixture();
    // The model tries to confirm without validating; the dispatcher refuses,
    // and the model gives up with text.
    let provider = Arc::new(ScriptedProvider::new(vec![
        call("add_to_cart", serde_json::json!({"item_id": fx.item_id})),
        call("set_delivery_type", serde_json::json!({"delivery_type": "takeaway"})),
        call("confirm_order", serde_json::json!({})),
        text("I still need to double-check your cart."),
    ]));
    let engine = engine_with(&fx, provider);

    engine.handle_inbound(inbound("a pizza, takeaway")).await.unwrap();

    // No order was placed: the cart still exists and holds the line.
    let orders = fx
        .stores
        .orders
        .list_for_customer(&fx.business_id, "+96170000001", 10)
        .unwrap();
    assert!(orders.is_empty());
    let cart = fx
        .stores
        .carts
        .snapshot(&plaza_orders::types::CartKey::new(
            &fx.business_id,
            &fx.business_id,
            "+96170000001",
        ))
        .unwrap()
        .unwrap();
    assert_eq!(cart.lines.len(), 1);
}

#[tokio::test]
async fn failed_validation_blocks_the_mutation() {
    let fx = fixture();
    // Empty cart: validator fails, then the model still tries to confirm.
    let provider = Arc::new(ScriptedProvider::new(vec![
        call("validate_cart_for_confirmation", serde_json::json!({})),
        call("confirm_order", serde_json::json!({})),
        text("Your cart is empty, want to add something first?"),
    ]));
    let engine = engine_with(&fx, provider);

    let outcome = engine.handle_inbound(inbound("confirm my order")).await.unwrap();
    assert!(outcome.reply.unwrap().contains("empty"));
    let orders = fx
        .stores
        .orders
        .list_for_customer(&fx.business_id, "+96170000001", 10)
        .unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn handover_locks_the_session_and_silences_the_bot() {
    let fx = fixture();
    let provider = Arc::new(ScriptedProvider::new(vec![
        call(
            "request_human_assistance",
            serde_json::json!({"reason": "customer requested human"}),
        ),
        text("Connecting you with the team now."),
    ]));
    let engine = engine_with(&fx, provider.clone());

    let outcome = engine
        .handle_inbound(inbound("I want to talk to a human, this is urgent"))
        .await
        .unwrap();
    assert!(outcome.reply.is_some());
    let llm_calls_after_handover = provider.call_count();

    let session = fx.stores.sessions.get(&outcome.session_id).unwrap().unwrap();
    assert_eq!(session.state, SessionState::HumanLocked);

    // A high-priority unassigned ticket waits in the queue.
    let queue = fx.stores.tickets.list_open(&fx.business_id, 10).unwrap();
    assert_eq!(queue.len(), 1);
    assert!(queue[0].assigned_employee_id.is_none());

    // The next message is logged but never reaches the LLM.
    let outcome = engine.handle_inbound(inbound("hello?")).await.unwrap();
    assert!(outcome.reply.is_none());
    assert_eq!(provider.call_count(), llm_calls_after_handover);
}

#[tokio::test]
async fn tool_round_cap_degrades_to_apology() {
    let fx = fixture();
    // More tool rounds than the cap allows (default 6).
    let responses: Vec<ChatResponse> = (0..10)
        .map(|_| call("view_cart", serde_json::json!({})))
        .collect();
    let provider = Arc::new(ScriptedProvider::new(responses));
    let engine = engine_with(&fx, provider.clone());

    let outcome = engine.handle_inbound(inbound("hmm")).await.unwrap();
    let reply = outcome.reply.unwrap();
    assert!(reply.contains("try again") || reply.contains("rephrase"));
    assert_eq!(provider.call_count(), 6);
}

#[tokio::test]
async fn inactive_base_bot_silences_the_tenant() {
    let fx = fixture();
    fx.stores
        .addons
        .set_active(&fx.business_id, ADDON_BASE_BOT, false, None)
        .unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let engine = engine_with(&fx, provider.clone());

    let outcome = engine.handle_inbound(inbound("anyone there?")).await.unwrap();
    assert!(outcome.reply.is_none());
    assert_eq!(provider.call_count(), 0);

    // The message still landed in the session log.
    let history = fx.stores.sessions.history(&outcome.session_id, 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "anyone there?");
}

#[tokio::test]
async fn reservation_slot_contention_surfaces_slot_taken() {
    let fx = fixture();
    fx.stores
        .catalog
        .create_table(&fx.business_id, &fx.business_id, 1, 2, 4, None)
        .unwrap();
    fx.stores
        .catalog
        .create_table(&fx.business_id, &fx.business_id, 2, 2, 4, None)
        .unwrap();

    // First customer books table 1 at 20:00.
    let provider = Arc::new(ScriptedProvider::new(vec![
        call(
            "validate_reservation_request",
            serde_json::json!({"date": "2027-01-09", "time": "20:00", "guests": 2}),
        ),
        call(
            "create_table_reservation",
            serde_json::json!({
                "date": "2027-01-09", "time": "20:00",
                "customer_name": "Rania", "guests": 2, "table_number": 1
            }),
        ),
        text("Booked! See you Saturday at 8."),
    ]));
    let engine = engine_with(&fx, provider);
    engine
        .handle_inbound(inbound("table for 2, saturday 8pm"))
        .await
        .unwrap();

    // Second customer's validation passes (table 2 is still free), but they
    // insist on table 1 and lose the race for it.
    let provider = Arc::new(ScriptedProvider::new(vec![
        calls(vec![(
            "validate_reservation_request",
            serde_json::json!({"date": "2027-01-09", "time": "20:00", "guests": 2}),
        )]),
        call(
            "create_table_reservation",
            serde_json::json!({
                "date": "2027-01-09", "time": "20:00",
                "customer_name": "Omar", "guests": 2, "table_number": 1
            }),
        ),
        text("That table just got booked. Would 20:15 work?"),
    ]));
    let engine = engine_with(&fx, provider);
    let outcome = engine
        .handle_inbound(InboundMessage {
            platform: Platform::Whatsapp,
            tenant_external_id: "15550001".into(),
            customer_phone: "+96170000002".into(),
            text: "table for 2, saturday 8pm".into(),
            language: None,
        })
        .await
        .unwrap();
    assert!(outcome.reply.unwrap().contains("20:15"));

    // Exactly one confirmed reservation exists for that slot.
    let all = fx
        .stores
        .reservations
        .list_range(&fx.business_id, "2027-01-09", "2027-01-09")
        .unwrap();
    let confirmed: Vec<_> = all
        .iter()
        .filter(|r| r.status == plaza_core::types::ReservationStatus::Confirmed)
        .collect();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].customer_name, "Rania");
}
