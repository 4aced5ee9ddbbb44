use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    routing::{get, patch, post},
    Router,
};
use dashmap::DashMap;
use plaza_channels::OutboundDispatcher;
use plaza_core::config::PlazaConfig;
use plaza_engine::context::Stores;
use plaza_engine::Engine;

/// Duplicate webhook deliveries inside this window are dropped.
const DEDUP_WINDOW: Duration = Duration::from_secs(600);

/// Central shared state, passed as Arc<AppState> to all handlers.
pub struct AppState {
    pub config: PlazaConfig,
    pub stores: Stores,
    pub engine: Arc<Engine>,
    pub outbound: Arc<OutboundDispatcher>,
    /// provider_message_id -> first-seen instant, for webhook dedup.
    seen_messages: DashMap<String, Instant>,
}

impl AppState {
    pub fn new(
        config: PlazaConfig,
        stores: Stores,
        engine: Arc<Engine>,
        outbound: Arc<OutboundDispatcher>,
    ) -> Self {
        Self {
            config,
            stores,
            engine,
            outbound,
            seen_messages: DashMap::new(),
        }
    }

    /// Returns true the first time a provider message id is seen within the
    /// window; repeated deliveries return false and are dropped.
    pub fn first_delivery(&self, provider_message_id: &str) -> bool {
        let now = Instant::now();
        // Opportunistic prune to keep the map bounded.
        self.seen_messages
            .retain(|_, seen| now.duration_since(*seen) < DEDUP_WINDOW);
        self.seen_messages
            .insert(provider_message_id.to_string(), now)
            .is_none()
    }
}

/// Assemble the full router: webhook ingress plus the admin surface.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health))
        .route(
            "/webhooks/{platform}",
            get(crate::http::webhooks::verify).post(crate::http::webhooks::receive),
        )
        .route(
            "/businesses",
            get(crate::http::businesses::list).post(crate::http::businesses::create),
        )
        .route("/businesses/{id}", get(crate::http::businesses::get_one))
        .route(
            "/businesses/{id}/settings",
            patch(crate::http::businesses::update_settings),
        )
        .route("/branches", post(crate::http::businesses::create_branch))
        .route(
            "/integrations",
            post(crate::http::businesses::upsert_integration),
        )
        .route(
            "/opening-hours",
            get(crate::http::businesses::list_hours).put(crate::http::businesses::put_hours),
        )
        .route(
            "/items",
            get(crate::http::items::list).post(crate::http::items::create),
        )
        .route(
            "/items/{id}",
            patch(crate::http::items::update).delete(crate::http::items::delete),
        )
        .route(
            "/menus",
            get(crate::http::menus::list).post(crate::http::menus::create),
        )
        .route(
            "/categories",
            get(crate::http::menus::list_categories).post(crate::http::menus::create_category),
        )
        .route(
            "/tables",
            get(crate::http::tables::list).post(crate::http::tables::create),
        )
        .route("/tables/{id}", patch(crate::http::tables::update))
        .route(
            "/reservations",
            get(crate::http::reservations::list).post(crate::http::reservations::create),
        )
        .route(
            "/reservations/{id}/status",
            patch(crate::http::reservations::update_status),
        )
        .route("/orders", get(crate::http::orders::list))
        .route("/orders/{id}", get(crate::http::orders::get_one))
        .route(
            "/orders/{id}/status",
            patch(crate::http::orders::update_status),
        )
        .route(
            "/orders/{id}/delivery-price",
            patch(crate::http::orders::update_delivery_price),
        )
        .route(
            "/addons",
            get(crate::http::addons::list).post(crate::http::addons::toggle),
        )
        .route("/calendar", get(crate::http::calendar::range))
        .route(
            "/tickets",
            get(crate::http::tickets::list),
        )
        .route("/tickets/{id}", patch(crate::http::tickets::update))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
