use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use rusqlite::Connection;
use tracing::{info, warn};

use plaza_channels::OutboundDispatcher;
use plaza_core::config::PlazaConfig;
use plaza_engine::anthropic::AnthropicProvider;
use plaza_engine::context::Stores;
use plaza_engine::Engine;
use plaza_identity::{AddonGate, IdentityStore};
use plaza_scheduler::schedule::DailyCron;
use plaza_scheduler::{ArchiveWorker, ScheduledRequestCompleter, SessionReaper};

mod app;
mod auth;
mod http;

#[derive(Parser)]
#[command(name = "plaza-gateway", about = "Conversational commerce gateway")]
struct Args {
    /// Config file path (defaults to ~/.plaza/plaza.toml).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plaza_gateway=info,plaza_engine=info,tower_http=warn".into()),
        )
        .init();

    let args = Args::parse();
    // Fail fast: a missing LLM key or a broken file is a startup error, not
    // something to limp through.
    let config = PlazaConfig::load(args.config.as_deref())?;

    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(&config.database.path)?;
    plaza_identity::db::init_db(&conn)?;
    plaza_catalog::db::init_db(&conn)?;
    plaza_orders::db::init_db(&conn)?;
    plaza_reservations::db::init_db(&conn)?;
    plaza_sessions::db::init_db(&conn)?;
    plaza_tickets::db::init_db(&conn)?;
    let db = Arc::new(Mutex::new(conn));

    let cold_conn = Connection::open(&config.database.archive_path)?;
    let order_logs = Arc::new(plaza_orders::OrderLogStore::new(cold_conn)?);

    let identity = Arc::new(IdentityStore::new(db.clone()));
    let stores = Stores {
        identity: identity.clone(),
        addons: Arc::new(AddonGate::new(db.clone())),
        catalog: Arc::new(plaza_catalog::CatalogStore::new(db.clone())),
        carts: Arc::new(plaza_orders::CartManager::new(db.clone())),
        orders: Arc::new(plaza_orders::OrderStore::new(db.clone())),
        order_logs: order_logs.clone(),
        reservations: Arc::new(plaza_reservations::ReservationStore::new(db.clone())),
        sessions: Arc::new(plaza_sessions::SessionManager::new(db.clone())),
        tickets: Arc::new(plaza_tickets::TicketManager::new(db.clone())),
    };

    let provider = Arc::new(AnthropicProvider::new(
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
        Duration::from_secs(config.llm.request_timeout_secs),
    ));
    let engine = Arc::new(Engine::new(
        provider,
        stores.clone(),
        config.engine.clone(),
        config.llm.model.clone(),
    ));
    let outbound = Arc::new(OutboundDispatcher::with_default_senders(identity));

    // Background workers, all stopped through one watch channel.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(
        ScheduledRequestCompleter::new(stores.orders.clone()).run(shutdown_rx.clone()),
    );
    let cron = DailyCron::parse(&config.archive.job_cron).unwrap_or_else(|e| {
        warn!(error = %e, "bad ARCHIVE_JOB_CRON; falling back to 02:00");
        DailyCron { minute: 0, hour: 2 }
    });
    tokio::spawn(
        ArchiveWorker::new(
            stores.orders.clone(),
            order_logs,
            db.clone(),
            cron,
            config.archive.order_age_hours,
            config.engine.default_tz_offset_minutes,
        )
        .run(shutdown_rx.clone()),
    );
    tokio::spawn(
        SessionReaper::new(stores.sessions.clone(), config.sessions.idle_minutes)
            .run(shutdown_rx.clone()),
    );

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::new(config, stores, engine, outbound));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("plaza gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    Ok(())
}
