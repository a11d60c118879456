//! Marketplace billing service entry point.
//!
//! Loads configuration, connects to PostgreSQL, wires the Stripe processor
//! into the billing handlers, starts the expiry sweep schedule, and serves
//! the HTTP API until interrupted.

use std::error::Error;
use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use marketplace_billing::adapters::http::{app_router, BillingAppState};
use marketplace_billing::adapters::postgres::{
    PostgresBillingAccountRepository, PostgresListingRepository, PostgresPaymentLedger,
    PostgresWebhookEventRepository,
};
use marketplace_billing::adapters::scheduler::ExpirySweepScheduler;
use marketplace_billing::adapters::stripe::{StripeConfig, StripePaymentProcessor};
use marketplace_billing::application::{
    build_webhook_registry, HandleProcessorWebhookHandler, SweepExpiredHandler,
    WebhookHandlerDeps,
};
use marketplace_billing::config::{AppConfig, DatabaseConfig, ServerConfig};
use marketplace_billing::domain::webhook::{IdempotentWebhookProcessor, WebhookVerifier};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Starting marketplace billing"
    );

    let pool = connect(&config.database).await?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations applied");
    }

    // Ports
    let listings = Arc::new(PostgresListingRepository::new(pool.clone()));
    let accounts = Arc::new(PostgresBillingAccountRepository::new(pool.clone()));
    let ledger = Arc::new(PostgresPaymentLedger::new(pool.clone()));
    let webhook_events = Arc::new(PostgresWebhookEventRepository::new(pool.clone()));
    let processor = Arc::new(StripePaymentProcessor::new(
        StripeConfig::new(config.payment.api_key())
            .with_base_url(config.payment.api_base_url.clone())
            .with_timeout(config.payment.api_timeout()),
    ));

    // Plan tables
    let catalog = Arc::new(config.payment.boost_catalog()?);
    let terms = Arc::new(config.payment.premium_terms());

    // Webhook reconciliation
    let deps = WebhookHandlerDeps {
        listings: listings.clone(),
        accounts: accounts.clone(),
        ledger,
        processor,
        catalog,
        terms: terms.clone(),
    };
    let registry = build_webhook_registry(deps.clone());
    let webhook = HandleProcessorWebhookHandler::new(
        WebhookVerifier::new(config.payment.webhook_secret()),
        Arc::new(IdempotentWebhookProcessor::new(
            webhook_events.clone(),
            registry,
        )),
    )
    .with_require_livemode(config.payment.require_livemode);

    // Expiry sweep
    let scheduler = if config.sweeper.enabled {
        let sweeper = SweepExpiredHandler::new(listings, accounts, webhook_events, &terms)
            .with_webhook_retention(config.sweeper.webhook_retention());
        Some(ExpirySweepScheduler::start(Arc::new(sweeper), &config.sweeper).await?)
    } else {
        warn!("Expiry sweep disabled by configuration");
        None
    };

    // HTTP
    let state = BillingAppState::new(deps, Arc::new(webhook))
        .with_freshness_window(config.payment.freshness_window())
        .with_error_details(config.server.exposes_error_details());
    let app = app_router(state, &config.server);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await?;
    }
    pool.close().await;
    info!("Marketplace billing stopped");
    Ok(())
}

/// JSON logs in production, human-readable logs elsewhere.
/// `RUST_LOG` overrides the configured filter.
fn init_tracing(server: &ServerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if server.is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

async fn connect(database: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    info!(url = %database.redacted_url(), "Connecting to database");
    database.pool_options().connect(&database.url).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
