use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use shipment_core::{EscrowSettlement, LogNotifier, Notifier, ShipmentLifecycle, Store};
use shipment_engine::{
    config::Config,
    database::PgStore,
    handlers,
    integration::{ChapaClient, SmsClient},
    metrics,
    request_metrics::RequestMetrics,
    security_middleware::JwtAuth,
    services::ShipmentService,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_logs = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false);
    if json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = Config::from_env().context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;
    let engine = config
        .engine_config()
        .map_err(|e| anyhow::anyhow!("invalid engine configuration: {}", e))?;

    info!("Starting Shipment Engine on port {}", config.server.port);
    metrics::init();

    let store = PgStore::connect(&config.database)
        .await
        .context("failed to connect to database")?;
    if config.database.run_migrations {
        store.migrate().await.context("failed to run migrations")?;
    }
    let store: Arc<dyn Store> = Arc::new(store);

    let gateway = Arc::new(ChapaClient::new(&config.chapa)?);
    let notifier: Arc<dyn Notifier> = if config.sms.enabled {
        Arc::new(SmsClient::new(&config.sms)?)
    } else {
        info!("SMS disabled, notifications will only be logged");
        Arc::new(LogNotifier)
    };

    let escrow = Arc::new(EscrowSettlement::new(
        store.clone(),
        gateway,
        engine.fee_rate,
        engine.payment_callback_url.clone(),
    ));
    let lifecycle = Arc::new(ShipmentLifecycle::new(
        store,
        escrow,
        notifier,
        engine,
    ));
    let service = Arc::new(ShipmentService::new(
        lifecycle,
        config.payments.default_currency.clone(),
    ));

    let jwt_secret = config.auth.jwt_secret.clone();
    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(JwtAuth::new(jwt_secret.clone()))
            .wrap(cors)
            .wrap(RequestMetrics)
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .app_data(web::Data::new(service.clone()))
            .configure(handlers::configure_routes)
    })
    .workers(config.server.workers)
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    Ok(())
}
