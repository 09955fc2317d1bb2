use std::sync::Arc;
use std::net::SocketAddr;
use std::time::Duration;
use anyhow::Context;
use busconnect_api::{app, metrics::ApiMetrics, state::{AppState, AuthConfig, RateLimitConfig, ResiliencyState}, worker};
use busconnect_booking::{BookingEngine, EngineOptions, FareSchedule, PaymentSettings, Repositories};
use busconnect_core::notification::{EventPublisher, LogPublisher};
use busconnect_core::payment::PaymentGateway;
use busconnect_store::app_config::{Config, PaymentProvider};
use busconnect_store::{
    DbClient, EventProducer, MockPaymentGateway, PaystackClient, RedisClient, StoreBookingRepository,
    StoreOutboxRepository, StorePaymentRepository, StoreTripRepository,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busconnect_api=debug,busconnect_booking=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting BusConnect API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let trips = Arc::new(StoreTripRepository::new(db.pool.clone()));
    let repos = Repositories {
        trips: trips.clone(),
        seats: trips,
        bookings: Arc::new(StoreBookingRepository::new(db.pool.clone())),
        payments: Arc::new(StorePaymentRepository::new(db.pool.clone())),
        outbox: Arc::new(StoreOutboxRepository::new(db.pool.clone())),
    };

    // Redis (optional, rate limiting only)
    let redis = match &config.redis {
        Some(redis_config) => match RedisClient::new(&redis_config.url).await {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!("Redis unavailable, rate limiting disabled: {}", e);
                None
            }
        },
        None => None,
    };

    // Kafka (optional, notification relay)
    let publisher: Arc<dyn EventPublisher> = match &config.kafka {
        Some(kafka_config) => Arc::new(
            EventProducer::new(&kafka_config.brokers).context("Failed to create Kafka producer")?,
        ),
        None => {
            tracing::warn!("No Kafka configured, outbox events will only be logged");
            Arc::new(LogPublisher)
        }
    };

    // Payment gateway
    let payments_config = &config.payments;
    let gateway: Arc<dyn PaymentGateway> = match payments_config.provider {
        PaymentProvider::Paystack => Arc::new(
            PaystackClient::new(
                &payments_config.base_url,
                &payments_config.secret_key,
                Duration::from_millis(payments_config.request_timeout_ms),
            )
            .context("Failed to build Paystack client")?,
        ),
        PaymentProvider::Mock => {
            tracing::warn!("Using the mock payment gateway; every charge succeeds");
            Arc::new(MockPaymentGateway::auto_completing())
        }
    };

    let rules = &config.business_rules;
    let engine = Arc::new(BookingEngine::new(
        repos,
        gateway,
        EngineOptions {
            fares: FareSchedule::new(rules.insurance_fee, rules.luggage_fee, rules.max_free_bags),
            payments: PaymentSettings {
                currency: payments_config.currency.clone(),
                callback_base_url: payments_config.callback_base_url.clone(),
                verify_timeout: Duration::from_millis(payments_config.verify_timeout_ms),
            },
            webhook_secret: payments_config.secret_key.clone(),
            feed_capacity: rules.feed_capacity,
            provisional_ttl: rules.provisional_ttl_seconds.map(Duration::from_secs),
        },
    ));

    // Background workers
    tokio::spawn(worker::start_outbox_relay(
        engine.outbox.clone(),
        publisher,
        Duration::from_millis(rules.outbox_poll_interval_ms),
    ));
    tokio::spawn(worker::start_change_listener(db.clone(), engine.feed.clone()));
    if let Some(expiry) = engine.expiry.clone() {
        tokio::spawn(worker::start_expiry_sweeper(
            expiry,
            Duration::from_secs(rules.expiry_sweep_interval_seconds),
        ));
    }

    let app_state = AppState {
        engine,
        redis,
        rate_limit: RateLimitConfig {
            per_minute: config.redis.as_ref().map(|r| r.rate_limit_per_minute).unwrap_or(100),
        },
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        currency: payments_config.currency.clone(),
        metrics: Arc::new(ApiMetrics::new().context("Failed to register metrics")?),
        resiliency: Arc::new(ResiliencyState::default()),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>()
    ).await?;

    Ok(())
}
