use library_lending::{
    adapters::mock::BookAvailabilityCache as InMemoryBookAvailabilityCache,
    adapters::postgres::{PostgresLendingRecordStore, PostgresReaderDirectory},
    adapters::redis::RedisBookAvailabilityCache,
    api::{handlers::AppState, router::create_router},
    application::lending::{ServiceDependencies, sweep_overdue},
    config::AppConfig,
    ports::BookAvailabilityCache,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize database connection pool
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Initialize adapters
    let record_store = Arc::new(PostgresLendingRecordStore::new(pool.clone()));
    let reader_directory = Arc::new(PostgresReaderDirectory::new(pool.clone()));
    let availability_cache: Arc<dyn BookAvailabilityCache> = if config.redis.enabled {
        let cache = RedisBookAvailabilityCache::connect(&config.redis.url).await?;
        tracing::info!("Book views cached in Redis");
        Arc::new(cache)
    } else {
        tracing::warn!("Redis disabled, book views cached in process memory");
        Arc::new(InMemoryBookAvailabilityCache::new())
    };

    // Create service dependencies
    let service_deps =
        ServiceDependencies::new(record_store, availability_cache, reader_directory)
            .with_cache_ttl(config.cache.ttl());

    // Scheduled overdue sweep
    if config.sweep.enabled {
        let deps = service_deps.clone();
        let period = config.sweep.interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let today = chrono::Utc::now().date_naive();
                sweep_overdue(&deps, today).await;
            }
        });
        tracing::info!(interval_seconds = period.as_secs(), "Overdue sweep scheduled");
    }

    // Create application state
    let app_state = Arc::new(AppState { service_deps });

    // Create router
    let app = create_router(app_state);

    // Server configuration
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    // Start server
    axum::serve(listener, app).await?;

    Ok(())
}
