use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use campus_match::config::{LoggingSettings, Settings};
use campus_match::core::{DeliveryHub, EngineLimits, MatchEngine, MessageStore, RelationshipStore};
use campus_match::routes::auth::JwtVerifier;
use campus_match::routes::{self, AppState};
use campus_match::services::{
    AppwriteDirectory, CacheManager, CachedDirectory, MemoryMessageStore, MemoryRelationshipStore,
    PostgresStore, ProfileDirectory, StaticDirectory,
};

fn init_logging(logging: &LoggingSettings) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match logging.format.as_str() {
        "pretty" => subscriber.pretty().init(),
        "json" => subscriber.json().init(),
        _ => subscriber.compact().init(),
    }
}

fn io_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, e);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, e))
}

async fn build_directory(settings: &Settings) -> std::io::Result<Arc<dyn ProfileDirectory>> {
    let source: Arc<dyn ProfileDirectory> = match &settings.directory.appwrite {
        Some(appwrite) => {
            let directory = AppwriteDirectory::new(
                appwrite.endpoint.clone(),
                appwrite.api_key.clone(),
                appwrite.project_id.clone(),
                appwrite.database_id.clone(),
                appwrite.profiles_collection.clone(),
                settings.directory.pool_limit,
            )
            .map_err(|e| io_error("Failed to build Appwrite client", e))?;
            info!("Profile directory: Appwrite ({})", appwrite.endpoint);
            Arc::new(directory)
        }
        None => {
            let directory = StaticDirectory::load(&settings.directory.seed_path)
                .map_err(|e| io_error("Failed to load seed profiles", e))?;
            info!("Profile directory: {} seed profiles", directory.len());
            Arc::new(directory)
        }
    };

    let cache_ttl = settings.cache.ttl_secs;
    let l1_cache_size = settings.cache.l1_cache_size;

    // Redis is optional; fall back to the in-process tier alone
    let cache = match CacheManager::new(settings.cache.redis_url.as_deref(), l1_cache_size, cache_ttl).await {
        Ok(cache) => cache,
        Err(e) => {
            warn!("Failed to connect to Redis ({}), using local profile cache only", e);
            CacheManager::local(l1_cache_size, cache_ttl)
        }
    };
    info!(
        "Profile cache initialized (L1: {} entries, TTL: {}s, shared tier: {})",
        l1_cache_size,
        cache_ttl,
        cache.stats().shared_tier
    );

    Ok(Arc::new(CachedDirectory::new(source, Arc::new(cache))))
}

async fn build_stores(
    settings: &Settings,
) -> std::io::Result<(Arc<dyn RelationshipStore>, Arc<dyn MessageStore>)> {
    let Some(url) = settings.database.url.as_deref() else {
        warn!("No database url configured; relationships and messages are kept in memory");
        let relationships: Arc<dyn RelationshipStore> = Arc::new(MemoryRelationshipStore::new());
        let messages: Arc<dyn MessageStore> = Arc::new(MemoryMessageStore::new());
        return Ok((relationships, messages));
    };

    let store = PostgresStore::from_settings(
        url,
        settings.database.max_connections,
        settings.database.min_connections,
        settings.database.acquire_timeout_secs,
        settings.database.idle_timeout_secs,
    )
    .await
    .map_err(|e| io_error("Failed to connect to PostgreSQL", e))?;

    let store = Arc::new(store);
    let relationships: Arc<dyn RelationshipStore> = store.clone();
    let messages: Arc<dyn MessageStore> = store;
    Ok((relationships, messages))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
        }
    };

    init_logging(&settings.logging);
    info!("Starting Campus Match service...");

    let directory = build_directory(&settings).await?;
    let (relationships, messages) = build_stores(&settings).await?;

    let limits = EngineLimits {
        default_candidates: settings.matching.default_limit,
        max_candidates: settings.matching.max_limit,
        max_message_chars: settings.matching.max_message_chars,
    };
    let delivery = Arc::new(DeliveryHub::new(settings.delivery.channel_capacity));

    let engine = MatchEngine::new(relationships, messages, directory, delivery, limits);
    info!("Match engine initialized with limits: {:?}", limits);

    let app_state = AppState { engine };
    let verifier = web::Data::new(JwtVerifier::new(&settings.auth.jwt_secret));

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(verifier.clone())
            .app_data(web::JsonConfig::default().error_handler(routes::handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(routes::handle_query_payload_error))
            .app_data(web::PathConfig::default().error_handler(routes::handle_path_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
