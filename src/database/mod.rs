// ==================== DATABASE CONNECTION CACHE ====================
// One cached connection per logical store (tools, users), shared by every
// request in the process. Establishment retries with escalating fallback
// option sets and exponential backoff; concurrent callers share a single
// in-flight attempt instead of opening parallel connection storms.

use crate::utils::error::AppError;
use crate::utils::validators::{is_valid_mongo_uri, mask_uri};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use mongodb::bson::doc;
use mongodb::event::sdam::SdamEvent;
use mongodb::event::EventHandler;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use rand::Rng;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct MongoDB {
    client: Client,
    db: Database,
}

impl MongoDB {
    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| AppError::ConnectionError(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: Option<String>,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub connect_timeout: Duration,
    pub server_selection_timeout: Duration,
    pub max_pool_size: u32,
    pub min_pool_size: u32,
}

impl MongoConfig {
    pub fn from_env(var: &str) -> Self {
        Self {
            uri: env::var(var).ok().filter(|v| !v.is_empty()),
            max_retries: 3,
            retry_delay_ms: 2000,
            connect_timeout: Duration::from_secs(5),
            server_selection_timeout: Duration::from_secs(5),
            max_pool_size: 20,
            min_pool_size: 5,
        }
    }
}

type PendingConnect = Shared<BoxFuture<'static, Result<MongoDB, String>>>;

struct CacheState {
    conn: Option<MongoDB>,
    pending: Option<PendingConnect>,
}

pub struct ConnectionCache {
    label: &'static str,
    default_db_name: &'static str,
    config: MongoConfig,
    state: Mutex<CacheState>,
    // Flipped by the SDAM monitor when the topology drops so the next
    // connect() call rebuilds instead of reusing a dead handle
    poisoned: Arc<AtomicBool>,
}

impl ConnectionCache {
    pub fn new(label: &'static str, default_db_name: &'static str, config: MongoConfig) -> Self {
        Self {
            label,
            default_db_name,
            config,
            state: Mutex::new(CacheState {
                conn: None,
                pending: None,
            }),
            poisoned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the cached connection, establishing it on first use.
    /// Concurrent callers during establishment await the same attempt.
    pub async fn connect(&self) -> Result<MongoDB, AppError> {
        let uri = match &self.config.uri {
            None => {
                return Err(AppError::ConfigError(format!(
                    "MongoDB URI for {} store is not defined",
                    self.label
                )))
            }
            Some(uri) if !is_valid_mongo_uri(uri) => {
                return Err(AppError::ConfigError(format!(
                    "Invalid MongoDB URI format for {} store",
                    self.label
                )))
            }
            Some(uri) => uri.clone(),
        };

        let pending = {
            let mut state = self.state.lock().await;

            if self.poisoned.swap(false, Ordering::SeqCst) && state.conn.take().is_some() {
                log::warn!("♻️  {} store connection invalidated, reconnecting", self.label);
            }

            if let Some(conn) = &state.conn {
                return Ok(conn.clone());
            }

            if state.pending.is_none() {
                log::info!(
                    "🔌 Initiating new {} store connection to {}",
                    self.label,
                    mask_uri(&uri)
                );
                let label = self.label;
                let db_name = db_name_from_uri(&uri, self.default_db_name);
                let config = self.config.clone();
                let poisoned = self.poisoned.clone();
                state.pending = Some(
                    async move { establish_with_retry(label, uri, db_name, config, poisoned).await }
                        .boxed()
                        .shared(),
                );
            }

            state
                .pending
                .clone()
                .ok_or_else(|| AppError::InternalError("connection state lost".to_string()))?
        };

        let result = pending.await;

        let mut state = self.state.lock().await;
        state.pending = None;

        match result {
            Ok(conn) => {
                state.conn = Some(conn.clone());
                Ok(conn)
            }
            Err(msg) => Err(AppError::ConnectionError(msg)),
        }
    }

    /// Drops all cached state so the next connect() starts fresh (test isolation)
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.conn = None;
        state.pending = None;
        self.poisoned.store(false, Ordering::SeqCst);
    }
}

fn db_name_from_uri(uri: &str, default: &str) -> String {
    uri.split('/')
        .nth(3)
        .and_then(|s| s.split('?').next())
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}

async fn establish_with_retry(
    label: &'static str,
    uri: String,
    db_name: String,
    config: MongoConfig,
    poisoned: Arc<AtomicBool>,
) -> Result<MongoDB, String> {
    let mut last_error = String::new();

    for attempt in 1..=config.max_retries {
        match establish(label, &uri, &db_name, &config, attempt, poisoned.clone()).await {
            Ok(mongo) => {
                log::info!(
                    "✅ {} store connected (attempt {}/{})",
                    label,
                    attempt,
                    config.max_retries
                );
                return Ok(mongo);
            }
            Err(e) => {
                last_error = e.to_string();
                log::warn!(
                    "⚠️  {} store connection attempt {}/{} failed: {}",
                    label,
                    attempt,
                    config.max_retries,
                    last_error
                );
                if attempt < config.max_retries {
                    // Exponential backoff with jitter, capped at 30s
                    let jitter = rand::thread_rng().gen_range(0..1000);
                    let delay = (config.retry_delay_ms * 2u64.pow(attempt - 1) + jitter).min(30_000);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    Err(format!(
        "Failed to connect to {} store after {} attempts: {}",
        label, config.max_retries, last_error
    ))
}

async fn establish(
    label: &'static str,
    uri: &str,
    db_name: &str,
    config: &MongoConfig,
    attempt: u32,
    poisoned: Arc<AtomicBool>,
) -> Result<MongoDB, mongodb::error::Error> {
    let mut options = ClientOptions::parse(uri).await?;

    options.max_pool_size = Some(config.max_pool_size);
    options.min_pool_size = Some(config.min_pool_size);
    options.connect_timeout = Some(config.connect_timeout);
    options.server_selection_timeout = Some(config.server_selection_timeout);
    options.max_idle_time = Some(Duration::from_secs(300));

    // Escalating fallback option sets per attempt: standard topology first,
    // then direct connection, then simplified short-timeout options
    match attempt {
        1 => {}
        2 => {
            options.direct_connection = Some(true);
        }
        _ => {
            options.direct_connection = None;
            options.connect_timeout = Some(config.connect_timeout.min(Duration::from_secs(2)));
            options.server_selection_timeout =
                Some(config.server_selection_timeout.min(Duration::from_secs(2)));
        }
    }

    options.sdam_event_handler = Some(EventHandler::callback(move |event: SdamEvent| {
        match event {
            SdamEvent::ServerClosed(_) | SdamEvent::TopologyClosed(_) => {
                poisoned.store(true, Ordering::SeqCst);
            }
            _ => {}
        }
    }));

    let client = Client::with_options(options)?;
    let db = client.database(db_name);

    // Test the connection before handing it out
    db.run_command(doc! { "ping": 1 }).await?;

    let mongo = MongoDB { client, db };
    ensure_indexes(label, &mongo).await;

    Ok(mongo)
}

/// Creates the indexes each store relies on; failures are logged, not fatal
async fn ensure_indexes(label: &str, mongo: &MongoDB) {
    let unique = || IndexOptions::builder().unique(true).build();

    match label {
        "tools" => {
            let tools = mongo.collection::<mongodb::bson::Document>("tools");
            let indexes = vec![
                IndexModel::builder()
                    .keys(doc! { "title": 1 })
                    .options(unique())
                    .build(),
                IndexModel::builder().keys(doc! { "category": 1 }).build(),
                IndexModel::builder().keys(doc! { "keywords": 1 }).build(),
            ];
            for index in indexes {
                if let Err(e) = tools.create_index(index).await {
                    log::debug!("ℹ️  tools index: {}", e);
                }
            }
        }
        "users" => {
            let users = mongo.collection::<mongodb::bson::Document>("users");
            let indexes = vec![
                IndexModel::builder()
                    .keys(doc! { "clerk_id": 1 })
                    .options(unique())
                    .build(),
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique())
                    .build(),
            ];
            for index in indexes {
                if let Err(e) = users.create_index(index).await {
                    log::debug!("ℹ️  users index: {}", e);
                }
            }

            let orders = mongo.collection::<mongodb::bson::Document>("subscription_orders");
            let order_index = IndexModel::builder()
                .keys(doc! { "order_id": 1 })
                .options(unique())
                .build();
            if let Err(e) = orders.create_index(order_index).await {
                log::debug!("ℹ️  subscription_orders index: {}", e);
            }
        }
        _ => {}
    }
}

// ==================== DB POOL ====================
// Both logical stores bundled as one injectable dependency (web::Data)

pub struct DbPool {
    tools: ConnectionCache,
    users: ConnectionCache,
}

impl DbPool {
    pub fn from_env() -> Self {
        Self {
            tools: ConnectionCache::new("tools", "aitools", MongoConfig::from_env("MONGODB_URI_TOOLS")),
            users: ConnectionCache::new(
                "users",
                "aitools_users",
                MongoConfig::from_env("MONGODB_URI_USERS"),
            ),
        }
    }

    pub async fn tools_db(&self) -> Result<MongoDB, AppError> {
        self.tools.connect().await
    }

    pub async fn users_db(&self) -> Result<MongoDB, AppError> {
        self.users.connect().await
    }

    pub async fn reset(&self) {
        self.tools.reset().await;
        self.users.reset().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(uri: Option<&str>) -> MongoConfig {
        MongoConfig {
            uri: uri.map(|s| s.to_string()),
            max_retries: 3,
            retry_delay_ms: 10,
            connect_timeout: Duration::from_millis(300),
            server_selection_timeout: Duration::from_millis(300),
            max_pool_size: 2,
            min_pool_size: 1,
        }
    }

    #[test]
    fn test_db_name_from_uri() {
        assert_eq!(
            db_name_from_uri("mongodb://localhost:27017/tools", "fallback"),
            "tools"
        );
        assert_eq!(
            db_name_from_uri("mongodb+srv://u:p@cluster.net/users?retryWrites=true", "fallback"),
            "users"
        );
        assert_eq!(
            db_name_from_uri("mongodb://localhost:27017", "fallback"),
            "fallback"
        );
    }

    #[tokio::test]
    async fn test_missing_uri_is_config_error() {
        let cache = ConnectionCache::new("tools", "aitools", test_config(None));
        match cache.connect().await {
            Err(AppError::ConfigError(_)) => {}
            other => panic!("expected ConfigError, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_malformed_uri_is_config_error() {
        let cache = ConnectionCache::new("tools", "aitools", test_config(Some("http://example.com")));
        match cache.connect().await {
            Err(AppError::ConfigError(_)) => {}
            other => panic!("expected ConfigError, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_retry_exhaustion_then_fresh_attempt() {
        // Nothing listens on this port, so every attempt fails fast
        let cache = ConnectionCache::new(
            "users",
            "aitools_users",
            test_config(Some("mongodb://127.0.0.1:9/test")),
        );

        match cache.connect().await {
            Err(AppError::ConnectionError(msg)) => {
                assert!(msg.contains("after 3 attempts"), "got: {}", msg);
            }
            other => panic!("expected ConnectionError, got {:?}", other.err()),
        }

        // A later call must start a fresh attempt rather than reuse failed state
        match cache.connect().await {
            Err(AppError::ConnectionError(_)) => {}
            other => panic!("expected a fresh ConnectionError, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_live_connection() {
        dotenv::dotenv().ok();
        let cache = ConnectionCache::new("users", "aitools_users", MongoConfig::from_env("MONGODB_URI_USERS"));
        let db = cache.connect().await.expect("connect");
        db.health_check().await.expect("ping");
    }
}
