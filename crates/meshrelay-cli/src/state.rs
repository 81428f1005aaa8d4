//! Application state wiring the stores together.
//!
//! The core components are generic over repository and backend traits;
//! `AppState` pins them to the SQLite and HTTP implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use meshrelay_core::llm::BackendChain;
use meshrelay_core::memory::MemoryManager;
use meshrelay_core::router::Router;
use meshrelay_infra::config::resolve_database_path;
use meshrelay_infra::sqlite::{DatabasePool, SqliteHistoryRepository, SqliteSummaryRepository};
use meshrelay_types::config::RelayConfig;

pub type ConcreteMemory = MemoryManager<SqliteSummaryRepository, BackendChain>;

pub type ConcreteRouter<T> =
    Router<T, SqliteHistoryRepository, SqliteSummaryRepository, BackendChain>;

/// Loaded configuration plus open stores.
pub struct AppState {
    pub config: RelayConfig,
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    pub pool: DatabasePool,
    pub history: Arc<SqliteHistoryRepository>,
    pub summaries: Arc<SqliteSummaryRepository>,
}

impl AppState {
    /// Open the database named by `config` and wire the repositories.
    pub async fn init(config: RelayConfig, config_path: &Path) -> anyhow::Result<Self> {
        let db_path = resolve_database_path(config_path, &config);
        let pool = DatabasePool::open(&db_path).await?;
        tracing::debug!(db = %db_path.display(), "Database opened");

        Ok(Self {
            history: Arc::new(SqliteHistoryRepository::new(pool.clone())),
            summaries: Arc::new(SqliteSummaryRepository::new(pool.clone())),
            config,
            config_path: config_path.to_path_buf(),
            db_path,
            pool,
        })
    }
}
