//! Shared wiring for commands that touch the database.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

use crate::adapters::sqlite::{
    database_url, initialize_database, PoolConfig, SqliteAuditRepository, SqliteCatalog,
    SqliteTaskRepository,
};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::services::TaskService;

/// Load configuration from `path` when given, otherwise from the project
/// hierarchy under `.autoapply/`.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Open repositories over a migrated pool.
pub struct AppContext {
    pub config: Config,
    pub pool: SqlitePool,
    pub tasks: Arc<SqliteTaskRepository>,
    pub audit: Arc<SqliteAuditRepository>,
    pub catalog: Arc<SqliteCatalog>,
}

impl AppContext {
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = initialize_database(
            &database_url(&config.database.path),
            Some(PoolConfig::from(&config.database)),
        )
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path))?;

        Ok(Self {
            config: config.clone(),
            tasks: Arc::new(SqliteTaskRepository::new(pool.clone())),
            audit: Arc::new(SqliteAuditRepository::new(pool.clone())),
            catalog: Arc::new(SqliteCatalog::new(pool.clone())),
            pool,
        })
    }

    pub fn task_service(&self) -> TaskService {
        TaskService::new(
            self.tasks.clone(),
            self.audit.clone(),
            self.catalog.clone(),
            self.catalog.clone(),
        )
    }
}
