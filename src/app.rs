//! Wiring: config → manuscript source, SQLite cache, provider → service.

use anyhow::Result;
use std::sync::Arc;

use plotline_core::Plotline;

use crate::config::Config;
use crate::db;
use crate::manuscript::FsManuscriptSource;
use crate::migrate;
use crate::provider;
use crate::single_flight::SingleFlight;
use crate::sqlite_cache::SqliteCache;

/// Everything a command or request handler needs.
pub struct App {
    pub config: Config,
    pub service: Plotline,
    pub cache: Arc<SqliteCache>,
    pub flights: SingleFlight,
}

impl App {
    /// Open the database (migrating it if needed) and assemble the service.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate(&pool).await?;
        let cache = Arc::new(SqliteCache::new(pool));
        let generator = provider::build_generator(&config.provider)?;
        let source = Arc::new(FsManuscriptSource::new(config));
        let service = Plotline::new(source, cache.clone(), generator, config.service_settings());
        tracing::debug!(
            db = %config.db.path.display(),
            projects = config.projects.len(),
            provider = %config.provider.kind,
            "service ready"
        );
        Ok(Self {
            config: config.clone(),
            service,
            cache,
            flights: SingleFlight::new(),
        })
    }

    pub async fn close(self) {
        self.cache.pool().close().await;
    }
}
