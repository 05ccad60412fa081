use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::auth::jwt::JwtKeys;
use crate::config::{AppConfig, JwtConfig};
use crate::users::{
    memory::MemoryUserStore,
    repo::{PgUserStore, UserStore},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        Self::from_config(config).await
    }

    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let store = if config.uses_memory_store() {
            warn!("using in-memory user store; data is lost on restart");
            Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>
        } else {
            let pg = PgUserStore::connect(&config.database_url)
                .await
                .context("connect to postgres")?;
            // email uniqueness lives in the schema; never serve without it
            pg.migrate().await.context("run migrations")?;
            info!("connected to postgres");
            Arc::new(pg) as Arc<dyn UserStore>
        };
        Ok(Self::from_parts(store, Arc::new(config)))
    }

    pub fn from_parts(store: Arc<dyn UserStore>, config: Arc<AppConfig>) -> Self {
        let keys = JwtKeys::new(&config.jwt);
        Self {
            store,
            config,
            keys,
        }
    }

    /// Memory-backed state with a fixed secret, for tests.
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            app_name: "test".into(),
            database_url: "memory:".into(),
            jwt: JwtConfig {
                secret: "test-secret".into(),
                ttl_minutes: 30,
            },
            host: "127.0.0.1".into(),
            port: 0,
        });
        Self::from_parts(Arc::new(MemoryUserStore::new()), config)
    }
}
