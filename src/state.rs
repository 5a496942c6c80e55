use std::sync::Arc;

use tracing::info;

use crate::auth::jwt::JwtKeys;
use crate::auth::repo::{InMemoryUserRepo, PgUserRepo, UserRepo};
use crate::config::{AppConfig, StoreBackend};
use crate::db;
use crate::documents::storage::{LocalStorage, StorageClient};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: Arc<JwtKeys>,
    pub users: Arc<dyn UserRepo>,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let users: Arc<dyn UserRepo> = match config.store {
            StoreBackend::Postgres => {
                let pool = db::connect(&config).await?;
                db::migrate(&pool).await?;
                Arc::new(PgUserRepo::new(pool))
            }
            StoreBackend::Memory => {
                info!("using in-memory user store; accounts are lost on restart");
                Arc::new(InMemoryUserRepo::new())
            }
        };

        let storage = Arc::new(LocalStorage::new(&config.upload_dir).await?) as Arc<dyn StorageClient>;

        Ok(Self::from_parts(Arc::new(config), users, storage))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserRepo>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        let keys = Arc::new(JwtKeys::from_config(&config.jwt));
        Self {
            config,
            keys,
            users,
            storage,
        }
    }
}
