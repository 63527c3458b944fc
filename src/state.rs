use std::sync::Arc;

use anyhow::Context;

use crate::accounts::repo::{AccountStore, PgAccountStore};
use crate::config::AppConfig;
use crate::storage::{MediaStore, S3MediaStore};

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountStore>,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn MediaStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;

        let storage = Arc::new(S3MediaStore::connect(&config.storage).await?) as Arc<dyn MediaStore>;
        let accounts = Arc::new(PgAccountStore::new(db)) as Arc<dyn AccountStore>;

        Ok(Self::from_parts(accounts, config, storage))
    }

    pub fn from_parts(
        accounts: Arc<dyn AccountStore>,
        config: Arc<AppConfig>,
        storage: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            accounts,
            config,
            storage,
        }
    }
}
