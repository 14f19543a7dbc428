use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::db::Store;
use crate::mail::{Mailer, build_mailer};
use crate::services::{AuthService, StoreAuthService};

/// Everything the web layer needs, wired once at startup. Handlers receive
/// this behind an `Arc`; there is no process-global state.
pub struct AppState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub mailer: Arc<dyn Mailer>,

    pub auth: Arc<dyn AuthService>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let store = Store::new(&config.general.database_path).await?;
        let mailer = build_mailer(&config.mail)?;
        Ok(Self::from_parts(config, store, mailer))
    }

    /// Assemble from pre-built parts. Tests use this to inject an in-memory
    /// store and a capturing mailer.
    #[must_use]
    pub fn from_parts(config: Config, store: Store, mailer: Arc<dyn Mailer>) -> Arc<Self> {
        let config = Arc::new(RwLock::new(config));
        let auth: Arc<dyn AuthService> = Arc::new(StoreAuthService::new(
            store.clone(),
            mailer.clone(),
            config.clone(),
        ));

        Arc::new(Self {
            config,
            store,
            mailer,
            auth,
        })
    }
}
