pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod providers;
pub mod publish;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::AppError;

use std::sync::Arc;

use providers::ProviderRegistry;
use publish::{MediaUploader, PostPublisher, TokenRefresher};
use scheduler::{Scheduler, SchedulerConfig};
use store::Stores;

/// Provider the publishing workflow targets.
pub const PUBLISH_PROVIDER: &str = "linkedin";

/// Shared application state passed to all API handlers and workers.
pub struct AppState {
    pub config: Config,
    pub stores: Stores,
    pub registry: Arc<ProviderRegistry>,
    pub refresher: Arc<TokenRefresher>,
    pub publisher: Arc<PostPublisher>,
    pub scheduler: Arc<Scheduler>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire the publishing components on top of the given stores.
    pub fn build(config: Config, stores: Stores, registry: Arc<ProviderRegistry>) -> Self {
        let refresher = Arc::new(TokenRefresher::new(stores.tokens.clone(), registry.clone()));
        let uploader = Arc::new(MediaUploader::new(refresher.clone(), registry.clone()));
        let publisher = Arc::new(PostPublisher::new(
            refresher.clone(),
            uploader,
            registry.clone(),
            PUBLISH_PROVIDER,
        ));
        let scheduler = Arc::new(Scheduler::new(
            stores.accounts.clone(),
            stores.posts.clone(),
            publisher.clone(),
            SchedulerConfig {
                batch_size: config.scheduler_batch_size,
                max_concurrent: config.max_concurrent_publishes,
                publish_timeout: config.publish_timeout,
            },
        ));

        Self {
            config,
            stores,
            registry,
            refresher,
            publisher,
            scheduler,
        }
    }
}
