mod linkedin;
mod registry;
mod traits;

pub use linkedin::{LinkedInConfig, LinkedInProvider};
pub use registry::ProviderRegistry;
pub use traits::{ProviderAdapter, TokenSet, UploadTicket};

use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::error::AppError;

/// Register all providers that have credentials configured.
pub fn register_defaults(registry: &mut ProviderRegistry, config: &Config) -> Result<(), AppError> {
    // LinkedIn
    if let (Some(id), Some(secret)) = (&config.linkedin_client_id, &config.linkedin_client_secret) {
        let provider = LinkedInProvider::new(LinkedInConfig {
            client_id: id.clone(),
            client_secret: secret.clone(),
            api_version: config.linkedin_api_version.clone(),
            oauth_base_url: config.linkedin_oauth_base_url.clone(),
            api_base_url: config.linkedin_api_base_url.clone(),
            http_timeout: config.http_timeout,
        })?;
        registry.register(Arc::new(provider));
    } else {
        warn!("LINKEDIN_CLIENT_ID/LINKEDIN_CLIENT_SECRET not set; LinkedIn publishing disabled");
    }

    Ok(())
}
