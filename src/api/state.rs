use crate::core::AppConfig;
use crate::openai::{OpenAiProvider, SharedProvider};

/// Read-only state shared by every request. The relay keeps nothing
/// between requests so there is nothing to lock.
pub struct AppState {
    pub config: AppConfig,
    pub provider: SharedProvider,
}

impl AppState {
    pub fn new(config: AppConfig, provider: SharedProvider) -> Self {
        Self { config, provider }
    }

    pub fn from_config(config: AppConfig) -> Self {
        let provider = std::sync::Arc::new(OpenAiProvider::from_config(&config));
        Self::new(config, provider)
    }
}
