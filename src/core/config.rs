use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub openai_model: String,
    pub openai_api_hostname: String,
    // Checked on every request rather than at startup so a missing
    // key fails requests instead of the server
    pub openai_api_key: Option<String>,
    pub system_message: String,
    pub upstream_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        let openai_api_hostname = env::var("PROMPTRELAY_LLM_HOST")
            .unwrap_or_else(|_| "https://api.openai.com".to_string());
        let openai_api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        let openai_model =
            env::var("PROMPTRELAY_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let system_message = env::var("PROMPTRELAY_SYSTEM_MESSAGE").unwrap_or_else(|_| {
            "You are a chat completion AI that provides detailed and comprehensive long-form content in response to user questions.".to_string()
        });
        let upstream_timeout = env::var("PROMPTRELAY_UPSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|secs| secs.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60 * 5));

        Self {
            openai_model,
            openai_api_hostname,
            openai_api_key,
            system_message,
            upstream_timeout,
        }
    }
}
