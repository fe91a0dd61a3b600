use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_hostname: String,
    pub api_key: Option<String>,
    pub model: String,
    pub instructions: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let api_hostname = env::var("CHATKIT_API_HOSTNAME")
            .unwrap_or_else(|_| "https://api.openai.com".to_string());
        let api_key = env::var("OPENAI_API_KEY").ok();
        let model = env::var("CHATKIT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let instructions = env::var("CHATKIT_INSTRUCTIONS").unwrap_or_default();

        Self {
            api_hostname,
            api_key,
            model,
            instructions,
        }
    }
}
