use serde::{Deserialize, Serialize};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8090;
pub const DEFAULT_MEILI_HOST: &str = "http://localhost:7700";
pub const DEFAULT_INDEX_UID: &str = "chunks";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "voyage/voyage-3.5-lite";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Output dimensionality of the embedding model. The search index embedder is
/// declared with the same size, so this is not configurable.
pub const EMBEDDING_DIMENSIONS: usize = 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub telegram: TelegramSettings,
    pub search: SearchSettings,
    pub llm: LlmSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_PORT,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub api_url: String,
    pub bot_token: Option<String>,
    /// Channel allow-list. Empty means every channel is accepted.
    pub target_chat_ids: Vec<i64>,
    pub poll_timeout_secs: u64,
    pub retry_delay_secs: u64,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
            bot_token: None,
            target_chat_ids: Vec::new(),
            poll_timeout_secs: 30,
            retry_delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub host: String,
    pub master_key: Option<String>,
    pub index_uid: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_MEILI_HOST.to_string(),
            master_key: None,
            index_uid: DEFAULT_INDEX_UID.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub chat_model: String,
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            api_key: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: EMBEDDING_DIMENSIONS,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            request_timeout_secs: 120,
        }
    }
}

pub fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}
