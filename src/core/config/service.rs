use std::env;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use super::defaults::Settings;
use super::validation::validate_settings;
use crate::core::errors::ConfigError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 8] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "master_key",
    "credential",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 2] = ["max_tokens", "tokens"];

pub struct ConfigService;

impl ConfigService {
    /// Loads settings from the YAML file (if present), applies environment
    /// overrides and validates the result.
    pub fn load(config_path: &Path) -> Result<Settings, ConfigError> {
        let mut settings = load_yaml_file(config_path)?;
        apply_env_overrides(&mut settings, |key| env::var(key).ok());
        validate_settings(&settings)?;
        Ok(settings)
    }

    pub fn redacted(settings: &Settings) -> Value {
        match serde_json::to_value(settings) {
            Ok(value) => redact_sensitive_values(&value),
            Err(_) => Value::Null,
        }
    }
}

fn load_yaml_file(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }

    serde_yaml::from_str::<Settings>(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

pub(crate) fn apply_env_overrides<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(addr) = get("BIND_ADDR") {
        settings.server.bind_addr = addr;
    }
    if let Some(port) = get("PORT").and_then(|v| v.trim().parse::<u16>().ok()) {
        settings.server.port = port;
    }

    if let Some(token) = get("TG_BOT_TOKEN") {
        settings.telegram.bot_token = Some(token);
    }
    if let Some(ids) = get("TARGET_CHAT_IDS") {
        settings.telegram.target_chat_ids = parse_id_list(&ids);
    }

    if let Some(host) = get("MEILI_HOST") {
        settings.search.host = host;
    }
    if let Some(key) = get("MEILI_MASTER_KEY") {
        settings.search.master_key = Some(key);
    }

    if let Some(key) = get("OPENAI_API_KEY") {
        settings.llm.api_key = Some(key);
    }
    if let Some(url) = get("OPENAI_BASE_URL") {
        settings.llm.base_url = url;
    }
    if let Some(model) = get("EMBEDDING_MODEL") {
        settings.llm.embedding_model = model;
    }
    if let Some(model) = get("CHAT_MODEL") {
        settings.llm.chat_model = model;
    }
}

/// Parses a comma-separated list of channel ids, skipping anything that is
/// not an integer.
pub fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse::<i64>().ok())
        .collect()
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}
