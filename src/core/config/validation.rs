use super::defaults::{Settings, EMBEDDING_DIMENSIONS};
use crate::core::errors::ConfigError;

pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    validate_required_string("server.bind_addr", &settings.server.bind_addr)?;

    validate_http_url("telegram.api_url", &settings.telegram.api_url)?;
    validate_u64_range(
        "telegram.poll_timeout_secs",
        settings.telegram.poll_timeout_secs,
        1,
        600,
    )?;
    validate_u64_range(
        "telegram.retry_delay_secs",
        settings.telegram.retry_delay_secs,
        1,
        3_600,
    )?;

    validate_http_url("search.host", &settings.search.host)?;
    validate_required_string("search.index_uid", &settings.search.index_uid)?;

    validate_http_url("llm.base_url", &settings.llm.base_url)?;
    validate_required_string("llm.embedding_model", &settings.llm.embedding_model)?;
    validate_required_string("llm.chat_model", &settings.llm.chat_model)?;
    validate_u64_range(
        "llm.request_timeout_secs",
        settings.llm.request_timeout_secs,
        1,
        3_600,
    )?;

    if settings.llm.embedding_dimensions != EMBEDDING_DIMENSIONS {
        return Err(invalid(
            "llm.embedding_dimensions",
            format!("must be {}", EMBEDDING_DIMENSIONS),
        ));
    }

    Ok(())
}

fn validate_required_string(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(invalid(field, "must be an http(s) URL"));
    }
    Ok(())
}

fn validate_u64_range(field: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(invalid(field, format!("must be between {} and {}", min, max)));
    }
    Ok(())
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_settings(&Settings::default()).is_ok());
    }

    #[test]
    fn rejects_non_http_search_host() {
        let mut settings = Settings::default();
        settings.search.host = "localhost:7700".to_string();

        let err = validate_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("search.host"));
    }

    #[test]
    fn rejects_other_embedding_dimensions() {
        let mut settings = Settings::default();
        settings.llm.embedding_dimensions = 1536;

        let err = validate_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("llm.embedding_dimensions"));
    }

    #[test]
    fn rejects_blank_model() {
        let mut settings = Settings::default();
        settings.llm.chat_model = "  ".to_string();
        assert!(validate_settings(&settings).is_err());
    }
}
