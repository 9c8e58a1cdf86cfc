use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to initialize record store: {0}")]
    Store(#[source] anyhow::Error),

    #[error("Failed to initialize LLM provider: {0}")]
    Llm(#[source] anyhow::Error),

    #[error("Failed to initialize search client: {0}")]
    Search(#[source] anyhow::Error),

    #[error("Failed to initialize Telegram poller: {0}")]
    Telegram(#[source] anyhow::Error),
}
