pub mod completion;
pub mod embedding;
pub mod openai;
pub mod provider;
pub mod types;

pub use completion::CompletionClient;
pub use embedding::EmbeddingClient;
pub use openai::OpenAiProvider;
pub use provider::{LlmProvider, TokenStream};
pub use types::{ChatMessage, ChatRequest};
