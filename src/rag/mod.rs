//! Retrieval-augmented chat.
//!
//! - `RagOrchestrator`: one-shot and streamed answers over the indexed corpus
//! - `context_builder`: numbered context blocks, citations, snippets, titles
//! - `prompt`: the fixed answering instructions

mod context_builder;
mod orchestrator;
mod prompt;

pub use context_builder::{build_context, derive_title, snippet, Source};
pub use orchestrator::{ChatAnswer, RagOrchestrator, StreamEvent, MAX_CONTEXT_DOCS};
pub use prompt::{user_prompt, SYSTEM_PROMPT};
