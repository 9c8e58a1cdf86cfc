//! Ingestion side of the pipeline: platform events in, indexed chunks out.

pub mod dispatcher;
pub mod event;
pub mod telegram;
pub mod whitelist;

pub use dispatcher::{IngestionDispatcher, Outcome};
pub use event::{IncomingEvent, SourceMessage};
pub use telegram::TelegramPoller;
pub use whitelist::Whitelist;
