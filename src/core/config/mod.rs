pub mod defaults;
pub mod paths;
pub mod service;
pub mod validation;

pub use defaults::{Settings, EMBEDDING_DIMENSIONS};
pub use paths::AppPaths;
pub use service::ConfigService;
