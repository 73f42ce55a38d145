pub mod config;
pub mod error;
pub mod file_config;
pub mod types;

pub use config::AppConfig;
pub use error::AdScreenError;
pub use file_config::{FileConfig, StorageBackend};
pub use types::*;
