pub mod config;
pub mod error;
pub mod events;
pub mod prompts;
pub mod providers;

pub use config::{BackendConfig, VisionConfig};
pub use error::VisionError;
