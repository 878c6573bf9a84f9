//! Vision request pipeline: resolve the image source, encode and tile it,
//! plan prompt stages from the question, and dispatch them to one backend
//! under a whole-pipeline retry.

pub mod backends;
pub mod encoder;
pub mod orchestrator;
pub mod retry;
pub mod source;

pub use backends::{backend_for, VisionBackend};
pub use encoder::{encode, EncodeOptions, ImageVariant, ImageVariantSet};
pub use orchestrator::{AnalysisRequest, VisionOrchestrator, DEFAULT_USER_PROMPT};
pub use retry::RetryPolicy;
pub use source::ImageReference;
