mod registry;
mod selectors;

pub use registry::{ProviderRegistry, ProviderSpec, ProviderTag};
pub use selectors::{ProviderSelection, ProviderSelector};
