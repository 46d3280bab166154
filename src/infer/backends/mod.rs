pub mod native;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use native::{LinearClassifier, PooledExtractor};

#[cfg(feature = "backend-tract")]
pub use tract::{TractClassifier, TractExtractor};
