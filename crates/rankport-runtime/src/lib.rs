pub mod config;
pub mod model;
pub mod rank;
pub mod ranker;

pub use config::*;
pub use model::{ModelDescriptor, ModelError, ModelHandle, ModelUnit};
pub use rank::*;
pub use ranker::*;
