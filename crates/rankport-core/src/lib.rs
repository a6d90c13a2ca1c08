pub mod context;
pub mod engine;
pub mod notation;
pub mod spec;
pub mod tensor;

pub use context::*;
pub use engine::*;
pub use notation::{parse, ParseError, ParseResult, TensorParser};
pub use spec::*;
pub use tensor::*;
