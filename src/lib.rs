pub mod config;
pub mod engine;
pub mod error;
pub mod runtime;
pub mod stack;
pub mod util;

pub use config::CoordinatorConfig;
pub use engine::Engine;
pub use error::{CoordinatorError, Result};
pub use runtime::Runtime;
