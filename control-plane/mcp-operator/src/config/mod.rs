pub mod types;

pub use types::{ConfigError, OperatorConfig};
