//! YAML configuration.

mod build;
mod loader;
mod types;

pub use types::*;
