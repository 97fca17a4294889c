// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod diff;
pub mod error;
pub mod metrics;
pub mod reporter;
pub mod runtime;
pub mod session;
pub mod snippet;
pub mod store;
pub mod timer;
pub mod wire;

pub use error::{Error, Result};
