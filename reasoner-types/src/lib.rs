pub mod errors;
pub mod node;
pub mod rule;
pub mod types;

// Re-export to avoid version conflicts in downstream crates.
pub use ahash;
pub use log;
pub use parking_lot;
pub use serde;
pub use thiserror;
pub use tracing;
