mod answer_table;
pub mod errors;
pub mod materialiser;
pub mod message;
mod node;
pub mod plan;
pub mod port;
pub mod producer;
pub mod registry;
pub mod storage;

#[cfg(test)]
mod tests;

pub use errors::ReasoningError;
pub use materialiser::Materialiser;
pub use plan::{CompiledPlan, Planner};
pub use producer::{Producer, QueueItem};
pub use registry::NodeRegistry;
pub use storage::{TraversalIterator, TraversalSource};
