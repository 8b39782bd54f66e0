use reasoner_types::errors::internal::BoxedError;
use reasoner_types::node::NodeId;
use reasoner_types::thiserror;
use reasoner_types::thiserror::Error;

use crate::port::{PortId, PortState};

#[derive(Error, Debug)]
pub enum ReasoningError {
    #[error("Answer table of {node} is complete; cannot touch index {index}")]
    TableComplete { node: NodeId, index: usize },
    #[error("Answer table of {node} accessed at index {index} past size {size}")]
    TableIndexOutOfBounds {
        node: NodeId,
        index: usize,
        size: usize,
    },
    #[error("Port {port} cannot pull in state {state}")]
    PortNotReady { port: PortId, state: PortState },
    #[error("Port {port} in state {state} received {message} with index {index}")]
    UnexpectedMessage {
        port: PortId,
        state: PortState,
        message: &'static str,
        index: usize,
    },
    #[error("No downstream port {0} is registered")]
    UnknownDownstreamPort(PortId),
    #[error("No upstream port {0} is registered")]
    UnknownUpstreamPort(PortId),
    #[error("Node {node} cannot handle {message} messages")]
    IllegalMessageVariant {
        node: NodeId,
        message: &'static str,
    },
    #[error("Cannot send to channel")]
    CannotSendToChannel,
    #[error("Cannot spawn worker thread: {0}")]
    CannotSpawnWorkerThread(#[from] std::io::Error),
    #[error("Traversal failed: {0}")]
    Traversal(#[source] BoxedError),
    #[error("Planner failed: {0}")]
    Planner(#[source] BoxedError),
    #[error("Materialisation failed: {0}")]
    Materialisation(#[source] BoxedError),
    #[error("Reasoner was terminated")]
    Terminated,
}

impl<T> From<crossbeam::channel::SendError<T>> for ReasoningError {
    fn from(_: crossbeam::channel::SendError<T>) -> Self {
        ReasoningError::CannotSendToChannel
    }
}
