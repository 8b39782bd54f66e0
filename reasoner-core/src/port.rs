use std::fmt::{Display, Formatter};

use crossbeam::channel::Sender;
use reasoner_types::log::trace;
use reasoner_types::node::NodeId;

use crate::errors::ReasoningError;
use crate::message::{InversionStatus, Message};
use crate::node::{NodeDriver, NodeRequest};

/// Identifier of a pull port: the owning node's id plus a per-owner
/// sequence number. There may be multiple ports between the same pair of
/// nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PortId {
    pub node: NodeId,
    pub seq: u32,
}

impl Display for PortId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.p{}", self.node, self.seq)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortState {
    Ready,
    Pulling,
    Done,
}

impl Display for PortState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PortState::Ready => f.write_str("READY"),
            PortState::Pulling => f.write_str("PULLING"),
            PortState::Done => f.write_str("DONE"),
        }
    }
}

/// Owner side of a pull channel to one remote node.
///
/// State is driven only by `read_next` calls from the owner and by messages
/// received from the remote; `Done` is terminal.
#[derive(Debug)]
pub(crate) struct Port {
    id: PortId,
    remote: NodeDriver,
    state: PortState,
    last_requested: Option<usize>,
    received_inversion: Option<InversionStatus>,
}

impl Port {
    pub fn new(id: PortId, remote: NodeDriver) -> Self {
        Self {
            id,
            remote,
            state: PortState::Ready,
            last_requested: None,
            received_inversion: None,
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn remote(&self) -> &NodeDriver {
        &self.remote
    }

    pub fn state(&self) -> PortState {
        self.state
    }

    pub fn received_inversion(&self) -> Option<&InversionStatus> {
        self.received_inversion.as_ref()
    }

    /// Requests the next not-yet-requested index from the remote.
    pub fn read_next(&mut self) -> Result<(), ReasoningError> {
        if self.state != PortState::Ready {
            return Err(ReasoningError::PortNotReady {
                port: self.id,
                state: self.state,
            });
        }
        let index = self.last_requested.map_or(0, |last| last + 1);
        self.last_requested = Some(index);
        self.state = PortState::Pulling;
        trace!("port {} pulling index {}", self.id, index);
        self.remote.execute(NodeRequest::ReadAnswerAt {
            port: self.id,
            index,
        })
    }

    /// Records a message from the remote, before the owning node's handler
    /// sees it. Enforces the port state machine.
    pub fn record_receive(&mut self, message: &Message) -> Result<(), ReasoningError> {
        match message {
            Message::Answer { index, .. } | Message::Conclusion { index, .. } => {
                if self.state != PortState::Pulling || self.last_requested != Some(*index) {
                    return Err(ReasoningError::UnexpectedMessage {
                        port: self.id,
                        state: self.state,
                        message: message.kind(),
                        index: *index,
                    });
                }
                self.state = PortState::Ready;
            }
            Message::HitInversion(status) => {
                // probes may arrive at any time, in any port state
                self.received_inversion = Some(status.clone());
            }
            Message::Done { .. } | Message::TerminateScc { .. } => {
                self.state = PortState::Done;
            }
        }
        Ok(())
    }

    /// Forces the port into its terminal state without a remote message;
    /// used when the owner commits SCC termination.
    pub fn retire(&mut self) {
        self.state = PortState::Done;
    }
}

/// Remote-side handle of a port: lets the pulled node serve answers and
/// broadcast protocol messages to the owner's mailbox.
#[derive(Clone, Debug)]
pub(crate) struct DownstreamPort {
    id: PortId,
    owner: NodeId,
    sender: Sender<NodeRequest>,
}

impl DownstreamPort {
    pub fn new(id: PortId, owner: NodeId, sender: Sender<NodeRequest>) -> Self {
        Self { id, owner, sender }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn send(&self, message: Message) -> Result<(), ReasoningError> {
        self.sender.send(NodeRequest::Receive {
            port: self.id,
            message,
        })?;
        Ok(())
    }
}
