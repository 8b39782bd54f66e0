use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver, Sender};
use reasoner_types::log::debug;
use reasoner_types::node::NodeId;
use reasoner_types::rule::PlanId;
use reasoner_types::types::{Bounds, ConceptMap};

use crate::errors::ReasoningError;
use crate::message::Message;
use crate::node::{NodeDriver, NodeRequest};
use crate::port::{DownstreamPort, Port, PortId, PortState};
use crate::registry::NodeRegistry;

/// One item of the consumer queue.
#[derive(Clone, Debug)]
pub enum QueueItem {
    Answer(ConceptMap),
    /// Stream complete: no more answers exist.
    Done,
    /// Stream failed; the registry has been aborted.
    Failed(Arc<ReasoningError>),
}

/// Bridges an external consumer to the root node of a query: opens a
/// single port, pulls on demand, and forwards answers to the consumer
/// queue.
///
/// Repeated `produce` calls resume where the previous demand left off;
/// `recycle` releases the port so the next call replays the stream from
/// the first answer (served from the root's table).
#[derive(Debug)]
pub struct Producer {
    registry: Arc<NodeRegistry>,
    root: NodeDriver,
    node_id: NodeId,
    sender: Sender<NodeRequest>,
    mailbox: Receiver<NodeRequest>,
    port: Option<Port>,
    next_port_seq: u32,
    finished: bool,
}

impl Producer {
    pub fn new(
        registry: Arc<NodeRegistry>,
        plan: PlanId,
        bounds: Bounds,
    ) -> Result<Self, ReasoningError> {
        let root = registry.acquire(plan, bounds)?;
        let node_id = registry.reserve_node_id();
        let (sender, mailbox) = unbounded();
        registry.register_external(NodeDriver::new(node_id, sender.clone()));
        Ok(Self {
            registry,
            root,
            node_id,
            sender,
            mailbox,
            port: None,
            next_port_seq: 0,
            finished: false,
        })
    }

    /// Pulls up to `requested` answers and forwards them to `queue`,
    /// followed by [`QueueItem::Done`] when the stream completes or
    /// [`QueueItem::Failed`] when the reasoner aborts. Runs on the caller's
    /// thread; the queue must be consumed concurrently if its capacity is
    /// smaller than the demand.
    pub fn produce(
        &mut self,
        queue: &Sender<QueueItem>,
        requested: usize,
    ) -> Result<(), ReasoningError> {
        let mut remaining = requested;
        while remaining > 0 {
            if self.finished {
                queue.send(QueueItem::Done)?;
                return Ok(());
            }
            match self.pull_next() {
                Ok(Some(map)) => {
                    queue.send(QueueItem::Answer(map))?;
                    remaining -= 1;
                }
                Ok(None) => {
                    self.finished = true;
                    queue.send(QueueItem::Done)?;
                    return Ok(());
                }
                Err(error) => {
                    let failure = self
                        .registry
                        .failure()
                        .unwrap_or_else(|| Arc::new(error));
                    queue.send(QueueItem::Failed(failure))?;
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Releases the root port and resets the stream; the next `produce`
    /// replays from the first answer.
    pub fn recycle(&mut self) {
        if let Some(port) = self.port.take() {
            debug!("producer {} recycling port {}", self.node_id, port.id());
            let _ = self
                .root
                .execute(NodeRequest::DetachDownstream { port: port.id() });
        }
        self.finished = false;
    }

    fn connect(&mut self) -> Result<&mut Port, ReasoningError> {
        if self.port.is_none() {
            let id = PortId {
                node: self.node_id,
                seq: self.next_port_seq,
            };
            self.next_port_seq += 1;
            self.root.execute(NodeRequest::Connect(DownstreamPort::new(
                id,
                self.node_id,
                self.sender.clone(),
            )))?;
            self.port = Some(Port::new(id, self.root.clone()));
        }
        Ok(self.port.as_mut().expect("port was just connected"))
    }

    /// One full pull: request the next index, then wait for the port to
    /// resolve. Probes are recorded and skipped; a terminal ends the
    /// stream.
    fn pull_next(&mut self) -> Result<Option<ConceptMap>, ReasoningError> {
        {
            let port = self.connect()?;
            if port.state() == PortState::Done {
                return Ok(None);
            }
            port.read_next()?;
        }
        loop {
            let request = self
                .mailbox
                .recv()
                .map_err(|_| ReasoningError::Terminated)?;
            if matches!(request, NodeRequest::Terminate) {
                return Err(ReasoningError::Terminated);
            }
            let NodeRequest::Receive { port: id, message } = request else {
                continue;
            };
            let Some(port) = self.port.as_mut() else {
                continue;
            };
            if id != port.id() {
                // message for a recycled port
                continue;
            }
            port.record_receive(&message)?;
            match message {
                Message::Answer { map, .. } => return Ok(Some(map)),
                Message::Conclusion { .. } => {
                    return Err(ReasoningError::IllegalMessageVariant {
                        node: self.node_id,
                        message: "Conclusion",
                    })
                }
                Message::Done { .. } | Message::TerminateScc { .. } => return Ok(None),
                Message::HitInversion(_) => {
                    // saturation probes are meaningless to the consumer
                }
            }
        }
    }
}
