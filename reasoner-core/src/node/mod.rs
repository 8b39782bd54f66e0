use std::borrow::Cow;
use std::sync::{Arc, Weak};

use crossbeam::channel::{Receiver, Sender};
use reasoner_types::ahash::AHashMap;
use reasoner_types::log::{debug, trace};
use reasoner_types::node::NodeId;
use reasoner_types::types::{ConceptMap, ConclusionMap};

use crate::answer_table::AnswerTable;
use crate::errors::ReasoningError;
use crate::message::{InversionStatus, Message};
use crate::port::{DownstreamPort, Port, PortId, PortState};
use crate::registry::NodeRegistry;

pub(crate) mod concludable;
pub(crate) mod conclusion;
pub(crate) mod retrievable;

/// A request on a node's mailbox. Requests from one sender are processed in
/// FIFO order; a handler runs to completion before the next request.
#[derive(Debug)]
pub(crate) enum NodeRequest {
    /// A new downstream port registers itself with this node.
    Connect(DownstreamPort),
    /// A downstream port pulls the record at `index`.
    ReadAnswerAt { port: PortId, index: usize },
    /// A message from the remote of the upstream port `port`.
    Receive { port: PortId, message: Message },
    /// Reply from the materialiser for a condition answer received on
    /// `port`.
    Materialised {
        port: PortId,
        conclusion: Option<ConclusionMap>,
    },
    /// A downstream port will never pull again; drop its handles.
    DetachDownstream { port: PortId },
    /// Registry abort; the node drops all further work.
    Terminate,
}

/// Handle that schedules requests onto a node's single-threaded mailbox.
#[derive(Clone, Debug)]
pub(crate) struct NodeDriver {
    node_id: NodeId,
    sender: Sender<NodeRequest>,
}

impl NodeDriver {
    pub fn new(node_id: NodeId, sender: Sender<NodeRequest>) -> Self {
        Self { node_id, sender }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn execute(&self, request: NodeRequest) -> Result<(), ReasoningError> {
        self.sender.send(request)?;
        Ok(())
    }
}

pub(crate) trait Name {
    fn name(&self) -> Cow<'_, str>;
}

/// Behaviour hooks of a resolvable node. The surrounding [`ActorNode`]
/// drives the shared pull protocol and termination detection; a resolver
/// only decides how answers are produced.
pub(crate) trait Resolver: Name {
    /// A subscriber is waiting at the end of the table; produce more
    /// answers (pull Ready upstream ports, or draw from traversal).
    fn on_pull(&mut self, base: &mut NodeBase) -> Result<(), ReasoningError>;

    /// An answer arrived on the upstream port `port`.
    fn on_answer(
        &mut self,
        base: &mut NodeBase,
        port: PortId,
        map: ConceptMap,
    ) -> Result<(), ReasoningError>;

    /// A rule conclusion arrived on the upstream port `port`.
    fn on_conclusion(
        &mut self,
        base: &mut NodeBase,
        port: PortId,
        map: ConclusionMap,
    ) -> Result<(), ReasoningError> {
        let _ = (port, map);
        Err(ReasoningError::IllegalMessageVariant {
            node: base.node_id(),
            message: "Conclusion",
        })
    }

    /// The materialiser replied for a condition answer received on `port`.
    fn on_materialised(
        &mut self,
        base: &mut NodeBase,
        port: PortId,
        conclusion: Option<ConclusionMap>,
    ) -> Result<(), ReasoningError> {
        let _ = (port, conclusion);
        Err(ReasoningError::IllegalMessageVariant {
            node: base.node_id(),
            message: "Materialised",
        })
    }

    /// False while the resolver has work in flight that may still yield an
    /// answer. Inversion probes are not forwarded past a non-quiescent
    /// node; the deferred check runs once it is quiescent again.
    fn quiescent(&self) -> bool {
        true
    }
}

/// State shared by all node kinds: the answer table, the upstream port
/// sets, the downstream handles, and the forwarded-inversion cell of the
/// termination protocol. All of it is owned by the node's thread.
pub(crate) struct NodeBase {
    node_id: NodeId,
    table: AnswerTable,
    active: AHashMap<PortId, Port>,
    done: AHashMap<PortId, Port>,
    downstream: AHashMap<PortId, DownstreamPort>,
    forwarded_inversion: Option<InversionStatus>,
    next_port_seq: u32,
    self_sender: Sender<NodeRequest>,
    registry: Weak<NodeRegistry>,
}

impl NodeBase {
    pub fn new(
        node_id: NodeId,
        self_sender: Sender<NodeRequest>,
        registry: Weak<NodeRegistry>,
    ) -> Self {
        Self {
            node_id,
            table: AnswerTable::new(node_id),
            active: AHashMap::new(),
            done: AHashMap::new(),
            downstream: AHashMap::new(),
            forwarded_inversion: None,
            next_port_seq: 0,
            self_sender,
            registry,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn table(&self) -> &AnswerTable {
        &self.table
    }

    pub fn registry(&self) -> Result<Arc<NodeRegistry>, ReasoningError> {
        self.registry.upgrade().ok_or(ReasoningError::Terminated)
    }

    pub fn self_sender(&self) -> &Sender<NodeRequest> {
        &self.self_sender
    }

    /// Opens a new upstream port to `remote` and registers the mirror
    /// handle with it.
    pub fn open_port(&mut self, remote: NodeDriver) -> Result<PortId, ReasoningError> {
        let id = PortId {
            node: self.node_id,
            seq: self.next_port_seq,
        };
        self.next_port_seq += 1;
        remote.execute(NodeRequest::Connect(DownstreamPort::new(
            id,
            self.node_id,
            self.self_sender.clone(),
        )))?;
        trace!("{} opened port {} to {}", self.node_id, id, remote.node_id());
        self.active.insert(id, Port::new(id, remote));
        Ok(id)
    }

    pub fn port_mut(&mut self, id: PortId) -> Result<&mut Port, ReasoningError> {
        self.active
            .get_mut(&id)
            .ok_or(ReasoningError::UnknownUpstreamPort(id))
    }

    pub fn has_active_port(&self, id: PortId) -> bool {
        self.active.contains_key(&id)
    }

    /// Pulls every upstream port that is not already waiting on a request.
    pub fn pull_ready_ports(&mut self) -> Result<(), ReasoningError> {
        for port in self.active.values_mut() {
            if port.state() == PortState::Ready {
                port.read_next()?;
            }
        }
        Ok(())
    }

    /// Appends an answer and serves every subscriber waiting for it.
    pub fn record_and_send_answer(&mut self, map: ConceptMap) -> Result<(), ReasoningError> {
        let subscribers = self.table.drain_subscribers(self.table.len())?;
        let record = self.table.record_answer(map)?;
        for subscriber in subscribers {
            subscriber.send(record.clone())?;
        }
        Ok(())
    }

    /// Appends a conclusion and serves every subscriber waiting for it.
    pub fn record_and_send_conclusion(
        &mut self,
        map: ConclusionMap,
    ) -> Result<(), ReasoningError> {
        let subscribers = self.table.drain_subscribers(self.table.len())?;
        let record = self.table.record_conclusion(map)?;
        for subscriber in subscribers {
            subscriber.send(record.clone())?;
        }
        Ok(())
    }

    /// Completes the table with `Done` and serves waiting subscribers.
    /// Idle downstream ports learn of the completion on their next pull.
    pub fn record_and_send_done(&mut self) -> Result<(), ReasoningError> {
        if self.table.is_complete() {
            return Ok(());
        }
        let subscribers = self.table.drain_subscribers(self.table.len())?;
        let record = self.table.record_done()?;
        debug!("{} done at {}", self.node_id, self.table.len() - 1);
        for subscriber in subscribers {
            subscriber.send(record.clone())?;
        }
        Ok(())
    }

    /// The best inversion witnessed across all active upstream ports, with
    /// `through_all_paths` reduced over the whole port set. `None` when no
    /// port has seen a probe.
    fn aggregate_inversion(&self) -> Option<InversionStatus> {
        let mut best: Option<&InversionStatus> = None;
        for port in self.active.values() {
            if let Some(status) = port.received_inversion() {
                best = match best {
                    Some(current) if !status.outranks(current) => Some(current),
                    _ => Some(status),
                };
            }
        }
        let best = best?;
        let through_all_paths = best.through_all_paths
            && self
                .active
                .values()
                .all(|port| port.received_inversion() == Some(best));
        Some(InversionStatus {
            origin: best.origin,
            answer_index: best.answer_index,
            through_all_paths,
        })
    }

    /// Re-evaluates the aggregated inversion status and forwards it, or
    /// commits termination when this node's own probe has returned as a
    /// saturation witness.
    pub fn check_inversion_status_change(&mut self) -> Result<(), ReasoningError> {
        let Some(aggregate) = self.aggregate_inversion() else {
            return Ok(());
        };
        if self.forwarded_inversion.as_ref() == Some(&aggregate) {
            return Ok(());
        }
        trace!(
            "{} inversion {:?} -> {:?}",
            self.node_id,
            self.forwarded_inversion,
            aggregate
        );
        self.forwarded_inversion = Some(aggregate.clone());
        if aggregate.origin == self.node_id {
            if aggregate.through_all_paths && aggregate.answer_index == Some(self.table.len()) {
                // the probe circled back through every path with no new
                // answers produced: the SCC has saturated
                self.commit_terminate_scc(aggregate)
            } else {
                self.broadcast_downstream(Message::HitInversion(InversionStatus {
                    origin: self.node_id,
                    answer_index: Some(self.table.len()),
                    through_all_paths: true,
                }))
            }
        } else {
            self.broadcast_downstream(Message::HitInversion(aggregate))
        }
    }

    /// Completes the table with `TerminateScc`, notifies every downstream
    /// port, and detaches from the remaining suppliers so the cycle cannot
    /// keep itself warm.
    pub fn commit_terminate_scc(
        &mut self,
        expected: InversionStatus,
    ) -> Result<(), ReasoningError> {
        debug!(
            "{} terminating SCC anchored at {} with {} answers",
            self.node_id,
            expected.origin,
            self.table.len()
        );
        // the broadcast below reaches every downstream port, subscribers
        // included
        self.table.clear_subscribers();
        let record = self.table.record_terminate_scc(expected)?;
        self.broadcast_downstream(record)?;
        let retiring = self.active.drain().collect::<Vec<_>>();
        for (id, mut port) in retiring {
            // the remote may already have quit while the decision was in
            // flight
            let _ = port
                .remote()
                .execute(NodeRequest::DetachDownstream { port: id });
            port.retire();
            self.done.insert(id, port);
        }
        Ok(())
    }

    fn broadcast_downstream(&self, message: Message) -> Result<(), ReasoningError> {
        for handle in self.downstream.values() {
            handle.send(message.clone())?;
        }
        Ok(())
    }
}

/// A reasoner node: a single-threaded actor draining its mailbox in order.
/// All cross-node communication goes through [`NodeDriver`]s.
pub(crate) struct ActorNode<R: Resolver> {
    base: NodeBase,
    resolver: R,
    mailbox: Receiver<NodeRequest>,
}

impl<R: Resolver> ActorNode<R> {
    pub fn new(base: NodeBase, resolver: R, mailbox: Receiver<NodeRequest>) -> Self {
        Self {
            base,
            resolver,
            mailbox,
        }
    }

    /// Runs the node until its registry terminates, every driver is
    /// dropped, or a handler fails. Failures abort the whole registry.
    pub fn run(mut self) {
        debug!(
            "[{}] started as {}",
            self.resolver.name(),
            self.base.node_id()
        );
        while let Ok(request) = self.mailbox.recv() {
            if matches!(request, NodeRequest::Terminate) {
                break;
            }
            if let Err(error) = self.handle(request) {
                if let Ok(registry) = self.base.registry() {
                    registry.terminate(error);
                }
                break;
            }
        }
        debug!("[{}] quit", self.resolver.name());
    }

    fn handle(&mut self, request: NodeRequest) -> Result<(), ReasoningError> {
        match request {
            NodeRequest::Connect(handle) => {
                trace!(
                    "{} connected downstream port {}",
                    self.base.node_id(),
                    handle.id()
                );
                self.base.downstream.insert(handle.id(), handle);
                Ok(())
            }
            NodeRequest::ReadAnswerAt { port, index } => self.read_answer_at(port, index),
            NodeRequest::Receive { port, message } => self.receive(port, message),
            NodeRequest::Materialised { port, conclusion } => {
                self.resolver
                    .on_materialised(&mut self.base, port, conclusion)?;
                // a Done that arrived while the materialisation was in
                // flight could not complete the table; settle it now
                if self.resolver.quiescent() && self.base.active.is_empty() {
                    self.base.record_and_send_done()?;
                }
                self.check_inversion()
            }
            NodeRequest::DetachDownstream { port } => {
                self.base.downstream.remove(&port);
                self.base.table.remove_subscriber(port);
                Ok(())
            }
            NodeRequest::Terminate => Ok(()),
        }
    }

    /// Serves a downstream pull: answer from the table when possible,
    /// otherwise subscribe the port and set local work in motion. A pull
    /// from a node that is not older than us is a potential back-edge of a
    /// cycle, announced with an early inversion probe.
    fn read_answer_at(&mut self, port: PortId, index: usize) -> Result<(), ReasoningError> {
        let handle = self
            .base
            .downstream
            .get(&port)
            .cloned()
            .ok_or(ReasoningError::UnknownDownstreamPort(port))?;
        match self.base.table.at(index)?.cloned() {
            Some(record) => handle.send(record),
            None => {
                if handle.owner() >= self.base.node_id() {
                    handle.send(Message::HitInversion(InversionStatus {
                        origin: self.base.node_id(),
                        answer_index: None,
                        through_all_paths: true,
                    }))?;
                }
                self.base.table.subscribe(handle, index)?;
                self.resolver.on_pull(&mut self.base)
            }
        }
    }

    fn receive(&mut self, port: PortId, message: Message) -> Result<(), ReasoningError> {
        let Some(active) = self.base.active.get_mut(&port) else {
            // late probes and terminal broadcasts race pulls; tolerate them
            // on retired ports
            if self.base.done.contains_key(&port) {
                trace!(
                    "{} ignoring {} on retired port {}",
                    self.base.node_id(),
                    message.kind(),
                    port
                );
                return Ok(());
            }
            return Err(ReasoningError::UnknownUpstreamPort(port));
        };
        active.record_receive(&message)?;
        if active.state() == PortState::Done {
            debug!(
                "{} received {} on port {}",
                self.base.node_id(),
                message.kind(),
                port
            );
            if let Some(retired) = self.base.active.remove(&port) {
                self.base.done.insert(port, retired);
            }
        }
        match message {
            Message::Answer { map, .. } => {
                self.resolver.on_answer(&mut self.base, port, map)?;
                self.check_inversion()
            }
            Message::Conclusion { map, .. } => {
                self.resolver.on_conclusion(&mut self.base, port, map)?;
                self.check_inversion()
            }
            Message::HitInversion(_) => self.check_inversion(),
            Message::Done { .. } => {
                if self.base.active.is_empty() && self.resolver.quiescent() {
                    self.base.record_and_send_done()
                } else {
                    self.check_inversion()
                }
            }
            Message::TerminateScc { expected, .. } => self.handle_terminate_scc(expected),
        }
    }

    /// Commits a termination decision that matches this node's forwarded
    /// inversion; otherwise the decision is foreign and the port is merely
    /// done (the cycle must rediscover itself).
    fn handle_terminate_scc(&mut self, expected: InversionStatus) -> Result<(), ReasoningError> {
        if self.base.table.is_complete() {
            return Ok(());
        }
        if self.base.forwarded_inversion.as_ref() == Some(&expected) {
            self.base.commit_terminate_scc(expected)
        } else if self.base.active.is_empty() && self.resolver.quiescent() {
            self.base.record_and_send_done()
        } else {
            self.check_inversion()
        }
    }

    fn check_inversion(&mut self) -> Result<(), ReasoningError> {
        if !self.resolver.quiescent() {
            return Ok(());
        }
        self.base.check_inversion_status_change()
    }
}

#[cfg(test)]
mod tests {
    use crossbeam::channel::unbounded;

    use super::*;

    fn base() -> NodeBase {
        let (sender, _receiver) = unbounded();
        NodeBase::new(NodeId(5), sender, Weak::new())
    }

    /// Installs an active port carrying `status` as its last received
    /// inversion.
    fn port_with_inversion(base: &mut NodeBase, seq: u32, status: Option<InversionStatus>) {
        let (sender, _receiver) = unbounded();
        let id = PortId {
            node: base.node_id(),
            seq,
        };
        let mut port = Port::new(id, NodeDriver::new(NodeId(100 + seq as u64), sender));
        if let Some(status) = status {
            port.record_receive(&Message::HitInversion(status)).unwrap();
        }
        base.active.insert(id, port);
    }

    fn status(origin: u64, answer_index: Option<usize>, through_all_paths: bool) -> InversionStatus {
        InversionStatus {
            origin: NodeId(origin),
            answer_index,
            through_all_paths,
        }
    }

    #[test]
    fn no_aggregate_without_probes() {
        let mut base = base();
        port_with_inversion(&mut base, 0, None);
        port_with_inversion(&mut base, 1, None);
        assert_eq!(base.aggregate_inversion(), None);
    }

    #[test]
    fn oldest_origin_wins() {
        let mut base = base();
        port_with_inversion(&mut base, 0, Some(status(3, Some(7), true)));
        port_with_inversion(&mut base, 1, Some(status(1, Some(0), false)));
        let aggregate = base.aggregate_inversion().unwrap();
        assert_eq!(aggregate.origin, NodeId(1));
        assert_eq!(aggregate.answer_index, Some(0));
        // ports disagree, so the probe has not been seen through all paths
        assert!(!aggregate.through_all_paths);
    }

    #[test]
    fn larger_index_wins_for_same_origin() {
        let mut base = base();
        port_with_inversion(&mut base, 0, Some(status(1, Some(2), true)));
        port_with_inversion(&mut base, 1, Some(status(1, Some(5), true)));
        let aggregate = base.aggregate_inversion().unwrap();
        assert_eq!(aggregate.answer_index, Some(5));
        assert!(!aggregate.through_all_paths);
    }

    #[test]
    fn through_all_paths_requires_agreement_everywhere() {
        let mut base = base();
        port_with_inversion(&mut base, 0, Some(status(1, Some(4), true)));
        port_with_inversion(&mut base, 1, Some(status(1, Some(4), true)));
        let aggregate = base.aggregate_inversion().unwrap();
        assert_eq!(aggregate, status(1, Some(4), true));

        port_with_inversion(&mut base, 2, None);
        let aggregate = base.aggregate_inversion().unwrap();
        // a silent port breaks the all-paths conjunction
        assert!(!aggregate.through_all_paths);
    }

    #[test]
    fn early_probe_never_reaches_all_paths() {
        let mut base = base();
        port_with_inversion(&mut base, 0, Some(status(1, None, true)));
        let aggregate = base.aggregate_inversion().unwrap();
        assert_eq!(aggregate.answer_index, None);
        // an early probe aggregates, but its index can never equal the
        // table size, so it is not a saturation witness
        assert!(aggregate.through_all_paths);
    }

    #[test]
    fn flag_mismatch_degrades_aggregate() {
        let mut base = base();
        port_with_inversion(&mut base, 0, Some(status(1, Some(4), true)));
        port_with_inversion(&mut base, 1, Some(status(1, Some(4), false)));
        let aggregate = base.aggregate_inversion().unwrap();
        assert_eq!(aggregate.origin, NodeId(1));
        assert_eq!(aggregate.answer_index, Some(4));
        assert!(!aggregate.through_all_paths);
    }
}
