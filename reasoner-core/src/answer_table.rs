use reasoner_types::ahash::AHashMap;
use reasoner_types::node::NodeId;
use reasoner_types::types::{ConceptMap, ConclusionMap};

use crate::errors::ReasoningError;
use crate::message::{InversionStatus, Message};
use crate::port::{DownstreamPort, PortId};

/// A node's monotone, append-only answer log.
///
/// Memoises the node's output for all future readers and coordinates the
/// subscribers waiting for the next not-yet-recorded index. Indexes are
/// dense from 0; at most one terminal record exists and it is always last.
#[derive(Debug)]
pub(crate) struct AnswerTable {
    node: NodeId,
    records: Vec<Message>,
    complete: bool,
    subscribers: AHashMap<PortId, DownstreamPort>,
}

impl AnswerTable {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            records: Vec::new(),
            complete: false,
            subscribers: AHashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// The record at `index`, or `None` when `index` is the next index of a
    /// still-incomplete table. Reading further than that is a protocol
    /// violation.
    pub fn at(&self, index: usize) -> Result<Option<&Message>, ReasoningError> {
        if index < self.records.len() {
            Ok(Some(&self.records[index]))
        } else if index == self.records.len() && !self.complete {
            Ok(None)
        } else {
            Err(self.out_of_bounds(index))
        }
    }

    /// Registers `port` as waiting for the record at `index`. Idempotent
    /// per port.
    pub fn subscribe(&mut self, port: DownstreamPort, index: usize) -> Result<(), ReasoningError> {
        self.expect_open(index)?;
        self.subscribers.entry(port.id()).or_insert(port);
        Ok(())
    }

    /// Returns and clears the subscriber set; called immediately before the
    /// append that satisfies the subscribers at `index`.
    pub fn drain_subscribers(
        &mut self,
        index: usize,
    ) -> Result<Vec<DownstreamPort>, ReasoningError> {
        self.expect_open(index)?;
        Ok(self.subscribers.drain().map(|(_, port)| port).collect())
    }

    /// Drops a waiting subscriber, if present. Used when a downstream port
    /// detaches mid-pull.
    pub fn remove_subscriber(&mut self, port: PortId) {
        self.subscribers.remove(&port);
    }

    /// Clears subscribers that are about to be satisfied by a broadcast
    /// instead of a targeted send.
    pub fn clear_subscribers(&mut self) {
        self.subscribers.clear();
    }

    pub fn record_answer(&mut self, map: ConceptMap) -> Result<Message, ReasoningError> {
        self.append(|index| Message::Answer { index, map })
    }

    pub fn record_conclusion(&mut self, map: ConclusionMap) -> Result<Message, ReasoningError> {
        self.append(|index| Message::Conclusion { index, map })
    }

    pub fn record_done(&mut self) -> Result<Message, ReasoningError> {
        let record = self.append(|index| Message::Done { index })?;
        self.complete = true;
        Ok(record)
    }

    pub fn record_terminate_scc(
        &mut self,
        expected: InversionStatus,
    ) -> Result<Message, ReasoningError> {
        let record = self.append(|index| Message::TerminateScc { expected, index })?;
        self.complete = true;
        Ok(record)
    }

    fn append(
        &mut self,
        record: impl FnOnce(usize) -> Message,
    ) -> Result<Message, ReasoningError> {
        if self.complete {
            return Err(ReasoningError::TableComplete {
                node: self.node,
                index: self.records.len(),
            });
        }
        let record = record(self.records.len());
        self.records.push(record.clone());
        Ok(record)
    }

    fn expect_open(&self, index: usize) -> Result<(), ReasoningError> {
        if self.complete {
            Err(ReasoningError::TableComplete {
                node: self.node,
                index,
            })
        } else if index != self.records.len() {
            Err(self.out_of_bounds(index))
        } else {
            Ok(())
        }
    }

    fn out_of_bounds(&self, index: usize) -> ReasoningError {
        ReasoningError::TableIndexOutOfBounds {
            node: self.node,
            index,
            size: self.records.len(),
        }
    }
}
