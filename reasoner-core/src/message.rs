use std::cmp::Ordering;

use reasoner_types::node::NodeId;
use reasoner_types::types::{ConceptMap, ConclusionMap};

/// A candidate saturation witness, propagated through downstream ports by
/// `HitInversion` probes and referenced by `TerminateScc` decisions.
///
/// `answer_index` is the size of the originator's answer table when the
/// probe was emitted; `None` marks an early probe that must never be
/// accepted as a saturation witness.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InversionStatus {
    pub origin: NodeId,
    pub answer_index: Option<usize>,
    pub through_all_paths: bool,
}

impl InversionStatus {
    /// The total order used to aggregate probes across a node's upstream
    /// ports: an older origin wins; for the same origin a larger witnessed
    /// index wins (`None` sorts below any index); for the same index a
    /// probe seen through all paths wins.
    pub fn outranks(&self, other: &InversionStatus) -> bool {
        match self.origin.cmp(&other.origin) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => match self.answer_index.cmp(&other.answer_index) {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => self.through_all_paths && !other.through_all_paths,
            },
        }
    }
}

/// A record exchanged on ports. Variants are dispatched by tag in the
/// receiving node's mailbox loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// One answer of the sending node, at position `index` of its table.
    Answer { index: usize, map: ConceptMap },
    /// One rule-conclusion binding, at position `index` of the sender's
    /// table.
    Conclusion { index: usize, map: ConclusionMap },
    /// The sender will produce no more answers; `index` equals the table
    /// size at the moment of completion.
    Done { index: usize },
    /// Inversion probe; carries no index-order guarantee against answers.
    HitInversion(InversionStatus),
    /// Committed termination decision for the SCC anchored at
    /// `expected.origin`.
    TerminateScc {
        expected: InversionStatus,
        index: usize,
    },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Answer { .. } => "Answer",
            Message::Conclusion { .. } => "Conclusion",
            Message::Done { .. } => "Done",
            Message::HitInversion(_) => "HitInversion",
            Message::TerminateScc { .. } => "TerminateScc",
        }
    }

    /// True for `Done` and `TerminateScc`, the records that complete a
    /// table and retire a port.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Message::Done { .. } | Message::TerminateScc { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(origin: u64, answer_index: Option<usize>, through_all_paths: bool) -> InversionStatus {
        InversionStatus {
            origin: NodeId(origin),
            answer_index,
            through_all_paths,
        }
    }

    #[test]
    fn older_origin_outranks() {
        assert!(status(1, None, false).outranks(&status(2, Some(10), true)));
        assert!(!status(2, Some(10), true).outranks(&status(1, None, false)));
    }

    #[test]
    fn larger_index_outranks_for_equal_origin() {
        assert!(status(3, Some(2), false).outranks(&status(3, Some(1), true)));
        assert!(status(3, Some(0), false).outranks(&status(3, None, true)));
        assert!(!status(3, None, true).outranks(&status(3, Some(0), false)));
    }

    #[test]
    fn through_all_paths_breaks_ties() {
        assert!(status(3, Some(1), true).outranks(&status(3, Some(1), false)));
        assert!(!status(3, Some(1), false).outranks(&status(3, Some(1), true)));
        assert!(!status(3, Some(1), true).outranks(&status(3, Some(1), true)));
    }
}
