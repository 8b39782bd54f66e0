use std::borrow::Cow;
use std::fmt::{self, Debug, Formatter};

use reasoner_types::rule::Retrievable;
use reasoner_types::types::ConceptMap;

use crate::errors::ReasoningError;
use crate::port::PortId;
use crate::storage::TraversalIterator;

use super::{Name, NodeBase, Resolver};

/// Leaf node: serves a pattern straight from a lazy storage traversal.
///
/// Retrievable nodes never open upstream ports, so they never participate
/// in cycles; exhaustion of the traversal completes the table with `Done`.
pub(crate) struct RetrievableResolver {
    retrievable: Retrievable,
    traversal: TraversalIterator,
}

impl RetrievableResolver {
    pub fn new(retrievable: Retrievable, traversal: TraversalIterator) -> Self {
        Self {
            retrievable,
            traversal,
        }
    }
}

impl Debug for RetrievableResolver {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievableResolver")
            .field("retrievable", &self.retrievable)
            .finish_non_exhaustive()
    }
}

impl Name for RetrievableResolver {
    fn name(&self) -> Cow<'_, str> {
        Cow::Owned(format!("retrievable {}", self.retrievable.pattern.id))
    }
}

impl Resolver for RetrievableResolver {
    fn on_pull(&mut self, base: &mut NodeBase) -> Result<(), ReasoningError> {
        // one subscriber is waiting at the end of the table; one traversal
        // result settles all of them
        match self.traversal.next() {
            Some(Ok(map)) => base.record_and_send_answer(map),
            Some(Err(error)) => Err(ReasoningError::Traversal(error)),
            None => base.record_and_send_done(),
        }
    }

    fn on_answer(
        &mut self,
        base: &mut NodeBase,
        _port: PortId,
        _map: ConceptMap,
    ) -> Result<(), ReasoningError> {
        Err(ReasoningError::IllegalMessageVariant {
            node: base.node_id(),
            message: "Answer",
        })
    }
}
