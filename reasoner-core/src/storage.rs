use std::fmt::Debug;

use reasoner_types::errors::internal::BoxedError;
use reasoner_types::rule::Pattern;
use reasoner_types::types::{Bounds, ConceptMap};

/// A lazy traversal over concept storage. `next` must not block.
pub type TraversalIterator = Box<dyn Iterator<Item = Result<ConceptMap, BoxedError>> + Send>;

/// Concept storage as seen by the core: a factory of lazy traversal
/// iterators for a pattern under bounds.
pub trait TraversalSource: Send + Sync + Debug {
    fn traversal(&self, pattern: &Pattern, bounds: &Bounds) -> Result<TraversalIterator, BoxedError>;
}
