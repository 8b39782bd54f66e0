use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Identifier of a reasoner node, assigned by the registry at construction.
///
/// Ids are handed out from a monotone counter, so ordering doubles as age:
/// a smaller id means an older node, which wins priority in the
/// termination-detection protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}
