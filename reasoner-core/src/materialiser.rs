use std::fmt::Debug;
use std::sync::{Arc, Weak};

use crossbeam::channel::{Receiver, Sender};
use reasoner_types::errors::internal::BoxedError;
use reasoner_types::log::{debug, trace};
use reasoner_types::rule::Rule;
use reasoner_types::types::{ConceptMap, ConclusionMap};

use crate::errors::ReasoningError;
use crate::node::NodeRequest;
use crate::port::PortId;
use crate::registry::NodeRegistry;

/// Materialisation of rule conclusions, provided by the concept manager.
/// Maps a condition answer to zero or one conclusion binding.
pub trait Materialiser: Send + Sync + Debug {
    fn materialise(
        &self,
        rule: &Rule,
        condition: &ConceptMap,
    ) -> Result<Option<ConclusionMap>, BoxedError>;
}

#[derive(Debug)]
pub(crate) enum MaterialiserRequest {
    Materialise {
        /// Mailbox of the requesting conclusion node.
        reply: Sender<NodeRequest>,
        /// The condition port the answer arrived on.
        port: PortId,
        rule: Rule,
        condition: ConceptMap,
    },
    Terminate,
}

/// Stateless service actor computing materialisations for every conclusion
/// node of the registry. Replies are delivered through the requesting
/// node's mailbox; requests from one node are answered in order, with no
/// causal guarantee between distinct requesters.
pub(crate) struct MaterialiserNode {
    materialiser: Arc<dyn Materialiser>,
    registry: Weak<NodeRegistry>,
    mailbox: Receiver<MaterialiserRequest>,
}

impl MaterialiserNode {
    pub fn new(
        materialiser: Arc<dyn Materialiser>,
        registry: Weak<NodeRegistry>,
        mailbox: Receiver<MaterialiserRequest>,
    ) -> Self {
        Self {
            materialiser,
            registry,
            mailbox,
        }
    }

    pub fn run(self) {
        debug!("[materialiser] started");
        while let Ok(request) = self.mailbox.recv() {
            match request {
                MaterialiserRequest::Terminate => break,
                MaterialiserRequest::Materialise {
                    reply,
                    port,
                    rule,
                    condition,
                } => match self.materialiser.materialise(&rule, &condition) {
                    Ok(conclusion) => {
                        trace!(
                            "[materialiser] {} on {} -> {:?}",
                            rule,
                            condition,
                            conclusion
                        );
                        if reply
                            .send(NodeRequest::Materialised { port, conclusion })
                            .is_err()
                        {
                            // the requesting node quit; the query is being
                            // torn down
                            debug!("[materialiser] reply dropped for port {port}");
                        }
                    }
                    Err(error) => {
                        if let Some(registry) = self.registry.upgrade() {
                            registry.terminate(ReasoningError::Materialisation(error));
                        }
                        break;
                    }
                },
            }
        }
        debug!("[materialiser] quit");
    }
}
