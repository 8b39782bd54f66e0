use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::Builder;

use crossbeam::channel::{unbounded, Sender};
use reasoner_types::ahash::AHashMap;
use reasoner_types::log::{debug, error};
use reasoner_types::node::NodeId;
use reasoner_types::parking_lot::{Mutex, RwLock};
use reasoner_types::rule::{PlanId, Rule};
use reasoner_types::types::{Bounds, ConceptMap};
use uuid::Uuid;

use crate::errors::ReasoningError;
use crate::materialiser::{Materialiser, MaterialiserNode, MaterialiserRequest};
use crate::node::concludable::ConcludableResolver;
use crate::node::conclusion::ConclusionResolver;
use crate::node::retrievable::RetrievableResolver;
use crate::node::{ActorNode, NodeBase, NodeDriver, NodeRequest, Resolver};
use crate::plan::{CompiledPlan, Planner};
use crate::port::PortId;
use crate::storage::TraversalSource;

/// Owns the reasoner actor graph of one session: hands out node ids,
/// caches one node driver per (plan, bounds), spawns node threads, and
/// aborts everything on the first failure.
///
/// The registry holds only mailbox senders; nodes hold weak registry
/// references. Dropping the registry disconnects every mailbox, at which
/// point node threads exit.
#[derive(Debug)]
pub struct NodeRegistry {
    trace_id: Uuid,
    next_node_id: AtomicU64,
    nodes: RwLock<AHashMap<(PlanId, Bounds), NodeDriver>>,
    drivers: Mutex<Vec<NodeDriver>>,
    materialiser: Sender<MaterialiserRequest>,
    storage: Arc<dyn TraversalSource>,
    planner: Arc<dyn Planner>,
    failure: Mutex<Option<Arc<ReasoningError>>>,
}

impl NodeRegistry {
    pub fn new(
        storage: Arc<dyn TraversalSource>,
        planner: Arc<dyn Planner>,
        materialiser: Arc<dyn Materialiser>,
    ) -> Result<Arc<Self>, ReasoningError> {
        let (sender, mailbox) = unbounded();
        let registry = Arc::new(Self {
            trace_id: Uuid::new_v4(),
            next_node_id: AtomicU64::new(0),
            nodes: RwLock::new(AHashMap::new()),
            drivers: Mutex::new(Vec::new()),
            materialiser: sender,
            storage,
            planner,
            failure: Mutex::new(None),
        });
        let node = MaterialiserNode::new(materialiser, Arc::downgrade(&registry), mailbox);
        Builder::new()
            .name("reasoner-materialiser".into())
            .spawn(move || node.run())
            .map_err(ReasoningError::CannotSpawnWorkerThread)?;
        debug!("[registry {}] created", registry.trace_id);
        Ok(registry)
    }

    pub fn planner(&self) -> &Arc<dyn Planner> {
        &self.planner
    }

    /// The driver of the node evaluating `plan` under `bounds`, creating
    /// and spawning the node on first use. At most one node exists per
    /// key.
    pub(crate) fn acquire(
        self: &Arc<Self>,
        plan: PlanId,
        bounds: Bounds,
    ) -> Result<NodeDriver, ReasoningError> {
        if self.failure.lock().is_some() {
            return Err(ReasoningError::Terminated);
        }
        let key = (plan, bounds);
        if let Some(driver) = self.nodes.read().get(&key) {
            return Ok(driver.clone());
        }

        let compiled = self.planner.plan(plan).map_err(ReasoningError::Planner)?;
        let mut nodes = self.nodes.write();
        if let Some(driver) = nodes.get(&key) {
            return Ok(driver.clone());
        }
        let node_id = NodeId(self.next_node_id.fetch_add(1, Ordering::SeqCst));
        let (sender, mailbox) = unbounded();
        let driver = NodeDriver::new(node_id, sender.clone());
        let bounds = key.1.clone();
        nodes.insert(key, driver.clone());
        drop(nodes);
        self.drivers.lock().push(driver.clone());

        debug!(
            "[registry {}] {} evaluates {} under {}",
            self.trace_id, node_id, plan, bounds
        );
        let base = NodeBase::new(node_id, sender, Arc::downgrade(self));
        match compiled {
            CompiledPlan::Retrievable(retrievable) => {
                let traversal = self
                    .storage
                    .traversal(&retrievable.pattern, &bounds)
                    .map_err(ReasoningError::Traversal)?;
                let resolver = RetrievableResolver::new(retrievable, traversal);
                self.spawn(node_id, ActorNode::new(base, resolver, mailbox))?;
            }
            CompiledPlan::Concludable(concludable) => {
                let resolver = ConcludableResolver::new(concludable, bounds);
                self.spawn(node_id, ActorNode::new(base, resolver, mailbox))?;
            }
            CompiledPlan::RuleConclusion(rule) => {
                let resolver = ConclusionResolver::new(rule, bounds);
                self.spawn(node_id, ActorNode::new(base, resolver, mailbox))?;
            }
        }
        Ok(driver)
    }

    fn spawn<R: Resolver + Send + 'static>(
        &self,
        node_id: NodeId,
        node: ActorNode<R>,
    ) -> Result<(), ReasoningError> {
        Builder::new()
            .name(format!("reasoner-{node_id}"))
            .spawn(move || node.run())
            .map_err(ReasoningError::CannotSpawnWorkerThread)?;
        Ok(())
    }

    /// Reserves a node id for a participant that is not a graph node (the
    /// producer), so the termination protocol can order it.
    pub(crate) fn reserve_node_id(&self) -> NodeId {
        NodeId(self.next_node_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Registers an external mailbox (the producer's) for abort
    /// notification. Covers the race with an abort that happened before
    /// registration.
    pub(crate) fn register_external(&self, driver: NodeDriver) {
        self.drivers.lock().push(driver.clone());
        if self.failure.lock().is_some() {
            let _ = driver.execute(NodeRequest::Terminate);
        }
    }

    /// Schedules a materialisation; the reply lands on `reply` as a
    /// `Materialised` request.
    pub(crate) fn materialise(
        &self,
        reply: Sender<NodeRequest>,
        port: PortId,
        rule: Rule,
        condition: ConceptMap,
    ) -> Result<(), ReasoningError> {
        self.materialiser.send(MaterialiserRequest::Materialise {
            reply,
            port,
            rule,
            condition,
        })?;
        Ok(())
    }

    /// Aborts the whole reasoner: records the failure, then tells every
    /// node to drop all further work. Idempotent; only the first failure
    /// is kept.
    pub fn terminate(&self, cause: ReasoningError) {
        {
            let mut failure = self.failure.lock();
            if failure.is_some() {
                return;
            }
            error!("[registry {}] aborting: {}", self.trace_id, cause);
            *failure = Some(Arc::new(cause));
        }
        for driver in self.drivers.lock().iter() {
            let _ = driver.execute(NodeRequest::Terminate);
        }
        let _ = self.materialiser.send(MaterialiserRequest::Terminate);
    }

    pub fn failure(&self) -> Option<Arc<ReasoningError>> {
        self.failure.lock().clone()
    }
}

impl Drop for NodeRegistry {
    /// Nodes hold clones of their own mailbox senders, so dropping the
    /// driver alone does not disconnect them; an explicit `Terminate`
    /// releases every thread when the session ends.
    fn drop(&mut self) {
        for driver in self.drivers.get_mut().iter() {
            let _ = driver.execute(NodeRequest::Terminate);
        }
        let _ = self.materialiser.send(MaterialiserRequest::Terminate);
    }
}
