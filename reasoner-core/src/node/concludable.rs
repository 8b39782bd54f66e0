use std::borrow::Cow;

use reasoner_types::ahash::{AHashMap, AHashSet};
use reasoner_types::log::trace;
use reasoner_types::rule::{Concludable, Resolvable, Retrievable, RuleUnifier};
use reasoner_types::types::{Bounds, ConceptMap, ConclusionMap};

use crate::errors::ReasoningError;
use crate::port::PortId;

use super::{Name, NodeBase, Resolver};

/// Recursive node: answers its pattern from storage plus every applicable
/// rule. Rule ports point at the rules' conclusion nodes, which may
/// transitively pull this node again; the base protocol resolves the
/// resulting cycles.
///
/// Appended answers are deduplicated against everything this node has
/// already produced.
#[derive(Debug)]
pub(crate) struct ConcludableResolver {
    concludable: Concludable,
    bounds: Bounds,
    initialised: bool,
    seen: AHashSet<ConceptMap>,
    rule_ports: AHashMap<PortId, RuleUnifier>,
}

impl ConcludableResolver {
    pub fn new(concludable: Concludable, bounds: Bounds) -> Self {
        Self {
            concludable,
            bounds,
            initialised: false,
            seen: AHashSet::new(),
            rule_ports: AHashMap::new(),
        }
    }

    /// Opens one port to a retrievable node over this pattern (direct
    /// storage answers) and one per applicable rule's conclusion node.
    fn open_upstream(&mut self, base: &mut NodeBase) -> Result<(), ReasoningError> {
        let registry = base.registry()?;
        let planner = registry.planner().clone();

        let retrievable = Resolvable::Retrievable(Retrievable {
            pattern: self.concludable.pattern.clone(),
        });
        let plan = planner
            .resolvable_plan(&retrievable)
            .map_err(ReasoningError::Planner)?;
        let driver = registry.acquire(plan, self.bounds.clone())?;
        base.open_port(driver)?;

        for rule_unifier in planner
            .applicable_rules(&self.concludable)
            .map_err(ReasoningError::Planner)?
        {
            let plan = planner
                .conclusion_plan(&rule_unifier.rule)
                .map_err(ReasoningError::Planner)?;
            let bounds = rule_unifier.unifier.apply_bounds(&self.bounds);
            let driver = registry.acquire(plan, bounds)?;
            let port = base.open_port(driver)?;
            self.rule_ports.insert(port, rule_unifier);
        }
        Ok(())
    }

    fn insert_if_novel(
        &mut self,
        base: &mut NodeBase,
        map: ConceptMap,
    ) -> Result<(), ReasoningError> {
        if !self.bounds.admits(&map) {
            trace!("{} dropping answer outside bounds: {}", base.node_id(), map);
            return Ok(());
        }
        if self.seen.insert(map.clone()) {
            base.record_and_send_answer(map)?;
        }
        Ok(())
    }
}

impl Name for ConcludableResolver {
    fn name(&self) -> Cow<'_, str> {
        Cow::Owned(format!("concludable {}", self.concludable.pattern.id))
    }
}

impl Resolver for ConcludableResolver {
    fn on_pull(&mut self, base: &mut NodeBase) -> Result<(), ReasoningError> {
        if !self.initialised {
            self.initialised = true;
            self.open_upstream(base)?;
        }
        base.pull_ready_ports()
    }

    fn on_answer(
        &mut self,
        base: &mut NodeBase,
        port: PortId,
        map: ConceptMap,
    ) -> Result<(), ReasoningError> {
        self.insert_if_novel(base, map)?;
        // keep the port hot
        base.port_mut(port)?.read_next()
    }

    fn on_conclusion(
        &mut self,
        base: &mut NodeBase,
        port: PortId,
        map: ConclusionMap,
    ) -> Result<(), ReasoningError> {
        let rule_unifier = self
            .rule_ports
            .get(&port)
            .ok_or(ReasoningError::UnknownUpstreamPort(port))?;
        if let Some(unapplied) = rule_unifier.unifier.unapply(&map) {
            self.insert_if_novel(base, unapplied)?;
        }
        base.port_mut(port)?.read_next()
    }
}
