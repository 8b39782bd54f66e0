use std::borrow::Cow;

use reasoner_types::rule::Rule;
use reasoner_types::types::{Bounds, ConceptMap, ConclusionMap};

use crate::errors::ReasoningError;
use crate::port::PortId;

use super::{Name, NodeBase, Resolver};

/// The conclusion stage of one rule under one set of bounds: pulls the
/// rule's condition node and materialises each condition answer into at
/// most one conclusion record.
///
/// Materialisation runs on the materialiser service actor; while a request
/// is in flight the node is not quiescent, which holds back inversion
/// probes that would otherwise overtake the pending conclusion.
#[derive(Debug)]
pub(crate) struct ConclusionResolver {
    rule: Rule,
    bounds: Bounds,
    initialised: bool,
    in_flight: usize,
}

impl ConclusionResolver {
    pub fn new(rule: Rule, bounds: Bounds) -> Self {
        Self {
            rule,
            bounds,
            initialised: false,
            in_flight: 0,
        }
    }

    fn open_condition(&mut self, base: &mut NodeBase) -> Result<(), ReasoningError> {
        let registry = base.registry()?;
        let (plan, bounds) = registry
            .planner()
            .condition_plan(&self.rule, &self.bounds)
            .map_err(ReasoningError::Planner)?;
        let driver = registry.acquire(plan, bounds)?;
        base.open_port(driver)?;
        Ok(())
    }
}

impl Name for ConclusionResolver {
    fn name(&self) -> Cow<'_, str> {
        Cow::Owned(format!("conclusion {}", self.rule))
    }
}

impl Resolver for ConclusionResolver {
    fn on_pull(&mut self, base: &mut NodeBase) -> Result<(), ReasoningError> {
        if !self.initialised {
            self.initialised = true;
            self.open_condition(base)?;
        }
        base.pull_ready_ports()
    }

    fn on_answer(
        &mut self,
        base: &mut NodeBase,
        port: PortId,
        map: ConceptMap,
    ) -> Result<(), ReasoningError> {
        // hand the condition answer to the materialiser; the port stays
        // idle until the reply comes back
        let registry = base.registry()?;
        registry.materialise(base.self_sender().clone(), port, self.rule.clone(), map)?;
        self.in_flight += 1;
        Ok(())
    }

    fn on_materialised(
        &mut self,
        base: &mut NodeBase,
        port: PortId,
        conclusion: Option<ConclusionMap>,
    ) -> Result<(), ReasoningError> {
        debug_assert!(self.in_flight > 0, "materialised reply without request");
        self.in_flight = self.in_flight.saturating_sub(1);
        if let Some(map) = conclusion {
            if !base.table().is_complete() {
                base.record_and_send_conclusion(map)?;
            }
        }
        // pull the condition again unless the port was retired while the
        // materialisation was in flight
        if base.has_active_port(port) {
            base.port_mut(port)?.read_next()?;
        }
        Ok(())
    }

    fn quiescent(&self) -> bool {
        self.in_flight == 0
    }
}
