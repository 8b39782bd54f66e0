use std::fmt::Debug;

use reasoner_types::errors::internal::BoxedError;
use reasoner_types::rule::{Concludable, Conjunction, PlanId, Resolvable, Retrievable, Rule, RuleUnifier};
use reasoner_types::types::Bounds;

/// What a plan id resolves to: the node kind the registry must build for
/// it.
#[derive(Clone, Debug)]
pub enum CompiledPlan {
    Retrievable(Retrievable),
    Concludable(Concludable),
    /// The conclusion stage of a rule: materialises answers of the rule's
    /// condition.
    RuleConclusion(Rule),
}

/// Pattern compilation and rule lookup, provided by the query planner.
///
/// The core treats plans as opaque cache keys; conjunction stream planning
/// (including multi-atom conditions) is entirely the planner's concern.
pub trait Planner: Send + Sync + Debug {
    /// Compiles a conjunction into its resolvable sub-patterns.
    fn compile(&self, conjunction: &Conjunction) -> Result<Vec<Resolvable>, BoxedError>;

    /// The plan id evaluating `resolvable`.
    fn resolvable_plan(&self, resolvable: &Resolvable) -> Result<PlanId, BoxedError>;

    /// The rules that can produce answers for `concludable`, each with the
    /// unifier linking the two variable spaces.
    fn applicable_rules(&self, concludable: &Concludable) -> Result<Vec<RuleUnifier>, BoxedError>;

    /// The plan id of `rule`'s conclusion stage.
    fn conclusion_plan(&self, rule: &Rule) -> Result<PlanId, BoxedError>;

    /// The plan evaluating `rule`'s condition under `bounds` (already in
    /// the rule's variable space), with the bounds the condition node must
    /// run under.
    fn condition_plan(&self, rule: &Rule, bounds: &Bounds) -> Result<(PlanId, Bounds), BoxedError>;

    /// Resolves a plan id handed out by one of the methods above.
    fn plan(&self, id: PlanId) -> Result<CompiledPlan, BoxedError>;
}
