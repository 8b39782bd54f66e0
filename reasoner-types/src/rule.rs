use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::types::{Bounds, Concept, ConceptMap, ConclusionMap, Variable};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatternId(pub u32);

impl Display for PatternId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "pattern#{}", self.0)
    }
}

/// A compiled pattern atom. The core never interprets its structure; it only
/// needs an identity for caching and the variable set for bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub variables: Vec<Variable>,
}

impl Pattern {
    pub fn new(id: PatternId, variables: Vec<Variable>) -> Self {
        Self { id, variables }
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// A pattern answered by storage traversal alone.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Retrievable {
    pub pattern: Pattern,
}

/// A pattern that rules may additionally produce answers for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Concludable {
    pub pattern: Pattern,
}

/// Kinds of resolvable sub-patterns, as handed out by the planner.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolvable {
    Retrievable(Retrievable),
    Concludable(Concludable),
}

impl Resolvable {
    pub fn pattern(&self) -> &Pattern {
        match self {
            Resolvable::Retrievable(retrievable) => &retrievable.pattern,
            Resolvable::Concludable(concludable) => &concludable.pattern,
        }
    }
}

/// A conjunction of pattern atoms, as parsed by the query front end.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Conjunction {
    pub patterns: Vec<Pattern>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId(pub u32);

impl Display for RuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "rule#{}", self.0)
    }
}

/// An inference rule handle. Condition and conclusion internals live behind
/// the planner and materialisation interfaces.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub label: String,
}

impl Rule {
    pub fn new(id: RuleId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }
}

impl Display for Rule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.id, self.label)
    }
}

/// Variable renaming between a concludable's space and a rule's conclusion
/// space: `concludable variable -> conclusion variable`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unifier {
    mapping: BTreeMap<Variable, Variable>,
}

impl Unifier {
    pub fn identity(variables: impl IntoIterator<Item = Variable>) -> Self {
        Self {
            mapping: variables.into_iter().map(|v| (v.clone(), v)).collect(),
        }
    }

    pub fn mapped(mapping: impl IntoIterator<Item = (Variable, Variable)>) -> Self {
        Self {
            mapping: mapping.into_iter().collect(),
        }
    }

    /// Renames caller bounds into the rule's variable space. Bounds on
    /// variables the rule does not mention are dropped.
    pub fn apply_bounds(&self, bounds: &Bounds) -> Bounds {
        bounds
            .iter()
            .filter_map(|(variable, concept)| {
                self.mapping
                    .get(variable)
                    .map(|renamed| (renamed.clone(), concept.clone()))
            })
            .collect()
    }

    /// Renames a rule conclusion back into the concludable's variable space.
    /// Returns `None` when the conclusion does not bind every mapped
    /// variable: the rule cannot answer this pattern.
    pub fn unapply(&self, conclusion: &ConclusionMap) -> Option<ConceptMap> {
        let mut result = Vec::with_capacity(self.mapping.len());
        for (ours, theirs) in &self.mapping {
            let concept: &Concept = conclusion.get(theirs)?;
            result.push((ours.clone(), concept.clone()));
        }
        Some(result.into_iter().collect())
    }
}

/// An applicable rule together with the unifier that links it to the
/// concludable it answers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleUnifier {
    pub rule: Rule,
    pub unifier: Unifier,
}

/// Identifier of a compiled node plan, assigned by the planner. Together
/// with the evaluation bounds it keys the registry's node cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlanId(pub u64);

impl Display for PlanId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "plan#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::types::Concept;

    use super::*;

    fn var(name: &str) -> Variable {
        Variable::named(name)
    }

    #[test]
    fn identity_unifier_preserves_bounds() {
        let unifier = Unifier::identity([var("x"), var("y")]);
        let bounds = Bounds::none().with(var("x"), Concept::long(1));
        assert_eq!(unifier.apply_bounds(&bounds), bounds);
    }

    #[test]
    fn apply_bounds_renames_and_drops_unmapped() {
        let unifier = Unifier::mapped([(var("x"), var("p"))]);
        let bounds = Bounds::none()
            .with(var("x"), Concept::long(1))
            .with(var("z"), Concept::long(9));
        let applied = unifier.apply_bounds(&bounds);
        assert_eq!(applied, Bounds::none().with(var("p"), Concept::long(1)));
    }

    #[test]
    fn unapply_renames_conclusion_back() {
        let unifier = Unifier::mapped([(var("x"), var("p"))]);
        let conclusion = ConclusionMap::new().with(var("p"), Concept::long(7));
        let unapplied = unifier.unapply(&conclusion).unwrap();
        assert_eq!(
            unapplied,
            [(var("x"), Concept::long(7))].into_iter().collect()
        );
    }

    #[test]
    fn unapply_requires_every_mapped_variable() {
        let unifier = Unifier::mapped([(var("x"), var("p")), (var("y"), var("q"))]);
        let conclusion = ConclusionMap::new().with(var("p"), Concept::long(7));
        assert_eq!(unifier.unapply(&conclusion), None);
    }
}
