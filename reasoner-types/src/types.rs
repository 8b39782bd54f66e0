use std::collections::btree_map::{BTreeMap, Entry};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// A named query variable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Variable(String);

impl Variable {
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Long(i64),
    Text(String),
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "\"{v}\""),
        }
    }
}

/// A concept bound to a variable: either a stored thing (by internal id) or
/// a literal value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Concept {
    Thing(u64),
    Value(Value),
}

impl Concept {
    pub fn long(value: i64) -> Self {
        Concept::Value(Value::Long(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Concept::Value(Value::Text(value.into()))
    }
}

impl Display for Concept {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Concept::Thing(iid) => write!(f, "thing({iid})"),
            Concept::Value(value) => write!(f, "{value}"),
        }
    }
}

/// One solution to a pattern: an immutable variable-to-concept binding.
///
/// Backed by an ordered map so that equality and hashing are canonical; the
/// reasoner deduplicates whole maps.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConceptMap(BTreeMap<Variable, Concept>);

impl ConceptMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, variable: Variable, concept: Concept) -> Self {
        self.0.insert(variable, concept);
        self
    }

    pub fn get(&self, variable: &Variable) -> Option<&Concept> {
        self.0.get(variable)
    }

    pub fn contains(&self, variable: &Variable) -> bool {
        self.0.contains_key(variable)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Concept)> {
        self.0.iter()
    }

    /// Merges `other` into a copy of this map. Returns `None` when the two
    /// maps bind a shared variable to different concepts.
    pub fn merged(&self, other: &ConceptMap) -> Option<ConceptMap> {
        let mut result = self.0.clone();
        for (variable, concept) in &other.0 {
            match result.entry(variable.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(concept.clone());
                }
                Entry::Occupied(entry) => {
                    if entry.get() != concept {
                        return None;
                    }
                }
            }
        }
        Some(ConceptMap(result))
    }
}

impl FromIterator<(Variable, Concept)> for ConceptMap {
    fn from_iter<T: IntoIterator<Item = (Variable, Concept)>>(iter: T) -> Self {
        ConceptMap(iter.into_iter().collect())
    }
}

impl Display for ConceptMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, (variable, concept)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{variable} -> {concept}")?;
        }
        f.write_str("}")
    }
}

/// A rule-conclusion binding produced by materialisation, in the rule's own
/// variable space.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConclusionMap(BTreeMap<Variable, Concept>);

impl ConclusionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, variable: Variable, concept: Concept) -> Self {
        self.0.insert(variable, concept);
        self
    }

    pub fn get(&self, variable: &Variable) -> Option<&Concept> {
        self.0.get(variable)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Concept)> {
        self.0.iter()
    }
}

impl FromIterator<(Variable, Concept)> for ConclusionMap {
    fn from_iter<T: IntoIterator<Item = (Variable, Concept)>>(iter: T) -> Self {
        ConclusionMap(iter.into_iter().collect())
    }
}

impl Display for ConclusionMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, (variable, concept)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{variable} -> {concept}")?;
        }
        f.write_str("}")
    }
}

/// Variables fixed by the caller before a pattern is evaluated. Part of the
/// registry cache key, so equality and hashing must be canonical.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Bounds(BTreeMap<Variable, Concept>);

impl Bounds {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, variable: Variable, concept: Concept) -> Self {
        self.0.insert(variable, concept);
        self
    }

    pub fn get(&self, variable: &Variable) -> Option<&Concept> {
        self.0.get(variable)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Concept)> {
        self.0.iter()
    }

    /// True when `map` agrees with every bound variable.
    pub fn admits(&self, map: &ConceptMap) -> bool {
        self.0
            .iter()
            .all(|(variable, concept)| map.get(variable) == Some(concept))
    }
}

impl FromIterator<(Variable, Concept)> for Bounds {
    fn from_iter<T: IntoIterator<Item = (Variable, Concept)>>(iter: T) -> Self {
        Bounds(iter.into_iter().collect())
    }
}

impl Display for Bounds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, (variable, concept)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{variable} = {concept}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Variable {
        Variable::named("x")
    }

    fn y() -> Variable {
        Variable::named("y")
    }

    #[test]
    fn merged_joins_disjoint_bindings() {
        let left = ConceptMap::new().with(x(), Concept::long(1));
        let right = ConceptMap::new().with(y(), Concept::text("a"));
        let merged = left.merged(&right).unwrap();
        assert_eq!(merged.get(&x()), Some(&Concept::long(1)));
        assert_eq!(merged.get(&y()), Some(&Concept::text("a")));
    }

    #[test]
    fn merged_rejects_conflicting_bindings() {
        let left = ConceptMap::new().with(x(), Concept::long(1));
        let right = ConceptMap::new().with(x(), Concept::long(2));
        assert_eq!(left.merged(&right), None);
        // agreeing maps merge fine
        assert!(left.merged(&left.clone()).is_some());
    }

    #[test]
    fn bounds_admit_agreeing_maps_only() {
        let bounds = Bounds::none().with(x(), Concept::long(2));
        assert!(bounds.admits(&ConceptMap::new().with(x(), Concept::long(2))));
        assert!(!bounds.admits(&ConceptMap::new().with(x(), Concept::long(3))));
        assert!(!bounds.admits(&ConceptMap::new().with(y(), Concept::long(2))));
        assert!(Bounds::none().admits(&ConceptMap::new()));
    }
}
