use crate::error::PlanningError;
use crate::graph::{SpecializedGraph, Subsumption};
use crate::model::{NodePattern, Term, TripleMatch, TriplePattern, Variable};
use crate::query::VariableMap;
use std::fmt;
use std::sync::Arc;

const BOUND_COST: u32 = 1;
const UNBOUND_COST: u32 = 4;
const PREDICATE_WEIGHT: u32 = 4;
const MIN_COST: u32 = 1;
const MAX_COST: u32 = 99;

/// One position of a triple pattern as seen by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternElement {
    /// Matches any node without binding it.
    Any,
    /// A constant node.
    Fixed(Term),
    /// A variable bound by an earlier stage, with its binding slot.
    Bound(usize),
    /// A variable first bound by this pattern.
    Free(Variable),
}

impl PatternElement {
    fn new(node: &NodePattern, variables: &VariableMap) -> Self {
        match node {
            NodePattern::Any => Self::Any,
            NodePattern::Node(node) => Self::Fixed(node.clone()),
            NodePattern::Variable(variable) => match variables.slot(variable) {
                Some(slot) => Self::Bound(slot),
                None => Self::Free(variable.clone()),
            },
        }
    }

    /// Whether the node is known when the pattern is evaluated.
    #[inline]
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Fixed(_) | Self::Bound(_))
    }

    #[inline]
    pub fn as_fixed(&self) -> Option<&Term> {
        match self {
            Self::Fixed(node) => Some(node),
            Self::Any | Self::Bound(_) | Self::Free(_) => None,
        }
    }

    #[inline]
    pub fn as_free(&self) -> Option<&Variable> {
        match self {
            Self::Free(variable) => Some(variable),
            Self::Any | Self::Fixed(_) | Self::Bound(_) => None,
        }
    }

    fn cost(&self) -> u32 {
        if self.is_bound() {
            BOUND_COST
        } else {
            UNBOUND_COST
        }
    }

    /// Turns a free variable that got a slot into a bound element.
    fn rebind(&mut self, variables: &VariableMap) -> bool {
        let Self::Free(variable) = self else {
            return false;
        };
        let Some(slot) = variables.slot(variable) else {
            return false;
        };
        *self = Self::Bound(slot);
        true
    }
}

impl fmt::Display for PatternElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("ANY"),
            Self::Fixed(node) => node.fmt(f),
            Self::Bound(slot) => write!(f, "${slot}"),
            Self::Free(variable) => variable.fmt(f),
        }
    }
}

/// A triple pattern during planning: its elements, its sources and its memoized cost.
pub(crate) struct PatternDescriptor {
    index: usize,
    pub subject: PatternElement,
    pub predicate: PatternElement,
    pub object: PatternElement,
    sources: Vec<Arc<dyn SpecializedGraph>>,
    subsumption: Option<Subsumption>,
    pub staged: bool,
    cost: Option<u32>,
}

impl PatternDescriptor {
    pub fn new(index: usize, pattern: &TriplePattern, variables: &VariableMap) -> Self {
        Self {
            index,
            subject: PatternElement::new(&pattern.subject, variables),
            predicate: PatternElement::new(&pattern.predicate, variables),
            object: PatternElement::new(&pattern.object, variables),
            sources: Vec::new(),
            subsumption: None,
            staged: false,
            cost: None,
        }
    }

    /// Index of the pattern in the query.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn elements(&self) -> [&PatternElement; 3] {
        [&self.subject, &self.predicate, &self.object]
    }

    /// The constant part of the pattern, as used to ask specialized graphs about it.
    pub fn as_match(&self) -> TripleMatch {
        TripleMatch::new(
            self.subject.as_fixed().cloned(),
            self.predicate.as_fixed().cloned(),
            self.object.as_fixed().cloned(),
        )
    }

    /// A constant literal subject or non-IRI predicate can never match.
    pub fn is_unsatisfiable(&self) -> bool {
        self.as_match().is_unsatisfiable()
    }

    /// Adds a specialized graph able to hold matches of the pattern.
    pub fn record_source(
        &mut self,
        source: Arc<dyn SpecializedGraph>,
        subsumption: Subsumption,
    ) -> Result<(), PlanningError> {
        match self.subsumption {
            None => self.subsumption = Some(subsumption),
            Some(first) if first != subsumption => {
                return Err(PlanningError::InconsistentSubsumption {
                    index: self.index,
                    first,
                    found: subsumption,
                });
            }
            Some(_) => (),
        }
        self.sources.push(source);
        Ok(())
    }

    #[inline]
    pub fn has_source(&self) -> bool {
        !self.sources.is_empty()
    }

    #[inline]
    pub fn is_single_source(&self) -> bool {
        self.sources.len() == 1
    }

    /// The source of a single-source pattern.
    pub fn single_source(&self) -> Option<&Arc<dyn SpecializedGraph>> {
        match self.sources.as_slice() {
            [source] => Some(source),
            _ => None,
        }
    }

    pub fn sources(&self) -> Result<&[Arc<dyn SpecializedGraph>], PlanningError> {
        if self.has_source() {
            Ok(&self.sources)
        } else {
            Err(PlanningError::NoSource { index: self.index })
        }
    }

    /// The evaluation cost estimate, in `1..100`.
    ///
    /// Known nodes are cheap, an unknown predicate is four times as expensive as an unknown
    /// subject or object.
    pub fn cost(&mut self) -> Result<u32, PlanningError> {
        if !self.has_source() {
            return Err(PlanningError::NoSource { index: self.index });
        }
        if let Some(cost) = self.cost {
            return Ok(cost);
        }
        let cost = (self.subject.cost()
            + self.predicate.cost() * if self.predicate.is_bound() { 1 } else { PREDICATE_WEIGHT }
            + self.object.cost())
        .clamp(MIN_COST, MAX_COST);
        self.cost = Some(cost);
        Ok(cost)
    }

    /// Marks as bound the free variables that got a slot since the last call.
    ///
    /// Returns if an element changed, in which case the cost is recomputed on next use.
    pub fn rebind(&mut self, variables: &VariableMap) -> bool {
        let mut changed = false;
        for element in [&mut self.subject, &mut self.predicate, &mut self.object] {
            changed |= element.rebind(variables);
        }
        if changed {
            self.cost = None;
        }
        changed
    }

    /// The free variables of the pattern, in subject, predicate, object order.
    pub fn free_variables(&self) -> impl Iterator<Item = &Variable> {
        self.elements().into_iter().filter_map(PatternElement::as_free)
    }

    /// The free variables in subject or object position.
    pub fn free_nodes(&self) -> impl Iterator<Item = &Variable> {
        [&self.subject, &self.object]
            .into_iter()
            .filter_map(PatternElement::as_free)
    }

    /// Checks if `other` can be evaluated inside the same SQL statement as this pattern.
    ///
    /// Both predicates must be constants, both patterns must have the same single source and
    /// `other` must reach one of the `joined` variables by its subject or object.
    pub fn joins_with(&self, other: &Self, joined: &[Variable]) -> bool {
        if self.predicate.as_fixed().is_none() || other.predicate.as_fixed().is_none() {
            return false;
        }
        let (Some(source), Some(other_source)) = (self.single_source(), other.single_source())
        else {
            return false;
        };
        source.id() == other_source.id() && other.free_nodes().any(|v| joined.contains(v))
    }
}

impl fmt::Display for PatternDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} {}",
            self.index, self.subject, self.predicate, self.object
        )
    }
}
