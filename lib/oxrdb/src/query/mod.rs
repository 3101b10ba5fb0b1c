//! Triple pattern queries.
//!
//! A conjunction of [`TriplePattern`]s is turned into a [`QueryPipeline`]:
//! 1. every pattern gets a [`PatternDescriptor`](pattern::PatternDescriptor) recording the
//!    specialized graphs able to hold its matches;
//! 2. the planner picks the cheapest pattern, greedily groups it with the patterns it joins with
//!    inside the same table, and repeats;
//! 3. each group of several patterns is compiled into one SQL statement, the other patterns are
//!    evaluated one by one with `find`.
//!
//! The stages of the pipeline run in their own threads and exchange bindings through bounded channels.
use crate::driver::Driver;
use crate::error::QueryError;
use crate::graph::{SpecializedGraph, Subsumption};
use crate::model::{Term, TriplePattern, Variable};
use crate::options::GraphOptions;
use pattern::PatternDescriptor;
use rustc_hash::FxHashMap;
use stage::{PatternStage, Stage};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

mod compiler;
mod db_query;
mod pattern;
mod planner;
mod stage;
mod var_desc;

pub use db_query::DbQuery;
pub use pattern::PatternElement;
pub use stage::{QueryPipeline, QuerySolutionIter};

/// Allocates the binding slots of variables, in the order they get bound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableMap {
    variables: Vec<Variable>,
    slots: FxHashMap<Variable, usize>,
}

impl VariableMap {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot of the variable if it is bound.
    #[inline]
    pub fn slot(&self, variable: &Variable) -> Option<usize> {
        self.slots.get(variable).copied()
    }

    /// Returns the slot of the variable, allocating it if needed.
    pub fn bind(&mut self, variable: &Variable) -> usize {
        if let Some(slot) = self.slot(variable) {
            return slot;
        }
        let slot = self.variables.len();
        self.variables.push(variable.clone());
        self.slots.insert(variable.clone(), slot);
        slot
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// The bound variables, indexed by slot.
    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }
}

/// A row of bindings, one optional node per variable slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Domain {
    values: Vec<Option<Term>>,
}

impl Domain {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, slot: usize) -> Option<&Term> {
        self.values.get(slot)?.as_ref()
    }

    pub fn set(&mut self, slot: usize, value: Term) {
        if self.values.len() <= slot {
            self.values.resize(slot + 1, None);
        }
        self.values[slot] = Some(value);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A way to designate a value of a [`QuerySolution`].
pub trait VariableSolutionIndex {
    fn index(self, solution: &QuerySolution) -> Option<usize>;
}

impl VariableSolutionIndex for usize {
    #[inline]
    fn index(self, _: &QuerySolution) -> Option<usize> {
        Some(self)
    }
}

impl VariableSolutionIndex for &str {
    #[inline]
    fn index(self, solution: &QuerySolution) -> Option<usize> {
        solution.variables.iter().position(|v| v.as_str() == self)
    }
}

impl VariableSolutionIndex for &Variable {
    #[inline]
    fn index(self, solution: &QuerySolution) -> Option<usize> {
        solution.variables.iter().position(|v| v == self)
    }
}

/// One solution of a query: the values bound to its variables.
///
/// ```
/// use oxrdb::model::{Literal, NamedNode, TriplePattern, Triple, Variable};
/// use oxrdb::{Driver, GraphOptions, GraphRdb};
///
/// let graph = GraphRdb::default_graph(&Driver::open_in_memory()?, GraphOptions::new())?;
/// let name = NamedNode::new("http://example.com/name")?;
/// graph.add(&Triple::new(NamedNode::new("http://example.com/p1")?, name.clone(), Literal::from("Alice")))?;
/// for solution in graph.query(&[TriplePattern::new(Variable::new("x")?, name, Variable::new("n")?)])? {
///     let solution = solution?;
///     assert_eq!(solution.get("n"), Some(&Literal::from("Alice").into()));
/// }
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySolution {
    variables: Arc<[Variable]>,
    values: Domain,
}

impl QuerySolution {
    pub(crate) fn new(variables: Arc<[Variable]>, values: Domain) -> Self {
        Self { variables, values }
    }

    /// The value of a variable, by slot, name or [`Variable`].
    #[inline]
    pub fn get(&self, index: impl VariableSolutionIndex) -> Option<&Term> {
        self.values.get(index.index(self)?)
    }

    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// The bound variables and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Term)> {
        self.variables
            .iter()
            .enumerate()
            .filter_map(|(slot, v)| Some((v, self.values.get(slot)?)))
    }

    #[inline]
    pub fn into_domain(self) -> Domain {
        self.values
    }
}

impl fmt::Display for QuerySolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (variable, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{variable}: {value}")?;
        }
        f.write_str("}")
    }
}

/// Builds the pipeline answering a conjunction of patterns over the specialized graphs of a graph.
pub(crate) struct QueryHandler<'a> {
    driver: &'a Driver,
    graphs: &'a [Arc<dyn SpecializedGraph>],
    options: &'a GraphOptions,
}

impl<'a> QueryHandler<'a> {
    pub fn new(
        driver: &'a Driver,
        graphs: &'a [Arc<dyn SpecializedGraph>],
        options: &'a GraphOptions,
    ) -> Self {
        Self {
            driver,
            graphs,
            options,
        }
    }

    pub fn prepare(
        &self,
        patterns: &[TriplePattern],
        variables: &mut VariableMap,
    ) -> Result<QueryPipeline, QueryError> {
        let mut descriptors = patterns
            .iter()
            .enumerate()
            .map(|(index, pattern)| PatternDescriptor::new(index, pattern, variables))
            .collect::<Vec<_>>();
        if let Some(descriptor) = descriptors.iter().find(|d| d.is_unsatisfiable()) {
            debug!(
                "Pattern {} can never match, the query has no solution",
                descriptor.index()
            );
            for descriptor in &descriptors {
                for variable in descriptor.free_variables() {
                    variables.bind(variable);
                }
            }
            return Ok(QueryPipeline::new(
                vec![Stage::Query(Arc::new(DbQuery::empty(
                    self.driver.clone(),
                )))],
                variables,
                self.options.pipeline_buffer(),
            ));
        }
        let style = self.options.reification_style();
        for descriptor in &mut descriptors {
            let pattern = descriptor.as_match();
            for graph in self.graphs {
                let subsumption = graph.subsumes(&pattern, style);
                if subsumption == Subsumption::None {
                    continue;
                }
                descriptor.record_source(Arc::clone(graph), subsumption)?;
                if subsumption == Subsumption::All {
                    break;
                }
            }
        }
        let planned = planner::plan(&mut descriptors, variables, self.options.fast_path())?;
        let mut stages = Vec::with_capacity(planned.len());
        for planned in planned {
            stages.push(if planned.is_joined() {
                let group = planned
                    .patterns
                    .iter()
                    .map(|i| &descriptors[*i])
                    .collect::<Vec<_>>();
                Stage::Query(Arc::new(compiler::compile(
                    &group,
                    variables,
                    planned.base,
                    self.options.full_reification(),
                )?))
            } else {
                Stage::Pattern(Arc::new(PatternStage::new(
                    &descriptors[planned.patterns[0]],
                    variables,
                )?))
            });
        }
        Ok(QueryPipeline::new(
            stages,
            variables,
            self.options.pipeline_buffer(),
        ))
    }
}
