//! API to access an RDF graph stored in relational tables.
//!
//! Usage example:
//! ```
//! use oxrdb::model::*;
//! use oxrdb::{Driver, GraphOptions, GraphRdb};
//!
//! let driver = Driver::open_in_memory()?;
//! let graph = GraphRdb::create(&driver, "people", GraphOptions::new())?;
//!
//! // insertion
//! let ex = NamedNode::new("http://example.com")?;
//! let triple = Triple::new(ex.clone(), ex.clone(), ex.clone());
//! graph.add(&triple)?;
//!
//! // triple filter
//! assert_eq!(graph.find(&TripleMatch::any())?, vec![triple]);
//!
//! // triple pattern query
//! let x = Variable::new("x")?;
//! for solution in graph.query(&[TriplePattern::new(x.clone(), ex.clone(), ex.clone())])? {
//!     assert_eq!(solution?.get(&x), Some(&ex.clone().into()));
//! }
//! # Result::<_, Box<dyn std::error::Error>>::Ok(())
//! ```
use crate::driver::{Driver, GraphId};
use crate::error::{GraphError, QueryError, StorageError};
use crate::graph::{
    CompletionFlag, ReifierGraph, SpecializedGraph, SpecializedGraphId, StatementGraph,
};
use crate::model::{Triple, TripleMatch, TriplePattern};
use crate::options::GraphOptions;
use crate::query::{Domain, QueryHandler, QueryPipeline, QuerySolutionIter, VariableMap};
use crate::reification::Reifier;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Name of the graph returned by [`GraphRdb::default_graph`].
pub const DEFAULT_GRAPH_NAME: &str = "DEFAULT";

/// An RDF graph stored in the tables of a [`Driver`].
///
/// Its triples are spread over specialized graphs: the reification fragments go to the reifier
/// table (following the [`ReificationStyle`](crate::ReificationStyle)) and the other triples
/// to the statement table.
///
/// Cloning the graph shares the same specialized graphs.
#[derive(Clone)]
pub struct GraphRdb {
    inner: Arc<GraphInner>,
}

struct GraphInner {
    driver: Driver,
    name: String,
    id: GraphId,
    options: GraphOptions,
    reifier: Arc<ReifierGraph>,
    /// Consulted in order, the reifier first.
    graphs: Vec<Arc<dyn SpecializedGraph>>,
}

impl GraphRdb {
    /// Registers a new graph named `name`.
    ///
    /// Fails with [`GraphError::AlreadyExists`] if the name is taken.
    pub fn create(
        driver: &Driver,
        name: &str,
        options: GraphOptions,
    ) -> Result<Self, GraphError> {
        check_name(name)?;
        if driver.find_graph(name)?.is_some() {
            return Err(GraphError::AlreadyExists(name.into()));
        }
        let id = driver.create_graph(name, options.storage())?;
        Ok(Self::build(driver, name, id, options))
    }

    /// Opens the graph named `name`.
    ///
    /// Fails with [`GraphError::DoesNotExist`] if there is none
    /// and with [`GraphError::OptionsMismatch`] if it was created with other storage options.
    pub fn open(driver: &Driver, name: &str, options: GraphOptions) -> Result<Self, GraphError> {
        check_name(name)?;
        let id = driver
            .find_graph(name)?
            .ok_or_else(|| GraphError::DoesNotExist(name.into()))?;
        Self::reopen(driver, name, id, options)
    }

    /// Opens the graph named `name`, creating it if needed.
    pub fn open_or_create(
        driver: &Driver,
        name: &str,
        options: GraphOptions,
    ) -> Result<Self, GraphError> {
        check_name(name)?;
        Self::open_or_create_unchecked(driver, name, options)
    }

    /// Opens the default graph of the database, creating it if needed.
    pub fn default_graph(driver: &Driver, options: GraphOptions) -> Result<Self, GraphError> {
        Self::open_or_create_unchecked(driver, DEFAULT_GRAPH_NAME, options)
    }

    /// The options the graph named `name` was created with.
    ///
    /// The options that are not stored with the graph have their default value.
    ///
    /// ```
    /// use oxrdb::{Driver, GraphOptions, GraphRdb, ReificationStyle};
    ///
    /// let driver = Driver::open_in_memory()?;
    /// let options = GraphOptions::new().with_reification_style(ReificationStyle::Minimal);
    /// GraphRdb::create(&driver, "g", options.clone())?;
    /// assert_eq!(GraphRdb::stored_options(&driver, "g")?, options);
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    pub fn stored_options(driver: &Driver, name: &str) -> Result<GraphOptions, GraphError> {
        let id = driver
            .find_graph(name)?
            .ok_or_else(|| GraphError::DoesNotExist(name.into()))?;
        Ok(GraphOptions::new().with_storage(driver.graph_options(id)?))
    }

    fn open_or_create_unchecked(
        driver: &Driver,
        name: &str,
        options: GraphOptions,
    ) -> Result<Self, GraphError> {
        match driver.find_graph(name)? {
            Some(id) => Self::reopen(driver, name, id, options),
            None => {
                let id = driver.create_graph(name, options.storage())?;
                Ok(Self::build(driver, name, id, options))
            }
        }
    }

    fn reopen(
        driver: &Driver,
        name: &str,
        id: GraphId,
        options: GraphOptions,
    ) -> Result<Self, GraphError> {
        if driver.graph_options(id)? != options.storage() {
            return Err(GraphError::OptionsMismatch(name.into()));
        }
        Ok(Self::build(driver, name, id, options))
    }

    fn build(driver: &Driver, name: &str, id: GraphId, options: GraphOptions) -> Self {
        let reifier = Arc::new(ReifierGraph::new(
            SpecializedGraphId(0),
            driver.clone(),
            id,
            options.reification_cache_size(),
        ));
        let statements = Arc::new(StatementGraph::new(
            SpecializedGraphId(1),
            driver.clone(),
            id,
            options.duplicate_check(),
        ));
        let reifier_graph: Arc<dyn SpecializedGraph> = reifier.clone();
        debug!("Opened graph {name} with id {id}");
        Self {
            inner: Arc::new(GraphInner {
                driver: driver.clone(),
                name: name.into(),
                id,
                graphs: vec![reifier_graph, statements],
                reifier,
                options,
            }),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[inline]
    pub fn id(&self) -> GraphId {
        self.inner.id
    }

    #[inline]
    pub fn options(&self) -> &GraphOptions {
        &self.inner.options
    }

    #[inline]
    pub fn driver(&self) -> &Driver {
        &self.inner.driver
    }

    /// The specialized graphs receiving writes.
    fn writers(&self) -> impl Iterator<Item = &Arc<dyn SpecializedGraph>> {
        let intercepts = self.inner.options.reification_style().intercepts();
        self.inner
            .graphs
            .iter()
            .filter(move |graph| intercepts || !graph.is_reifier())
    }

    /// The specialized graphs whose content is visible.
    fn readers(&self) -> impl Iterator<Item = &Arc<dyn SpecializedGraph>> {
        let conceals = self.inner.options.reification_style().conceals();
        self.inner
            .graphs
            .iter()
            .filter(move |graph| !conceals || !graph.is_reifier())
    }

    /// Adds a triple to the graph.
    ///
    /// A reification fragment conflicting with the statement already reified by its subject
    /// fails with [`ReificationError::AlreadyReified`](crate::ReificationError::AlreadyReified).
    pub fn add(&self, triple: &Triple) -> Result<(), GraphError> {
        let mut complete = CompletionFlag::new();
        for graph in self.writers() {
            graph.add(triple, &mut complete)?;
            if complete.is_done() {
                return Ok(());
            }
        }
        Err(GraphError::NoSuitableStore(triple.clone()))
    }

    /// Removes a triple from the graph. Removing a missing triple does nothing.
    pub fn delete(&self, triple: &Triple) -> Result<(), GraphError> {
        let mut complete = CompletionFlag::new();
        for graph in self.writers() {
            graph.delete(triple, &mut complete)?;
            if complete.is_done() {
                break;
            }
        }
        Ok(())
    }

    pub fn contains(&self, triple: &Triple) -> Result<bool, StorageError> {
        let mut complete = CompletionFlag::new();
        for graph in self.readers() {
            if graph.contains(triple, &mut complete)? {
                return Ok(true);
            }
            if complete.is_done() {
                break;
            }
        }
        Ok(false)
    }

    /// The triples matching the filter.
    pub fn find(&self, pattern: &TripleMatch) -> Result<Vec<Triple>, StorageError> {
        let mut triples = Vec::new();
        let mut complete = CompletionFlag::new();
        for graph in self.readers() {
            triples.extend(graph.find(pattern, &mut complete)?);
            if complete.is_done() {
                break;
            }
        }
        Ok(triples)
    }

    /// Number of visible triples.
    pub fn len(&self) -> Result<usize, StorageError> {
        let mut len = 0;
        for graph in self.readers() {
            len += graph.len()?;
        }
        Ok(len)
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Removes all the triples of the graph, reification fragments included.
    pub fn clear(&self) -> Result<(), StorageError> {
        for graph in &self.inner.graphs {
            graph.clear()?;
        }
        debug!("Cleared graph {}", self.inner.name);
        Ok(())
    }

    /// Drops the graph content and its registration.
    pub fn remove(self) -> Result<(), StorageError> {
        self.inner.driver.remove_graph(self.inner.id)
    }

    /// Plans and compiles a conjunction of triple patterns.
    ///
    /// Variables already bound in `variables` are read from the bindings the pipeline is run with.
    /// The variables of the patterns get their slots allocated in `variables`.
    pub fn prepare(
        &self,
        patterns: &[TriplePattern],
        variables: &mut VariableMap,
    ) -> Result<QueryPipeline, QueryError> {
        QueryHandler::new(&self.inner.driver, &self.inner.graphs, &self.inner.options)
            .prepare(patterns, variables)
    }

    /// Evaluates a conjunction of triple patterns.
    ///
    /// ```
    /// use oxrdb::model::*;
    /// use oxrdb::{Driver, GraphOptions, GraphRdb};
    ///
    /// let graph = GraphRdb::default_graph(&Driver::open_in_memory()?, GraphOptions::new())?;
    /// let ex = |name| NamedNode::new_unchecked(format!("http://example.com/{name}"));
    /// graph.add(&Triple::new(ex("p1"), ex("name"), Literal::from("Alice")))?;
    /// graph.add(&Triple::new(ex("p1"), ex("age"), Literal::from(30)))?;
    ///
    /// let (x, n) = (Variable::new("x")?, Variable::new("n")?);
    /// let solutions = graph
    ///     .query(&[
    ///         TriplePattern::new(x.clone(), ex("age"), n.clone()),
    ///         TriplePattern::new(x.clone(), ex("name"), Literal::from("Alice")),
    ///     ])?
    ///     .collect::<Result<Vec<_>, _>>()?;
    /// assert_eq!(solutions.len(), 1);
    /// assert_eq!(solutions[0].get(&x), Some(&ex("p1").into()));
    /// assert_eq!(solutions[0].get(&n), Some(&Literal::from(30).into()));
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    pub fn query(&self, patterns: &[TriplePattern]) -> Result<QuerySolutionIter, QueryError> {
        self.prepare(patterns, &mut VariableMap::new())?
            .run(Domain::new())
    }

    /// The reification surface of the graph.
    #[inline]
    pub fn reifier(&self) -> Reifier<'_> {
        self.inner.reifier.reifier()
    }
}

impl fmt::Debug for GraphRdb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphRdb")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

fn check_name(name: &str) -> Result<(), GraphError> {
    if name == DEFAULT_GRAPH_NAME {
        return Err(GraphError::ReservedName(name.into()));
    }
    Ok(())
}
