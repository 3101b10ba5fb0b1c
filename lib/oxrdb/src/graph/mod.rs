//! Specialized graphs: the tables a [`GraphRdb`](crate::GraphRdb) spreads its triples over.
//!
//! Each specialized graph is optimized for one shape of triples.
//! Writes and reads are routed through them in order, each one either completing the
//! operation or letting the next one handle it.
//! The query planner only sees them through [`SpecializedGraph::subsumes`].
use crate::driver::{Driver, GraphId};
use crate::error::{GraphError, StorageError};
use crate::model::{Triple, TripleMatch};
use crate::options::ReificationStyle;
use std::fmt;

mod reifier;
mod statements;

pub use reifier::ReifierGraph;
pub use statements::StatementGraph;

/// How many of the triples matching a pattern a specialized graph holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsumption {
    /// The specialized graph cannot hold a matching triple.
    None,
    /// The specialized graph may hold some of the matching triples.
    Some,
    /// The specialized graph holds all of the matching triples.
    All,
}

impl fmt::Display for Subsumption {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Some => "some",
            Self::All => "all",
        })
    }
}

/// Identifier of a specialized graph inside its [`GraphRdb`](crate::GraphRdb).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpecializedGraphId(pub(crate) u32);

/// Set by a specialized graph when it has fully handled an operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompletionFlag {
    done: bool,
}

impl CompletionFlag {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn set_done(&mut self) {
        self.done = true;
    }

    #[inline]
    pub fn is_done(self) -> bool {
        self.done
    }
}

/// A table-backed part of a graph.
pub trait SpecializedGraph: Send + Sync {
    fn id(&self) -> SpecializedGraphId;

    /// The graph partition the rows of this specialized graph belong to.
    fn graph_id(&self) -> GraphId;

    /// The table holding the rows.
    fn table(&self) -> &'static str;

    /// Whether rows are reification fragments instead of plain statements.
    fn is_reifier(&self) -> bool;

    fn driver(&self) -> &Driver;

    /// Reports how many of the triples matching `pattern` this specialized graph holds.
    fn subsumes(&self, pattern: &TripleMatch, style: ReificationStyle) -> Subsumption;

    fn add(&self, triple: &Triple, complete: &mut CompletionFlag) -> Result<(), GraphError>;

    fn delete(&self, triple: &Triple, complete: &mut CompletionFlag) -> Result<(), GraphError>;

    fn contains(&self, triple: &Triple, complete: &mut CompletionFlag)
    -> Result<bool, StorageError>;

    fn find(
        &self,
        pattern: &TripleMatch,
        complete: &mut CompletionFlag,
    ) -> Result<Vec<Triple>, StorageError>;

    /// Number of triples stored.
    fn len(&self) -> Result<usize, StorageError>;

    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    fn clear(&self) -> Result<(), StorageError>;
}
