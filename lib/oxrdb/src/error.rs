use crate::graph::Subsumption;
use oxrdf::{Subject, Triple, Variable};
use std::error::Error;
use std::io;
use thiserror::Error;

/// An error related to storage operations (reads, writes...).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Error from the SQL driver.
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
    /// Error related to data corruption.
    #[error(transparent)]
    Corruption(#[from] CorruptionError),
    #[doc(hidden)]
    #[error("{0}")]
    Other(#[source] Box<dyn Error + Send + Sync + 'static>),
}

impl From<StorageError> for io::Error {
    #[inline]
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Sql(error) => Self::other(error),
            StorageError::Corruption(error) => error.into(),
            StorageError::Other(error) => Self::other(error),
        }
    }
}

/// An error return if some content in the database is corrupted.
#[derive(Debug, Error)]
pub enum CorruptionError {
    #[error("{0}")]
    Msg(String),
    #[error("{0}")]
    Other(#[source] Box<dyn Error + Send + Sync + 'static>),
}

impl CorruptionError {
    /// Builds an error from a printable error message.
    #[inline]
    pub(crate) fn new(error: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        Self::Other(error.into())
    }

    /// Builds an error from a printable error message.
    #[inline]
    pub(crate) fn msg(msg: impl Into<String>) -> Self {
        Self::Msg(msg.into())
    }
}

impl From<CorruptionError> for io::Error {
    #[inline]
    fn from(error: CorruptionError) -> Self {
        Self::new(io::ErrorKind::InvalidData, error)
    }
}

/// A storage configuration inconsistency detected while planning a query.
///
/// These errors are deterministic: planning the same patterns against the same graph fails again.
#[derive(Debug, Error)]
pub enum PlanningError {
    /// No specialized graph is able to hold triples matching the pattern.
    #[error("Pattern {index} is not bound by any specialized graph")]
    NoSource { index: usize },
    /// Two specialized graphs disagree on how much of the pattern they hold.
    #[error(
        "Inconsistent subsumption for pattern {index}: first source holds {first} of the matches, a later one {found}"
    )]
    InconsistentSubsumption {
        index: usize,
        first: Subsumption,
        found: Subsumption,
    },
}

/// An internal defect of the SQL compiler.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A variable was bound to two different columns of the same statement.
    #[error("Variable slot {slot} is already bound to a column")]
    VariableBoundTwice { slot: usize },
    /// A pattern element of an unsupported kind reached the qualifier builder.
    #[error("Unexpected {position} element in pattern {index}")]
    UnexpectedElement {
        index: usize,
        position: &'static str,
    },
    /// A free variable of the group has no binding slot.
    #[error("Variable {0} has no binding slot")]
    UnknownVariable(Variable),
    /// A pattern of a joined group is not sourced by exactly one specialized graph.
    #[error("Pattern {index} is not sourced by a single specialized graph")]
    NotSingleSource { index: usize },
}

/// A data-driven conflict raised by the reifier.
///
/// Callers may ignore, report or resolve these.
#[derive(Debug, Error)]
pub enum ReificationError {
    /// The node already completely reifies a different statement.
    #[error("{node} already reifies a different statement")]
    AlreadyReified { node: Subject },
    /// The node partially reifies data that is incompatible with the statement.
    #[error("{node} has reification fragments incompatible with the statement")]
    CannotReify { node: Subject },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// An error raised by a [`GraphRdb`](crate::GraphRdb) operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Reification(#[from] ReificationError),
    /// A graph with this name is already registered.
    #[error("The graph {0} already exists")]
    AlreadyExists(String),
    /// No graph with this name is registered.
    #[error("The graph {0} does not exist")]
    DoesNotExist(String),
    /// The graph was created with other storage options.
    #[error("The graph {0} was created with other storage options")]
    OptionsMismatch(String),
    /// The name is reserved for the default graph.
    #[error("The graph name {0} is reserved")]
    ReservedName(String),
    /// No specialized graph accepted the triple.
    #[error("No specialized graph is able to store {0}")]
    NoSuitableStore(Triple),
}

/// An error raised while planning, compiling or evaluating a triple pattern query.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    #[error(transparent)]
    Planning(#[from] PlanningError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A pipeline worker could not be started or stopped unexpectedly.
    #[error("Query worker failure: {0}")]
    Worker(String),
}

impl From<QueryError> for io::Error {
    #[inline]
    fn from(error: QueryError) -> Self {
        match error {
            QueryError::Storage(error) => error.into(),
            QueryError::Planning(_) | QueryError::Compile(_) | QueryError::Worker(_) => {
                Self::other(error)
            }
        }
    }
}
