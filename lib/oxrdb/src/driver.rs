//! The relational storage driver.
//!
//! It owns the SQLite connection, the table layout, the node encoding and the
//! SQL fragments the query compiler assembles statements from.
use crate::error::{CorruptionError, StorageError};
use crate::options::{ReificationStyle, StorageOptions};
use oxrdf::Term;
use rusqlite::{Connection, OptionalExtension, params};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Table of the asserted statements.
pub const STATEMENT_TABLE: &str = "rdb_stmt";
/// Table of the reification fragments.
pub const REIFICATION_TABLE: &str = "rdb_reif";
const GRAPH_TABLE: &str = "rdb_graph";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS rdb_graph (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    reification_style TEXT NOT NULL,
    duplicate_check INTEGER NOT NULL,
    full_reification INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS rdb_stmt (
    G INTEGER NOT NULL,
    S TEXT NOT NULL,
    P TEXT NOT NULL,
    O TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS rdb_stmt_gsp ON rdb_stmt (G, S, P);
CREATE INDEX IF NOT EXISTS rdb_stmt_gpo ON rdb_stmt (G, P, O);
CREATE INDEX IF NOT EXISTS rdb_stmt_go ON rdb_stmt (G, O);
CREATE TABLE IF NOT EXISTS rdb_reif (
    G INTEGER NOT NULL,
    H TEXT NOT NULL,
    S TEXT,
    P TEXT,
    O TEXT,
    T INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS rdb_reif_gh ON rdb_reif (G, H);
CREATE INDEX IF NOT EXISTS rdb_reif_gspo ON rdb_reif (G, S, P, O);
";

/// Identifier of a named graph. Every stored row is scoped by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(i64);

impl GraphId {
    #[inline]
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for GraphId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A column of the statement or reification tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Subject,
    Predicate,
    Object,
    /// The reifying node of a reification row.
    Head,
    /// The `rdf:type rdf:Statement` flag of a reification row.
    Type,
    Graph,
}

impl Column {
    #[inline]
    pub fn letter(self) -> &'static str {
        match self {
            Self::Subject => "S",
            Self::Predicate => "P",
            Self::Object => "O",
            Self::Head => "H",
            Self::Type => "T",
            Self::Graph => "G",
        }
    }
}

/// A handle on a relational database holding RDF graphs.
///
/// Cloning the handle shares the same connection.
///
/// ```
/// use oxrdb::Driver;
///
/// let driver = Driver::open_in_memory()?;
/// assert!(driver.graph_names()?.is_empty());
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone)]
pub struct Driver {
    connection: Arc<Mutex<Connection>>,
}

impl Driver {
    /// Opens the database file at `path`, creating it and its tables if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::setup(Connection::open(path)?)
    }

    /// Opens a fresh database living in memory.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::setup(Connection::open_in_memory()?)
    }

    fn setup(connection: Connection) -> Result<Self, StorageError> {
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.connection.lock().map_err(poison_corruption_error)
    }

    /// Names of the graphs registered in the database.
    pub fn graph_names(&self) -> Result<Vec<String>, StorageError> {
        let connection = self.connection()?;
        let mut statement =
            connection.prepare_cached(&format!("SELECT name FROM {GRAPH_TABLE} ORDER BY id"))?;
        let names = statement
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub(crate) fn find_graph(&self, name: &str) -> Result<Option<GraphId>, StorageError> {
        let connection = self.connection()?;
        Ok(connection
            .query_row(
                &format!("SELECT id FROM {GRAPH_TABLE} WHERE name = ?1"),
                [name],
                |row| row.get(0),
            )
            .optional()?
            .map(GraphId))
    }

    pub(crate) fn create_graph(
        &self,
        name: &str,
        options: StorageOptions,
    ) -> Result<GraphId, StorageError> {
        let connection = self.connection()?;
        connection.execute(
            &format!(
                "INSERT INTO {GRAPH_TABLE} (name, reification_style, duplicate_check, full_reification) VALUES (?1, ?2, ?3, ?4)"
            ),
            params![
                name,
                options.reification_style.name(),
                options.duplicate_check,
                options.full_reification
            ],
        )?;
        let id = GraphId(connection.last_insert_rowid());
        debug!("Registered graph {name} with id {id}");
        Ok(id)
    }

    /// The storage options the graph was created with.
    pub(crate) fn graph_options(&self, id: GraphId) -> Result<StorageOptions, StorageError> {
        let connection = self.connection()?;
        let (style, duplicate_check, full_reification) = connection.query_row(
            &format!(
                "SELECT reification_style, duplicate_check, full_reification FROM {GRAPH_TABLE} WHERE id = ?1"
            ),
            [id.0],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, bool>(2)?,
                ))
            },
        )?;
        let reification_style = ReificationStyle::from_name(&style).ok_or_else(|| {
            CorruptionError::msg(format!("Invalid stored reification style {style}"))
        })?;
        Ok(StorageOptions {
            reification_style,
            duplicate_check,
            full_reification,
        })
    }

    /// Deletes all the rows of the graph and its registration.
    pub(crate) fn remove_graph(&self, id: GraphId) -> Result<(), StorageError> {
        let connection = self.connection()?;
        let transaction = connection.unchecked_transaction()?;
        for table in [STATEMENT_TABLE, REIFICATION_TABLE] {
            transaction.execute(&format!("DELETE FROM {table} WHERE G = ?1"), params![id.0])?;
        }
        transaction.execute(
            &format!("DELETE FROM {GRAPH_TABLE} WHERE id = ?1"),
            params![id.0],
        )?;
        transaction.commit()?;
        debug!("Removed graph {id}");
        Ok(())
    }
}

/// Encodes a node into its stored representation, the N-Triples term syntax.
#[inline]
pub fn encode_node(node: &Term) -> String {
    node.to_string()
}

/// Decodes a stored node.
pub fn decode_node(value: &str) -> Result<Term, CorruptionError> {
    Term::from_str(value).map_err(|e| {
        CorruptionError::msg(format!("Invalid stored node {value}: {e}"))
    })
}

pub(crate) fn decode_optional_node(value: Option<&str>) -> Result<Option<Term>, CorruptionError> {
    value.map(decode_node).transpose()
}

/// `A<alias>.<column>`
#[inline]
pub(crate) fn column(alias: usize, column: Column) -> String {
    format!("A{alias}.{}", column.letter())
}

/// `<table> A<alias>`
#[inline]
pub(crate) fn table_reference(table: &str, alias: usize) -> String {
    format!("{table} A{alias}")
}

pub(crate) fn qualifier_constant(alias: usize, column: Column, encoded: &str) -> String {
    format!("A{alias}.{} = {}", column.letter(), quote(encoded))
}

pub(crate) fn qualifier_parameter(alias: usize, column: Column) -> String {
    format!("A{alias}.{} = ?", column.letter())
}

pub(crate) fn qualifier_join(
    alias: usize,
    column: Column,
    other_alias: usize,
    other_column: Column,
) -> String {
    format!(
        "A{alias}.{} = A{other_alias}.{}",
        column.letter(),
        other_column.letter()
    )
}

pub(crate) fn qualifier_graph(alias: usize, graph: GraphId) -> String {
    format!("A{alias}.{} = {graph}", Column::Graph.letter())
}

pub(crate) fn qualifier_not_null(alias: usize, column: Column) -> String {
    format!("A{alias}.{} IS NOT NULL", column.letter())
}

pub(crate) fn qualifier_flag(alias: usize, column: Column) -> String {
    format!("A{alias}.{} = 1", column.letter())
}

/// Quotes a string as a SQL literal.
pub(crate) fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn poison_corruption_error<T>(_: PoisonError<T>) -> StorageError {
    CorruptionError::msg("Poisoned connection mutex").into()
}
