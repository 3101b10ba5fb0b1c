use crate::driver::{Driver, decode_node, encode_node};
use crate::error::StorageError;
use crate::graph::{SpecializedGraph, SpecializedGraphId};
use crate::query::Domain;
use rusqlite::{Statement, params_from_iter};
use std::fmt;
use tracing::trace;

/// A compiled SQL statement answering a group of triple patterns.
///
/// It is immutable and may be executed any number of times with different incoming bindings.
pub struct DbQuery {
    sql: String,
    /// Slots read from the incoming bindings, in placeholder order.
    arguments: Vec<usize>,
    /// Slots written from the selected columns, in column order.
    results: Vec<usize>,
    table: &'static str,
    source: Option<SpecializedGraphId>,
    is_empty: bool,
    is_reifier: bool,
    is_cacheable: bool,
    driver: Driver,
}

impl DbQuery {
    pub(crate) fn new(
        sql: String,
        arguments: Vec<usize>,
        results: Vec<usize>,
        source: &dyn SpecializedGraph,
    ) -> Self {
        Self {
            is_cacheable: !arguments.is_empty(),
            sql,
            arguments,
            results,
            table: source.table(),
            source: Some(source.id()),
            is_empty: false,
            is_reifier: source.is_reifier(),
            driver: source.driver().clone(),
        }
    }

    /// A query without any solution.
    pub(crate) fn empty(driver: Driver) -> Self {
        Self {
            sql: String::new(),
            arguments: Vec::new(),
            results: Vec::new(),
            table: "",
            source: None,
            is_empty: true,
            is_reifier: false,
            is_cacheable: false,
            driver,
        }
    }

    #[inline]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[inline]
    pub fn arguments(&self) -> &[usize] {
        &self.arguments
    }

    #[inline]
    pub fn results(&self) -> &[usize] {
        &self.results
    }

    /// The queried table, empty for a query without solution.
    #[inline]
    pub fn table(&self) -> &'static str {
        self.table
    }

    /// The specialized graph queried.
    #[inline]
    pub fn source(&self) -> Option<SpecializedGraphId> {
        self.source
    }

    /// Whether the query is known to have no solution and is never sent to the database.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    #[inline]
    pub fn is_reifier(&self) -> bool {
        self.is_reifier
    }

    /// Whether the statement is kept prepared between executions.
    ///
    /// Only statements reading arguments are: they run once per incoming binding.
    /// The other ones inline all their values and run once per pipeline run.
    #[inline]
    pub fn is_cacheable(&self) -> bool {
        self.is_cacheable
    }

    /// Runs the statement with the arguments taken from `input`.
    ///
    /// Each row extends a copy of `input` with the result columns.
    /// An input missing an argument has no solution.
    pub fn execute(&self, input: &Domain) -> Result<Vec<Domain>, StorageError> {
        if self.is_empty {
            return Ok(Vec::new());
        }
        let mut parameters = Vec::with_capacity(self.arguments.len());
        for slot in &self.arguments {
            let Some(node) = input.get(*slot) else {
                return Ok(Vec::new());
            };
            parameters.push(encode_node(node));
        }
        let connection = self.driver.connection()?;
        let solutions = if self.is_cacheable {
            self.collect(&mut *connection.prepare_cached(&self.sql)?, parameters, input)?
        } else {
            self.collect(&mut connection.prepare(&self.sql)?, parameters, input)?
        };
        trace!("Executed {} with {} solutions", self.sql, solutions.len());
        Ok(solutions)
    }

    fn collect(
        &self,
        statement: &mut Statement<'_>,
        parameters: Vec<String>,
        input: &Domain,
    ) -> Result<Vec<Domain>, StorageError> {
        let mut rows = statement.query(params_from_iter(parameters))?;
        let mut solutions = Vec::new();
        while let Some(row) = rows.next()? {
            let mut solution = input.clone();
            for (i, slot) in self.results.iter().enumerate() {
                solution.set(*slot, decode_node(&row.get::<_, String>(i)?)?);
            }
            solutions.push(solution);
        }
        Ok(solutions)
    }
}

impl fmt::Debug for DbQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbQuery")
            .field("sql", &self.sql)
            .field("arguments", &self.arguments)
            .field("results", &self.results)
            .field("is_empty", &self.is_empty)
            .finish_non_exhaustive()
    }
}
