use crate::driver::{Column, Driver, GraphId, STATEMENT_TABLE, decode_node, encode_node};
use crate::error::{CorruptionError, GraphError, StorageError};
use crate::graph::{CompletionFlag, SpecializedGraph, SpecializedGraphId, Subsumption};
use crate::model::{Term, Triple, TripleMatch, triple_from_terms};
use crate::options::ReificationStyle;
use crate::reification::FragmentPattern;
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params, params_from_iter};
use tracing::trace;

/// The specialized graph of plain asserted triples, one row per triple.
///
/// It accepts every triple, so it always completes writes routed to it.
pub struct StatementGraph {
    id: SpecializedGraphId,
    driver: Driver,
    graph: GraphId,
    duplicate_check: bool,
}

impl StatementGraph {
    pub(crate) fn new(
        id: SpecializedGraphId,
        driver: Driver,
        graph: GraphId,
        duplicate_check: bool,
    ) -> Self {
        Self {
            id,
            driver,
            graph,
            duplicate_check,
        }
    }

    fn contains_row(&self, s: &str, p: &str, o: &str) -> Result<bool, StorageError> {
        let connection = self.driver.connection()?;
        let mut statement = connection.prepare_cached(&format!(
            "SELECT 1 FROM {STATEMENT_TABLE} WHERE G = ?1 AND S = ?2 AND P = ?3 AND O = ?4 LIMIT 1"
        ))?;
        Ok(statement
            .query_row(params![self.graph.as_i64(), s, p, o], |_| Ok(()))
            .optional()?
            .is_some())
    }

    fn execute(&self, sql: &str, s: &str, p: &str, o: &str) -> Result<usize, StorageError> {
        let connection = self.driver.connection()?;
        Ok(connection
            .prepare_cached(sql)?
            .execute(params![self.graph.as_i64(), s, p, o])?)
    }
}

impl SpecializedGraph for StatementGraph {
    #[inline]
    fn id(&self) -> SpecializedGraphId {
        self.id
    }

    #[inline]
    fn graph_id(&self) -> GraphId {
        self.graph
    }

    #[inline]
    fn table(&self) -> &'static str {
        STATEMENT_TABLE
    }

    #[inline]
    fn is_reifier(&self) -> bool {
        false
    }

    #[inline]
    fn driver(&self) -> &Driver {
        &self.driver
    }

    fn subsumes(&self, pattern: &TripleMatch, style: ReificationStyle) -> Subsumption {
        if style.conceals() {
            // Fragments are either plain triples here or invisible.
            return Subsumption::All;
        }
        match FragmentPattern::of(pattern) {
            FragmentPattern::Fragment(_) => Subsumption::None,
            FragmentPattern::Mixed => Subsumption::Some,
            FragmentPattern::Plain => Subsumption::All,
        }
    }

    fn add(&self, triple: &Triple, complete: &mut CompletionFlag) -> Result<(), GraphError> {
        let (s, p, o) = encode_triple(triple);
        if !self.duplicate_check || !self.contains_row(&s, &p, &o)? {
            self.execute(
                &format!("INSERT INTO {STATEMENT_TABLE} (G, S, P, O) VALUES (?1, ?2, ?3, ?4)"),
                &s,
                &p,
                &o,
            )?;
            trace!("Inserted {triple} in graph {}", self.graph);
        }
        complete.set_done();
        Ok(())
    }

    fn delete(&self, triple: &Triple, complete: &mut CompletionFlag) -> Result<(), GraphError> {
        let (s, p, o) = encode_triple(triple);
        let deleted = self.execute(
            &format!("DELETE FROM {STATEMENT_TABLE} WHERE G = ?1 AND S = ?2 AND P = ?3 AND O = ?4"),
            &s,
            &p,
            &o,
        )?;
        trace!("Deleted {deleted} rows for {triple} in graph {}", self.graph);
        complete.set_done();
        Ok(())
    }

    fn contains(
        &self,
        triple: &Triple,
        complete: &mut CompletionFlag,
    ) -> Result<bool, StorageError> {
        let (s, p, o) = encode_triple(triple);
        let found = self.contains_row(&s, &p, &o)?;
        if found {
            complete.set_done();
        }
        Ok(found)
    }

    fn find(
        &self,
        pattern: &TripleMatch,
        complete: &mut CompletionFlag,
    ) -> Result<Vec<Triple>, StorageError> {
        if pattern.is_unsatisfiable() {
            complete.set_done();
            return Ok(Vec::new());
        }
        let mut sql = format!("SELECT S, P, O FROM {STATEMENT_TABLE} WHERE G = ?");
        let mut values = vec![Value::Integer(self.graph.as_i64())];
        for (column, node) in [
            (Column::Subject, &pattern.subject),
            (Column::Predicate, &pattern.predicate),
            (Column::Object, &pattern.object),
        ] {
            if let Some(node) = node {
                sql.push_str(" AND ");
                sql.push_str(column.letter());
                sql.push_str(" = ?");
                values.push(Value::Text(encode_node(node)));
            }
        }
        let connection = self.driver.connection()?;
        let mut statement = connection.prepare_cached(&sql)?;
        let mut rows = statement.query(params_from_iter(values))?;
        let mut triples = Vec::new();
        while let Some(row) = rows.next()? {
            let s = decode_node(&row.get::<_, String>(0)?)?;
            let p = decode_node(&row.get::<_, String>(1)?)?;
            let o = decode_node(&row.get::<_, String>(2)?)?;
            triples.push(stored_triple(s, p, o)?);
        }
        trace!("Found {} triples matching {pattern}", triples.len());
        if matches!(FragmentPattern::of(pattern), FragmentPattern::Plain) {
            complete.set_done();
        }
        Ok(triples)
    }

    fn len(&self) -> Result<usize, StorageError> {
        let connection = self.driver.connection()?;
        let count: i64 = connection
            .prepare_cached(&format!(
                "SELECT COUNT(*) FROM {STATEMENT_TABLE} WHERE G = ?1"
            ))?
            .query_row([self.graph.as_i64()], |row| row.get(0))?;
        usize::try_from(count).map_err(|e| CorruptionError::new(e).into())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let connection = self.driver.connection()?;
        connection.execute(
            &format!("DELETE FROM {STATEMENT_TABLE} WHERE G = ?1"),
            [self.graph.as_i64()],
        )?;
        Ok(())
    }
}

fn encode_triple(triple: &Triple) -> (String, String, String) {
    (
        encode_node(&triple.subject.clone().into()),
        encode_node(&triple.predicate.clone().into()),
        encode_node(&triple.object),
    )
}

pub(crate) fn stored_triple(s: Term, p: Term, o: Term) -> Result<Triple, CorruptionError> {
    let description = format!("{s} {p} {o}");
    triple_from_terms(s, p, o)
        .ok_or_else(|| CorruptionError::msg(format!("Invalid stored triple {description}")))
}
