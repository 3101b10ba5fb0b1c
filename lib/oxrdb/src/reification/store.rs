use crate::driver::{Driver, GraphId, REIFICATION_TABLE, decode_node, decode_optional_node, encode_node};
use crate::error::{CorruptionError, StorageError};
use crate::model::{Subject, Term, Triple, term_into_subject};
use crate::reification::mask::{Fragment, FragmentKind, StmtMask};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::{trace, warn};

/// One row of the reification table.
///
/// A row holds any subset of the four fragments of a single reified node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReifRow {
    pub id: i64,
    pub subject: Option<Term>,
    pub predicate: Option<Term>,
    pub object: Option<Term>,
    pub typed: bool,
}

impl ReifRow {
    pub fn mask(&self) -> StmtMask {
        let mut mask = StmtMask::EMPTY;
        if self.subject.is_some() {
            mask.merge(StmtMask::SUBJECT);
        }
        if self.predicate.is_some() {
            mask.merge(StmtMask::PREDICATE);
        }
        if self.object.is_some() {
            mask.merge(StmtMask::OBJECT);
        }
        if self.typed {
            mask.merge(StmtMask::TYPE);
        }
        mask
    }

    pub fn fragments(&self) -> impl Iterator<Item = Fragment> + '_ {
        [
            self.subject.clone().map(Fragment::Subject),
            self.predicate.clone().map(Fragment::Predicate),
            self.object.clone().map(Fragment::Object),
            self.typed.then_some(Fragment::Type),
        ]
        .into_iter()
        .flatten()
    }

    pub fn holds(&self, fragment: &Fragment) -> bool {
        match fragment {
            Fragment::Subject(v) => self.subject.as_ref() == Some(v),
            Fragment::Predicate(v) => self.predicate.as_ref() == Some(v),
            Fragment::Object(v) => self.object.as_ref() == Some(v),
            Fragment::Type => self.typed,
        }
    }

    /// Checks that no fragment of the row contradicts the statement.
    pub fn agrees_with(&self, triple: &Triple) -> bool {
        let [subject, predicate, object, _] = Fragment::of_statement(triple);
        [
            (&self.subject, subject),
            (&self.predicate, predicate),
            (&self.object, object),
        ]
        .into_iter()
        .all(|(value, expected)| value.as_ref().is_none_or(|v| Some(v) == expected.value()))
    }

    /// The reified statement, if the row holds the four fragments.
    pub fn statement(&self) -> Option<Triple> {
        if !self.typed {
            return None;
        }
        crate::model::triple_from_terms(
            self.subject.clone()?,
            self.predicate.clone()?,
            self.object.clone()?,
        )
    }

    /// Moves the fragments of `other` into this row.
    pub fn absorb(&mut self, other: Self) {
        if other.subject.is_some() {
            self.subject = other.subject;
        }
        if other.predicate.is_some() {
            self.predicate = other.predicate;
        }
        if other.object.is_some() {
            self.object = other.object;
        }
        self.typed |= other.typed;
    }

    fn of_fragment(fragment: Fragment) -> Self {
        let mut row = Self {
            id: 0,
            subject: None,
            predicate: None,
            object: None,
            typed: false,
        };
        row.set(fragment);
        row
    }

    fn set(&mut self, fragment: Fragment) {
        match fragment {
            Fragment::Subject(v) => self.subject = Some(v),
            Fragment::Predicate(v) => self.predicate = Some(v),
            Fragment::Object(v) => self.object = Some(v),
            Fragment::Type => self.typed = true,
        }
    }

    fn from_row(row: &Row<'_>, offset: usize) -> Result<Self, StorageError> {
        Ok(Self {
            id: row.get(offset)?,
            subject: decode_optional_node(row.get::<_, Option<String>>(offset + 1)?.as_deref())?,
            predicate: decode_optional_node(row.get::<_, Option<String>>(offset + 2)?.as_deref())?,
            object: decode_optional_node(row.get::<_, Option<String>>(offset + 3)?.as_deref())?,
            typed: row.get::<_, i64>(offset + 4)? != 0,
        })
    }
}

/// SQL access to the reification rows of one graph.
#[derive(Clone)]
pub(crate) struct ReifStore {
    driver: Driver,
    graph: GraphId,
}

impl ReifStore {
    pub fn new(driver: Driver, graph: GraphId) -> Self {
        Self { driver, graph }
    }

    /// All the rows of the node, oldest first.
    pub fn rows(&self, node: &Subject) -> Result<Vec<ReifRow>, StorageError> {
        self.rows_in(&*self.driver.connection()?, node)
    }

    fn rows_in(&self, connection: &Connection, node: &Subject) -> Result<Vec<ReifRow>, StorageError> {
        let mut statement = connection.prepare_cached(&format!(
            "SELECT rowid, S, P, O, T FROM {REIFICATION_TABLE} WHERE G = ?1 AND H = ?2 ORDER BY rowid"
        ))?;
        let mut rows = statement.query(params![self.graph.as_i64(), encode_subject(node)])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(ReifRow::from_row(row, 0)?);
        }
        Ok(result)
    }

    /// Stores the fragment as a new row.
    pub fn insert_fragment(&self, node: &Subject, fragment: Fragment) -> Result<(), StorageError> {
        self.insert_row(&*self.driver.connection()?, node, &ReifRow::of_fragment(fragment))
    }

    pub fn insert_statement(&self, node: &Subject, triple: &Triple) -> Result<(), StorageError> {
        self.insert_row(
            &*self.driver.connection()?,
            node,
            &ReifRow {
                id: 0,
                subject: Some(triple.subject.clone().into()),
                predicate: Some(triple.predicate.clone().into()),
                object: Some(triple.object.clone()),
                typed: true,
            },
        )
    }

    fn insert_row(
        &self,
        connection: &Connection,
        node: &Subject,
        row: &ReifRow,
    ) -> Result<(), StorageError> {
        connection
            .prepare_cached(&format!(
                "INSERT INTO {REIFICATION_TABLE} (G, H, S, P, O, T) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ))?
            .execute(params![
                self.graph.as_i64(),
                encode_subject(node),
                row.subject.as_ref().map(encode_node),
                row.predicate.as_ref().map(encode_node),
                row.object.as_ref().map(encode_node),
                i64::from(row.typed)
            ])?;
        trace!("Inserted reification row {} for {node}", row.mask());
        Ok(())
    }

    /// Sets the fragment on the row of the node if it is its only row and lacks this fragment.
    ///
    /// Returns `false` and changes nothing otherwise.
    pub fn update_fragment(&self, node: &Subject, fragment: &Fragment) -> Result<bool, StorageError> {
        let kind = fragment.kind();
        let column = kind.column().letter();
        let (value, unset) = match fragment {
            Fragment::Type => (Value::Integer(1), "T = 0".to_owned()),
            Fragment::Subject(v) | Fragment::Predicate(v) | Fragment::Object(v) => {
                (Value::Text(encode_node(v)), format!("{column} IS NULL"))
            }
        };
        let connection = self.driver.connection()?;
        let changed = connection
            .prepare_cached(&format!(
                "UPDATE {REIFICATION_TABLE} SET {column} = ?1 WHERE {unset} AND rowid = (SELECT CASE WHEN COUNT(*) = 1 THEN MIN(rowid) END FROM {REIFICATION_TABLE} WHERE G = ?2 AND H = ?3)"
            ))?
            .execute(params![value, self.graph.as_i64(), encode_subject(node)])?;
        if changed == 1 {
            trace!("Added {} fragment to {node}", kind.mask());
        }
        Ok(changed == 1)
    }

    /// Stores the fragment as a new row, then folds the rows of the node into one canonical row.
    ///
    /// Folding stops at the first row that would set an already present fragment.
    /// Both steps are done in one transaction.
    pub fn insert_and_compact(&self, node: &Subject, fragment: Fragment) -> Result<(), StorageError> {
        let connection = self.driver.connection()?;
        let transaction = connection.unchecked_transaction()?;
        self.insert_row(&transaction, node, &ReifRow::of_fragment(fragment))?;
        let mut rows = self.rows_in(&transaction, node)?;
        let canonical = rows
            .iter()
            .position(|row| row.mask().is_spot())
            .or_else(|| rows.iter().position(|row| row.mask().has_type()))
            .unwrap_or(0);
        if canonical >= rows.len() {
            transaction.commit()?;
            return Ok(());
        }
        let mut target = rows.remove(canonical);
        let mut mask = target.mask();
        let mut absorbed = Vec::new();
        for row in rows {
            let row_mask = row.mask();
            if mask.intersects(row_mask) {
                warn!("{node} is over-specified, keeping its fragment {row_mask} on its own row");
                break;
            }
            mask.merge(row_mask);
            absorbed.push(row.id);
            target.absorb(row);
        }
        if !absorbed.is_empty() {
            let mut delete = transaction.prepare_cached(&format!(
                "DELETE FROM {REIFICATION_TABLE} WHERE rowid = ?1"
            ))?;
            for id in absorbed {
                delete.execute([id])?;
            }
            transaction
                .prepare_cached(&format!(
                    "UPDATE {REIFICATION_TABLE} SET S = ?1, P = ?2, O = ?3, T = ?4 WHERE rowid = ?5"
                ))?
                .execute(params![
                    target.subject.as_ref().map(encode_node),
                    target.predicate.as_ref().map(encode_node),
                    target.object.as_ref().map(encode_node),
                    i64::from(target.typed),
                    target.id
                ])?;
            trace!("Compacted {node} into {mask}");
        }
        transaction.commit()?;
        Ok(())
    }

    /// Removes the fragment from every row of the node, dropping the rows left empty.
    ///
    /// Returns the number of rows that held the fragment.
    pub fn remove_fragment(&self, node: &Subject, fragment: &Fragment) -> Result<usize, StorageError> {
        let head = encode_subject(node);
        let connection = self.driver.connection()?;
        let transaction = connection.unchecked_transaction()?;
        let changed = match fragment {
            Fragment::Type => transaction.execute(
                &format!(
                    "UPDATE {REIFICATION_TABLE} SET T = 0 WHERE G = ?1 AND H = ?2 AND T = 1"
                ),
                params![self.graph.as_i64(), head],
            )?,
            Fragment::Subject(v) | Fragment::Predicate(v) | Fragment::Object(v) => {
                let column = fragment.kind().column().letter();
                transaction.execute(
                    &format!(
                        "UPDATE {REIFICATION_TABLE} SET {column} = NULL WHERE G = ?1 AND H = ?2 AND {column} = ?3"
                    ),
                    params![self.graph.as_i64(), head, encode_node(v)],
                )?
            }
        };
        transaction.execute(
            &format!(
                "DELETE FROM {REIFICATION_TABLE} WHERE G = ?1 AND H = ?2 AND S IS NULL AND P IS NULL AND O IS NULL AND T = 0"
            ),
            params![self.graph.as_i64(), head],
        )?;
        transaction.commit()?;
        trace!("Removed {} fragment of {node} from {changed} rows", fragment.mask());
        Ok(changed)
    }

    pub fn has_fragment(&self, node: &Subject, fragment: &Fragment) -> Result<bool, StorageError> {
        Ok(self.rows(node)?.iter().any(|row| row.holds(fragment)))
    }

    /// Scans the rows, optionally restricted to a node and to the rows holding a fragment kind
    /// (with the given value if any).
    pub fn scan(
        &self,
        node: Option<&Term>,
        fragment: Option<(FragmentKind, Option<&Term>)>,
    ) -> Result<Vec<(Subject, ReifRow)>, StorageError> {
        let mut sql = format!("SELECT H, rowid, S, P, O, T FROM {REIFICATION_TABLE} WHERE G = ?");
        let mut values = vec![Value::Integer(self.graph.as_i64())];
        if let Some(node) = node {
            sql.push_str(" AND H = ?");
            values.push(Value::Text(encode_node(node)));
        }
        match fragment {
            Some((FragmentKind::Type, _)) => sql.push_str(" AND T = 1"),
            Some((kind, Some(value))) => {
                sql.push_str(" AND ");
                sql.push_str(kind.column().letter());
                sql.push_str(" = ?");
                values.push(Value::Text(encode_node(value)));
            }
            Some((kind, None)) => {
                sql.push_str(" AND ");
                sql.push_str(kind.column().letter());
                sql.push_str(" IS NOT NULL");
            }
            None => (),
        }
        sql.push_str(" ORDER BY rowid");
        let connection = self.driver.connection()?;
        let mut statement = connection.prepare_cached(&sql)?;
        let mut rows = statement.query(params_from_iter(values))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let head = decode_subject(&row.get::<_, String>(0)?)?;
            result.push((head, ReifRow::from_row(row, 1)?));
        }
        Ok(result)
    }

    /// Nodes with a complete row reifying the statement.
    pub fn nodes_for(&self, triple: &Triple) -> Result<Vec<Subject>, StorageError> {
        let connection = self.driver.connection()?;
        let mut statement = connection.prepare_cached(&format!(
            "SELECT DISTINCT H FROM {REIFICATION_TABLE} WHERE G = ?1 AND S = ?2 AND P = ?3 AND O = ?4 AND T = 1"
        ))?;
        let mut rows = statement.query(params![
            self.graph.as_i64(),
            encode_subject(&triple.subject),
            encode_node(&triple.predicate.clone().into()),
            encode_node(&triple.object)
        ])?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(decode_subject(&row.get::<_, String>(0)?)?);
        }
        Ok(nodes)
    }

    /// Nodes with a complete row.
    pub fn complete_nodes(&self) -> Result<Vec<Subject>, StorageError> {
        let connection = self.driver.connection()?;
        let mut statement = connection.prepare_cached(&format!(
            "SELECT DISTINCT H FROM {REIFICATION_TABLE} WHERE G = ?1 AND S IS NOT NULL AND P IS NOT NULL AND O IS NOT NULL AND T = 1"
        ))?;
        let mut rows = statement.query([self.graph.as_i64()])?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(decode_subject(&row.get::<_, String>(0)?)?);
        }
        Ok(nodes)
    }

    pub fn has_node(&self, node: &Subject) -> Result<bool, StorageError> {
        let connection = self.driver.connection()?;
        Ok(connection
            .prepare_cached(&format!(
                "SELECT 1 FROM {REIFICATION_TABLE} WHERE G = ?1 AND H = ?2 LIMIT 1"
            ))?
            .query_row(params![self.graph.as_i64(), encode_subject(node)], |_| Ok(()))
            .optional()?
            .is_some())
    }

    /// Number of fragments stored.
    pub fn count(&self) -> Result<usize, StorageError> {
        let connection = self.driver.connection()?;
        let count: i64 = connection
            .prepare_cached(&format!(
                "SELECT COUNT(S) + COUNT(P) + COUNT(O) + COALESCE(SUM(T), 0) FROM {REIFICATION_TABLE} WHERE G = ?1"
            ))?
            .query_row([self.graph.as_i64()], |row| row.get(0))?;
        usize::try_from(count).map_err(|e| CorruptionError::new(e).into())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        let connection = self.driver.connection()?;
        connection.execute(
            &format!("DELETE FROM {REIFICATION_TABLE} WHERE G = ?1"),
            [self.graph.as_i64()],
        )?;
        Ok(())
    }
}

fn encode_subject(node: &Subject) -> String {
    encode_node(&node.clone().into())
}

fn decode_subject(value: &str) -> Result<Subject, CorruptionError> {
    term_into_subject(decode_node(value)?)
        .ok_or_else(|| CorruptionError::msg(format!("Invalid stored reified node {value}")))
}
