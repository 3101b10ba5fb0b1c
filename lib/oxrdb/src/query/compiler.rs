use crate::driver::{
    Column, GraphId, column, encode_node, qualifier_constant, qualifier_flag, qualifier_graph,
    qualifier_join, qualifier_not_null, qualifier_parameter, table_reference,
};
use crate::error::{CompileError, QueryError};
use crate::model::Term;
use crate::query::VariableMap;
use crate::query::db_query::DbQuery;
use crate::query::pattern::{PatternDescriptor, PatternElement};
use crate::query::var_desc::VarDesc;
use crate::reification::{FragmentKind, is_statement_class};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Compiles a group of patterns sharing one specialized graph into a single SQL statement.
///
/// Variables with a slot lower than `base` and bound elements are arguments read from the
/// incoming bindings, the other variables are results.
pub(crate) fn compile(
    group: &[&PatternDescriptor],
    variables: &VariableMap,
    base: usize,
    full_reification: bool,
) -> Result<DbQuery, QueryError> {
    let Some(first) = group.first() else {
        return Err(CompileError::NotSingleSource { index: 0 }.into());
    };
    let source = first
        .single_source()
        .ok_or(CompileError::NotSingleSource {
            index: first.index(),
        })?;
    let mut builder = SqlBuilder {
        graph: source.graph_id(),
        table: source.table(),
        full_reification,
        variables,
        base,
        descs: FxHashMap::default(),
        order: Vec::new(),
        tables: Vec::new(),
        qualifiers: Vec::new(),
        arguments: Vec::new(),
    };
    for descriptor in group {
        if descriptor.single_source().map(|s| s.id()) != Some(source.id()) {
            return Err(CompileError::NotSingleSource {
                index: descriptor.index(),
            }
            .into());
        }
        if source.is_reifier() {
            builder.reification_pattern(descriptor)?;
        } else {
            builder.statement_pattern(descriptor)?;
        }
    }
    let (sql, arguments, results) = builder.finish();
    debug!(
        "Compiled {} patterns into {sql} with {} arguments and {} results",
        group.len(),
        arguments.len(),
        results.len()
    );
    Ok(DbQuery::new(sql, arguments, results, source.as_ref()))
}

struct SqlBuilder<'a> {
    graph: GraphId,
    table: &'static str,
    full_reification: bool,
    variables: &'a VariableMap,
    base: usize,
    descs: FxHashMap<usize, VarDesc>,
    /// Slots in the order they were first bound to a column.
    order: Vec<usize>,
    tables: Vec<String>,
    qualifiers: Vec<String>,
    arguments: Vec<usize>,
}

impl SqlBuilder<'_> {
    fn new_alias(&mut self) -> usize {
        let alias = self.tables.len();
        self.tables.push(table_reference(self.table, alias));
        self.qualifiers.push(qualifier_graph(alias, self.graph));
        alias
    }

    fn statement_pattern(&mut self, descriptor: &PatternDescriptor) -> Result<(), CompileError> {
        let alias = self.new_alias();
        for (element, column) in [
            (&descriptor.subject, Column::Subject),
            (&descriptor.predicate, Column::Predicate),
            (&descriptor.object, Column::Object),
        ] {
            self.element(alias, column, element)?;
        }
        Ok(())
    }

    /// A reification pattern reads one fragment column of a row keyed by its subject.
    fn reification_pattern(&mut self, descriptor: &PatternDescriptor) -> Result<(), CompileError> {
        let kind = match descriptor.predicate.as_fixed() {
            Some(Term::NamedNode(predicate)) => FragmentKind::from_predicate(predicate.as_ref()),
            _ => None,
        }
        .ok_or(CompileError::UnexpectedElement {
            index: descriptor.index(),
            position: "predicate",
        })?;
        let alias = match self.head_alias(&descriptor.subject)? {
            Some(alias) if self.full_reification => alias,
            _ => self.new_alias(),
        };
        self.element(alias, Column::Head, &descriptor.subject)?;
        if kind == FragmentKind::Type {
            if !descriptor.object.as_fixed().is_some_and(is_statement_class) {
                return Err(CompileError::UnexpectedElement {
                    index: descriptor.index(),
                    position: "object",
                });
            }
            self.qualifiers.push(qualifier_flag(alias, Column::Type));
        } else {
            let column = kind.column();
            if descriptor.object.as_fixed().is_none() {
                self.qualifiers.push(qualifier_not_null(alias, column));
            }
            self.element(alias, column, &descriptor.object)?;
        }
        Ok(())
    }

    /// The alias whose head column the variable is already bound to.
    fn head_alias(&self, element: &PatternElement) -> Result<Option<usize>, CompileError> {
        let Some((slot, _)) = self.slot(element)? else {
            return Ok(None);
        };
        Ok(self
            .descs
            .get(&slot)
            .and_then(VarDesc::column)
            .and_then(|(alias, column)| (column == Column::Head).then_some(alias)))
    }

    fn slot(&self, element: &PatternElement) -> Result<Option<(usize, bool)>, CompileError> {
        Ok(match element {
            PatternElement::Any | PatternElement::Fixed(_) => None,
            PatternElement::Bound(slot) => Some((*slot, true)),
            PatternElement::Free(variable) => {
                let slot = self
                    .variables
                    .slot(variable)
                    .ok_or_else(|| CompileError::UnknownVariable(variable.clone()))?;
                Some((slot, slot < self.base))
            }
        })
    }

    fn element(
        &mut self,
        alias: usize,
        column: Column,
        element: &PatternElement,
    ) -> Result<(), CompileError> {
        if let PatternElement::Fixed(node) = element {
            self.qualifiers
                .push(qualifier_constant(alias, column, &encode_node(node)));
            return Ok(());
        }
        let Some((slot, is_argument)) = self.slot(element)? else {
            return Ok(());
        };
        if let Some((other_alias, other_column)) = self.descs.get(&slot).and_then(VarDesc::column)
        {
            if (other_alias, other_column) != (alias, column) {
                self.qualifiers
                    .push(qualifier_join(alias, column, other_alias, other_column));
            }
            return Ok(());
        }
        let desc = self
            .descs
            .entry(slot)
            .or_insert_with(|| VarDesc::new(slot, is_argument));
        if desc.is_argument {
            self.qualifiers.push(qualifier_parameter(alias, column));
            self.arguments.push(slot);
        }
        desc.bind(alias, column)?;
        self.order.push(slot);
        Ok(())
    }

    /// Returns the SQL text, the argument slots and the result slots.
    fn finish(self) -> (String, Vec<usize>, Vec<usize>) {
        let mut results = Vec::new();
        let mut columns = Vec::new();
        for slot in &self.order {
            let Some(desc) = self.descs.get(slot) else {
                continue;
            };
            if desc.is_argument {
                continue;
            }
            if let Some((alias, c)) = desc.column() {
                results.push(*slot);
                columns.push(column(alias, c));
            }
        }
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            if columns.is_empty() {
                "1".to_owned()
            } else {
                columns.join(", ")
            },
            self.tables.join(", "),
            self.qualifiers.join(" AND ")
        );
        (sql, self.arguments, results)
    }
}
