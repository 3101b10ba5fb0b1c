use crate::driver::{Driver, GraphId, REIFICATION_TABLE};
use crate::error::{GraphError, StorageError};
use crate::graph::{CompletionFlag, SpecializedGraph, SpecializedGraphId, Subsumption};
use crate::model::{Triple, TripleMatch};
use crate::options::ReificationStyle;
use crate::reification::{Fragment, FragmentKind, FragmentPattern, ReificationTable, Reifier};
use tracing::trace;

/// The specialized graph of reification fragments.
///
/// It claims `rdf:subject`, `rdf:predicate`, `rdf:object` and `rdf:type rdf:Statement` triples
/// and stores them per reified node in the reification table.
pub struct ReifierGraph {
    id: SpecializedGraphId,
    driver: Driver,
    graph: GraphId,
    table: ReificationTable,
}

impl ReifierGraph {
    pub(crate) fn new(
        id: SpecializedGraphId,
        driver: Driver,
        graph: GraphId,
        cache_size: usize,
    ) -> Self {
        Self {
            id,
            table: ReificationTable::new(driver.clone(), graph, cache_size),
            driver,
            graph,
        }
    }

    #[inline]
    pub fn reifier(&self) -> Reifier<'_> {
        Reifier::new(&self.table)
    }
}

impl SpecializedGraph for ReifierGraph {
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
        REIFICATION_TABLE
    }

    #[inline]
    fn is_reifier(&self) -> bool {
        true
    }

    #[inline]
    fn driver(&self) -> &Driver {
        &self.driver
    }

    fn subsumes(&self, pattern: &TripleMatch, style: ReificationStyle) -> Subsumption {
        if style.conceals() {
            return Subsumption::None;
        }
        match FragmentPattern::of(pattern) {
            FragmentPattern::Fragment(_) => Subsumption::All,
            FragmentPattern::Mixed => Subsumption::Some,
            FragmentPattern::Plain => Subsumption::None,
        }
    }

    fn add(&self, triple: &Triple, complete: &mut CompletionFlag) -> Result<(), GraphError> {
        let Some((node, fragment)) = Fragment::from_triple(triple) else {
            return Ok(());
        };
        self.table.add_fragment(&node, fragment)?;
        complete.set_done();
        Ok(())
    }

    fn delete(&self, triple: &Triple, complete: &mut CompletionFlag) -> Result<(), GraphError> {
        let Some((node, fragment)) = Fragment::from_triple(triple) else {
            return Ok(());
        };
        if self.table.remove_fragment(&node, &fragment)? {
            trace!("Deleted reification fragment {triple}");
            complete.set_done();
        }
        Ok(())
    }

    fn contains(
        &self,
        triple: &Triple,
        complete: &mut CompletionFlag,
    ) -> Result<bool, StorageError> {
        let Some((node, fragment)) = Fragment::from_triple(triple) else {
            return Ok(false);
        };
        let found = self.table.store().has_fragment(&node, &fragment)?;
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
        let kind = match FragmentPattern::of(pattern) {
            FragmentPattern::Plain => return Ok(Vec::new()),
            FragmentPattern::Mixed => None,
            FragmentPattern::Fragment(kind) => {
                complete.set_done();
                Some(kind)
            }
        };
        if pattern.is_unsatisfiable() {
            return Ok(Vec::new());
        }
        let filter = kind.map(|kind| {
            (
                kind,
                if kind == FragmentKind::Type {
                    None
                } else {
                    pattern.object.as_ref()
                },
            )
        });
        let mut triples = Vec::new();
        for (node, row) in self.table.store().scan(pattern.subject.as_ref(), filter)? {
            triples.extend(
                row.fragments()
                    .map(|fragment| fragment.to_triple(&node))
                    .filter(|triple| pattern.matches(triple)),
            );
        }
        trace!("Found {} reification fragments matching {pattern}", triples.len());
        Ok(triples)
    }

    fn len(&self) -> Result<usize, StorageError> {
        self.table.store().count()
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.table.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Literal, NamedNode, Subject, Term};
    use crate::options::GraphOptions;
    use oxrdf::vocab::rdf;

    #[test]
    fn fragments_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let driver = Driver::open_in_memory()?;
        let graph = driver.create_graph("g", GraphOptions::new().storage())?;
        let reifier = ReifierGraph::new(SpecializedGraphId(0), driver, graph, 1);
        let node = Subject::from(NamedNode::new("http://example.com/r")?);
        let statement = Triple::new(
            NamedNode::new("http://example.com/s")?,
            NamedNode::new("http://example.com/p")?,
            Literal::from(30),
        );
        let fragments = Fragment::of_statement(&statement).map(|f| f.to_triple(&node));
        for triple in &fragments {
            let mut complete = CompletionFlag::new();
            reifier.add(triple, &mut complete)?;
            assert!(complete.is_done());
        }
        let plain = Triple::new(node.clone(), rdf::VALUE.into_owned(), Literal::from(1));
        let mut complete = CompletionFlag::new();
        reifier.add(&plain, &mut complete)?;
        assert!(!complete.is_done());

        assert_eq!(reifier.len()?, 4);
        assert_eq!(reifier.reifier().triple_for(&node)?, Some(statement.clone()));
        let objects = reifier.find(
            &TripleMatch::new(None, Some(rdf::OBJECT.into_owned().into()), None),
            &mut CompletionFlag::new(),
        )?;
        assert_eq!(objects, vec![fragments[2].clone()]);
        let by_node = reifier.find(
            &TripleMatch::new(Some(Term::from(node.clone())), None, None),
            &mut CompletionFlag::new(),
        )?;
        assert_eq!(by_node.len(), 4);

        let mut complete = CompletionFlag::new();
        reifier.delete(&fragments[0], &mut complete)?;
        assert!(complete.is_done());
        assert_eq!(reifier.len()?, 3);
        assert_eq!(reifier.reifier().triple_for(&node)?, None);
        Ok(())
    }

    #[test]
    fn subsumption_by_style() -> Result<(), StorageError> {
        let driver = Driver::open_in_memory()?;
        let graph = driver.create_graph("g", GraphOptions::new().storage())?;
        let reifier = ReifierGraph::new(SpecializedGraphId(0), driver, graph, 1);
        let typed = |object: Option<Term>| {
            TripleMatch::new(None, Some(rdf::TYPE.into_owned().into()), object)
        };
        let standard = ReificationStyle::Standard;
        assert_eq!(
            reifier.subsumes(&typed(Some(rdf::STATEMENT.into_owned().into())), standard),
            Subsumption::All
        );
        assert_eq!(reifier.subsumes(&typed(None), standard), Subsumption::Some);
        assert_eq!(
            reifier.subsumes(&typed(Some(rdf::PROPERTY.into_owned().into())), standard),
            Subsumption::None
        );
        assert_eq!(
            reifier.subsumes(&TripleMatch::any(), ReificationStyle::Convenient),
            Subsumption::None
        );
        Ok(())
    }
}
