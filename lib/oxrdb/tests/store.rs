#![cfg(test)]
#![allow(clippy::panic_in_result_fn)]

use oxrdb::model::vocab::rdf;
use oxrdb::model::*;
use oxrdb::{Driver, GraphError, GraphOptions, GraphRdb, ReificationError, ReificationStyle};
use std::error::Error;
use tempfile::TempDir;

fn ex(name: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.com/{name}"))
}

fn statement() -> Triple {
    Triple::new(ex("s"), ex("p"), Literal::new_language_tagged_literal_unchecked("o", "en"))
}

/// The four fragments of `statement()` reified by `ex:r`.
fn fragments() -> Vec<Triple> {
    let r = ex("r");
    let statement = statement();
    vec![
        Triple::new(r.clone(), rdf::SUBJECT, statement.subject),
        Triple::new(r.clone(), rdf::PREDICATE, statement.predicate),
        Triple::new(r.clone(), rdf::OBJECT, statement.object),
        Triple::new(r, rdf::TYPE, rdf::STATEMENT.into_owned()),
    ]
}

fn plain() -> Triple {
    Triple::new(ex("r"), ex("source"), ex("wikipedia"))
}

fn graph_with_style(style: ReificationStyle) -> Result<GraphRdb, Box<dyn Error>> {
    let graph = GraphRdb::create(
        &Driver::open_in_memory()?,
        "g",
        GraphOptions::new().with_reification_style(style),
    )?;
    for triple in fragments().iter().chain([&plain()]) {
        graph.add(triple)?;
    }
    Ok(graph)
}

#[test]
fn test_graph_registry() -> Result<(), Box<dyn Error>> {
    let driver = Driver::open_in_memory()?;
    let default = GraphRdb::default_graph(&driver, GraphOptions::new())?;
    let people = GraphRdb::create(&driver, "people", GraphOptions::new())?;
    assert_eq!(driver.graph_names()?, ["DEFAULT", "people"]);
    assert_eq!(
        GraphRdb::default_graph(&driver, GraphOptions::new())?.id(),
        default.id()
    );
    assert_eq!(
        GraphRdb::open_or_create(&driver, "people", GraphOptions::new())?.id(),
        people.id()
    );

    assert!(matches!(
        GraphRdb::create(&driver, "people", GraphOptions::new()),
        Err(GraphError::AlreadyExists(name)) if name == "people"
    ));
    assert!(matches!(
        GraphRdb::open(&driver, "places", GraphOptions::new()),
        Err(GraphError::DoesNotExist(name)) if name == "places"
    ));
    assert!(matches!(
        GraphRdb::create(&driver, "DEFAULT", GraphOptions::new()),
        Err(GraphError::ReservedName(_))
    ));
    assert!(matches!(
        GraphRdb::open(&driver, "DEFAULT", GraphOptions::new()),
        Err(GraphError::ReservedName(_))
    ));
    Ok(())
}

#[test]
fn test_graphs_are_isolated() -> Result<(), Box<dyn Error>> {
    let driver = Driver::open_in_memory()?;
    let a = GraphRdb::create(&driver, "a", GraphOptions::new())?;
    let b = GraphRdb::create(&driver, "b", GraphOptions::new())?;
    a.add(&statement())?;
    assert!(a.contains(&statement())?);
    assert!(!b.contains(&statement())?);
    assert!(b.is_empty()?);

    a.remove()?;
    assert_eq!(driver.graph_names()?, ["b"]);
    let a = GraphRdb::create(&driver, "a", GraphOptions::new())?;
    assert!(a.is_empty()?);
    Ok(())
}

#[test]
fn test_add_find_delete() -> Result<(), Box<dyn Error>> {
    let graph = GraphRdb::default_graph(&Driver::open_in_memory()?, GraphOptions::new())?;
    let blank = BlankNode::new("alice")?;
    let triples = [
        statement(),
        Triple::new(blank.clone(), ex("p"), Literal::from(1.5)),
        Triple::new(ex("s"), ex("q"), blank.clone()),
        Triple::new(ex("s"), ex("p"), Literal::from("it's \"quoted\"")),
    ];
    for triple in &triples {
        graph.add(triple)?;
    }
    assert_eq!(graph.len()?, 4);
    for triple in &triples {
        assert!(graph.contains(triple)?);
    }

    let mut by_predicate = graph.find(&TripleMatch::new(None, Some(ex("p").into()), None))?;
    by_predicate.sort_by_key(ToString::to_string);
    let mut expected = vec![triples[0].clone(), triples[1].clone(), triples[3].clone()];
    expected.sort_by_key(ToString::to_string);
    assert_eq!(by_predicate, expected);
    assert_eq!(
        graph.find(&TripleMatch::new(None, None, Some(blank.into())))?,
        vec![triples[2].clone()]
    );
    assert!(
        graph
            .find(&TripleMatch::new(Some(Literal::from(1).into()), None, None))?
            .is_empty()
    );

    graph.delete(&triples[0])?;
    graph.delete(&triples[0])?;
    assert!(!graph.contains(&triples[0])?);
    assert_eq!(graph.len()?, 3);
    graph.clear()?;
    assert!(graph.is_empty()?);
    Ok(())
}

#[test]
fn test_duplicate_check() -> Result<(), Box<dyn Error>> {
    let driver = Driver::open_in_memory()?;
    let checked = GraphRdb::create(&driver, "checked", GraphOptions::new())?;
    let unchecked = GraphRdb::create(
        &driver,
        "unchecked",
        GraphOptions::new().without_duplicate_check(),
    )?;
    for graph in [&checked, &unchecked] {
        graph.add(&statement())?;
        graph.add(&statement())?;
    }
    assert_eq!(checked.len()?, 1);
    assert_eq!(unchecked.len()?, 2);
    Ok(())
}

#[test]
fn test_standard_reification_is_visible() -> Result<(), Box<dyn Error>> {
    let graph = graph_with_style(ReificationStyle::Standard)?;
    assert_eq!(graph.len()?, 5);
    for triple in fragments() {
        assert!(graph.contains(&triple)?);
    }
    assert_eq!(
        graph.find(&TripleMatch::new(None, Some(rdf::OBJECT.into_owned().into()), None))?,
        vec![fragments()[2].clone()]
    );
    assert_eq!(
        graph
            .find(&TripleMatch::new(Some(ex("r").into()), None, None))?
            .len(),
        5
    );
    assert_eq!(graph.reifier().triple_for(&ex("r").into())?, Some(statement()));

    graph.delete(&fragments()[0])?;
    assert!(!graph.contains(&fragments()[0])?);
    assert_eq!(graph.len()?, 4);
    assert_eq!(graph.reifier().triple_for(&ex("r").into())?, None);
    assert!(graph.reifier().has_fragments(&ex("r").into())?);

    graph.clear()?;
    assert!(graph.is_empty()?);
    assert!(!graph.reifier().has_fragments(&ex("r").into())?);
    Ok(())
}

#[test]
fn test_convenient_reification_is_hidden() -> Result<(), Box<dyn Error>> {
    let graph = graph_with_style(ReificationStyle::Convenient)?;
    assert_eq!(graph.len()?, 1);
    assert!(graph.contains(&plain())?);
    assert!(!graph.contains(&fragments()[0])?);
    assert_eq!(graph.find(&TripleMatch::any())?, vec![plain()]);
    assert_eq!(graph.reifier().triple_for(&ex("r").into())?, Some(statement()));
    Ok(())
}

#[test]
fn test_minimal_reification_keeps_plain_triples() -> Result<(), Box<dyn Error>> {
    let graph = graph_with_style(ReificationStyle::Minimal)?;
    assert_eq!(graph.len()?, 5);
    for triple in fragments() {
        assert!(graph.contains(&triple)?);
    }
    assert_eq!(graph.reifier().triple_for(&ex("r").into())?, None);
    assert!(graph.reifier().reified_nodes()?.is_empty());
    Ok(())
}

#[test]
fn test_conflicting_fragment_is_refused() -> Result<(), Box<dyn Error>> {
    let graph = graph_with_style(ReificationStyle::Standard)?;
    let conflicting = Triple::new(ex("r"), rdf::SUBJECT, ex("other"));
    assert!(matches!(
        graph.add(&conflicting),
        Err(GraphError::Reification(ReificationError::AlreadyReified { .. }))
    ));
    // The identical fragment is accepted
    graph.add(&fragments()[0])?;
    assert_eq!(graph.len()?, 5);
    assert!(!graph.contains(&conflicting)?);
    Ok(())
}

#[test]
fn test_persistence() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let path = dir.path().join("graphs.db");
    {
        let driver = Driver::open(&path)?;
        let graph = GraphRdb::create(&driver, "people", GraphOptions::new())?;
        graph.add(&statement())?;
        for fragment in fragments() {
            graph.add(&fragment)?;
        }
    }
    let driver = Driver::open(&path)?;
    assert_eq!(driver.graph_names()?, ["people"]);
    let graph = GraphRdb::open(&driver, "people", GraphOptions::new())?;
    assert!(graph.contains(&statement())?);
    assert_eq!(graph.len()?, 5);
    assert_eq!(graph.reifier().nodes_for(&statement())?, vec![Subject::from(ex("r"))]);
    Ok(())
}

#[test]
fn test_storage_options_are_stored() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let path = dir.path().join("graphs.db");
    let fragment = Triple::new(ex("r"), rdf::SUBJECT, ex("s"));
    {
        let driver = Driver::open(&path)?;
        let graph = GraphRdb::create(&driver, "g", GraphOptions::new())?;
        graph.add(&fragment)?;
        graph.add(&plain())?;
    }
    let driver = Driver::open(&path)?;
    assert!(matches!(
        GraphRdb::open(
            &driver,
            "g",
            GraphOptions::new().with_reification_style(ReificationStyle::Minimal)
        ),
        Err(GraphError::OptionsMismatch(name)) if name == "g"
    ));
    assert!(matches!(
        GraphRdb::open_or_create(&driver, "g", GraphOptions::new().without_duplicate_check()),
        Err(GraphError::OptionsMismatch(_))
    ));
    assert!(matches!(
        GraphRdb::stored_options(&driver, "h"),
        Err(GraphError::DoesNotExist(_))
    ));

    let options = GraphRdb::stored_options(&driver, "g")?;
    assert_eq!(options, GraphOptions::new());
    // Options tuning only the handle may change
    let graph = GraphRdb::open(
        &driver,
        "g",
        options.without_fast_path().with_reification_cache_size(8),
    )?;
    assert_eq!(graph.len()?, 2);
    assert!(graph.contains(&fragment)?);
    assert!(graph.reifier().has_fragments(&ex("r").into())?);
    Ok(())
}

#[test]
fn test_default_graph_keeps_its_options() -> Result<(), Box<dyn Error>> {
    let driver = Driver::open_in_memory()?;
    let options = GraphOptions::new().with_reification_style(ReificationStyle::Convenient);
    GraphRdb::default_graph(&driver, options.clone())?;
    assert!(matches!(
        GraphRdb::default_graph(&driver, GraphOptions::new()),
        Err(GraphError::OptionsMismatch(_))
    ));
    let graph = GraphRdb::default_graph(&driver, options)?;
    assert_eq!(
        graph.options().reification_style(),
        ReificationStyle::Convenient
    );
    Ok(())
}
