#![cfg(test)]
#![allow(clippy::panic_in_result_fn)]

use oxrdb::model::vocab::rdf;
use oxrdb::model::*;
use oxrdb::query::{Domain, QuerySolution, VariableMap};
use oxrdb::{Driver, GraphOptions, GraphRdb, QueryError, StorageError};
use rusqlite::Connection;
use std::error::Error;
use tempfile::TempDir;

fn ex(name: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.com/{name}"))
}

fn var(name: &str) -> Variable {
    Variable::new_unchecked(name)
}

fn people(options: GraphOptions) -> Result<GraphRdb, Box<dyn Error>> {
    let graph = GraphRdb::default_graph(&Driver::open_in_memory()?, options)?;
    for triple in [
        Triple::new(ex("p1"), ex("name"), Literal::from("Alice")),
        Triple::new(ex("p1"), ex("age"), Literal::from(30)),
        Triple::new(ex("p2"), ex("name"), Literal::from("Bob")),
        Triple::new(ex("p2"), ex("age"), Literal::from(25)),
        Triple::new(ex("p1"), ex("knows"), ex("p2")),
    ] {
        graph.add(&triple)?;
    }
    Ok(graph)
}

fn alice_patterns() -> [TriplePattern; 2] {
    [
        TriplePattern::new(var("x"), ex("age"), var("n")),
        TriplePattern::new(var("x"), ex("name"), Literal::from("Alice")),
    ]
}

#[test]
fn test_join_is_compiled_into_one_statement() -> Result<(), Box<dyn Error>> {
    let graph = people(GraphOptions::new())?;
    let mut variables = VariableMap::new();
    let pipeline = graph.prepare(&alice_patterns(), &mut variables)?;
    assert_eq!(pipeline.stage_count(), 1);
    assert_eq!(pipeline.variables(), [var("x"), var("n")]);
    let queries = pipeline.queries().collect::<Vec<_>>();
    assert_eq!(queries.len(), 1);
    let id = graph.id();
    assert_eq!(
        queries[0].sql(),
        format!(
            "SELECT A0.S, A1.O FROM rdb_stmt A0, rdb_stmt A1 WHERE A0.G = {id} AND A0.P = '<http://example.com/name>' AND A0.O = '\"Alice\"' AND A1.G = {id} AND A1.S = A0.S AND A1.P = '<http://example.com/age>'"
        )
    );
    assert!(queries[0].arguments().is_empty());
    assert_eq!(queries[0].results(), [0, 1]);
    assert!(!queries[0].is_cacheable());

    let solutions = pipeline
        .run(Domain::new())?
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].get("x"), Some(&ex("p1").into()));
    assert_eq!(solutions[0].get("n"), Some(&Literal::from(30).into()));
    Ok(())
}

#[test]
fn test_generic_stages_give_the_same_solutions() -> Result<(), Box<dyn Error>> {
    let graph = people(GraphOptions::new().without_fast_path())?;
    let pipeline = graph.prepare(&alice_patterns(), &mut VariableMap::new())?;
    assert_eq!(pipeline.stage_count(), 2);
    assert_eq!(pipeline.queries().count(), 0);
    let solutions = pipeline
        .run(Domain::new())?
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].get(&var("x")), Some(&ex("p1").into()));
    assert_eq!(solutions[0].get(&var("n")), Some(&Literal::from(30).into()));
    Ok(())
}

#[test]
fn test_absorbed_patterns_extend_the_join() -> Result<(), Box<dyn Error>> {
    let graph = people(GraphOptions::new())?;
    let pipeline = graph.prepare(
        &[
            TriplePattern::new(var("x"), ex("knows"), var("y")),
            TriplePattern::new(var("y"), ex("name"), var("n")),
            TriplePattern::new(var("x"), ex("name"), Literal::from("Alice")),
        ],
        &mut VariableMap::new(),
    )?;
    assert_eq!(pipeline.stage_count(), 1);
    let solutions = pipeline
        .run(Domain::new())?
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].get("y"), Some(&ex("p2").into()));
    assert_eq!(solutions[0].get("n"), Some(&Literal::from("Bob").into()));
    Ok(())
}

#[test]
fn test_disconnected_patterns() -> Result<(), Box<dyn Error>> {
    let graph = people(GraphOptions::new())?;
    let pipeline = graph.prepare(
        &[
            TriplePattern::new(var("x"), ex("name"), var("n")),
            TriplePattern::new(var("y"), ex("age"), var("a")),
        ],
        &mut VariableMap::new(),
    )?;
    assert_eq!(pipeline.stage_count(), 2);
    let solutions = pipeline
        .run(Domain::new())?
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(solutions.len(), 4);
    assert!(solutions.iter().all(|s| s.iter().count() == 4));
    Ok(())
}

#[test]
fn test_incoming_bindings_are_arguments() -> Result<(), Box<dyn Error>> {
    let graph = people(GraphOptions::new())?;
    let mut variables = VariableMap::new();
    let x = variables.bind(&var("x"));
    let pipeline = graph.prepare(
        &[
            TriplePattern::new(var("x"), ex("knows"), var("y")),
            TriplePattern::new(var("y"), ex("name"), var("n")),
        ],
        &mut variables,
    )?;
    let queries = pipeline.queries().collect::<Vec<_>>();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].arguments(), [x]);
    assert_eq!(queries[0].results().len(), 2);
    assert!(queries[0].is_cacheable());

    let mut alice = Domain::new();
    alice.set(x, ex("p1").into());
    let mut bob = Domain::new();
    bob.set(x, ex("p2").into());
    let solutions = pipeline
        .run_all([alice, bob, Domain::new()])?
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].get("x"), Some(&ex("p1").into()));
    assert_eq!(solutions[0].get("n"), Some(&Literal::from("Bob").into()));
    Ok(())
}

#[test]
fn test_unsatisfiable_query_is_empty() -> Result<(), Box<dyn Error>> {
    let graph = people(GraphOptions::new())?;
    let pipeline = graph.prepare(
        &[
            TriplePattern::new(var("x"), ex("name"), var("n")),
            TriplePattern::new(Literal::from("Alice"), ex("name"), var("n")),
        ],
        &mut VariableMap::new(),
    )?;
    assert!(pipeline.queries().all(|q| q.is_empty()));
    assert_eq!(pipeline.variables(), [var("x"), var("n")]);
    assert_eq!(pipeline.run(Domain::new())?.count(), 0);

    let solutions = graph.query(&[TriplePattern::new(var("x"), ex("name"), Literal::from("Carol"))])?;
    assert_eq!(solutions.count(), 0);
    Ok(())
}

#[test]
fn test_reified_statements_are_queried_in_the_reification_table() -> Result<(), Box<dyn Error>> {
    let patterns = [
        TriplePattern::new(var("r"), rdf::SUBJECT, var("s")),
        TriplePattern::new(var("r"), rdf::OBJECT, var("o")),
        TriplePattern::new(var("r"), rdf::TYPE, rdf::STATEMENT),
    ];
    for options in [
        GraphOptions::new(),
        GraphOptions::new().with_full_reification(),
    ] {
        let full_reification = options.full_reification();
        let graph = people(options)?;
        let statement = Triple::new(ex("p1"), ex("knows"), ex("p2"));
        graph.reifier().reify(&ex("r").into(), &statement)?;

        let pipeline = graph.prepare(&patterns, &mut VariableMap::new())?;
        let queries = pipeline.queries().collect::<Vec<_>>();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].is_reifier());
        assert_eq!(queries[0].sql().contains("rdb_reif A1"), !full_reification);

        let solutions = pipeline
            .run(Domain::new())?
            .map(|s| s.map(QuerySolution::into_domain))
            .collect::<Result<Vec<_>, _>>()?;
        let mut expected = Domain::new();
        expected.set(0, ex("r").into());
        expected.set(1, ex("p1").into());
        expected.set(2, ex("p2").into());
        assert_eq!(solutions, [expected]);
    }
    Ok(())
}

#[test]
fn test_storage_errors_reach_the_consumer() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let path = dir.path().join("graphs.db");
    let graph = GraphRdb::create(&Driver::open(&path)?, "people", GraphOptions::new())?;
    graph.add(&Triple::new(ex("p1"), ex("name"), Literal::from("Alice")))?;
    let connection = Connection::open(&path)?;
    for (predicate, object) in [("age", "\"30\""), ("name", "\"Zed\"")] {
        connection.execute(
            "INSERT INTO rdb_stmt (G, S, P, O) VALUES (?1, 'not a node', ?2, ?3)",
            rusqlite::params![
                graph.id().as_i64(),
                ex(predicate).to_string(),
                object
            ],
        )?;
    }

    for patterns in [
        vec![TriplePattern::new(var("x"), ex("age"), var("n"))],
        vec![
            TriplePattern::new(var("x"), ex("age"), var("n")),
            TriplePattern::new(var("x"), ex("name"), var("m")),
        ],
    ] {
        let mut solutions = graph.query(&patterns)?;
        assert!(matches!(
            solutions.next(),
            Some(Err(QueryError::Storage(StorageError::Corruption(_))))
        ));
        assert!(solutions.next().is_none());
    }
    Ok(())
}

#[test]
fn test_solutions_are_exactly_the_matching_triples() -> Result<(), Box<dyn Error>> {
    let bob = Literal::from("bob");
    for options in [GraphOptions::new(), GraphOptions::new().without_fast_path()] {
        let graph = people(options)?;
        for (subject, object) in [
            ("p1", bob.clone()),
            ("p2", bob.clone()),
            ("p3", Literal::from("carol")),
        ] {
            graph.add(&Triple::new(ex(subject), ex("knows"), object))?;
        }
        let x = var("x");
        let solutions = graph
            .query(&[TriplePattern::new(x.clone(), ex("knows"), bob.clone())])?
            .collect::<Result<Vec<_>, _>>()?;
        let mut subjects = Vec::new();
        for solution in &solutions {
            let Some(Term::NamedNode(subject)) = solution.get(&x) else {
                panic!("?x must be bound to an IRI");
            };
            assert!(graph.contains(&Triple::new(subject.clone(), ex("knows"), bob.clone()))?);
            subjects.push(subject.clone());
        }
        subjects.sort_by_key(ToString::to_string);
        assert_eq!(subjects, [ex("p1"), ex("p2")]);
        assert!(!graph.contains(&Triple::new(ex("p3"), ex("knows"), bob.clone()))?);
        assert_eq!(
            graph
                .find(&TripleMatch::new(None, Some(ex("knows").into()), Some(bob.clone().into())))?
                .len(),
            solutions.len()
        );
    }
    Ok(())
}

#[test]
fn test_writes_while_solutions_are_pending() -> Result<(), Box<dyn Error>> {
    let graph = people(GraphOptions::new().with_pipeline_buffer(1))?;
    let mut solutions = graph.query(&[TriplePattern::new(var("x"), ex("name"), var("n"))])?;
    assert!(solutions.next().transpose()?.is_some());
    // The stage is blocked on its output channel without holding the connection
    graph.add(&Triple::new(ex("p3"), ex("name"), Literal::from("Carol")))?;
    assert_eq!(solutions.count(), 1);
    assert_eq!(graph.query(&[TriplePattern::new(var("x"), ex("name"), var("n"))])?.count(), 3);
    Ok(())
}
