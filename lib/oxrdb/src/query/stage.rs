use crate::error::{CompileError, QueryError, StorageError};
use crate::graph::{CompletionFlag, SpecializedGraph};
use crate::model::{Term, Triple, TripleMatch, Variable};
use crate::query::db_query::DbQuery;
use crate::query::pattern::{PatternDescriptor, PatternElement};
use crate::query::{Domain, QuerySolution, VariableMap};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, trace};

type Binding = Result<Domain, QueryError>;

/// One step of a [`QueryPipeline`].
#[derive(Clone)]
pub(crate) enum Stage {
    /// A compiled SQL statement, executed once per incoming binding.
    Query(Arc<DbQuery>),
    /// A single pattern evaluated with `find` on its sources.
    Pattern(Arc<PatternStage>),
}

impl Stage {
    fn evaluate(&self, input: &Domain) -> Result<Vec<Domain>, StorageError> {
        match self {
            Self::Query(query) => query.execute(input),
            Self::Pattern(pattern) => pattern.evaluate(input),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Self::Query(query) if query.is_empty())
    }

    /// Starts a worker reading `upstream` and returns the channel of its output bindings.
    fn deliver(
        &self,
        upstream: Receiver<Binding>,
        buffer: usize,
        position: usize,
    ) -> Result<(Receiver<Binding>, Option<JoinHandle<()>>), QueryError> {
        if self.is_empty() {
            // The sender is dropped right away, closing the output.
            let (_, receiver) = bounded(0);
            return Ok((receiver, None));
        }
        let (sender, receiver) = bounded(buffer);
        let stage = self.clone();
        let handle = thread::Builder::new()
            .name(format!("oxrdb-stage-{position}"))
            .spawn(move || stage.run(&upstream, &sender))
            .map_err(|e| QueryError::Worker(format!("Failed to spawn stage {position}: {e}")))?;
        Ok((receiver, Some(handle)))
    }

    fn run(&self, upstream: &Receiver<Binding>, downstream: &Sender<Binding>) {
        for input in upstream {
            let outputs = match input {
                Ok(input) => match self.evaluate(&input) {
                    Ok(outputs) => outputs,
                    Err(e) => {
                        error!("Query stage failed: {e}");
                        downstream.send(Err(e.into())).ok();
                        return;
                    }
                },
                Err(e) => {
                    downstream.send(Err(e)).ok();
                    return;
                }
            };
            for output in outputs {
                if downstream.send(Ok(output)).is_err() {
                    // Nobody is listening anymore
                    return;
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Any,
    Constant(Term),
    Input(usize),
    Output(usize),
}

/// Evaluation of a single pattern through the `find` operation of its sources.
pub(crate) struct PatternStage {
    index: usize,
    slots: [Slot; 3],
    sources: Vec<Arc<dyn SpecializedGraph>>,
}

impl PatternStage {
    pub fn new(descriptor: &PatternDescriptor, variables: &VariableMap) -> Result<Self, QueryError> {
        let slot = |element: &PatternElement| -> Result<Slot, CompileError> {
            Ok(match element {
                PatternElement::Any => Slot::Any,
                PatternElement::Fixed(node) => Slot::Constant(node.clone()),
                PatternElement::Bound(slot) => Slot::Input(*slot),
                PatternElement::Free(variable) => Slot::Output(
                    variables
                        .slot(variable)
                        .ok_or_else(|| CompileError::UnknownVariable(variable.clone()))?,
                ),
            })
        };
        Ok(Self {
            index: descriptor.index(),
            slots: [
                slot(&descriptor.subject)?,
                slot(&descriptor.predicate)?,
                slot(&descriptor.object)?,
            ],
            sources: descriptor.sources()?.to_vec(),
        })
    }

    fn evaluate(&self, input: &Domain) -> Result<Vec<Domain>, StorageError> {
        let mut nodes = [None, None, None];
        for (node, slot) in nodes.iter_mut().zip(&self.slots) {
            *node = match slot {
                Slot::Constant(value) => Some(value.clone()),
                Slot::Input(slot) => {
                    let Some(value) = input.get(*slot) else {
                        return Ok(Vec::new());
                    };
                    Some(value.clone())
                }
                Slot::Any | Slot::Output(_) => None,
            };
        }
        let [subject, predicate, object] = nodes;
        let pattern = TripleMatch::new(subject, predicate, object);
        if pattern.is_unsatisfiable() {
            return Ok(Vec::new());
        }
        let mut outputs = Vec::new();
        for source in &self.sources {
            let mut complete = CompletionFlag::new();
            outputs.extend(
                source
                    .find(&pattern, &mut complete)?
                    .iter()
                    .filter_map(|triple| self.bind(input, triple)),
            );
            if complete.is_done() {
                break;
            }
        }
        trace!("Pattern {} produced {} bindings", self.index, outputs.len());
        Ok(outputs)
    }

    /// Extends the input with the nodes of the triple, if a variable repeated inside the pattern
    /// gets the same node each time.
    fn bind(&self, input: &Domain, triple: &Triple) -> Option<Domain> {
        let mut output = input.clone();
        let nodes = [
            Term::from(triple.subject.clone()),
            triple.predicate.clone().into(),
            triple.object.clone(),
        ];
        for (slot, node) in self.slots.iter().zip(nodes) {
            let Slot::Output(slot) = slot else {
                continue;
            };
            match output.get(*slot) {
                Some(existing) if *existing != node => return None,
                Some(_) => (),
                None => output.set(*slot, node),
            }
        }
        Some(output)
    }
}

/// The executable form of a triple pattern query: a chain of stages.
///
/// Each run starts one worker thread per stage, connected by bounded channels.
/// Dropping the returned iterator stops the workers.
///
/// A stage reads all the rows matching one incoming binding before sending any of them,
/// so the database connection is never held while a stage waits on its output channel.
/// The channels bound the number of pending bindings between stages,
/// but the rows produced from a single binding are held in memory at once:
/// the first stage of a top-level query holds its whole result.
pub struct QueryPipeline {
    stages: Vec<Stage>,
    variables: Arc<[Variable]>,
    buffer: usize,
}

impl QueryPipeline {
    pub(crate) fn new(stages: Vec<Stage>, variables: &VariableMap, buffer: usize) -> Self {
        Self {
            stages,
            variables: variables.variables().into(),
            buffer: buffer.max(1),
        }
    }

    /// The variables of the solutions, indexed by slot.
    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    #[inline]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// The compiled SQL statements, in evaluation order.
    pub fn queries(&self) -> impl Iterator<Item = &DbQuery> {
        self.stages.iter().filter_map(|stage| match stage {
            Stage::Query(query) => Some(query.as_ref()),
            Stage::Pattern(_) => None,
        })
    }

    /// Runs the pipeline from a single binding, the empty one for a top-level query.
    pub fn run(&self, input: Domain) -> Result<QuerySolutionIter, QueryError> {
        self.run_all([input])
    }

    /// Runs the pipeline once for each of the input bindings.
    pub fn run_all(
        &self,
        inputs: impl IntoIterator<Item = Domain>,
    ) -> Result<QuerySolutionIter, QueryError> {
        let (sender, mut receiver) = unbounded();
        for input in inputs {
            sender
                .send(Ok(input))
                .map_err(|_| QueryError::Worker("The query input channel is closed".into()))?;
        }
        drop(sender);
        let mut workers = Vec::new();
        for (position, stage) in self.stages.iter().enumerate() {
            let (next, worker) = stage.deliver(receiver, self.buffer, position)?;
            receiver = next;
            workers.extend(worker);
        }
        Ok(QuerySolutionIter {
            variables: Arc::clone(&self.variables),
            receiver,
            workers,
        })
    }
}

/// An iterator over the solutions of a query.
///
/// An error ends the iteration.
pub struct QuerySolutionIter {
    variables: Arc<[Variable]>,
    receiver: Receiver<Binding>,
    workers: Vec<JoinHandle<()>>,
}

impl QuerySolutionIter {
    /// The variables of the solutions, indexed by slot.
    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }
}

impl Iterator for QuerySolutionIter {
    type Item = Result<QuerySolution, QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Ok(binding) = self.receiver.recv() {
            return Some(binding.map(|values| QuerySolution::new(Arc::clone(&self.variables), values)));
        }
        for worker in mem::take(&mut self.workers) {
            if worker.join().is_err() {
                return Some(Err(QueryError::Worker("A query stage panicked".into())));
            }
        }
        None
    }
}
