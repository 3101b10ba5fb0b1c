use crate::error::PlanningError;
use crate::model::Variable;
use crate::query::VariableMap;
use crate::query::pattern::PatternDescriptor;
use tracing::debug;

/// A group of patterns evaluated together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedStage {
    /// Indexes of the patterns, seed first.
    pub patterns: Vec<usize>,
    /// Number of variables bound before this stage.
    pub base: usize,
}

impl PlannedStage {
    /// Whether the patterns are compiled into a single SQL join.
    #[inline]
    pub fn is_joined(&self) -> bool {
        self.patterns.len() > 1
    }
}

/// Orders and groups the patterns into stages.
///
/// Repeatedly selects the cheapest unstaged pattern (the first one on ties) and, if it has a
/// single source and `fast_path` is set, absorbs in one pass the unstaged patterns joining with it.
/// The free variables of each stage are allocated slots in `variables` before the next selection.
pub(crate) fn plan(
    descriptors: &mut [PatternDescriptor],
    variables: &mut VariableMap,
    fast_path: bool,
) -> Result<Vec<PlannedStage>, PlanningError> {
    let mut stages = Vec::new();
    let mut remaining = descriptors.len();
    while remaining > 0 {
        let mut best: Option<(usize, u32)> = None;
        for (i, descriptor) in descriptors.iter_mut().enumerate() {
            if descriptor.staged {
                continue;
            }
            let cost = descriptor.cost()?;
            if best.is_none_or(|(_, best_cost)| cost < best_cost) {
                best = Some((i, cost));
            }
        }
        let Some((seed, cost)) = best else {
            break;
        };
        descriptors[seed].staged = true;
        remaining -= 1;

        let mut group = vec![seed];
        if fast_path && descriptors[seed].is_single_source() {
            let mut joined = Vec::<Variable>::new();
            extend_unique(&mut joined, descriptors[seed].free_nodes());
            for i in 0..descriptors.len() {
                if descriptors[i].staged || !descriptors[seed].joins_with(&descriptors[i], &joined) {
                    continue;
                }
                descriptors[i].staged = true;
                remaining -= 1;
                group.push(i);
                extend_unique(&mut joined, descriptors[i].free_nodes());
            }
        }
        debug!(
            "Planned stage seeded by pattern {seed} with cost {cost} grouping {} patterns",
            group.len()
        );

        let base = variables.len();
        let introduced = group
            .iter()
            .flat_map(|i| descriptors[*i].free_variables().cloned())
            .collect::<Vec<_>>();
        for variable in &introduced {
            variables.bind(variable);
        }
        for descriptor in descriptors.iter_mut().filter(|d| !d.staged) {
            descriptor.rebind(variables);
        }
        stages.push(PlannedStage {
            patterns: group,
            base,
        });
    }
    Ok(stages)
}

fn extend_unique<'a>(target: &mut Vec<Variable>, variables: impl Iterator<Item = &'a Variable>) {
    for variable in variables {
        if !target.contains(variable) {
            target.push(variable.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{SpecializedGraph, Subsumption};
    use crate::model::{Literal, TriplePattern};
    use crate::query::pattern::PatternElement;
    use crate::query::pattern::tests::{ex, statement_graph, var};
    use std::sync::Arc;

    fn descriptors(
        patterns: &[TriplePattern],
        sources: &[&Arc<dyn SpecializedGraph>],
        variables: &VariableMap,
    ) -> Result<Vec<PatternDescriptor>, PlanningError> {
        patterns
            .iter()
            .zip(sources)
            .enumerate()
            .map(|(i, (pattern, source))| {
                let mut descriptor = PatternDescriptor::new(i, pattern, variables);
                descriptor.record_source(Arc::clone(source), Subsumption::All)?;
                Ok(descriptor)
            })
            .collect()
    }

    #[test]
    fn joins_around_cheapest_pattern() -> Result<(), Box<dyn std::error::Error>> {
        let source = statement_graph(1)?;
        let mut variables = VariableMap::new();
        let mut descriptors = descriptors(
            &[
                TriplePattern::new(var("x"), ex("age"), var("n")),
                TriplePattern::new(var("x"), ex("name"), Literal::from("Alice")),
            ],
            &[&source, &source],
            &variables,
        )?;
        let stages = plan(&mut descriptors, &mut variables, true)?;
        assert_eq!(
            stages,
            [PlannedStage {
                patterns: vec![1, 0],
                base: 0
            }]
        );
        assert_eq!(variables.variables(), [var("x"), var("n")]);
        Ok(())
    }

    #[test]
    fn every_pattern_is_staged_once() -> Result<(), Box<dyn std::error::Error>> {
        let source = statement_graph(1)?;
        let other = statement_graph(2)?;
        let patterns = [
            TriplePattern::new(var("a"), ex("p"), var("b")),
            TriplePattern::new(var("c"), var("q"), var("d")),
            TriplePattern::new(var("b"), ex("p"), var("e")),
            TriplePattern::new(var("e"), ex("p"), ex("o")),
            TriplePattern::new(var("z"), ex("p"), ex("o")),
        ];
        for fast_path in [true, false] {
            let mut variables = VariableMap::new();
            let mut descriptors = descriptors(
                &patterns,
                &[&source, &source, &source, &other, &source],
                &variables,
            )?;
            let stages = plan(&mut descriptors, &mut variables, fast_path)?;
            let mut staged = stages
                .iter()
                .flat_map(|s| s.patterns.iter().copied())
                .collect::<Vec<_>>();
            staged.sort_unstable();
            assert_eq!(staged, [0, 1, 2, 3, 4]);
            assert!(descriptors.iter().all(|d| d.staged));
            if !fast_path {
                assert!(stages.iter().all(|s| !s.is_joined()));
            }
        }
        Ok(())
    }

    #[test]
    fn join_groups_share_source_and_fixed_predicates() -> Result<(), Box<dyn std::error::Error>> {
        let source = statement_graph(1)?;
        let other = statement_graph(2)?;
        let patterns = [
            TriplePattern::new(var("x"), ex("p"), ex("o")),
            TriplePattern::new(var("x"), var("q"), var("y")),
            TriplePattern::new(var("x"), ex("p"), var("z")),
            TriplePattern::new(var("x"), ex("r"), var("w")),
            TriplePattern::new(var("z"), ex("r"), var("v")),
        ];
        let mut variables = VariableMap::new();
        let mut descriptors = descriptors(
            &patterns,
            &[&source, &source, &source, &other, &source],
            &variables,
        )?;
        let stages = plan(&mut descriptors, &mut variables, true)?;
        assert_eq!(stages[0].patterns, [0, 2, 4]);
        for stage in stages.iter().filter(|s| s.is_joined()) {
            let seed = &descriptors[stage.patterns[0]];
            for i in &stage.patterns {
                let descriptor = &descriptors[*i];
                assert!(descriptor.predicate.as_fixed().is_some());
                assert_eq!(
                    descriptor.single_source().map(|s| s.id()),
                    seed.single_source().map(|s| s.id())
                );
            }
        }
        Ok(())
    }

    #[test]
    fn ties_pick_the_first_pattern() -> Result<(), Box<dyn std::error::Error>> {
        let source = statement_graph(1)?;
        let mut variables = VariableMap::new();
        let mut descriptors = descriptors(
            &[
                TriplePattern::new(var("a"), ex("p"), var("b")),
                TriplePattern::new(var("c"), ex("p"), var("d")),
            ],
            &[&source, &source],
            &variables,
        )?;
        let stages = plan(&mut descriptors, &mut variables, true)?;
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].patterns, [0]);
        assert_eq!(stages[1].patterns, [1]);
        assert_eq!(stages[1].base, 2);
        Ok(())
    }

    #[test]
    fn later_patterns_see_bound_variables() -> Result<(), Box<dyn std::error::Error>> {
        let source = statement_graph(1)?;
        let other = statement_graph(2)?;
        let mut variables = VariableMap::new();
        let mut descriptors = descriptors(
            &[
                TriplePattern::new(var("x"), ex("p"), ex("o")),
                TriplePattern::new(var("x"), ex("q"), var("y")),
            ],
            &[&source, &other],
            &variables,
        )?;
        let stages = plan(&mut descriptors, &mut variables, true)?;
        assert_eq!(stages.len(), 2);
        assert_eq!(descriptors[1].subject, PatternElement::Bound(0));
        assert_eq!(descriptors[1].object, PatternElement::Free(var("y")));
        Ok(())
    }
}
