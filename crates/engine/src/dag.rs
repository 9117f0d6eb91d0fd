//! Dependency materialization and DAG validation.
//!
//! Rules enforced before any adjacency is written:
//! 1. Job names must be unique within the workflow.
//! 2. Every dependency must reference declared job names (both `from` and `to`).
//! 3. The directed graph (existing edges plus pending ones) must be acyclic.
//!
//! Validation returns job names in topological order.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::{EngineError, JobNode};

/// One `from → to` declaration recorded by `Workflow::run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub from: String,
    pub to: String,
}

/// Validate `pending` against `jobs`, then write `incoming`/`outgoing` on both
/// endpoints of every pair.  On error no node is touched.
pub fn materialize(jobs: &mut [JobNode], pending: &[Dependency]) -> Result<Vec<String>, EngineError> {
    let order = validate(jobs, pending)?;

    for dep in pending {
        if let Some(from) = jobs.iter_mut().find(|j| j.name == dep.from) {
            from.outgoing.insert(dep.to.clone());
        }
        if let Some(to) = jobs.iter_mut().find(|j| j.name == dep.to) {
            to.incoming.insert(dep.from.clone());
        }
    }

    Ok(order)
}

/// Check the graph formed by the jobs' current `outgoing` sets plus `pending`
/// and return job names in topological order.
///
/// # Errors
/// - [`EngineError::DuplicateJobName`] if two jobs share a name.
/// - [`EngineError::UnknownJobReference`] if a pair names a missing job.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn validate(jobs: &[JobNode], pending: &[Dependency]) -> Result<Vec<String>, EngineError> {
    let mut names: HashSet<&str> = HashSet::new();
    for job in jobs {
        if !names.insert(job.name.as_str()) {
            return Err(EngineError::DuplicateJobName(job.name.clone()));
        }
    }

    for dep in pending {
        if !names.contains(dep.from.as_str()) {
            return Err(EngineError::UnknownJobReference {
                name: dep.from.clone(),
                side: "from",
            });
        }
        if !names.contains(dep.to.as_str()) {
            return Err(EngineError::UnknownJobReference {
                name: dep.to.clone(),
                side: "to",
            });
        }
    }

    // Kahn's algorithm over a de-duplicated edge set.
    let mut edges: HashSet<(&str, &str)> = HashSet::new();
    for job in jobs {
        for to in &job.outgoing {
            if !names.contains(to.as_str()) {
                return Err(EngineError::UnknownJobReference {
                    name: to.clone(),
                    side: "to",
                });
            }
            edges.insert((job.name.as_str(), to.as_str()));
        }
    }
    for dep in pending {
        edges.insert((dep.from.as_str(), dep.to.as_str()));
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = jobs.iter().map(|j| (j.name.as_str(), 0)).collect();
    for &(from, to) in &edges {
        adjacency.entry(from).or_default().push(to);
        *in_degree.entry(to).or_insert(0) += 1;
    }

    // Seed in declaration order so the result is deterministic.
    let mut queue: VecDeque<&str> = jobs
        .iter()
        .map(|j| j.name.as_str())
        .filter(|name| in_degree.get(name) == Some(&0))
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(jobs.len());
    while let Some(name) = queue.pop_front() {
        sorted.push(name.to_owned());

        if let Some(neighbours) = adjacency.get_mut(name) {
            neighbours.sort_by_key(|n| position(jobs, n));
            for &neighbour in neighbours.iter() {
                if let Some(deg) = in_degree.get_mut(neighbour) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(neighbour);
                    }
                }
            }
        }
    }

    if sorted.len() != jobs.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(sorted)
}

fn position(jobs: &[JobNode], name: &str) -> usize {
    jobs.iter().position(|j| j.name == name).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn job(name: &str) -> JobNode {
        JobNode::new(name, name, Value::Null)
    }

    fn dep(from: &str, to: &str) -> Dependency {
        Dependency { from: from.into(), to: to.into() }
    }

    #[test]
    fn linear_chain_returns_sorted_order() {
        // A → B → C
        let mut jobs = vec![job("c"), job("b"), job("a")];
        let order = materialize(&mut jobs, &[dep("a", "b"), dep("b", "c")]).expect("valid");
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn diamond_wires_both_sides_of_every_edge() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let mut jobs = vec![job("a"), job("b"), job("c"), job("d")];
        let order = materialize(
            &mut jobs,
            &[dep("a", "b"), dep("a", "c"), dep("b", "d"), dep("c", "d")],
        )
        .expect("valid");

        assert_eq!(order, vec!["a", "b", "c", "d"]);
        assert_eq!(jobs[0].outgoing.iter().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(jobs[3].incoming.iter().collect::<Vec<_>>(), vec!["b", "c"]);

        for from in &jobs {
            for to_name in &from.outgoing {
                let to = jobs.iter().find(|j| &j.name == to_name).unwrap();
                assert!(to.incoming.contains(&from.name));
            }
        }
    }

    #[test]
    fn duplicate_job_name_is_rejected() {
        let mut jobs = vec![job("a"), job("a")];
        assert!(matches!(
            materialize(&mut jobs, &[]),
            Err(EngineError::DuplicateJobName(name)) if name == "a"
        ));
    }

    #[test]
    fn unknown_reference_fails_without_touching_nodes() {
        let mut jobs = vec![job("a"), job("b")];
        let result = materialize(&mut jobs, &[dep("a", "b"), dep("ghost", "b")]);

        assert!(matches!(
            result,
            Err(EngineError::UnknownJobReference { name, side: "from" }) if name == "ghost"
        ));
        assert!(jobs.iter().all(|j| j.incoming.is_empty() && j.outgoing.is_empty()));
    }

    #[test]
    fn cycle_is_detected() {
        // A → B → C → A
        let mut jobs = vec![job("a"), job("b"), job("c")];
        let result = materialize(&mut jobs, &[dep("a", "b"), dep("b", "c"), dep("c", "a")]);
        assert!(matches!(result, Err(EngineError::CycleDetected)));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut jobs = vec![job("a")];
        assert!(matches!(
            materialize(&mut jobs, &[dep("a", "a")]),
            Err(EngineError::CycleDetected)
        ));
    }

    #[test]
    fn cycle_through_existing_edges_is_detected() {
        let mut jobs = vec![job("a"), job("b")];
        materialize(&mut jobs, &[dep("a", "b")]).unwrap();
        assert!(matches!(
            materialize(&mut jobs, &[dep("b", "a")]),
            Err(EngineError::CycleDetected)
        ));
    }

    #[test]
    fn repeated_pair_is_recorded_once() {
        let mut jobs = vec![job("a"), job("b")];
        materialize(&mut jobs, &[dep("a", "b"), dep("a", "b")]).unwrap();
        assert_eq!(jobs[1].incoming.len(), 1);
    }
}
