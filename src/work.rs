//! Drives a graph to its fixpoint: decides which nodes are stale and runs
//! their rebuild actions, one concurrent pass per dependency depth.

use crate::graph::{FileId, Graph};
use crate::task::TaskResult;
use anyhow::bail;
use rayon::prelude::*;

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    None,
    InProgress,
    Done,
}

/// Computes a node's dependency depth, the longest path down to a leaf.
/// A back edge means the graph can never reach a fixpoint, so it's an error.
fn visit(
    graph: &Graph,
    id: FileId,
    visits: &mut Vec<Visit>,
    depths: &mut Vec<usize>,
) -> anyhow::Result<usize> {
    match visits[id.index()] {
        Visit::Done => return Ok(depths[id.index()]),
        Visit::InProgress => bail!("dependency cycle involving {}", graph.file(id).name),
        Visit::None => {}
    }
    visits[id.index()] = Visit::InProgress;
    let mut depth = 0;
    for &dep in graph.file(id).deps() {
        depth = depth.max(visit(graph, dep, visits, depths)? + 1);
    }
    visits[id.index()] = Visit::Done;
    depths[id.index()] = depth;
    Ok(depth)
}

/// Groups all nodes by dependency depth.  Processing the groups in order
/// guarantees a node is only examined after every node it depends on has
/// reached its final state, so one sweep reaches the fixpoint.
fn schedule(graph: &Graph) -> anyhow::Result<Vec<Vec<FileId>>> {
    let mut visits = vec![Visit::None; graph.len()];
    let mut depths = vec![0; graph.len()];
    for id in graph.all_ids() {
        visit(graph, id, &mut visits, &mut depths)?;
    }
    let mut layers = vec![Vec::new(); depths.iter().copied().max().map_or(0, |d| d + 1)];
    for id in graph.all_ids() {
        layers[depths[id.index()]].push(id);
    }
    Ok(layers)
}

/// One build session over a graph.  Create it, call `run`, and drop it;
/// the graph's recorded state carries over to the next session.
pub struct Work<'a> {
    graph: &'a mut Graph,
}

impl<'a> Work<'a> {
    pub fn new(graph: &'a mut Graph) -> Work<'a> {
        Work { graph }
    }

    /// Checks and rebuilds until nothing is stale.  Returns None if any
    /// rebuild action failed, otherwise the number of actions executed.
    ///
    /// Each pass covers one depth layer: staleness checks fan out in
    /// parallel over the layer, then the stale nodes' actions fan out in
    /// parallel, then their results are recorded.  Both fan-outs are full
    /// barriers, so a pass only ever reads state the previous passes
    /// finished writing.  A failure stops before the next pass; nodes that
    /// already completed keep their recorded state.
    pub fn run(&mut self) -> anyhow::Result<Option<usize>> {
        let layers = schedule(self.graph)?;
        let mut ran = 0;
        for layer in &layers {
            let graph = &*self.graph;
            let checks: std::io::Result<Vec<(FileId, bool)>> = layer
                .par_iter()
                .map(|&id| graph.needs_update(id).map(|stale| (id, stale)))
                .collect();
            let stale: Vec<FileId> = checks?
                .into_iter()
                .filter(|&(_, stale)| stale)
                .map(|(id, _)| id)
                .collect();
            if stale.is_empty() {
                continue;
            }

            let results: anyhow::Result<Vec<(FileId, TaskResult)>> = stale
                .par_iter()
                .map(|&id| graph.run_action(id).map(|result| (id, result)))
                .collect();

            let mut failed = false;
            for (id, result) in results? {
                self.graph.record_update(id)?;
                ran += 1;
                if !result.success {
                    failed = true;
                }
            }
            if failed {
                return Ok(None);
            }
        }
        Ok(Some(ran))
    }
}
