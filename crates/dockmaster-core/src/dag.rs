//! Dependency-ordered sort over task groups.
//!
//! The orchestrator splits a work's beads into groups (one group per
//! proposed task) and must emit them in an order where every group appears
//! after all groups containing a bead it depends on. Groupings are never
//! split; only reordered. Cycles among groups are fatal.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

/// A proposed task grouping: a set of bead ids that will become one task.
#[derive(Debug, Clone)]
pub struct TaskGroup {
    /// Stable index identifying this group, used for tie-breaking and in
    /// error messages. Callers typically use the group's position in the
    /// input slice.
    pub index: usize,
    /// Bead ids assigned to this group.
    pub bead_ids: Vec<String>,
}

/// Errors from sorting task groups.
#[derive(Debug, Error)]
pub enum DagError {
    /// The group graph contains a cycle; the affected group indices are
    /// listed in ascending order.
    #[error("dependency cycle detected among task groups: {0:?}")]
    Cycle(Vec<usize>),
}

/// Sort `groups` so that every group appears after all groups containing a
/// bead that one of its own beads depends on.
///
/// `edges` lists `(bead, depends_on_bead)` pairs read from the issue
/// tracker. Dependencies on bead ids that appear in no group (external
/// dependencies) are ignored. Ties among groups with no remaining ordering
/// constraint are broken by ascending `index`, so the sort is deterministic
/// and test-stable. Uses Kahn's algorithm; a non-empty leftover set after
/// the main loop means a cycle, and every group still carrying positive
/// in-degree is reported as part of it.
pub fn sort_groups_by_dependencies(
    groups: &[TaskGroup],
    edges: &[(String, String)],
) -> Result<Vec<TaskGroup>, DagError> {
    let n = groups.len();

    // Map each bead id to the group index that contains it.
    let mut bead_to_group: HashMap<&str, usize> = HashMap::new();
    for group in groups {
        for bead in &group.bead_ids {
            bead_to_group.insert(bead.as_str(), group.index);
        }
    }

    // Build the group-level graph: edge group(dep) -> group(bead) whenever
    // bead depends on dep and both beads are assigned to (different) groups.
    let mut in_degree = vec![0usize; n];
    let mut adj: Vec<HashSet<usize>> = vec![HashSet::new(); n];
    let index_to_pos: HashMap<usize, usize> =
        groups.iter().enumerate().map(|(pos, g)| (g.index, pos)).collect();

    for (bead, dep_bead) in edges {
        let (Some(&bead_group), Some(&dep_group)) =
            (bead_to_group.get(bead.as_str()), bead_to_group.get(dep_bead.as_str()))
        else {
            // External dependency, or a bead not part of this planning pass.
            continue;
        };
        if bead_group == dep_group {
            continue;
        }
        let from_pos = index_to_pos[&dep_group];
        let to_pos = index_to_pos[&bead_group];
        if adj[from_pos].insert(to_pos) {
            in_degree[to_pos] += 1;
        }
    }

    // Kahn's algorithm, tie-broken by ascending group index for a
    // deterministic, test-stable order.
    let mut queue: VecDeque<usize> = VecDeque::new();
    for (pos, deg) in in_degree.iter().enumerate() {
        if *deg == 0 {
            queue.push_back(pos);
        }
    }
    let mut ordered_positions: Vec<usize> = Vec::with_capacity(n);

    while !queue.is_empty() {
        let mut ready: Vec<usize> = queue.drain(..).collect();
        ready.sort_by_key(|&pos| groups[pos].index);

        for pos in ready {
            ordered_positions.push(pos);
            for &neighbor in &adj[pos] {
                in_degree[neighbor] -= 1;
                if in_degree[neighbor] == 0 {
                    queue.push_back(neighbor);
                }
            }
        }
    }

    if ordered_positions.len() != n {
        let mut cycle_indices: Vec<usize> = (0..n)
            .filter(|&pos| in_degree[pos] > 0)
            .map(|pos| groups[pos].index)
            .collect();
        cycle_indices.sort_unstable();
        return Err(DagError::Cycle(cycle_indices));
    }

    Ok(ordered_positions.into_iter().map(|pos| groups[pos].clone()).collect())
}
