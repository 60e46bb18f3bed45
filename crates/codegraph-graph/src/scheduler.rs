//! Dependency Scheduler (C2, §4.2). Builds a dependency graph over
//! entities and emits a deterministic, dependency-ordered sequence of
//! processing levels, folding unresolved cycles into single `is_cycle`
//! levels via Tarjan's SCC as Kahn's algorithm runs out of zero-in-degree
//! nodes.
//!
//! Represented as arena indices rather than pointers (§9 "Cyclic
//! dependency graph"), which turns Tarjan's SCC into a plain index walk
//! with an explicit stack instead of needing `Rc`/`RefCell` cycles.

use codegraph_core::{Entity, EntityId, Relationship};
use std::collections::{BTreeSet, HashMap, HashSet};

/// `{entity_id, kind, depends_on, depended_by}` (§3 "Dependency node").
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub entity_id: EntityId,
    pub depends_on: BTreeSet<EntityId>,
    pub depended_by: BTreeSet<EntityId>,
}

/// `{level, entity_ids, is_cycle, cycle_size?}` (§3 "Processing level").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingLevel {
    pub level: usize,
    pub entity_ids: Vec<EntityId>,
    pub is_cycle: bool,
    pub cycle_size: Option<usize>,
}

/// `{levels, total_entities, cycle_count, entities_in_cycles}` (§4.2
/// "Outputs").
#[derive(Debug, Clone, Default)]
pub struct ProcessingOrder {
    pub levels: Vec<ProcessingLevel>,
    pub total_entities: usize,
    pub cycle_count: usize,
    pub entities_in_cycles: usize,
}

impl ProcessingOrder {
    /// Map from entity id to the level it was scheduled into; used by
    /// property tests (§8) and by callers that want "is `d` done yet".
    pub fn level_of(&self, id: EntityId) -> Option<usize> {
        self.levels
            .iter()
            .find(|lvl| lvl.entity_ids.contains(&id))
            .map(|lvl| lvl.level)
    }

    pub fn leaf_count(&self, nodes: &HashMap<EntityId, DependencyNode>) -> usize {
        nodes.values().filter(|n| n.depends_on.is_empty()).count()
    }

    pub fn root_count(&self, nodes: &HashMap<EntityId, DependencyNode>) -> usize {
        nodes.values().filter(|n| n.depended_by.is_empty()).count()
    }

    pub fn max_depth(&self) -> usize {
        self.levels.last().map(|l| l.level).unwrap_or(0)
    }
}

/// Builds the dependency node map from entities and relationships (§4.2
/// "Graph construction"). `contains`/`has_method` edges are structural and
/// are not scheduling edges; edges whose endpoint is outside `entities`
/// are dropped.
pub fn build_dependency_nodes(
    entities: &[Entity],
    relationships: &[Relationship],
) -> HashMap<EntityId, DependencyNode> {
    let known: HashSet<EntityId> = entities.iter().map(|e| e.id).collect();
    let mut nodes: HashMap<EntityId, DependencyNode> = entities
        .iter()
        .map(|e| {
            (
                e.id,
                DependencyNode {
                    entity_id: e.id,
                    depends_on: BTreeSet::new(),
                    depended_by: BTreeSet::new(),
                },
            )
        })
        .collect();

    for rel in relationships {
        if !rel.kind.implies_dependency() {
            continue;
        }
        if !known.contains(&rel.from) || !known.contains(&rel.to) {
            continue;
        }
        if rel.from == rel.to {
            // Self-loop: recorded as a dependency on itself so it is
            // detected as a size-1 cyclic level (§4.2 "self-loops are
            // treated as single-node SCCs").
            nodes.get_mut(&rel.from).unwrap().depends_on.insert(rel.to);
            nodes.get_mut(&rel.to).unwrap().depended_by.insert(rel.from);
            continue;
        }
        nodes.get_mut(&rel.from).unwrap().depends_on.insert(rel.to);
        nodes.get_mut(&rel.to).unwrap().depended_by.insert(rel.from);
    }

    nodes
}

/// Kahn's topological sort with Tarjan fallback for residual cycles
/// (§4.2 "Ordering algorithm").
pub fn schedule(nodes: &HashMap<EntityId, DependencyNode>) -> ProcessingOrder {
    let mut in_degree: HashMap<EntityId, usize> = nodes
        .iter()
        .map(|(id, n)| (*id, n.depends_on.len()))
        .collect();
    let mut remaining: HashSet<EntityId> = nodes.keys().copied().collect();
    let mut levels = Vec::new();
    let mut level_idx = 0usize;
    let mut entities_in_cycles = 0usize;
    let mut cycle_count = 0usize;

    while !remaining.is_empty() {
        let mut zero_in_degree: Vec<EntityId> = remaining
            .iter()
            .copied()
            .filter(|id| in_degree.get(id).copied().unwrap_or(0) == 0)
            .collect();
        zero_in_degree.sort();

        if !zero_in_degree.is_empty() {
            for id in &zero_in_degree {
                remaining.remove(id);
                // Decrement in-degree of dependents still pending.
                for dependent in &nodes[id].depended_by {
                    if remaining.contains(dependent) {
                        if let Some(d) = in_degree.get_mut(dependent) {
                            *d = d.saturating_sub(1);
                        }
                    }
                }
            }
            levels.push(ProcessingLevel {
                level: level_idx,
                entity_ids: zero_in_degree,
                is_cycle: false,
                cycle_size: None,
            });
            level_idx += 1;
            continue;
        }

        // No zero-in-degree node remains but entities persist: the rest is
        // one or more cycles. Run Tarjan's SCC restricted to `remaining`
        // and peel off SCCs one at a time, smallest entity id first for
        // determinism, so multiple independent cycles still get stable,
        // reproducible level numbers.
        let sccs = tarjan_scc(nodes, &remaining);
        if sccs.is_empty() {
            // Unreachable under the invariants (§4.2 "Failure semantics"):
            // log and stop, leaving the remainder as one final level.
            tracing::error!(
                "dependency scheduler: {} entities remain but Tarjan found no SCC; \
                 emitting them as a final isolated level",
                remaining.len()
            );
            let mut leftover: Vec<EntityId> = remaining.drain().collect();
            leftover.sort();
            levels.push(ProcessingLevel {
                level: level_idx,
                entity_ids: leftover,
                is_cycle: false,
                cycle_size: None,
            });
            break;
        }

        for mut scc in sccs {
            scc.sort();
            let size = scc.len();
            for id in &scc {
                remaining.remove(id);
            }
            for id in &scc {
                // Same decrement the Kahn branch above does for a peeled
                // node's dependents, so a node depending only on this SCC
                // can reach zero in-degree on a later iteration instead of
                // falling into the "no SCC found" branch below.
                for dependent in &nodes[id].depended_by {
                    if remaining.contains(dependent) {
                        if let Some(d) = in_degree.get_mut(dependent) {
                            *d = d.saturating_sub(1);
                        }
                    }
                }
            }
            entities_in_cycles += size;
            cycle_count += 1;
            levels.push(ProcessingLevel {
                level: level_idx,
                entity_ids: scc,
                is_cycle: true,
                cycle_size: Some(size),
            });
            level_idx += 1;
        }
    }

    ProcessingOrder {
        total_entities: nodes.len(),
        cycle_count,
        entities_in_cycles,
        levels,
    }
}

/// Tarjan's SCC restricted to `scope`, returning every SCC of size >= 2
/// plus any self-looped singleton (§4.2). Implemented with an explicit
/// stack (no recursion) over arena-style indices into `scope`.
fn tarjan_scc(
    nodes: &HashMap<EntityId, DependencyNode>,
    scope: &HashSet<EntityId>,
) -> Vec<Vec<EntityId>> {
    let mut ordered: Vec<EntityId> = scope.iter().copied().collect();
    ordered.sort();
    let index_of: HashMap<EntityId, usize> = ordered
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();

    let n = ordered.len();
    let mut indices = vec![None; n];
    let mut low_links = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut sccs: Vec<Vec<EntityId>> = Vec::new();

    // Explicit work-stack DFS: each frame is (node, next child offset).
    for start in 0..n {
        if indices[start].is_some() {
            continue;
        }
        let mut call_stack: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(&mut (v, ref mut child_pos)) = call_stack.last_mut() {
            if indices[v].is_none() {
                indices[v] = Some(next_index);
                low_links[v] = next_index;
                next_index += 1;
                stack.push(v);
                on_stack[v] = true;
            }

            let neighbors: Vec<usize> = nodes[&ordered[v]]
                .depends_on
                .iter()
                .filter_map(|to| {
                    if scope.contains(to) {
                        index_of.get(to).copied()
                    } else {
                        None
                    }
                })
                .collect();

            if *child_pos < neighbors.len() {
                let w = neighbors[*child_pos];
                *child_pos += 1;
                if indices[w].is_none() {
                    call_stack.push((w, 0));
                } else if on_stack[w] {
                    low_links[v] = low_links[v].min(indices[w].unwrap());
                }
            } else {
                call_stack.pop();
                if let Some(idx_v) = indices[v] {
                    if low_links[v] == idx_v {
                        let mut component = Vec::new();
                        loop {
                            let w = stack.pop().unwrap();
                            on_stack[w] = false;
                            component.push(ordered[w]);
                            if w == v {
                                break;
                            }
                        }
                        let is_self_loop_singleton = component.len() == 1
                            && nodes[&component[0]].depends_on.contains(&component[0]);
                        if component.len() >= 2 || is_self_loop_singleton {
                            sccs.push(component);
                        }
                    }
                }
                if let Some(&(parent, _)) = call_stack.last() {
                    low_links[parent] = low_links[parent].min(low_links[v]);
                }
            }
        }
    }

    sccs
}
