//! Reinsertion-based BVH optimization.
//!
//! Repeatedly detaches the least efficient nodes and reinserts each one
//! next to the subtree that minimizes the induced + direct SAH cost, then
//! re-linearizes the node array so siblings stay contiguous.

use super::Node;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const AREA_EPSILON: f32 = 1e-10;

/// Per-node inefficiency `m_sum * m_min * m_area`, computed bottom-up.
/// Leaves score zero so they are never detached.
fn compute_inefficiencies(nodes: &[Node]) -> Vec<f32> {
    let n = nodes.len();
    let mut inefficiencies = vec![0.0f32; n];
    let mut min_area = vec![0.0f32; n];
    let mut sum_area = vec![0.0f32; n];
    let mut num_children = vec![0usize; n];

    // Children are stored after their parent, so a reverse scan sees
    // every child before its parent.
    for i in (0..n).rev() {
        let node = &nodes[i];
        let area = node.bbox().half_area();
        if node.is_leaf() {
            inefficiencies[i] = 0.0;
            min_area[i] = area;
            sum_area[i] = area;
            num_children[i] = 1;
        } else {
            let child = node.first as usize;
            let next_num_children = num_children[child] + num_children[child + 1];
            let next_sum_area = sum_area[child] + sum_area[child + 1];
            let next_min_area = min_area[child].min(min_area[child + 1]).max(AREA_EPSILON);
            let m_sum = area / (next_sum_area / next_num_children as f32);
            let m_min = area / next_min_area;
            let m_area = area;
            inefficiencies[i] = m_sum * m_min * m_area;
            min_area[i] = next_min_area.min(area);
            sum_area[i] = next_sum_area + area;
            num_children[i] = next_num_children + 1;
        }
    }
    inefficiencies
}

/// Parent indices, recomputed from the child links. The root is its own
/// parent.
fn compute_parents(nodes: &[Node]) -> Vec<usize> {
    let mut parents = vec![0usize; nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        if !node.is_leaf() {
            let child = node.first as usize;
            parents[child] = i;
            parents[child + 1] = i;
        }
    }
    parents
}

/// Recompute ancestor bounds after a subtree changed under `node_id`.
fn refit_parents(nodes: &mut [Node], parents: &[usize], node_id: usize) {
    let mut cur = node_id;
    while cur != 0 {
        cur = parents[cur];
        debug_assert!(!nodes[cur].is_leaf());
        let child = nodes[cur].first as usize;
        nodes[cur].min = nodes[child].min.min(nodes[child + 1].min);
        nodes[cur].max = nodes[child].max.max(nodes[child + 1].max);
    }
}

/// Detach `node_id` by replacing its parent with its sibling. Returns the
/// index of the freed node pair.
fn remove_node(nodes: &mut [Node], parents: &mut [usize], node_id: usize) -> usize {
    let parent = parents[node_id];
    let free = nodes[parent].first as usize;
    debug_assert!(parent != node_id);
    debug_assert!(node_id == free || node_id == free + 1);
    let sibling = if free == node_id { free + 1 } else { free };

    nodes[parent] = nodes[sibling];
    if !nodes[sibling].is_leaf() {
        let child = nodes[sibling].first as usize;
        debug_assert_eq!(parents[child], sibling);
        debug_assert_eq!(parents[child + 1], sibling);
        parents[child] = parent;
        parents[child + 1] = parent;
    }
    refit_parents(nodes, parents, parent);
    free
}

struct Candidate {
    node_id: usize,
    induced_cost: f32,
    priority: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.total_cmp(&other.priority)
    }
}

/// Best-first search for the subtree whose extension by `node` costs the
/// least (induced ancestor growth plus the direct union area).
fn find_reinsertion(nodes: &[Node], node: &Node) -> usize {
    const EPSILON: f32 = 1e-20;

    let node_area = node.bbox().half_area();
    let mut best_cost = f32::MAX;
    let mut best_id = 0;

    let mut candidates = BinaryHeap::new();
    candidates.push(Candidate {
        node_id: 0,
        induced_cost: 0.0,
        priority: 1.0 / EPSILON,
    });

    while let Some(candidate) = candidates.pop() {
        if candidate.induced_cost + node_area >= best_cost {
            break;
        }
        let cand_node = &nodes[candidate.node_id];
        let direct_cost = union_half_area(node, cand_node);
        let total_cost = candidate.induced_cost + direct_cost;
        if total_cost < best_cost {
            best_cost = total_cost;
            best_id = candidate.node_id;
        }
        let child_cost = total_cost - cand_node.bbox().half_area();
        if child_cost + node_area < best_cost && !cand_node.is_leaf() {
            let child = cand_node.first as usize;
            let priority = 1.0 / (child_cost + EPSILON);
            candidates.push(Candidate {
                node_id: child,
                induced_cost: child_cost,
                priority,
            });
            candidates.push(Candidate {
                node_id: child + 1,
                induced_cost: child_cost,
                priority,
            });
        }
    }
    best_id
}

fn union_half_area(a: &Node, b: &Node) -> f32 {
    let mut bb = a.bbox();
    bb.extend(&b.bbox());
    bb.half_area()
}

/// Reinsert `node` as a sibling of `pos`, reusing the freed pair.
fn reinsert_node(
    nodes: &mut [Node],
    parents: &mut [usize],
    node: Node,
    pos: usize,
    free: usize,
) {
    debug_assert!(pos != free && pos != free + 1);
    let other = nodes[pos];
    nodes[free] = node;
    nodes[free + 1] = other;
    if !node.is_leaf() {
        let child = node.first as usize;
        parents[child] = free;
        parents[child + 1] = free;
    }
    if !other.is_leaf() {
        let child = other.first as usize;
        parents[child] = free + 1;
        parents[child + 1] = free + 1;
    }
    parents[free] = pos;
    parents[free + 1] = pos;
    nodes[pos].min = node.min.min(other.min);
    nodes[pos].max = node.max.max(other.max);
    nodes[pos].first = free as u32;
    nodes[pos].count = 0;
    refit_parents(nodes, parents, pos);
}

/// Re-linearize so children follow their parent and sibling pairs stay
/// contiguous; rebuilds the parent array along the way.
fn reorder_nodes(nodes: &mut Vec<Node>, parents: &mut [usize]) {
    let mut tmp = vec![nodes[0]; nodes.len()];
    parents[0] = 0;
    if !nodes[0].is_leaf() {
        let mut stack = vec![0usize];
        let mut cur = 1;
        while let Some(parent_id) = stack.pop() {
            let child = tmp[parent_id].first as usize;
            parents[cur] = parent_id;
            parents[cur + 1] = parent_id;
            tmp[cur] = nodes[child];
            tmp[cur + 1] = nodes[child + 1];
            tmp[parent_id].first = cur as u32;
            if !tmp[cur].is_leaf() {
                stack.push(cur);
            }
            if !tmp[cur + 1].is_leaf() {
                stack.push(cur + 1);
            }
            cur += 2;
        }
    }
    std::mem::swap(nodes, &mut tmp);
}

/// Run `num_iters` passes of detach-and-reinsert over the top 10% of
/// nodes ranked by inefficiency (the root excluded).
pub(super) fn optimize(nodes: &mut Vec<Node>, num_iters: usize) {
    let num_nodes = nodes.len();
    if num_nodes <= 1 {
        return;
    }
    let num_ranks = num_nodes - 1;
    let mut parents = compute_parents(nodes);

    for _ in 0..num_iters {
        let batch_size = num_ranks / 10;
        if batch_size == 0 {
            return;
        }

        let inefficiencies = compute_inefficiencies(nodes);
        let mut ranks: Vec<usize> = (1..num_nodes).collect();
        let by_inefficiency =
            |a: &usize, b: &usize| inefficiencies[*b].total_cmp(&inefficiencies[*a]);
        ranks.select_nth_unstable_by(batch_size - 1, by_inefficiency);
        ranks[..batch_size].sort_unstable_by(by_inefficiency);

        for &rank in &ranks[..batch_size] {
            let node = nodes[rank];
            let free = remove_node(nodes, &mut parents, rank);
            let pos = find_reinsertion(nodes, &node);
            reinsert_node(nodes, &mut parents, node, pos, free);
        }
        reorder_nodes(nodes, &mut parents);
    }
}
