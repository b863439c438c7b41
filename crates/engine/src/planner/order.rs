//! Dependency graph checks and ordering.
//!
//! Nodes are addressed by their index in the input slice; `deps[i]` lists
//! the indices node `i` depends on.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Find one dependency cycle, returned as the node path with the first node
/// repeated at the end (`[a, b, a]`).
///
/// Iterative DFS with an explicit stack of `(node, next edge)` frames, so
/// deep chains do not exhaust the thread stack.
pub(crate) fn find_cycle(deps: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut marks = vec![Mark::Unvisited; deps.len()];
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..deps.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::OnStack;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let (node, edge) = *frame;
            if edge == deps[node].len() {
                marks[node] = Mark::Done;
                stack.pop();
                continue;
            }
            frame.1 += 1;

            let next = deps[node][edge];
            match marks[next] {
                Mark::Unvisited => {
                    marks[next] = Mark::OnStack;
                    stack.push((next, 0));
                }
                Mark::OnStack => {
                    let start = stack.iter().position(|&(n, _)| n == next).unwrap_or(0);
                    let mut path: Vec<usize> = stack[start..].iter().map(|&(n, _)| n).collect();
                    path.push(next);
                    return Some(path);
                }
                Mark::Done => {}
            }
        }
    }
    None
}

/// Topological order where, among the nodes ready at each step, the highest
/// priority goes first and input order breaks ties.
///
/// The graph must be acyclic; nodes caught in a cycle are left out.
pub(crate) fn priority_topo_order(deps: &[Vec<usize>], priorities: &[i32]) -> Vec<usize> {
    let n = deps.len();
    let mut pending = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (node, node_deps) in deps.iter().enumerate() {
        pending[node] = node_deps.len();
        for &d in node_deps {
            dependents[d].push(node);
        }
    }

    let mut ready: BinaryHeap<(i32, Reverse<usize>)> = (0..n)
        .filter(|&i| pending[i] == 0)
        .map(|i| (priorities[i], Reverse(i)))
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some((_, Reverse(node))) = ready.pop() {
        order.push(node);
        for &dependent in &dependents[node] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.push((priorities[dependent], Reverse(dependent)));
            }
        }
    }
    order
}
