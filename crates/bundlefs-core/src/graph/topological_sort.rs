// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Kahn's algorithm, used to order bundles so that every dependency precedes
//! its dependents and to reject cyclic declarations.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// The graph contains at least one cycle.
///
/// `remaining` lists, in input order, every node that could not be ordered:
/// the members of the cycles and everything that depends on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError<T> {
    /// Nodes left with unresolved incoming edges.
    pub remaining: Vec<T>,
}

/// Sorts `nodes` so that for every `(dependency, dependent)` edge the
/// dependency comes first.
///
/// Edges that reference a node absent from `nodes` are ignored; callers are
/// expected to have reported those separately.
///
/// Nodes with no ordering constraint between them keep their input order.
pub fn topological_sort<T>(
    nodes: impl IntoIterator<Item = T>,
    edges: impl IntoIterator<Item = (T, T)>,
) -> Result<Vec<T>, CycleError<T>>
where
    T: Copy + Eq + Hash,
{
    let node_list: Vec<T> = nodes.into_iter().collect();
    let mut dependents: HashMap<T, Vec<T>> = HashMap::new();
    let mut in_degree: HashMap<T, usize> = node_list.iter().map(|node| (*node, 0)).collect();

    for (dependency, dependent) in edges {
        if !in_degree.contains_key(&dependency) {
            continue;
        }
        if let Some(degree) = in_degree.get_mut(&dependent) {
            *degree += 1;
            dependents.entry(dependency).or_default().push(dependent);
        }
    }

    let mut queue: VecDeque<T> = node_list
        .iter()
        .copied()
        .filter(|node| in_degree.get(node).copied().unwrap_or(0) == 0)
        .collect();

    let mut sorted = Vec::with_capacity(node_list.len());
    while let Some(node) = queue.pop_front() {
        sorted.push(node);
        for &dependent in dependents.get(&node).map(Vec::as_slice).unwrap_or_default() {
            if let Some(degree) = in_degree.get_mut(&dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if sorted.len() == node_list.len() {
        Ok(sorted)
    } else {
        let remaining = node_list
            .into_iter()
            .filter(|node| in_degree.get(node).copied().unwrap_or(0) > 0)
            .collect();
        Err(CycleError { remaining })
    }
}
