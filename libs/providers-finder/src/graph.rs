//! Dependency graph over matched providers and its stable topological sort.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::error::FinderError;
use crate::model::ProviderRecord;

/// Adjacency over provider indices; `adj[d]` lists the providers that must come after `d`.
struct DependencyGraph {
    adj: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Edges only for dependencies whose key is itself a matched provider;
    /// anything else imposes no order on this contract.
    fn build(providers: &[ProviderRecord]) -> Self {
        let mut by_key: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, p) in providers.iter().enumerate() {
            by_key.entry(p.key()).or_default().push(i);
        }

        let mut adj = vec![Vec::<usize>::new(); providers.len()];
        for (u, p) in providers.iter().enumerate() {
            for dep in &p.dependencies {
                let Some(targets) = by_key.get(dep.as_str()) else {
                    continue;
                };
                for &v in targets {
                    // edge dep -> provider (dep before provider)
                    if v != u && !adj[v].contains(&u) {
                        adj[v].push(u);
                    }
                }
            }
        }

        Self { adj }
    }

    /// Detect cycles using DFS with path tracking.
    /// Returns the node indices of the cycle, closed by repeating its first node.
    fn find_cycle(&self) -> Option<Vec<usize>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White, // unvisited
            Gray,  // on current path
            Black, // finished
        }

        fn dfs(
            node: usize,
            adj: &[Vec<usize>],
            colors: &mut [Color],
            path: &mut Vec<usize>,
        ) -> Option<Vec<usize>> {
            colors[node] = Color::Gray;
            path.push(node);

            for &neighbor in &adj[node] {
                match colors[neighbor] {
                    Color::Gray => {
                        // back edge
                        if let Some(start) = path.iter().position(|&n| n == neighbor) {
                            let mut cycle = path[start..].to_vec();
                            cycle.push(neighbor);
                            return Some(cycle);
                        }
                    }
                    Color::White => {
                        if let Some(cycle) = dfs(neighbor, adj, colors, path) {
                            return Some(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }

            path.pop();
            colors[node] = Color::Black;
            None
        }

        let mut colors = vec![Color::White; self.adj.len()];
        let mut path = Vec::new();
        for i in 0..self.adj.len() {
            if colors[i] == Color::White {
                if let Some(cycle) = dfs(i, &self.adj, &mut colors, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    /// Kahn's algorithm, always emitting the ready node with the lowest
    /// insertion index so unconstrained providers keep their input order.
    fn stable_order(&self) -> Vec<usize> {
        let n = self.adj.len();
        let mut indeg = vec![0usize; n];
        for targets in &self.adj {
            for &t in targets {
                indeg[t] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = indeg
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(u)) = ready.pop() {
            order.push(u);
            for &w in &self.adj[u] {
                indeg[w] -= 1;
                if indeg[w] == 0 {
                    ready.push(Reverse(w));
                }
            }
        }
        order
    }
}

/// Order `providers` so that every matched dependency precedes its dependent.
///
/// Fails with [`FinderError::CyclicDependency`] when no such order exists.
pub fn sort_providers(
    contract: &str,
    providers: Vec<ProviderRecord>,
) -> Result<Vec<ProviderRecord>, FinderError> {
    if providers.is_empty() {
        return Ok(providers);
    }

    let graph = DependencyGraph::build(&providers);

    if let Some(cycle) = graph.find_cycle() {
        return Err(FinderError::CyclicDependency {
            contract: contract.to_string(),
            path: cycle
                .into_iter()
                .map(|i| providers[i].key().to_string())
                .collect(),
        });
    }

    let order = graph.stable_order();
    let mut slots: Vec<Option<ProviderRecord>> = providers.into_iter().map(Some).collect();
    let sorted: Vec<ProviderRecord> = order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect();

    tracing::info!(
        contract,
        providers = ?sorted.iter().map(|p| p.key()).collect::<Vec<_>>(),
        "Provider dependency order resolved (topo)"
    );

    Ok(sorted)
}
