//! Graph walks: breadth-first and topological enumeration, path printing,
//! and the pre-walk downgrade tagging helper.

use std::collections::HashSet;

use nupak_core::range::is_greater_or_equal;
use nupak_util::errors::{NupakError, NupakResult};
use nupak_util::scratch::with_scratch;

use crate::graph::{DependencyGraph, Disposition, NodeId};

/// Every node reachable from `root`, breadth-first, each exactly once.
pub fn enumerate_all(graph: &DependencyGraph, root: NodeId) -> Vec<NodeId> {
    with_scratch(|s| {
        let mut out = Vec::new();
        s.queue.push_back(root.0);
        s.seen.insert(root.0);
        while let Some(raw) = s.queue.pop_front() {
            let id = NodeId(raw);
            out.push(id);
            for &child in &graph.node(id).inner {
                if s.seen.insert(child.0) {
                    s.queue.push_back(child.0);
                }
            }
        }
        out
    })
}

/// Reachable nodes in topological order (parents before children), by
/// inbound-degree counting over `outer`. The root has indegree zero; a
/// child is yielded only once every reachable parent edge has been
/// consumed. Fails when the reachable set cannot be fully ordered.
pub fn topological_order(graph: &DependencyGraph, root: NodeId) -> NupakResult<Vec<NodeId>> {
    let reachable = enumerate_all(graph, root);
    let members: HashSet<NodeId> = reachable.iter().copied().collect();

    with_scratch(|s| {
        for &id in &reachable {
            let degree = graph
                .node(id)
                .outer
                .iter()
                .filter(|p| members.contains(p))
                .count() as i64;
            s.counts.insert(id.0, degree);
        }

        for &id in &reachable {
            if s.counts[&id.0] == 0 {
                s.queue.push_back(id.0);
            }
        }

        let mut out = Vec::with_capacity(reachable.len());
        while let Some(raw) = s.queue.pop_front() {
            let id = NodeId(raw);
            out.push(id);
            for &child in &graph.node(id).inner {
                let Some(degree) = s.counts.get_mut(&child.0) else {
                    continue;
                };
                *degree -= 1;
                if *degree == 0 {
                    s.queue.push_back(child.0);
                }
            }
        }

        if out.len() != reachable.len() {
            return Err(NupakError::InvalidGraph {
                message: "reachable nodes contain a true edge cycle".to_string(),
            }
            .into());
        }
        Ok(out)
    })
}

/// Render `"root -> … -> node"` by walking up through each node's first
/// parent. Works for severed cycle nodes too, since severing preserves the
/// node's own parent pointers.
pub fn path_to_root(graph: &DependencyGraph, node: NodeId) -> String {
    let mut labels = Vec::new();
    let mut current = Some(node);
    let mut hops = 0;
    while let Some(id) = current {
        labels.push(graph.label(id));
        current = graph.node(id).outer.first().copied();
        // parent chains cannot be longer than the arena
        hops += 1;
        if hops > graph.len() {
            break;
        }
    }
    labels.reverse();
    labels.join(" -> ")
}

/// Pre-walk helper for graph builders: tag a node `PotentiallyDowngraded`
/// when some ancestor declares a same-named child whose requested range is
/// not at least as high — the nearer, lower request will win the walk, and
/// the resolver will report the displacement.
pub fn flag_potential_downgrades(graph: &mut DependencyGraph) {
    let Some(root) = graph.root else { return };
    let suspects: Vec<NodeId> = enumerate_all(graph, root)
        .into_iter()
        .filter(|&n| is_potentially_downgraded(graph, n))
        .collect();
    for n in suspects {
        let node = graph.node_mut(n);
        if node.disposition == Disposition::Acceptable {
            node.disposition = Disposition::PotentiallyDowngraded;
        }
    }
}

fn is_potentially_downgraded(graph: &DependencyGraph, n: NodeId) -> bool {
    let node = graph.node(n);
    let Some(ref range) = node.key.range else {
        return false;
    };
    let name = node.key.name_key();

    // walk every strict ancestor of n
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<NodeId> = node.outer.clone();
    while let Some(ancestor) = stack.pop() {
        if !seen.insert(ancestor) {
            continue;
        }
        for &sibling in &graph.node(ancestor).inner {
            if sibling == n {
                continue;
            }
            let other = graph.node(sibling);
            if other.key.name_key() != name {
                continue;
            }
            if let Some(ref other_range) = other.key.range {
                if !is_greater_or_equal(other_range, range) {
                    return true;
                }
            }
        }
        stack.extend(graph.node(ancestor).outer.iter().copied());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use nupak_core::library::{DependencyKey, LibraryIdentity};
    use nupak_core::range::VersionRange;
    use nupak_core::version::Version;

    fn pkg(graph: &mut DependencyGraph, name: &str, version: &str) -> NodeId {
        let range = VersionRange::parse(version).unwrap();
        graph.add_node(
            DependencyKey::new(name, Some(range)),
            Some(LibraryIdentity::package(
                name,
                Version::parse(version).unwrap(),
            )),
        )
    }

    fn diamond() -> (DependencyGraph, NodeId, NodeId, NodeId, NodeId) {
        // root -> a -> c, root -> b -> c
        let mut g = DependencyGraph::new();
        let root = g.add_node(
            DependencyKey::new("app", None),
            Some(LibraryIdentity::project("app")),
        );
        g.set_root(root);
        let a = pkg(&mut g, "a", "1.0");
        let b = pkg(&mut g, "b", "1.0");
        let c = pkg(&mut g, "c", "1.0");
        g.add_edge(root, a);
        g.add_edge(root, b);
        g.add_edge(a, c);
        g.add_edge(b, c);
        (g, root, a, b, c)
    }

    #[test]
    fn bfs_yields_each_node_once() {
        let (g, root, a, b, c) = diamond();
        let order = enumerate_all(&g, root);
        assert_eq!(order, vec![root, a, b, c]);
    }

    #[test]
    fn topological_order_puts_parents_first() {
        let (g, root, a, b, c) = diamond();
        let order = topological_order(&g, root).unwrap();
        assert_eq!(order.first(), Some(&root));
        let pos = |n: NodeId| order.iter().position(|&x| x == n).unwrap();
        assert!(pos(a) < pos(c));
        assert!(pos(b) < pos(c));
    }

    #[test]
    fn topological_order_ignores_unreachable_parents() {
        let (mut g, root, a, _, _) = diamond();
        // an orphan pointing into the reachable set must not deadlock Kahn
        let orphan = pkg(&mut g, "orphan", "1.0");
        g.add_edge(orphan, a);
        let order = topological_order(&g, root).unwrap();
        assert!(!order.contains(&orphan));
        assert!(order.contains(&a));
    }

    #[test]
    fn path_walks_first_parents() {
        let (g, _, _, _, c) = diamond();
        assert_eq!(path_to_root(&g, c), "app -> a 1.0.0 -> c 1.0.0");
    }

    #[test]
    fn flags_deeper_higher_request_under_a_lower_pin() {
        // root -> d(1.0), root -> x -> d(2.0): the deeper 2.0 request is a
        // downgrade suspect because the root pinned 1.0 nearer.
        let mut g = DependencyGraph::new();
        let root = g.add_node(
            DependencyKey::new("app", None),
            Some(LibraryIdentity::project("app")),
        );
        g.set_root(root);
        let d1 = pkg(&mut g, "d", "1.0");
        let x = pkg(&mut g, "x", "1.0");
        let d2 = pkg(&mut g, "d", "2.0");
        g.add_edge(root, d1);
        g.add_edge(root, x);
        g.add_edge(x, d2);

        flag_potential_downgrades(&mut g);
        assert_eq!(g.node(d2).disposition, Disposition::PotentiallyDowngraded);
        assert_eq!(g.node(d1).disposition, Disposition::Acceptable);
        assert_eq!(g.node(x).disposition, Disposition::Acceptable);
    }
}
