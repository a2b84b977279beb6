//! The fixpoint walk that drives every reachable node to a terminal
//! disposition.

use std::collections::HashMap;

use tracing::{debug, warn};

use nupak_core::library::LibraryKind;
use nupak_util::errors::{NupakError, NupakResult};
use nupak_util::scratch::with_scratch;

use crate::conflict::{AnalyzeResult, Downgrade, VersionConflict};
use crate::graph::{DependencyGraph, Disposition, NodeId};
use crate::tracker::{Eclipse, Tracker};
use crate::traversal;

/// Upper bound on decide passes. Exhausting it means the walk failed to
/// converge, which is an internal invariant violation rather than an input
/// problem.
const MAX_PASSES: u32 = 1000;

/// Resolve every node reachable from the graph root and report cycles,
/// downgrades, and cousin version conflicts.
///
/// The caller hands in a fully expanded graph whose nodes carry their
/// initial dispositions; the resolver only mutates dispositions and, for
/// cycle nodes, severs inbound edges.
pub fn analyze(graph: &mut DependencyGraph) -> NupakResult<AnalyzeResult> {
    let root = graph.root.ok_or_else(|| NupakError::InvalidGraph {
        message: "graph has no root".to_string(),
    })?;
    graph.validate()?;

    let mut tracker = Tracker::new();
    tracker.track_root(graph, root)?;

    let centrals: Vec<NodeId> = graph
        .node(root)
        .inner
        .iter()
        .copied()
        .filter(|&child| graph.node(child).central_transitive)
        .collect();

    let mut cycles: Vec<NodeId> = Vec::new();
    let mut downgrades: Vec<Downgrade> = Vec::new();
    let mut accepted_by_name: HashMap<String, NodeId> = HashMap::new();

    let mut passes = 0u32;
    loop {
        passes += 1;
        if passes > MAX_PASSES {
            return Err(NupakError::DidNotConverge { passes: MAX_PASSES }.into());
        }

        reject_orphaned_centrals(graph, root, &centrals);

        for id in traversal::topological_order(graph, root)? {
            decide(
                graph,
                &mut tracker,
                root,
                id,
                &mut cycles,
                &mut downgrades,
                &mut accepted_by_name,
            )?;
        }

        let undecided = traversal::enumerate_all(graph, root)
            .into_iter()
            .filter(|&id| !graph.node(id).disposition.is_terminal())
            .count();
        if undecided == 0 {
            break;
        }
        debug!(pass = passes, undecided, "resolution pass left undecided nodes");
    }

    let version_conflicts = collect_cousin_conflicts(graph, root, &accepted_by_name);

    // a recorded downgrade only counts if its target actually won
    downgrades.retain(|d| graph.node(d.downgraded_to).disposition == Disposition::Accepted);

    Ok(AnalyzeResult {
        version_conflicts,
        cycles,
        downgrades,
    })
}

fn decide(
    graph: &mut DependencyGraph,
    tracker: &mut Tracker,
    root: NodeId,
    id: NodeId,
    cycles: &mut Vec<NodeId>,
    downgrades: &mut Vec<Downgrade>,
    accepted_by_name: &mut HashMap<String, NodeId>,
) -> NupakResult<()> {
    match graph.node(id).disposition {
        Disposition::Cycle => {
            warn!(node = %graph.label(id), "dependency cycle detected");
            cycles.push(id);
            tracker.remove(graph, id)?;
            graph.sever_from_parents(id);
            return Ok(());
        }
        Disposition::Accepted | Disposition::Rejected => return Ok(()),
        Disposition::Acceptable | Disposition::PotentiallyDowngraded => {}
    }

    // A central-transitive pin is only live while a real dependency pulls
    // it in, so its root edge does not count when real parents exist.
    let node = graph.node(id);
    let parents: Vec<NodeId> =
        if node.central_transitive && node.outer.iter().any(|&p| p != root) {
            node.outer.iter().copied().filter(|&p| p != root).collect()
        } else {
            node.outer.clone()
        };

    if !parents.is_empty() {
        let mut any_accepted = false;
        let mut any_undecided = false;
        let mut all_rejected = true;
        for &parent in &parents {
            match graph.node(parent).disposition {
                Disposition::Accepted => {
                    any_accepted = true;
                    all_rejected = false;
                }
                Disposition::Rejected => {}
                Disposition::Acceptable | Disposition::PotentiallyDowngraded => {
                    any_undecided = true;
                    all_rejected = false;
                }
                Disposition::Cycle => {
                    all_rejected = false;
                }
            }
        }

        if all_rejected {
            if tracker.eclipse(graph, id)? != Eclipse::Clear {
                tracker.remove(graph, id)?;
            }
            graph.node_mut(id).disposition = Disposition::Rejected;
            return Ok(());
        }
        // wait until the parents have settled and one of them won
        if !any_accepted || any_undecided {
            return Ok(());
        }
    }

    match tracker.eclipse(graph, id)? {
        Eclipse::Downgraded(by) => {
            debug!(
                node = %graph.label(id),
                by = %graph.label(by),
                "downgraded by a nearer, lower choice"
            );
            downgrades.push(Downgrade {
                downgraded: id,
                downgraded_to: by,
            });
            tracker.remove(graph, id)?;
            graph.node_mut(id).disposition = Disposition::Rejected;
        }
        Eclipse::Shadowed => {
            tracker.remove(graph, id)?;
            if tracker.is_any_version_accepted(graph, id) {
                graph.node_mut(id).disposition = Disposition::Rejected;
            }
            // otherwise the node stays undecided; it revives if its
            // eclipser is itself rejected on a later pass
        }
        Eclipse::Clear => {
            if tracker.is_best_version(graph, id) {
                graph.node_mut(id).disposition = Disposition::Accepted;
                accepted_by_name.insert(graph.node(id).key.name_key(), id);
            } else if tracker.is_any_version_accepted(graph, id) {
                graph.node_mut(id).disposition = Disposition::Rejected;
                tracker.untrack(graph, id)?;
            }
            // otherwise wait for the disputing candidate to settle
        }
    }
    Ok(())
}

/// Reject central-transitive pins whose real (non-root) parents have all
/// been rejected, together with their still-undecided subtrees. Repeats to
/// a fixpoint, since rejecting one pin's subtree can orphan another.
fn reject_orphaned_centrals(graph: &mut DependencyGraph, root: NodeId, centrals: &[NodeId]) {
    loop {
        let mut changed = false;
        for &central in centrals {
            let node = graph.node(central);
            if node.disposition.is_terminal() {
                continue;
            }
            let mut has_real_parent = false;
            let mut all_rejected = true;
            for &parent in &node.outer {
                if parent == root {
                    continue;
                }
                has_real_parent = true;
                if graph.node(parent).disposition != Disposition::Rejected {
                    all_rejected = false;
                }
            }
            if has_real_parent && all_rejected {
                debug!(node = %graph.label(central), "central pin lost all real parents");
                reject_subtree(graph, central);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

fn reject_subtree(graph: &mut DependencyGraph, start: NodeId) {
    with_scratch(|s| {
        s.queue.push_back(start.0);
        s.seen.insert(start.0);
        while let Some(raw) = s.queue.pop_front() {
            let id = NodeId(raw);
            let node = graph.node_mut(id);
            if !node.disposition.is_terminal() {
                node.disposition = Disposition::Rejected;
            }
            for &child in &graph.node(id).inner {
                if s.seen.insert(child.0) {
                    s.queue.push_back(child.0);
                }
            }
        }
    });
}

/// Post-loop scan for cousin conflicts: a rejected node under an accepted
/// parent whose requested range the winning same-name choice cannot
/// satisfy.
fn collect_cousin_conflicts(
    graph: &DependencyGraph,
    root: NodeId,
    accepted_by_name: &HashMap<String, NodeId>,
) -> Vec<VersionConflict> {
    let mut conflicts = Vec::new();
    for id in traversal::enumerate_all(graph, root) {
        let node = graph.node(id);
        if node.disposition != Disposition::Rejected {
            continue;
        }
        if !node
            .outer
            .iter()
            .any(|&parent| graph.node(parent).disposition == Disposition::Accepted)
        {
            continue;
        }
        let Some(&selected) = accepted_by_name.get(&node.key.name_key()) else {
            continue;
        };
        if selected == id {
            continue;
        }
        let Some(ref range) = node.key.range else {
            continue;
        };
        let selected_node = graph.node(selected);
        let Some(ref selected_item) = selected_node.item else {
            continue;
        };
        let Some(ref selected_version) = selected_item.version else {
            continue;
        };
        if !node.key.targets.intersects(selected_node.key.targets) {
            continue;
        }
        // a project pinned nearer the root legitimately overrides any
        // package version request
        if selected_item.kind.bypasses_ranges() && node.key.targets.contains(LibraryKind::Package)
        {
            continue;
        }
        if !range.satisfies(selected_version) {
            conflicts.push(VersionConflict {
                selected,
                conflicting: id,
            });
        }
    }
    conflicts
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

    fn project_root(graph: &mut DependencyGraph) -> NodeId {
        let root = graph.add_node(
            DependencyKey::new("app", None),
            Some(LibraryIdentity::project("app")),
        );
        graph.set_root(root);
        root
    }

    #[test]
    fn missing_root_is_an_invalid_graph() {
        let mut g = DependencyGraph::new();
        pkg(&mut g, "a", "1.0");
        assert!(analyze(&mut g).is_err());
    }

    #[test]
    fn chain_is_accepted_in_one_pass() {
        let mut g = DependencyGraph::new();
        let root = project_root(&mut g);
        let a = pkg(&mut g, "a", "1.0");
        let b = pkg(&mut g, "b", "1.0");
        g.add_edge(root, a);
        g.add_edge(a, b);

        let result = analyze(&mut g).unwrap();
        assert!(result.is_empty());
        assert_eq!(g.node(root).disposition, Disposition::Accepted);
        assert_eq!(g.node(a).disposition, Disposition::Accepted);
        assert_eq!(g.node(b).disposition, Disposition::Accepted);
    }

    #[test]
    fn shadowed_node_is_rejected_once_its_eclipser_wins() {
        // root -> c(2.0); root -> y -> c(3.0); root -> x -> c(1.0).
        // The direct 2.0 pin eclipses both deeper candidates: the higher
        // one is a downgrade, the lower one is plainly shadowed and must be
        // rejected as soon as the pin is accepted.
        let mut g = DependencyGraph::new();
        let root = project_root(&mut g);
        let c2 = pkg(&mut g, "c", "2.0");
        let y = pkg(&mut g, "y", "1.0");
        let x = pkg(&mut g, "x", "1.0");
        let c3 = pkg(&mut g, "c", "3.0");
        let c1 = pkg(&mut g, "c", "1.0");
        g.add_edge(root, c2);
        g.add_edge(root, y);
        g.add_edge(root, x);
        g.add_edge(y, c3);
        g.add_edge(x, c1);

        let result = analyze(&mut g).unwrap();
        assert_eq!(g.node(c2).disposition, Disposition::Accepted);
        assert_eq!(g.node(c3).disposition, Disposition::Rejected);
        assert_eq!(g.node(c1).disposition, Disposition::Rejected);

        assert_eq!(result.downgrades.len(), 1);
        assert_eq!(result.downgrades[0].downgraded, c3);
        assert_eq!(result.downgrades[0].downgraded_to, c2);

        // the 3.0 request cannot accept the selected 2.0
        assert_eq!(result.version_conflicts.len(), 1);
        assert_eq!(result.version_conflicts[0].selected, c2);
        assert_eq!(result.version_conflicts[0].conflicting, c3);
    }
}
