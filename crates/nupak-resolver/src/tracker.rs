//! Per-name candidate registry and ancestor path accounting.
//!
//! The tracker answers the three predicates the resolver's decide table is
//! built on: is a node the best version of its name, is some version of its
//! name already accepted, and is the node eclipsed — every root path blocked
//! by a same-named candidate chosen nearer the root. Eclipse detection works
//! purely on path multiplicities: for each tracked node the tracker holds a
//! multiset of its ancestors, counting the distinct parent-pointer paths
//! from each ancestor (the node itself included with count one).

use std::collections::{HashMap, HashSet, VecDeque};

use nupak_util::errors::{NupakError, NupakResult};

use crate::graph::{DependencyGraph, Disposition, NodeId};
use crate::traversal;

/// Eclipse verdict for a candidate node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eclipse {
    /// At least one root path reaches the node unblocked.
    Clear,
    /// Every root path is blocked by an equal-or-higher same-name choice.
    Shadowed,
    /// Every root path is blocked and all blockers are strictly lower;
    /// carries the blocking node nearest the root.
    Downgraded(NodeId),
}

#[derive(Debug, Default)]
pub struct Tracker {
    root: Option<NodeId>,
    /// name key -> candidate nodes, in topological insertion order.
    entries: HashMap<String, Vec<NodeId>>,
    /// node -> (ancestor -> distinct parent-pointer path count).
    ascendants: HashMap<NodeId, HashMap<NodeId, i64>>,
    /// Topological position at track time; orders choke processing and
    /// untrack scaling.
    order: HashMap<NodeId, usize>,
    /// Nodes whose path contributions have already been withdrawn.
    untracked: HashSet<NodeId>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear prior state and index every node reachable from `root`:
    /// ascendant maps are built parents-first by summing each parent's map
    /// once per edge, then adding the node's own entry.
    pub fn track_root(&mut self, graph: &DependencyGraph, root: NodeId) -> NupakResult<()> {
        self.root = Some(root);
        self.entries.clear();
        self.ascendants.clear();
        self.order.clear();
        self.untracked.clear();

        let order = traversal::topological_order(graph, root)?;
        for (position, &id) in order.iter().enumerate() {
            self.order.insert(id, position);

            let mut ascendants: HashMap<NodeId, i64> = HashMap::new();
            for &parent in &graph.node(id).outer {
                let Some(inherited) = self.ascendants.get(&parent) else {
                    continue; // unreachable parent, carries no root paths
                };
                for (&ancestor, &count) in inherited {
                    let slot = ascendants.entry(ancestor).or_insert(0);
                    *slot = slot.checked_add(count).ok_or_else(overflow)?;
                }
            }
            *ascendants.entry(id).or_insert(0) += 1;
            self.ascendants.insert(id, ascendants);

            self.entries
                .entry(graph.node(id).key.name_key())
                .or_default()
                .push(id);
        }
        Ok(())
    }

    /// Withdraw `id`'s path contributions from every descendant, scaled by
    /// the surviving `id`-to-descendant path count. Contributions are not
    /// forwarded through descendants that were themselves untracked earlier
    /// (theirs are already gone). A second untrack of the same node is a
    /// no-op.
    pub fn untrack(&mut self, graph: &DependencyGraph, id: NodeId) -> NupakResult<()> {
        if !self.untracked.insert(id) {
            return Ok(());
        }
        let Some(removed) = self.ascendants.get(&id).cloned() else {
            return Ok(());
        };

        let mut descendants = self.descendants_of(graph, id);
        descendants.sort_by_key(|d| self.order.get(d).copied().unwrap_or(usize::MAX));

        let mut down: HashMap<NodeId, i64> = HashMap::from([(id, 1)]);
        for &at in std::iter::once(&id).chain(descendants.iter()) {
            if at != id && self.untracked.contains(&at) {
                continue;
            }
            let multiplicity = down.get(&at).copied().unwrap_or(0);
            if multiplicity == 0 {
                continue;
            }
            for &child in &graph.node(at).inner {
                let slot = down.entry(child).or_insert(0);
                *slot = slot.checked_add(multiplicity).ok_or_else(overflow)?;
            }
        }

        for descendant in descendants {
            let multiplicity = down.get(&descendant).copied().unwrap_or(0);
            if multiplicity == 0 {
                continue;
            }
            let Some(ascendants) = self.ascendants.get_mut(&descendant) else {
                continue;
            };
            for (&ancestor, &count) in &removed {
                let withdrawn = multiplicity.checked_mul(count).ok_or_else(overflow)?;
                if let Some(slot) = ascendants.get_mut(&ancestor) {
                    *slot -= withdrawn;
                    if *slot <= 0 {
                        ascendants.remove(&ancestor);
                    }
                }
            }
        }
        Ok(())
    }

    /// Untrack `id` and drop it from its name entry.
    pub fn remove(&mut self, graph: &DependencyGraph, id: NodeId) -> NupakResult<()> {
        self.untrack(graph, id)?;
        let name = graph.node(id).key.name_key();
        if let Some(candidates) = self.entries.get_mut(&name) {
            candidates.retain(|&candidate| candidate != id);
        }
        Ok(())
    }

    /// True iff every other non-rejected same-name candidate is either
    /// version-dominated by `id` or related to it by ancestry. Ancestry
    /// disputes are nearest-wins territory and are settled by eclipse
    /// detection, never by version comparison: a deeper node cannot
    /// displace a shallower one of the same name, however high its version.
    pub fn is_best_version(&self, graph: &DependencyGraph, id: NodeId) -> bool {
        let node = graph.node(id);
        let Some(candidates) = self.entries.get(&node.key.name_key()) else {
            return true;
        };
        for &candidate in candidates {
            if candidate == id {
                continue;
            }
            if graph.node(candidate).disposition == Disposition::Rejected {
                continue;
            }
            if version_dominates(graph, id, candidate) {
                continue;
            }
            if self.is_ancestor(candidate, id) || self.is_ancestor(id, candidate) {
                continue;
            }
            return false;
        }
        true
    }

    /// Any candidate sharing `id`'s name with disposition `Accepted`.
    pub fn is_any_version_accepted(&self, graph: &DependencyGraph, id: NodeId) -> bool {
        self.entries
            .get(&graph.node(id).key.name_key())
            .is_some_and(|candidates| {
                candidates
                    .iter()
                    .any(|&c| graph.node(c).disposition == Disposition::Accepted)
            })
    }

    /// Whether any parent-pointer path from `ancestor` to `descendant`
    /// survives.
    pub fn is_ancestor(&self, ancestor: NodeId, descendant: NodeId) -> bool {
        self.path_count(ancestor, descendant) > 0
    }

    /// Is every root path to `id` blocked by another same-named candidate
    /// chosen nearer the root?
    ///
    /// The parents of each live same-name candidate are choke points: below
    /// such a parent the name is already resolved to that candidate. The
    /// number of root paths hitting at least one choke is computed by
    /// first-passage decomposition over the chokes in topological order —
    /// the inclusion-exclusion over the choke poset — using only tracked
    /// path counts. `id` is eclipsed iff that number covers every root path.
    pub fn eclipse(&self, graph: &DependencyGraph, id: NodeId) -> NupakResult<Eclipse> {
        let Some(root) = self.root else {
            return Ok(Eclipse::Clear);
        };
        if id == root {
            return Ok(Eclipse::Clear);
        }
        let total = self.path_count(root, id);
        if total <= 0 {
            return Ok(Eclipse::Clear);
        }
        let node = graph.node(id);
        let Some(candidates) = self.entries.get(&node.key.name_key()) else {
            return Ok(Eclipse::Clear);
        };

        // (choke, owning candidate) pairs, topologically ordered
        let mut chokes: Vec<(NodeId, NodeId)> = Vec::new();
        let mut seen: HashSet<NodeId> = HashSet::new();
        for &candidate in candidates {
            if candidate == id || graph.node(candidate).disposition == Disposition::Rejected {
                continue;
            }
            for &choke in &graph.node(candidate).outer {
                if choke != id && seen.insert(choke) {
                    chokes.push((choke, candidate));
                }
            }
        }
        if chokes.is_empty() {
            return Ok(Eclipse::Clear);
        }
        chokes.sort_by_key(|(choke, _)| self.order.get(choke).copied().unwrap_or(usize::MAX));

        // first_hits[i]: root paths whose first choke is chokes[i]
        let mut first_hits: Vec<i64> = vec![0; chokes.len()];
        let mut blocked: i64 = 0;
        let mut blockers: Vec<NodeId> = Vec::new();
        for i in 0..chokes.len() {
            let (choke, owner) = chokes[i];
            let mut arriving = self.path_count(root, choke);
            for j in 0..i {
                let through = first_hits[j]
                    .checked_mul(self.path_count(chokes[j].0, choke))
                    .ok_or_else(overflow)?;
                arriving = arriving.checked_sub(through).ok_or_else(overflow)?;
            }
            first_hits[i] = arriving.max(0);

            let contribution = first_hits[i]
                .checked_mul(self.path_count(choke, id))
                .ok_or_else(overflow)?;
            if contribution > 0 {
                blocked = blocked.checked_add(contribution).ok_or_else(overflow)?;
                if !blockers.contains(&owner) {
                    blockers.push(owner);
                }
            }
        }

        if blocked < total {
            return Ok(Eclipse::Clear);
        }

        let own_version = node.item.as_ref().and_then(|item| item.version.as_ref());
        let all_strictly_lower = !blockers.is_empty()
            && blockers.iter().all(|&blocker| {
                let blocker_version = graph
                    .node(blocker)
                    .item
                    .as_ref()
                    .and_then(|item| item.version.as_ref());
                match (blocker_version, own_version) {
                    (Some(theirs), Some(ours)) => theirs < ours,
                    _ => false,
                }
            });
        if all_strictly_lower {
            // blockers are in choke order, so the first is nearest the root
            Ok(Eclipse::Downgraded(blockers[0]))
        } else {
            Ok(Eclipse::Shadowed)
        }
    }

    fn path_count(&self, from: NodeId, to: NodeId) -> i64 {
        self.ascendants
            .get(&to)
            .and_then(|ancestors| ancestors.get(&from))
            .copied()
            .unwrap_or(0)
    }

    fn descendants_of(&self, graph: &DependencyGraph, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut queue: VecDeque<NodeId> = graph.node(id).inner.iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            if next == id || !seen.insert(next) {
                continue;
            }
            out.push(next);
            queue.extend(graph.node(next).inner.iter().copied());
        }
        out
    }
}

fn overflow() -> miette::Report {
    NupakError::InvalidGraph {
        message: "ascendant path multiplicity overflowed".to_string(),
    }
    .into()
}

fn version_dominates(graph: &DependencyGraph, id: NodeId, other: NodeId) -> bool {
    let version_of = |n: NodeId| {
        graph
            .node(n)
            .item
            .as_ref()
            .and_then(|item| item.version.as_ref())
    };
    match (version_of(id), version_of(other)) {
        (Some(ours), Some(theirs)) => ours >= theirs,
        // projects have no comparable version; the ancestor rule decides
        _ => true,
    }
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
    fn ascendants_count_distinct_paths() {
        // root -> a -> c, root -> b -> c: two root paths into c
        let mut g = DependencyGraph::new();
        let root = project_root(&mut g);
        let a = pkg(&mut g, "a", "1.0");
        let b = pkg(&mut g, "b", "1.0");
        let c = pkg(&mut g, "c", "1.0");
        g.add_edge(root, a);
        g.add_edge(root, b);
        g.add_edge(a, c);
        g.add_edge(b, c);

        let mut tracker = Tracker::new();
        tracker.track_root(&g, root).unwrap();
        assert_eq!(tracker.path_count(root, c), 2);
        assert_eq!(tracker.path_count(a, c), 1);
        assert_eq!(tracker.path_count(c, c), 1);
        assert!(tracker.is_ancestor(root, c));
        assert!(!tracker.is_ancestor(c, root));
    }

    #[test]
    fn untrack_withdraws_path_contributions() {
        let mut g = DependencyGraph::new();
        let root = project_root(&mut g);
        let a = pkg(&mut g, "a", "1.0");
        let b = pkg(&mut g, "b", "1.0");
        let c = pkg(&mut g, "c", "1.0");
        g.add_edge(root, a);
        g.add_edge(root, b);
        g.add_edge(a, c);
        g.add_edge(b, c);

        let mut tracker = Tracker::new();
        tracker.track_root(&g, root).unwrap();
        tracker.untrack(&g, a).unwrap();
        // only the path through b survives
        assert_eq!(tracker.path_count(root, c), 1);
        assert!(!tracker.is_ancestor(a, c));

        // a second untrack must not subtract again
        tracker.untrack(&g, a).unwrap();
        assert_eq!(tracker.path_count(root, c), 1);
    }

    #[test]
    fn untrack_order_is_irrelevant_on_chains() {
        // root -> x -> n -> d
        let mut g = DependencyGraph::new();
        let root = project_root(&mut g);
        let x = pkg(&mut g, "x", "1.0");
        let n = pkg(&mut g, "n", "1.0");
        let d = pkg(&mut g, "d", "1.0");
        g.add_edge(root, x);
        g.add_edge(x, n);
        g.add_edge(n, d);

        let mut tracker = Tracker::new();
        tracker.track_root(&g, root).unwrap();
        tracker.untrack(&g, n).unwrap();
        tracker.untrack(&g, x).unwrap();
        assert_eq!(tracker.path_count(root, d), 0);
        assert_eq!(tracker.path_count(x, d), 0);
        assert_eq!(tracker.path_count(d, d), 1);
    }

    #[test]
    fn best_version_prefers_higher_among_cousins() {
        let mut g = DependencyGraph::new();
        let root = project_root(&mut g);
        let a = pkg(&mut g, "a", "1.0");
        let b = pkg(&mut g, "b", "1.0");
        let c1 = pkg(&mut g, "c", "1.0");
        let c2 = pkg(&mut g, "c", "2.0");
        g.add_edge(root, a);
        g.add_edge(root, b);
        g.add_edge(a, c2);
        g.add_edge(b, c1);

        let mut tracker = Tracker::new();
        tracker.track_root(&g, root).unwrap();
        assert!(tracker.is_best_version(&g, c2));
        assert!(!tracker.is_best_version(&g, c1));
    }

    #[test]
    fn rejected_candidates_no_longer_dispute() {
        let mut g = DependencyGraph::new();
        let root = project_root(&mut g);
        let c1 = pkg(&mut g, "c", "1.0");
        let c2 = pkg(&mut g, "c", "2.0");
        g.add_edge(root, c1);
        g.add_edge(root, c2);

        let mut tracker = Tracker::new();
        tracker.track_root(&g, root).unwrap();
        assert!(!tracker.is_best_version(&g, c1));
        g.node_mut(c2).disposition = Disposition::Rejected;
        assert!(tracker.is_best_version(&g, c1));
    }

    #[test]
    fn eclipse_reports_downgrade_for_nearer_lower_pin() {
        // root -> d(1.0), root -> x -> d(2.0)
        let mut g = DependencyGraph::new();
        let root = project_root(&mut g);
        let d1 = pkg(&mut g, "d", "1.0");
        let x = pkg(&mut g, "x", "1.0");
        let d2 = pkg(&mut g, "d", "2.0");
        g.add_edge(root, d1);
        g.add_edge(root, x);
        g.add_edge(x, d2);

        let mut tracker = Tracker::new();
        tracker.track_root(&g, root).unwrap();
        assert_eq!(tracker.eclipse(&g, d2).unwrap(), Eclipse::Downgraded(d1));
        assert_eq!(tracker.eclipse(&g, d1).unwrap(), Eclipse::Clear);
    }

    #[test]
    fn eclipse_shadowed_by_equal_or_higher() {
        // root -> c(2.0), root -> x -> c(1.0)
        let mut g = DependencyGraph::new();
        let root = project_root(&mut g);
        let c2 = pkg(&mut g, "c", "2.0");
        let x = pkg(&mut g, "x", "1.0");
        let c1 = pkg(&mut g, "c", "1.0");
        g.add_edge(root, c2);
        g.add_edge(root, x);
        g.add_edge(x, c1);

        let mut tracker = Tracker::new();
        tracker.track_root(&g, root).unwrap();
        assert_eq!(tracker.eclipse(&g, c1).unwrap(), Eclipse::Shadowed);
        assert_eq!(tracker.eclipse(&g, c2).unwrap(), Eclipse::Clear);
    }

    #[test]
    fn eclipse_clear_when_an_unblocked_path_survives() {
        // cousins at equal depth block nothing
        let mut g = DependencyGraph::new();
        let root = project_root(&mut g);
        let a = pkg(&mut g, "a", "1.0");
        let b = pkg(&mut g, "b", "1.0");
        let c1 = pkg(&mut g, "c", "1.0");
        let c2 = pkg(&mut g, "c", "2.0");
        g.add_edge(root, a);
        g.add_edge(root, b);
        g.add_edge(a, c2);
        g.add_edge(b, c1);

        let mut tracker = Tracker::new();
        tracker.track_root(&g, root).unwrap();
        assert_eq!(tracker.eclipse(&g, c1).unwrap(), Eclipse::Clear);
        assert_eq!(tracker.eclipse(&g, c2).unwrap(), Eclipse::Clear);
    }
}
