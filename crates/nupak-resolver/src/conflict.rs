//! Resolution anomaly reporting: version conflicts, cycles, downgrades.

use std::fmt::Write as _;

use serde::Serialize;

use crate::graph::{DependencyGraph, NodeId};
use crate::traversal::path_to_root;

/// The outcome of resolving one restore graph. Anomalies are data, not
/// errors: a resolve that produces them still succeeded.
#[derive(Debug, Default, Serialize)]
pub struct AnalyzeResult {
    pub version_conflicts: Vec<VersionConflict>,
    pub cycles: Vec<NodeId>,
    pub downgrades: Vec<Downgrade>,
}

/// Two same-named requests from unrelated subtrees where the winning choice
/// cannot satisfy the loser's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VersionConflict {
    pub selected: NodeId,
    pub conflicting: NodeId,
}

/// A nearer, lower choice displaced a deeper, higher one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Downgrade {
    pub downgraded: NodeId,
    pub downgraded_to: NodeId,
}

impl AnalyzeResult {
    pub fn is_empty(&self) -> bool {
        self.version_conflicts.is_empty() && self.cycles.is_empty() && self.downgrades.is_empty()
    }

    pub fn anomaly_count(&self) -> usize {
        self.version_conflicts.len() + self.cycles.len() + self.downgrades.len()
    }

    /// Human-readable summary for restore logs, with the dependency path
    /// that led to each anomaly.
    pub fn describe(&self, graph: &DependencyGraph) -> String {
        if self.is_empty() {
            return "No resolution anomalies.".to_string();
        }
        let mut out = String::new();
        if !self.version_conflicts.is_empty() {
            let _ = writeln!(out, "Version conflicts ({}):", self.version_conflicts.len());
            for conflict in &self.version_conflicts {
                let requested = graph.node(conflict.conflicting).key.to_string();
                let _ = writeln!(
                    out,
                    "  {requested} cannot accept the selected {}",
                    graph.label(conflict.selected)
                );
                let _ = writeln!(out, "    via {}", path_to_root(graph, conflict.conflicting));
            }
        }
        if !self.cycles.is_empty() {
            let _ = writeln!(out, "Cycles ({}):", self.cycles.len());
            for &cycle in &self.cycles {
                let _ = writeln!(out, "  {}", path_to_root(graph, cycle));
            }
        }
        if !self.downgrades.is_empty() {
            let _ = writeln!(out, "Downgrades ({}):", self.downgrades.len());
            for downgrade in &self.downgrades {
                let _ = writeln!(
                    out,
                    "  {} downgraded to {}",
                    graph.label(downgrade.downgraded),
                    graph.label(downgrade.downgraded_to)
                );
                let _ = writeln!(out, "    via {}", path_to_root(graph, downgrade.downgraded));
            }
        }
        out
    }
}
