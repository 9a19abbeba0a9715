//! Dirty propagation: a top-level file must be rebuilt when it, or anything
//! it transitively includes, is stale.
//!
//! Rather than searching the include closure of every root, staleness is
//! pushed backwards along "included by" edges from each stale node, so every
//! node is visited at most once and include cycles need no special care.

use crate::densemap::DenseMap;
use crate::entry::CompilationUnit;
use crate::fs::{FileSystem, MTime};
use crate::graph::{Graph, NodeId, Staleness};
use std::collections::VecDeque;

/// Why a compilation unit has to be compiled.
#[derive(Debug, Clone, PartialEq)]
pub enum DirtyReason {
    /// A file in the unit's include closure (possibly its own source) is stale.
    Stale { node: NodeId, staleness: Staleness },
    /// The settings that affect compiler output changed.
    SettingsChanged,
    /// The unit's output artifact doesn't exist.
    OutputMissing,
}

/// For every dirty node, the stale node that made it dirty.
pub struct Dirty {
    causes: DenseMap<NodeId, Option<NodeId>>,
}

impl Dirty {
    /// Mark every node that is stale or transitively includes a stale node.
    pub fn propagate(graph: &mut Graph) -> Dirty {
        let mut causes: DenseMap<NodeId, Option<NodeId>> = DenseMap::new_sized(graph.len(), None);
        let mut queue = VecDeque::new();
        for (id, node) in graph.nodes() {
            if node.is_stale() {
                causes[id] = Some(id);
                queue.push_back(id);
            }
        }
        while let Some(id) = queue.pop_front() {
            let cause = causes[id];
            for &dependent in &graph.node(id).dependents {
                if causes[dependent].is_none() {
                    causes[dependent] = cause;
                    queue.push_back(dependent);
                }
            }
        }
        for (id, cause) in causes.iter() {
            graph.node_mut(id).dirty = cause.is_some();
        }
        Dirty { causes }
    }

    /// The stale node responsible for `id` being dirty, if it is.
    pub fn cause(&self, id: NodeId) -> Option<NodeId> {
        self.causes.lookup(id).copied().flatten()
    }
}

/// Decide whether a unit needs compiling, and why.
pub fn needs_compile(
    graph: &Graph,
    dirty: &Dirty,
    settings_changed: bool,
    fs: &dyn FileSystem,
    unit: &CompilationUnit,
) -> Option<DirtyReason> {
    if let Some(node) = dirty.cause(unit.root) {
        if let Some(staleness) = graph.node(node).staleness() {
            return Some(DirtyReason::Stale { node, staleness });
        }
    }
    if settings_changed {
        return Some(DirtyReason::SettingsChanged);
    }
    match fs.stat(&unit.output) {
        Ok(MTime::Stamp(_)) => None,
        // An output we can't even stat is treated like a missing one.
        Ok(MTime::Missing) | Err(_) => Some(DirtyReason::OutputMissing),
    }
}

/// A human-readable explanation, for `-d explain`.
pub fn explain(graph: &Graph, reason: &DirtyReason) -> String {
    match reason {
        DirtyReason::Stale { node, staleness } => {
            format!("{} is {}", graph.node(*node).path.display(), staleness)
        }
        DirtyReason::SettingsChanged => "build settings changed".to_string(),
        DirtyReason::OutputMissing => "output is missing".to_string(),
    }
}
