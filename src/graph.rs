//! The dependency graph, a graph between shader source files where an edge
//! means "including file references included file".
//!
//! Nodes live in a dense arena indexed by NodeId; ids are assigned in visit
//! order and are only meaningful within one session.

use crate::canon::canon_file;
use crate::db::Cache;
use crate::densemap::{self, DenseMap};
use crate::diag::Diagnostic;
use crate::fs::FileSystem;
use crate::hash::{self, Hash, Signature};
use crate::include;
use log::debug;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);
impl densemap::Index for NodeId {
    fn index(&self) -> usize {
        self.0 as usize
    }
}
impl From<usize> for NodeId {
    fn from(u: usize) -> NodeId {
        NodeId(u as u32)
    }
}

/// Why a node does not satisfy the cache.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Staleness {
    /// No previous session recorded this file.
    NoEntry,
    /// The content changed since it was recorded.
    Changed,
    /// The file could not be read this session.
    Unreadable,
}

impl std::fmt::Display for Staleness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Staleness::NoEntry => "not in cache",
            Staleness::Changed => "changed",
            Staleness::Unreadable => "unreadable",
        })
    }
}

#[derive(Debug)]
pub struct Node {
    /// Canonical absolute path; the node's identity.
    pub path: PathBuf,
    /// Source text, if the file could be read.
    pub text: Option<String>,
    pub signature: Signature,
    /// Signature recorded by the previous session.
    pub cached: Option<Hash>,
    /// Set for top-level shader files.
    pub is_root: bool,
    /// Set by dirty propagation when this node or anything it transitively
    /// includes is stale.
    pub dirty: bool,
    /// Files this one includes, in order of first inclusion.
    pub includes: Vec<NodeId>,
    /// Files that include this one.
    pub dependents: Vec<NodeId>,
}

impl Node {
    pub fn staleness(&self) -> Option<Staleness> {
        match (self.signature, self.cached) {
            (Signature::Unreadable, _) => Some(Staleness::Unreadable),
            (Signature::Digest(_), None) => Some(Staleness::NoEntry),
            (Signature::Digest(hash), Some(cached)) if hash != cached => Some(Staleness::Changed),
            _ => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.staleness().is_some()
    }
}

/// A directed (including, included) pair.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
}

#[derive(Default)]
pub struct Graph {
    nodes: DenseMap<NodeId, Node>,
    ids: FxHashMap<PathBuf, NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 0
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn lookup(&self, path: &Path) -> Option<NodeId> {
        self.ids.get(path).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    pub fn roots(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().filter(|(_, node)| node.is_root)
    }

    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.nodes.iter().flat_map(|(from, node)| {
            node.includes.iter().map(move |&to| Edge { from, to })
        })
    }

    fn add_node(&mut self, node: Node) -> NodeId {
        let path = node.path.clone();
        let id = self.nodes.push(node);
        self.ids.insert(path, id);
        id
    }

    /// Record that `from` includes `to`.  Repeated inclusion by the same file
    /// is recorded once.
    fn add_edge(&mut self, from: NodeId, to: NodeId) {
        if self.nodes[from].includes.contains(&to) {
            return;
        }
        self.nodes[from].includes.push(to);
        self.nodes[to].dependents.push(from);
    }
}

/// Walks top-level shader files and their transitive includes, building the
/// graph for one session.
pub struct GraphBuilder<'a> {
    fs: &'a dyn FileSystem,
    cache: &'a Cache,
    search_path: &'a [PathBuf],
    graph: Graph,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(fs: &'a dyn FileSystem, cache: &'a Cache, search_path: &'a [PathBuf]) -> Self {
        GraphBuilder {
            fs,
            cache,
            search_path,
            graph: Graph::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Visit a top-level shader file.
    pub fn add_root(&mut self, path: &Path) -> NodeId {
        let path = canon_file(self.fs, path);
        let id = self.visit(path, None);
        self.graph.node_mut(id).is_root = true;
        id
    }

    /// Visit `path`, reached from `incoming` (None for a top-level file).
    /// A path that already has a node only gains an edge; this is what
    /// terminates the walk on include cycles.
    pub fn visit(&mut self, path: PathBuf, incoming: Option<NodeId>) -> NodeId {
        if let Some(id) = self.graph.lookup(&path) {
            if let Some(from) = incoming {
                self.graph.add_edge(from, id);
            }
            return id;
        }

        let content = self.fs.read(&path);
        let signature = hash::signature(&content);
        let cached = self.cache.lookup(self.fs, &path);
        let text = match content {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) => {
                self.diagnostics
                    .push(Diagnostic::new(&path, None, format!("read: {}", err)));
                None
            }
        };
        let id = self.graph.add_node(Node {
            path,
            text,
            signature,
            cached,
            is_root: false,
            dirty: false,
            includes: Vec::new(),
            dependents: Vec::new(),
        });
        if let Some(from) = incoming {
            self.graph.add_edge(from, id);
        }

        let targets = self.include_targets(id);
        debug!(
            "visit {:?} {} ({} includes)",
            id,
            self.graph.node(id).path.display(),
            targets.len()
        );
        for target in targets {
            self.visit(target, Some(id));
        }
        id
    }

    /// Resolve the includes of an already-added node.
    fn include_targets(&mut self, id: NodeId) -> Vec<PathBuf> {
        let node = &self.graph.nodes[id];
        let text = match &node.text {
            None => return Vec::new(),
            Some(text) => text,
        };
        let dir = node.path.parent().unwrap_or_else(|| Path::new(""));
        let parsed = include::parse(text);
        for bad in parsed.malformed {
            self.diagnostics
                .push(Diagnostic::new(&node.path, Some(bad.line), bad.error.msg));
        }
        let mut targets = Vec::with_capacity(parsed.includes.len());
        for inc in &parsed.includes {
            match include::resolve(self.fs, inc, dir, self.search_path) {
                Some(path) => targets.push(path),
                None => debug!(
                    "{}:{}: <{}> not found, assuming toolchain header",
                    node.path.display(),
                    inc.line,
                    inc.target
                ),
            }
        }
        targets
    }

    pub fn finish(self) -> (Graph, Vec<Diagnostic>) {
        (self.graph, self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFileSystem;

    fn build(fs: &MemFileSystem, roots: &[&str]) -> (Graph, Vec<Diagnostic>) {
        let cache = Cache::new("/cache");
        let search_path = vec![PathBuf::from("/s/include")];
        let mut builder = GraphBuilder::new(fs, &cache, &search_path);
        for root in roots {
            builder.add_root(Path::new(root));
        }
        builder.finish()
    }

    fn id(graph: &Graph, path: &str) -> NodeId {
        match graph.lookup(Path::new(path)) {
            Some(id) => id,
            None => panic!("no node for {}", path),
        }
    }

    #[test]
    fn shared_header() {
        let fs = MemFileSystem::new();
        fs.add("/s/a.hlsl", "#include \"common.hlsli\"\n");
        fs.add("/s/b.hlsl", "#include \"common.hlsli\"\n");
        fs.add("/s/common.hlsli", "");
        let (graph, diags) = build(&fs, &["/s/a.hlsl", "/s/b.hlsl"]);
        assert!(diags.is_empty());
        assert_eq!(graph.len(), 3);
        let common = id(&graph, "/s/common.hlsli");
        let edges: Vec<Edge> = graph.edges().filter(|e| e.to == common).collect();
        assert_eq!(edges.len(), 2);
        assert!(!graph.node(common).is_root);
        assert!(graph.node(id(&graph, "/s/a.hlsl")).is_root);
    }

    #[test]
    fn cycle_terminates() {
        let fs = MemFileSystem::new();
        fs.add("/s/a.hlsl", "#include \"b.hlsli\"\n");
        fs.add("/s/b.hlsli", "#include \"a.hlsl\"\n#include \"b.hlsli\"\n");
        let (graph, _) = build(&fs, &["/s/a.hlsl"]);
        assert_eq!(graph.len(), 2);
        let a = id(&graph, "/s/a.hlsl");
        let b = id(&graph, "/s/b.hlsli");
        assert_ne!(a, b);
        assert_eq!(graph.node(a).includes, vec![b]);
        assert_eq!(graph.node(b).includes, vec![a, b]);
    }

    #[test]
    fn ids_in_visit_order() {
        let fs = MemFileSystem::new();
        fs.add("/s/a.hlsl", "#include \"x.hlsli\"\n#include \"y.hlsli\"\n");
        fs.add("/s/x.hlsli", "#include \"z.hlsli\"\n");
        fs.add("/s/y.hlsli", "");
        fs.add("/s/z.hlsli", "");
        let (graph, _) = build(&fs, &["/s/a.hlsl"]);
        let order: Vec<PathBuf> = graph.nodes().map(|(_, n)| n.path.clone()).collect();
        assert_eq!(
            order,
            ["/s/a.hlsl", "/s/x.hlsli", "/s/z.hlsli", "/s/y.hlsli"]
                .iter()
                .map(PathBuf::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn relative_to_includer() {
        let fs = MemFileSystem::new();
        fs.add("/s/a.hlsl", "#include \"lib/brdf.hlsli\"\n");
        fs.add("/s/lib/brdf.hlsli", "#include \"../common.hlsli\"\n#include \"math.hlsli\"\n");
        fs.add("/s/lib/math.hlsli", "");
        fs.add("/s/common.hlsli", "");
        let (graph, diags) = build(&fs, &["/s/a.hlsl"]);
        assert!(diags.is_empty());
        assert!(graph.lookup(Path::new("/s/common.hlsli")).is_some());
        assert!(graph.lookup(Path::new("/s/lib/math.hlsli")).is_some());
    }

    #[test]
    fn search_path() {
        let fs = MemFileSystem::new();
        fs.add("/s/a.hlsl", "#include <bindless.hlsli>\n#include <toolchain.h>\n#include \"shared.hlsli\"\n");
        fs.add("/s/include/bindless.hlsli", "");
        fs.add("/s/include/shared.hlsli", "");
        let (graph, diags) = build(&fs, &["/s/a.hlsl"]);
        assert!(diags.is_empty());
        assert_eq!(graph.len(), 3);
        assert!(graph.lookup(Path::new("/s/include/shared.hlsli")).is_some());
    }

    #[test]
    fn missing_header_is_unreadable_node() {
        let fs = MemFileSystem::new();
        fs.add("/s/a.hlsl", "#include \"gone.hlsli\"\n#include \"here.hlsli\"\n");
        fs.add("/s/here.hlsli", "");
        let (graph, diags) = build(&fs, &["/s/a.hlsl"]);
        assert_eq!(graph.len(), 3);
        let gone = graph.node(id(&graph, "/s/gone.hlsli"));
        assert_eq!(gone.signature, Signature::Unreadable);
        assert_eq!(gone.staleness(), Some(Staleness::Unreadable));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].path, Path::new("/s/gone.hlsli"));
    }

    #[test]
    fn malformed_include_diagnosed() {
        let fs = MemFileSystem::new();
        fs.add("/s/a.hlsl", "#include \"oops.hlsli\n#include \"ok.hlsli\"\n");
        fs.add("/s/ok.hlsli", "");
        let (graph, diags) = build(&fs, &["/s/a.hlsl"]);
        assert_eq!(graph.len(), 2);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, Some(1));
    }

    #[test]
    fn root_also_included() {
        let fs = MemFileSystem::new();
        fs.add("/s/a.hlsl", "#include \"b.hlsl\"\n");
        fs.add("/s/b.hlsl", "");
        let (graph, _) = build(&fs, &["/s/a.hlsl", "/s/b.hlsl"]);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.roots().count(), 2);
    }
}
