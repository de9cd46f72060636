// graph.rs — Single-state dataflow graph with stable node and edge indices
//
// A `State` is an arena of nodes and access edges. Identifiers are slot
// indices; removing a node tombstones its slot and drops its incident
// edges, so every other identifier stays valid. A `Program` pairs one
// state with the table of data descriptors its memlets refer to.
//
// Preconditions: none.
// Postconditions: identifiers are never reused within a state.
// Failure modes: unknown endpoints or data names → `GraphError`.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::DataDesc;
use crate::stencil::StencilNode;
use crate::subset::{Range, Subset};
use crate::symbolic::ExprParseError;

// ── Public types ────────────────────────────────────────────────────────────

/// Stable identifier for a node within a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

/// Stable identifier for an edge within a state.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EdgeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A parallel map: iteration parameters with inclusive ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapScope {
    pub label: String,
    pub params: Vec<String>,
    pub range: Vec<Range>,
}

impl MapScope {
    /// Iteration parameters paired with their ranges.
    pub fn iter_params(&self) -> impl Iterator<Item = (&str, &Range)> {
        self.params.iter().map(String::as_str).zip(self.range.iter())
    }

    pub fn param_set(&self) -> BTreeSet<String> {
        self.params.iter().cloned().collect()
    }
}

/// An elementary computation with named ports and a textual body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tasklet {
    pub label: String,
    #[serde(default)]
    pub inputs: BTreeSet<String>,
    #[serde(default)]
    pub outputs: BTreeSet<String>,
    pub code: String,
}

/// The kind of a graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Reads or writes a named data container.
    Access { data: String },
    MapEntry(MapScope),
    MapExit { entry: NodeId },
    Tasklet(Tasklet),
    Stencil(StencilNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    /// Short human-readable name used in listings and DOT output.
    pub fn label(&self) -> &str {
        match &self.kind {
            NodeKind::Access { data } => data,
            NodeKind::MapEntry(scope) => &scope.label,
            NodeKind::MapExit { .. } => "exit",
            NodeKind::Tasklet(t) => &t.label,
            NodeKind::Stencil(s) => &s.label,
        }
    }

    pub fn as_map_entry(&self) -> Option<&MapScope> {
        match &self.kind {
            NodeKind::MapEntry(scope) => Some(scope),
            _ => None,
        }
    }

    pub fn as_tasklet(&self) -> Option<&Tasklet> {
        match &self.kind {
            NodeKind::Tasklet(t) => Some(t),
            _ => None,
        }
    }
}

/// Data movement along an edge: which container, which elements, and an
/// optional write-conflict resolution function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memlet {
    pub data: String,
    pub subset: Subset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wcr: Option<String>,
}

impl Memlet {
    pub fn new(data: impl Into<String>, subset: Subset) -> Self {
        Memlet {
            data: data.into(),
            subset,
            wcr: None,
        }
    }

    /// Memlet from a textual subset, e.g. `Memlet::simple("A", "i - 1, j")`.
    pub fn simple(data: impl Into<String>, subset: &str) -> Result<Self, ExprParseError> {
        Ok(Memlet::new(data, subset.parse()?))
    }

    /// Memlet covering the whole of `desc`.
    pub fn from_array(data: impl Into<String>, desc: &DataDesc) -> Self {
        Memlet::new(data, desc.full_subset())
    }

    pub fn with_wcr(mut self, wcr: impl Into<String>) -> Self {
        self.wcr = Some(wcr.into());
        self
    }
}

/// A directed edge between two node ports.
///
/// An edge without a memlet is a pure ordering dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default, skip_serializing)]
    pub id: EdgeId,
    pub src: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_conn: Option<String>,
    pub dst: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_conn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memlet: Option<Memlet>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    UnknownNode(NodeId),
    DuplicateNode(NodeId),
    UnknownData(String),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::UnknownNode(id) => write!(f, "unknown node {id}"),
            GraphError::DuplicateNode(id) => write!(f, "duplicate node {id}"),
            GraphError::UnknownData(name) => write!(f, "unknown data '{name}'"),
        }
    }
}

impl std::error::Error for GraphError {}

// ── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    nodes: Vec<Option<Node>>,
    edges: Vec<Option<Edge>>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(Node { id, kind }));
        id
    }

    /// Insert a node under its own identifier (document loading).
    pub fn insert_node(&mut self, node: Node) -> Result<(), GraphError> {
        let slot = node.id.0 as usize;
        if slot >= self.nodes.len() {
            self.nodes.resize(slot + 1, None);
        }
        if self.nodes[slot].is_some() {
            return Err(GraphError::DuplicateNode(node.id));
        }
        self.nodes[slot] = Some(node);
        Ok(())
    }

    pub fn add_edge(
        &mut self,
        src: NodeId,
        src_conn: Option<&str>,
        dst: NodeId,
        dst_conn: Option<&str>,
        memlet: Option<Memlet>,
    ) -> Result<EdgeId, GraphError> {
        for endpoint in [src, dst] {
            if self.node(endpoint).is_none() {
                return Err(GraphError::UnknownNode(endpoint));
            }
        }
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Some(Edge {
            id,
            src,
            src_conn: src_conn.map(str::to_string),
            dst,
            dst_conn: dst_conn.map(str::to_string),
            memlet,
        }));
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Live nodes in identifier order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    /// Live edges in identifier order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().flatten()
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    pub fn edge_count(&self) -> usize {
        self.edges().count()
    }

    pub fn in_edges(&self, id: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges().filter(move |e| e.dst == id)
    }

    pub fn out_edges(&self, id: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges().filter(move |e| e.src == id)
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.get_mut(id.0 as usize)?.take()?;
        for slot in &mut self.edges {
            if slot.as_ref().is_some_and(|e| e.src == id || e.dst == id) {
                *slot = None;
            }
        }
        Some(node)
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Option<Edge> {
        self.edges.get_mut(id.0 as usize)?.take()
    }

    /// The exit node closing the map opened by `entry`.
    pub fn exit_node(&self, entry: NodeId) -> Option<NodeId> {
        self.nodes()
            .find(|n| matches!(n.kind, NodeKind::MapExit { entry: e } if e == entry))
            .map(|n| n.id)
    }

    /// Entry, every node reachable from it without passing its exit, and
    /// the exit itself. Breadth-first order starting at `entry`.
    pub fn scope_nodes(&self, entry: NodeId) -> Vec<NodeId> {
        let exit = self.exit_node(entry);
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        seen.insert(entry);
        queue.push_back(entry);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            if Some(id) == exit {
                continue;
            }
            for edge in self.out_edges(id) {
                if seen.insert(edge.dst) {
                    queue.push_back(edge.dst);
                }
            }
        }
        order
    }
}

// ── Program ─────────────────────────────────────────────────────────────────

/// Nodes created by `Program::add_mapped_tasklet`.
#[derive(Debug, Clone)]
pub struct MappedTasklet {
    pub entry: NodeId,
    pub tasklet: NodeId,
    pub exit: NodeId,
    /// External read access nodes, one per distinct input container.
    pub reads: Vec<NodeId>,
    /// External write access nodes, one per distinct output container.
    pub writes: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub name: String,
    pub arrays: BTreeMap<String, DataDesc>,
    pub state: State,
}

impl Program {
    pub fn new(name: impl Into<String>) -> Self {
        Program {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_array(&mut self, name: impl Into<String>, desc: DataDesc) {
        self.arrays.insert(name.into(), desc);
    }

    pub fn desc(&self, name: &str) -> Option<&DataDesc> {
        self.arrays.get(name)
    }

    /// Build `read -> entry -> tasklet -> exit -> write` for one map.
    ///
    /// Inputs and outputs map tasklet connectors to their per-iteration
    /// memlets. Connectors reading the same container share one external
    /// read node and one full-container edge into the entry.
    pub fn add_mapped_tasklet(
        &mut self,
        label: &str,
        map: &[(&str, Range)],
        inputs: &[(&str, Memlet)],
        code: &str,
        outputs: &[(&str, Memlet)],
    ) -> Result<MappedTasklet, GraphError> {
        for (_, memlet) in inputs.iter().chain(outputs) {
            if !self.arrays.contains_key(&memlet.data) {
                return Err(GraphError::UnknownData(memlet.data.clone()));
            }
        }

        let scope = MapScope {
            label: label.to_string(),
            params: map.iter().map(|(p, _)| p.to_string()).collect(),
            range: map.iter().map(|(_, r)| r.clone()).collect(),
        };
        let entry = self.state.add_node(NodeKind::MapEntry(scope));
        let tasklet = self.state.add_node(NodeKind::Tasklet(Tasklet {
            label: label.to_string(),
            inputs: inputs.iter().map(|(c, _)| c.to_string()).collect(),
            outputs: outputs.iter().map(|(c, _)| c.to_string()).collect(),
            code: code.to_string(),
        }));
        let exit = self.state.add_node(NodeKind::MapExit { entry });

        let mut reads = Vec::new();
        let mut routed: BTreeSet<&str> = BTreeSet::new();
        for (conn, memlet) in inputs {
            let outer_conn = format!("OUT_{}", memlet.data);
            if routed.insert(memlet.data.as_str()) {
                let access = self.state.add_node(NodeKind::Access {
                    data: memlet.data.clone(),
                });
                let full = Memlet::from_array(&memlet.data, &self.arrays[&memlet.data]);
                let entry_conn = format!("IN_{}", memlet.data);
                self.state
                    .add_edge(access, None, entry, Some(entry_conn.as_str()), Some(full))?;
                reads.push(access);
            }
            self.state.add_edge(
                entry,
                Some(outer_conn.as_str()),
                tasklet,
                Some(*conn),
                Some(memlet.clone()),
            )?;
        }
        if inputs.is_empty() {
            self.state.add_edge(entry, None, tasklet, None, None)?;
        }

        let mut writes = Vec::new();
        let mut routed: BTreeSet<&str> = BTreeSet::new();
        for (conn, memlet) in outputs {
            let inner_conn = format!("IN_{}", memlet.data);
            self.state.add_edge(
                tasklet,
                Some(*conn),
                exit,
                Some(inner_conn.as_str()),
                Some(memlet.clone()),
            )?;
            if routed.insert(memlet.data.as_str()) {
                let access = self.state.add_node(NodeKind::Access {
                    data: memlet.data.clone(),
                });
                let mut full = Memlet::from_array(&memlet.data, &self.arrays[&memlet.data]);
                full.wcr = memlet.wcr.clone();
                let exit_conn = format!("OUT_{}", memlet.data);
                self.state
                    .add_edge(exit, Some(exit_conn.as_str()), access, None, Some(full))?;
                writes.push(access);
            }
        }
        if outputs.is_empty() {
            self.state.add_edge(tasklet, None, exit, None, None)?;
        }

        Ok(MappedTasklet {
            entry,
            tasklet,
            exit,
            reads,
            writes,
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
