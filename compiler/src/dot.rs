// dot.rs — Graphviz DOT output for dataflow programs
//
// Renders a Program's state in DOT format suitable for `dot` or other
// Graphviz layout engines. Each map scope becomes a cluster.
//
// Preconditions: `program` is a fully constructed Program.
// Postconditions: returns a valid DOT string representing the state.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::collections::HashSet;
use std::fmt::Write;

use crate::graph::*;

/// Emit the program state as a Graphviz DOT string.
pub fn emit_dot(program: &Program) -> String {
    let state = &program.state;
    let mut buf = String::new();
    writeln!(buf, "digraph {} {{", sanitize(&program.name)).unwrap();
    writeln!(buf, "    rankdir=TB;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];").unwrap();
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];").unwrap();

    // Nodes inside a map scope are written in that scope's cluster
    let mut clustered: HashSet<NodeId> = HashSet::new();
    for node in state.nodes() {
        let Some(scope) = node.as_map_entry() else {
            continue;
        };
        let members = state.scope_nodes(node.id);
        let bounds: Vec<String> = scope
            .iter_params()
            .map(|(p, r)| format!("{p}={r}"))
            .collect();
        writeln!(buf).unwrap();
        writeln!(buf, "    subgraph cluster_{} {{", dot_node_id(node.id)).unwrap();
        writeln!(
            buf,
            "        label=\"map {}[{}]\";",
            escape(&scope.label),
            escape(&bounds.join(", "))
        )
        .unwrap();
        writeln!(buf, "        style=dashed;").unwrap();
        writeln!(buf, "        color=gray50;").unwrap();
        for id in members {
            if let Some(member) = state.node(id) {
                writeln!(buf, "        {} [{}];", dot_node_id(id), node_attrs(member)).unwrap();
                clustered.insert(id);
            }
        }
        writeln!(buf, "    }}").unwrap();
    }

    writeln!(buf).unwrap();
    for node in state.nodes() {
        if clustered.contains(&node.id) {
            continue;
        }
        writeln!(buf, "    {} [{}];", dot_node_id(node.id), node_attrs(node)).unwrap();
    }

    writeln!(buf).unwrap();
    for edge in state.edges() {
        let src = dot_node_id(edge.src);
        let dst = dot_node_id(edge.dst);
        match &edge.memlet {
            Some(memlet) => writeln!(
                buf,
                "    {src} -> {dst} [label=\"{}\"];",
                escape(&memlet_label(memlet))
            )
            .unwrap(),
            None => writeln!(buf, "    {src} -> {dst} [style=dotted];").unwrap(),
        }
    }

    writeln!(buf, "}}").unwrap();
    buf
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Sanitize a name to valid DOT identifier characters.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() || cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("g_{cleaned}")
    } else {
        cleaned
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn dot_node_id(node: NodeId) -> String {
    format!("n{}", node.0)
}

fn memlet_label(memlet: &Memlet) -> String {
    match &memlet.wcr {
        Some(wcr) => format!("{}[{}] (wcr: {wcr})", memlet.data, memlet.subset),
        None => format!("{}[{}]", memlet.data, memlet.subset),
    }
}

/// Return DOT attributes string for a node.
fn node_attrs(node: &Node) -> String {
    let (shape, color) = match &node.kind {
        NodeKind::Access { .. } => ("ellipse", "lightsalmon"),
        NodeKind::MapEntry(_) => ("trapezium", "lightyellow"),
        NodeKind::MapExit { .. } => ("invtrapezium", "lightyellow"),
        NodeKind::Tasklet(_) => ("octagon", "lightblue"),
        NodeKind::Stencil(_) => ("box3d", "lightgreen"),
    };
    let label = match &node.kind {
        NodeKind::Tasklet(t) => format!("{}\\n{}", escape(&t.label), escape(&t.code)),
        NodeKind::Stencil(s) => format!("{}\\n{}", escape(&s.label), escape(&s.code)),
        _ => escape(node.label()),
    };
    format!("shape={shape}, style=filled, fillcolor={color}, label=\"{label}\"")
}
