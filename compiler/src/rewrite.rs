// rewrite.rs — Replace an eligible map scope with a stencil node
//
// Derives a per-parameter offset from the tasklet's output indices,
// rewrites every tasklet access relative to that zero point, renames the
// tasklet's ports to one canonical connector per container, and splices a
// `StencilNode` in place of entry, tasklet and exit.
//
// Preconditions: `entry` passed `eligibility::check_candidate`.
// Postconditions: on `Ok`, the scope nodes are gone and each external
//                 source/sink of a referenced container is wired to the
//                 stencil with a full-container memlet. On `Err`, the
//                 program is unchanged (all checks run before mutation).
// Failure modes: violated preconditions → `RewriteError`.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::info;

use crate::data::DescKind;
use crate::graph::{Edge, EdgeId, GraphError, MapScope, Memlet, Node, NodeId, NodeKind, Program};
use crate::lexer::{lex_body, BodyToken};
use crate::stencil::{BoundaryCondition, StencilNode};
use crate::subset::Subset;
use crate::symbolic::Expr;

// ── Errors ──────────────────────────────────────────────────────────────────

/// A fatal rewrite failure: the candidate was not what eligibility promised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    /// The binding has no node for a required role.
    IncompleteBinding,
    NotAMapEntry(NodeId),
    MissingExit(NodeId),
    MissingTasklet(NodeId),
    /// A range access on a tasklet output spans more than one index.
    NonPointAccess { data: String, subset: Subset },
    UnknownData(String),
    /// A container used by the tasklet has no matching edge outside the scope.
    UnroutedData(String),
    Graph(GraphError),
}

impl fmt::Display for RewriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewriteError::IncompleteBinding => write!(f, "binding has no map entry"),
            RewriteError::NotAMapEntry(id) => write!(f, "node {id} is not a map entry"),
            RewriteError::MissingExit(id) => write!(f, "map {id} has no exit node"),
            RewriteError::MissingTasklet(id) => write!(f, "map {id} contains no tasklet"),
            RewriteError::NonPointAccess { data, subset } => {
                write!(f, "access {data}[{subset}] is not a single point")
            }
            RewriteError::UnknownData(name) => write!(f, "no descriptor for '{name}'"),
            RewriteError::UnroutedData(name) => {
                write!(f, "'{name}' is not connected outside the map scope")
            }
            RewriteError::Graph(e) => write!(f, "graph update failed: {e}"),
        }
    }
}

impl std::error::Error for RewriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RewriteError::Graph(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GraphError> for RewriteError {
    fn from(e: GraphError) -> Self {
        RewriteError::Graph(e)
    }
}

// ── Result ──────────────────────────────────────────────────────────────────

/// One tasklet access after rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenAccess {
    /// Original tasklet port.
    pub port: Option<String>,
    pub data: String,
    pub subset: Subset,
    pub is_output: bool,
}

/// What `apply_stencil_rewrite` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StencilRewrite {
    pub stencil: NodeId,
    pub label: String,
    /// Derived offset per map parameter, in parameter order.
    pub offsets: Vec<Option<i64>>,
    pub accesses: Vec<RewrittenAccess>,
}

// ── Offsets ─────────────────────────────────────────────────────────────────

/// For each map parameter, the smallest integer any output index takes
/// when the parameter sits at its lower bound. `None` if no output index
/// that mentions the parameter reduces to an integer.
pub fn derive_offsets(scope: &MapScope, outputs: &[&Memlet]) -> Result<Vec<Option<i64>>, RewriteError> {
    let mut offsets = Vec::with_capacity(scope.params.len());
    for (param, range) in scope.iter_params() {
        let mut values = BTreeSet::new();
        for memlet in outputs {
            let indices: Vec<&Expr> = match &memlet.subset {
                Subset::Range(ranges) => {
                    let mut starts = Vec::with_capacity(ranges.len());
                    for r in ranges {
                        if !r.is_point() {
                            return Err(RewriteError::NonPointAccess {
                                data: memlet.data.clone(),
                                subset: memlet.subset.clone(),
                            });
                        }
                        starts.push(&r.start);
                    }
                    starts
                }
                Subset::Indices(indices) => indices.iter().collect(),
            };
            for index in indices {
                if index.free_symbols().contains(param) {
                    if let Some(v) = index.substitute(param, &range.start).try_evaluate_to_integer() {
                        values.insert(v);
                    }
                }
            }
        }
        offsets.push(values.first().copied());
    }
    Ok(offsets)
}

/// Parameter replacements: `p -> lo - offset`, or `p -> lo` without offset.
pub fn substitution_map(scope: &MapScope, offsets: &[Option<i64>]) -> BTreeMap<String, Expr> {
    scope
        .iter_params()
        .zip(offsets)
        .map(|((param, range), offset)| {
            let value = match offset {
                Some(o) if *o != 0 => (range.start.clone() - Expr::Int(*o)).simplify(),
                _ => range.start.clone(),
            };
            (param.to_string(), value)
        })
        .collect()
}

/// Replace whole-identifier references in a tasklet body.
///
/// String literals, comments and identifiers after `.` are left alone.
pub fn rename_connectors(code: &str, replacements: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(code.len());
    let mut after_dot = false;
    for (token, span) in lex_body(code) {
        let text = &code[span.start..span.end];
        match token {
            BodyToken::Ident if !after_dot => match replacements.get(text) {
                Some(replacement) => out.push_str(replacement),
                None => out.push_str(text),
            },
            _ => out.push_str(text),
        }
        match token {
            BodyToken::Dot => after_dot = true,
            BodyToken::Whitespace | BodyToken::Comment => {}
            _ => after_dot = false,
        }
    }
    out
}

// ── Rewrite ─────────────────────────────────────────────────────────────────

/// A new full-container edge between the stencil and an outside node.
struct Wire {
    outside: NodeId,
    connector: String,
    memlet: Memlet,
    is_output: bool,
}

/// Replace the map scope opened by `entry` with a stencil node.
pub fn apply_stencil_rewrite(program: &mut Program, entry: NodeId) -> Result<StencilRewrite, RewriteError> {
    let state = &program.state;
    let scope = state
        .node(entry)
        .and_then(Node::as_map_entry)
        .ok_or(RewriteError::NotAMapEntry(entry))?
        .clone();
    let exit = state.exit_node(entry).ok_or(RewriteError::MissingExit(entry))?;
    let scope_nodes = state.scope_nodes(entry);
    let (tasklet_id, tasklet) = scope_nodes
        .iter()
        .find_map(|&id| state.node(id).and_then(Node::as_tasklet).map(|t| (id, t.clone())))
        .ok_or(RewriteError::MissingTasklet(entry))?;

    let in_edges: Vec<&Edge> = state.in_edges(tasklet_id).collect();
    let out_edges: Vec<&Edge> = state.out_edges(tasklet_id).collect();

    let output_memlets: Vec<&Memlet> = out_edges.iter().filter_map(|e| e.memlet.as_ref()).collect();
    let offsets = derive_offsets(&scope, &output_memlets)?;
    let rdict = substitution_map(&scope, &offsets);

    let nparams = scope.params.len();
    let mut replacements = BTreeMap::new();
    let mut iterator_mapping = BTreeMap::new();
    let mut in_data: BTreeMap<String, String> = BTreeMap::new();
    let mut out_data: BTreeMap<String, String> = BTreeMap::new();
    let mut accesses = Vec::new();

    let sides = [(&in_edges, false), (&out_edges, true)];
    for (edges, is_output) in sides {
        for edge in edges.iter() {
            let Some(memlet) = &edge.memlet else {
                continue;
            };
            let desc = program
                .desc(&memlet.data)
                .ok_or_else(|| RewriteError::UnknownData(memlet.data.clone()))?;
            let mut subset = memlet.subset.clone();
            subset.replace(&rdict);

            let connector = format!("__{}", memlet.data);
            let port = if is_output { &edge.src_conn } else { &edge.dst_conn };
            let (reference, indexing) = match desc.kind {
                DescKind::Array | DescKind::View => (format!("{connector}[{subset}]"), true),
                DescKind::Scalar => (connector.clone(), false),
            };
            if let Some(port) = port {
                replacements.insert(port.clone(), reference);
            }
            iterator_mapping.insert(connector.clone(), vec![indexing; nparams]);
            let data_map = if is_output { &mut out_data } else { &mut in_data };
            data_map.insert(memlet.data.clone(), connector);

            accesses.push(RewrittenAccess {
                port: port.clone(),
                data: memlet.data.clone(),
                subset,
                is_output,
            });
        }
    }

    let code = rename_connectors(&tasklet.code, &replacements);
    let stencil = StencilNode {
        label: format!("{}_stencil", scope.label),
        code,
        inputs: in_data.values().cloned().collect(),
        outputs: out_data.values().cloned().collect(),
        iterator_mapping,
        boundary_conditions: out_data
            .values()
            .map(|c| (c.clone(), BoundaryCondition::Shrink))
            .collect(),
    };

    // Outside endpoints; a later edge for the same container wins.
    let mut sources: BTreeMap<&str, NodeId> = BTreeMap::new();
    for e in state.in_edges(entry) {
        if let Some(m) = &e.memlet {
            if in_data.contains_key(&m.data) {
                sources.insert(m.data.as_str(), e.src);
            }
        }
    }
    let mut sinks: BTreeMap<&str, NodeId> = BTreeMap::new();
    for e in state.out_edges(exit) {
        if let Some(m) = &e.memlet {
            if out_data.contains_key(&m.data) {
                sinks.insert(m.data.as_str(), e.dst);
            }
        }
    }

    let mut wires = Vec::new();
    for (data_map, endpoints, is_output) in [(&in_data, &sources, false), (&out_data, &sinks, true)] {
        for (data, connector) in data_map {
            let outside = *endpoints
                .get(data.as_str())
                .ok_or_else(|| RewriteError::UnroutedData(data.clone()))?;
            let desc = program
                .desc(data)
                .ok_or_else(|| RewriteError::UnknownData(data.clone()))?;
            wires.push(Wire {
                outside,
                connector: connector.clone(),
                memlet: Memlet::from_array(data, desc),
                is_output,
            });
        }
    }

    // ── Commit ──
    let removed_edges: BTreeSet<EdgeId> = scope_nodes
        .iter()
        .flat_map(|&id| program.state.in_edges(id).chain(program.state.out_edges(id)))
        .map(|e| e.id)
        .collect();
    for id in &scope_nodes {
        program.state.remove_node(*id);
    }
    let label = stencil.label.clone();
    let stencil_id = program.state.add_node(NodeKind::Stencil(stencil));
    for wire in wires {
        if wire.is_output {
            program.state.add_edge(
                stencil_id,
                Some(wire.connector.as_str()),
                wire.outside,
                None,
                Some(wire.memlet),
            )?;
        } else {
            program.state.add_edge(
                wire.outside,
                None,
                stencil_id,
                Some(wire.connector.as_str()),
                Some(wire.memlet),
            )?;
        }
    }

    info!(
        label = %label,
        stencil = %stencil_id,
        offsets = ?offsets,
        removed_nodes = scope_nodes.len(),
        removed_edges = removed_edges.len(),
        "stencil rewrite applied"
    );

    Ok(StencilRewrite {
        stencil: stencil_id,
        label,
        offsets,
        accesses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataDesc;
    use crate::graph::MappedTasklet;

    fn jacobi(range: &str, out_index: &str) -> (Program, MappedTasklet) {
        let mut p = Program::new("p");
        p.add_array("A", DataDesc::array(vec![Expr::sym("N")]));
        p.add_array("B", DataDesc::array(vec![Expr::sym("N")]));
        p.add_array("w", DataDesc::scalar());
        let m = p
            .add_mapped_tasklet(
                "jacobi",
                &[("i", range.parse().unwrap())],
                &[
                    ("a0", Memlet::simple("A", "i - 1").unwrap()),
                    ("a1", Memlet::simple("A", "i").unwrap()),
                    ("a2", Memlet::simple("A", "i + 1").unwrap()),
                    ("wt", Memlet::simple("w", "0").unwrap()),
                ],
                "b = wt * (a0 + a1 + a2)",
                &[("b", Memlet::simple("B", out_index).unwrap())],
            )
            .unwrap();
        (p, m)
    }

    fn stencil_of(p: &Program, id: NodeId) -> &StencilNode {
        match &p.state.node(id).unwrap().kind {
            NodeKind::Stencil(s) => s,
            other => panic!("expected stencil, got {other:?}"),
        }
    }

    #[test]
    fn offsets_come_from_output_indices() {
        let (p, m) = jacobi("1:N-2", "i");
        let scope = p.state.node(m.entry).unwrap().as_map_entry().unwrap().clone();
        let out = Memlet::simple("B", "i").unwrap();
        assert_eq!(derive_offsets(&scope, &[&out]).unwrap(), vec![Some(1)]);

        let unrelated = Memlet::simple("B", "0").unwrap();
        assert_eq!(derive_offsets(&scope, &[&unrelated]).unwrap(), vec![None]);
    }

    #[test]
    fn substitution_normalizes_to_zero() {
        let (p, m) = jacobi("1:N-2", "i");
        let scope = p.state.node(m.entry).unwrap().as_map_entry().unwrap().clone();
        let rdict = substitution_map(&scope, &[Some(1)]);
        assert_eq!(rdict["i"], Expr::Int(0));
        let rdict = substitution_map(&scope, &[None]);
        assert_eq!(rdict["i"], Expr::Int(1));
    }

    #[test]
    fn non_point_output_range_is_fatal() {
        let (p, m) = jacobi("1:N-2", "i");
        let scope = p.state.node(m.entry).unwrap().as_map_entry().unwrap().clone();
        let wide = Memlet::simple("B", "i:i + 1").unwrap();
        assert!(matches!(
            derive_offsets(&scope, &[&wide]),
            Err(RewriteError::NonPointAccess { .. })
        ));
    }

    #[test]
    fn renaming_skips_attributes_and_strings() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), "__A[-1]".to_string());
        map.insert("b".to_string(), "__B[0]".to_string());
        let code = rename_connectors("b = a + a.real + len('a') + ab", &map);
        assert_eq!(code, "__B[0] = __A[-1] + __A[-1].real + len('a') + ab");
    }

    #[test]
    fn renaming_leaves_comments_alone() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), "__A[-1]".to_string());
        map.insert("b".to_string(), "__B[0]".to_string());
        let code = rename_connectors("b = a  # a\nb = b + a # keep b", &map);
        assert_eq!(code, "__B[0] = __A[-1]  # a\n__B[0] = __B[0] + __A[-1] # keep b");
    }

    #[test]
    fn jacobi_becomes_a_stencil() {
        let (mut p, m) = jacobi("1:N-2", "i");
        let rewrite = apply_stencil_rewrite(&mut p, m.entry).unwrap();
        assert_eq!(rewrite.offsets, vec![Some(1)]);
        assert_eq!(rewrite.label, "jacobi_stencil");

        let s = stencil_of(&p, rewrite.stencil);
        assert_eq!(s.code, "__B[0] = __w * (__A[-1] + __A[0] + __A[1])");
        assert_eq!(s.inputs, ["__A".to_string(), "__w".to_string()].into());
        assert_eq!(s.iterator_mapping["__A"], vec![true]);
        assert_eq!(s.iterator_mapping["__w"], vec![false]);
        assert_eq!(s.boundary_conditions["__B"], BoundaryCondition::Shrink);
        assert!(!s.boundary_conditions.contains_key("__A"));

        // Scope nodes are gone; external access nodes remain.
        assert!(p.state.node(m.entry).is_none());
        assert!(p.state.node(m.tasklet).is_none());
        assert!(p.state.node(m.exit).is_none());
        assert_eq!(p.state.node_count(), 4);
    }

    #[test]
    fn splice_uses_full_container_memlets() {
        let (mut p, m) = jacobi("0:N-1", "i");
        let rewrite = apply_stencil_rewrite(&mut p, m.entry).unwrap();
        let reads_a = p.state.in_edges(rewrite.stencil).find(|e| e.dst_conn.as_deref() == Some("__A")).unwrap();
        assert_eq!(reads_a.src, m.reads[0]);
        assert_eq!(reads_a.memlet.as_ref().unwrap().subset.to_string(), "0:N - 1");

        let writes_b: Vec<_> = p.state.out_edges(rewrite.stencil).collect();
        assert_eq!(writes_b.len(), 1);
        assert_eq!(writes_b[0].dst, m.writes[0]);
        assert_eq!(writes_b[0].src_conn.as_deref(), Some("__B"));
    }

    #[test]
    fn zero_lower_bound_keeps_relative_indices() {
        let (mut p, m) = jacobi("0:N-1", "i");
        let rewrite = apply_stencil_rewrite(&mut p, m.entry).unwrap();
        assert_eq!(rewrite.offsets, vec![Some(0)]);
        let inputs: Vec<String> = rewrite
            .accesses
            .iter()
            .filter(|a| !a.is_output && a.data == "A")
            .map(|a| a.subset.to_string())
            .collect();
        assert_eq!(inputs, vec!["-1", "0", "1"]);
    }

    #[test]
    fn missing_exit_leaves_program_untouched() {
        let (mut p, m) = jacobi("1:N-2", "i");
        p.state.remove_node(m.exit);
        let before = p.clone();
        assert_eq!(
            apply_stencil_rewrite(&mut p, m.entry),
            Err(RewriteError::MissingExit(m.entry))
        );
        assert_eq!(p, before);
    }

    #[test]
    fn unrouted_input_is_fatal() {
        let (mut p, m) = jacobi("1:N-2", "i");
        let feed = p.state.in_edges(m.entry).next().unwrap().id;
        p.state.remove_edge(feed);
        assert!(matches!(
            apply_stencil_rewrite(&mut p, m.entry),
            Err(RewriteError::UnroutedData(_))
        ));
    }
}
