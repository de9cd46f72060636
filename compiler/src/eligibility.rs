// eligibility.rs — Stencil eligibility analysis for a matched map scope
//
// Decides whether an `entry -> tasklet -> exit` binding computes a stencil:
// every array access is a single point, every index is a single iteration
// parameter plus an optional constant, every access walks the full
// iteration space, and at least one input array is read at two different
// integer offsets.
//
// Preconditions: `entry`, `tasklet` and `exit` come from one state of `program`.
// Postconditions: returns `Ok(())` only for a stencil; the graph is not read
//                 beyond the scope's own edges and the descriptor table.
// Failure modes: none; every unsupported construct is a `Rejection` value.
// Side effects: none.

use std::collections::BTreeSet;
use std::fmt;

use crate::data::DescKind;
use crate::diag::{codes, DiagCode, DiagLevel, Diagnostic};
use crate::graph::{Edge, Node, NodeId, Program};
use crate::subset::Subset;
use crate::symbolic::{Expr, IndexShape};

/// Largest scope a stencil may occupy: entry, one tasklet, exit.
pub const MAX_SCOPE_NODES: usize = 3;

// ── Rejection reasons ───────────────────────────────────────────────────────

/// Why a candidate is not a stencil.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A bound node does not have the kind its role requires, or the
    /// binding has the wrong number of roles (`node` is `None`).
    PatternMismatch { node: Option<NodeId> },
    /// The bound exit closes a different map.
    ForeignExit { entry: NodeId, exit: NodeId },
    ScopeTooLarge { nodes: usize },
    UnknownData { data: String },
    MultiElementAccess { data: String, subset: Subset },
    SymbolicOffset { data: String, offset: Vec<Expr> },
    DimensionMismatch { data: String },
    NonAffineIndex { data: String, index: Expr },
    IncompleteCoverage { data: String, missing: Vec<String> },
    WriteConflict { data: String },
    UnsupportedOutput { data: String },
    /// Structurally valid, but every access sits at the same offset.
    NoStencil,
}

impl Rejection {
    pub fn code(&self) -> DiagCode {
        match self {
            Rejection::PatternMismatch { .. } => codes::N0101,
            Rejection::ForeignExit { .. } => codes::N0102,
            Rejection::ScopeTooLarge { .. } => codes::N0103,
            Rejection::UnknownData { .. } => codes::N0104,
            Rejection::MultiElementAccess { .. } => codes::N0105,
            Rejection::SymbolicOffset { .. } => codes::N0106,
            Rejection::DimensionMismatch { .. } => codes::N0107,
            Rejection::NonAffineIndex { .. } => codes::N0108,
            Rejection::IncompleteCoverage { .. } => codes::N0109,
            Rejection::WriteConflict { .. } => codes::N0110,
            Rejection::UnsupportedOutput { .. } => codes::N0111,
            Rejection::NoStencil => codes::N0112,
        }
    }

    /// Note-level diagnostic anchored at the map entry.
    pub fn to_diagnostic(&self, entry: NodeId) -> Diagnostic {
        let diag = Diagnostic::new(DiagLevel::Note, Some(entry), self.to_string())
            .with_code(self.code());
        match self {
            Rejection::NonAffineIndex { .. } => {
                diag.with_hint("stencil indices must be a map parameter plus a constant")
            }
            Rejection::NoStencil => {
                diag.with_hint("all accesses share one offset; this is an element-wise map")
            }
            Rejection::ScopeTooLarge { .. } => {
                diag.with_hint("only maps around a single tasklet are considered")
            }
            _ => diag,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::PatternMismatch { node: Some(node) } => {
                write!(f, "node {node} does not fit the map/tasklet/exit pattern")
            }
            Rejection::PatternMismatch { node: None } => {
                write!(f, "binding does not have entry, tasklet and exit roles")
            }
            Rejection::ForeignExit { entry, exit } => {
                write!(f, "exit {exit} does not close map {entry}")
            }
            Rejection::ScopeTooLarge { nodes } => {
                write!(f, "map scope holds {nodes} nodes (at most {MAX_SCOPE_NODES})")
            }
            Rejection::UnknownData { data } => write!(f, "no descriptor for '{data}'"),
            Rejection::MultiElementAccess { data, subset } => {
                write!(f, "access {data}[{subset}] covers more than one element")
            }
            Rejection::SymbolicOffset { data, offset } => {
                let parts: Vec<String> = offset.iter().map(|e| e.to_string()).collect();
                write!(f, "offset ({}) between accesses to '{data}' is symbolic", parts.join(", "))
            }
            Rejection::DimensionMismatch { data } => {
                write!(f, "accesses to '{data}' differ in dimensionality")
            }
            Rejection::NonAffineIndex { data, index } => {
                write!(f, "index '{index}' into '{data}' is not a parameter plus a constant")
            }
            Rejection::IncompleteCoverage { data, missing } => write!(
                f,
                "access to '{data}' does not use map parameter(s) {}",
                missing.join(", ")
            ),
            Rejection::WriteConflict { data } => {
                write!(f, "write to '{data}' uses write-conflict resolution")
            }
            Rejection::UnsupportedOutput { data } => {
                write!(f, "output '{data}' is not an array or view")
            }
            Rejection::NoStencil => write!(f, "no access has a non-zero relative offset"),
        }
    }
}

// ── Analysis ────────────────────────────────────────────────────────────────

/// Check one `entry -> tasklet -> exit` candidate.
pub fn check_candidate(
    program: &Program,
    entry: NodeId,
    tasklet: NodeId,
    exit: NodeId,
) -> Result<(), Rejection> {
    let state = &program.state;
    let scope = state
        .node(entry)
        .and_then(Node::as_map_entry)
        .ok_or(Rejection::PatternMismatch { node: Some(entry) })?;
    state
        .node(tasklet)
        .and_then(Node::as_tasklet)
        .ok_or(Rejection::PatternMismatch {
            node: Some(tasklet),
        })?;
    if state.exit_node(entry) != Some(exit) {
        return Err(Rejection::ForeignExit { entry, exit });
    }

    let scope_size = state.scope_nodes(entry).len();
    if scope_size > MAX_SCOPE_NODES {
        return Err(Rejection::ScopeTooLarge { nodes: scope_size });
    }

    let params = scope.param_set();
    let mut stencil_found = false;

    for (data, accesses) in group_by_data(state.out_edges(entry)) {
        let desc = program
            .desc(data)
            .ok_or_else(|| Rejection::UnknownData { data: data.to_string() })?;
        match desc.kind {
            DescKind::Scalar => continue,
            DescKind::Array | DescKind::View => {
                if desc.is_singleton() {
                    continue;
                }
                let mut reference: Option<&Subset> = None;
                for subset in accesses {
                    require_single_point(data, subset)?;
                    match reference {
                        Some(first) => {
                            if has_nonzero_offset(data, subset, first)? {
                                stencil_found = true;
                            }
                        }
                        None => reference = Some(subset),
                    }
                    require_coverage(data, subset, &params)?;
                }
            }
        }
    }

    let exit_edges: Vec<&Edge> = state.in_edges(exit).collect();
    for edge in &exit_edges {
        if let Some(memlet) = &edge.memlet {
            if memlet.wcr.is_some() {
                return Err(Rejection::WriteConflict {
                    data: memlet.data.clone(),
                });
            }
        }
    }

    for (data, accesses) in group_by_data(exit_edges.into_iter()) {
        let desc = program
            .desc(data)
            .ok_or_else(|| Rejection::UnknownData { data: data.to_string() })?;
        match desc.kind {
            DescKind::Scalar => {
                return Err(Rejection::UnsupportedOutput {
                    data: data.to_string(),
                })
            }
            DescKind::Array | DescKind::View => {
                for subset in accesses {
                    require_single_point(data, subset)?;
                    require_coverage(data, subset, &params)?;
                }
            }
        }
    }

    if stencil_found {
        Ok(())
    } else {
        Err(Rejection::NoStencil)
    }
}

/// Subsets per data name, in first-seen edge order. Edges without a memlet
/// carry no data and are skipped.
fn group_by_data<'a>(edges: impl Iterator<Item = &'a Edge>) -> Vec<(&'a str, Vec<&'a Subset>)> {
    let mut groups: Vec<(&'a str, Vec<&'a Subset>)> = Vec::new();
    for memlet in edges.filter_map(|e| e.memlet.as_ref()) {
        match groups.iter_mut().find(|(data, _)| *data == memlet.data) {
            Some((_, subsets)) => subsets.push(&memlet.subset),
            None => groups.push((memlet.data.as_str(), vec![&memlet.subset])),
        }
    }
    groups
}

fn require_single_point(data: &str, subset: &Subset) -> Result<(), Rejection> {
    if subset.is_single_point() {
        Ok(())
    } else {
        Err(Rejection::MultiElementAccess {
            data: data.to_string(),
            subset: subset.clone(),
        })
    }
}

/// True if `subset` sits at a non-zero integer offset from `reference`.
fn has_nonzero_offset(data: &str, subset: &Subset, reference: &Subset) -> Result<bool, Rejection> {
    let offset = subset
        .offset_from(reference)
        .ok_or_else(|| Rejection::DimensionMismatch {
            data: data.to_string(),
        })?;
    let mut nonzero = false;
    for delta in &offset {
        match delta.try_evaluate_to_integer() {
            Some(0) => {}
            Some(_) => nonzero = true,
            None => {
                return Err(Rejection::SymbolicOffset {
                    data: data.to_string(),
                    offset: offset.clone(),
                })
            }
        }
    }
    Ok(nonzero)
}

/// Every dimension must be affine in one parameter, and together the
/// dimensions must use every parameter of the map.
fn require_coverage(data: &str, subset: &Subset, params: &BTreeSet<String>) -> Result<(), Rejection> {
    let mut unmatched = params.clone();
    for index in subset.min_element() {
        match index.classify(params) {
            IndexShape::Bare(symbol) | IndexShape::AffineSingle(symbol, _) => {
                unmatched.remove(&symbol);
            }
            IndexShape::Other => {
                return Err(Rejection::NonAffineIndex {
                    data: data.to_string(),
                    index,
                })
            }
        }
    }
    if unmatched.is_empty() {
        Ok(())
    } else {
        Err(Rejection::IncompleteCoverage {
            data: data.to_string(),
            missing: unmatched.into_iter().collect(),
        })
    }
}
