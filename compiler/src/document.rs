// document.rs — JSON document format for a single-state program
//
// A document lists the data descriptors, nodes (with their identifiers) and
// edges of one state. Expressions, subsets and ranges are strings in the
// index-expression syntax (`i - 1`, `0:N-1`).
//
// Preconditions: none.
// Postconditions: `into_program` returns a state whose edges all connect
//                 live nodes and whose memlets name known data.
// Failure modes: I/O, JSON syntax and validation errors → `DocumentError`.
// Side effects: `load` reads the file system.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::DataDesc;
use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::graph::{Edge, Node, NodeKind, Program, State};

// ── Error type ─────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum DocumentError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json(serde_json::Error),
    /// Validation produced error diagnostics.
    Invalid(Vec<Diagnostic>),
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            DocumentError::Json(e) => write!(f, "invalid document: {}", e),
            DocumentError::Invalid(diags) => {
                write!(f, "document has {} error(s)", diags.len())?;
                for d in diags {
                    write!(f, "\n{}", d)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocumentError::Io { source, .. } => Some(source),
            DocumentError::Json(e) => Some(e),
            DocumentError::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for DocumentError {
    fn from(e: serde_json::Error) -> Self {
        DocumentError::Json(e)
    }
}

// ── Document ───────────────────────────────────────────────────────────────

/// Node identifiers index the node arena, so they must stay close to the
/// node count. Sparse ids are fine up to this limit.
fn node_id_limit(node_count: usize) -> usize {
    node_count.saturating_mul(4).saturating_add(1024)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramDocument {
    pub name: String,
    #[serde(default)]
    pub arrays: BTreeMap<String, DataDesc>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl ProgramDocument {
    pub fn from_program(program: &Program) -> Self {
        ProgramDocument {
            name: program.name.clone(),
            arrays: program.arrays.clone(),
            nodes: program.state.nodes().cloned().collect(),
            edges: program.state.edges().cloned().collect(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Structural checks; every problem is reported, not just the first.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        let mut kinds: HashMap<_, &NodeKind> = HashMap::new();

        let limit = node_id_limit(self.nodes.len());
        for node in &self.nodes {
            if node.id.0 as usize >= limit {
                diags.push(
                    Diagnostic::new(
                        DiagLevel::Error,
                        Some(node.id),
                        format!("node id {} is out of range for {} node(s)", node.id.0, self.nodes.len()),
                    )
                    .with_code(codes::E0007)
                    .with_hint(format!("renumber nodes below {limit}")),
                );
            }
            if kinds.insert(node.id, &node.kind).is_some() {
                diags.push(
                    Diagnostic::new(DiagLevel::Error, Some(node.id), format!("node id {} is used twice", node.id.0))
                        .with_code(codes::E0006),
                );
            }
        }

        let mut exits = HashSet::new();
        for node in &self.nodes {
            match &node.kind {
                NodeKind::Access { data } if !self.arrays.contains_key(data) => {
                    diags.push(
                        Diagnostic::new(
                            DiagLevel::Error,
                            Some(node.id),
                            format!("access node refers to unknown data '{data}'"),
                        )
                        .with_code(codes::E0003),
                    );
                }
                NodeKind::MapEntry(scope) if scope.params.len() != scope.range.len() => {
                    diags.push(
                        Diagnostic::new(
                            DiagLevel::Error,
                            Some(node.id),
                            format!(
                                "map '{}' has {} parameter(s) but {} range(s)",
                                scope.label,
                                scope.params.len(),
                                scope.range.len()
                            ),
                        )
                        .with_code(codes::E0005),
                    );
                }
                NodeKind::MapExit { entry } => {
                    if !matches!(kinds.get(entry), Some(NodeKind::MapEntry(_))) {
                        diags.push(
                            Diagnostic::new(
                                DiagLevel::Error,
                                Some(node.id),
                                format!("map exit refers to {entry}, which is not a map entry"),
                            )
                            .with_code(codes::E0004),
                        );
                    } else if !exits.insert(*entry) {
                        diags.push(
                            Diagnostic::new(
                                DiagLevel::Error,
                                Some(node.id),
                                format!("map {entry} has more than one exit"),
                            )
                            .with_code(codes::E0004)
                            .with_related(*entry, "map entry"),
                        );
                    }
                }
                _ => {}
            }
        }

        for (index, edge) in self.edges.iter().enumerate() {
            for endpoint in [edge.src, edge.dst] {
                if !kinds.contains_key(&endpoint) {
                    diags.push(
                        Diagnostic::new(
                            DiagLevel::Error,
                            None,
                            format!("edge #{index} refers to missing node {endpoint}"),
                        )
                        .with_code(codes::E0001),
                    );
                }
            }
            if let Some(memlet) = &edge.memlet {
                if !self.arrays.contains_key(&memlet.data) {
                    diags.push(
                        Diagnostic::new(
                            DiagLevel::Error,
                            Some(edge.dst),
                            format!("edge #{index} moves unknown data '{}'", memlet.data),
                        )
                        .with_code(codes::E0002),
                    );
                }
            }
        }

        diags
    }

    /// Validate and build the program.
    pub fn into_program(self) -> Result<Program, DocumentError> {
        let diags = self.validate();
        if diags.iter().any(Diagnostic::is_error) {
            return Err(DocumentError::Invalid(diags));
        }
        let mut state = State::new();
        for node in self.nodes {
            state
                .insert_node(node)
                .map_err(|e| DocumentError::Invalid(vec![graph_diag(e)]))?;
        }
        for edge in self.edges {
            state
                .add_edge(
                    edge.src,
                    edge.src_conn.as_deref(),
                    edge.dst,
                    edge.dst_conn.as_deref(),
                    edge.memlet,
                )
                .map_err(|e| DocumentError::Invalid(vec![graph_diag(e)]))?;
        }
        Ok(Program {
            name: self.name,
            arrays: self.arrays,
            state,
        })
    }
}

fn graph_diag(e: crate::graph::GraphError) -> Diagnostic {
    Diagnostic::new(DiagLevel::Error, None, e.to_string()).with_code(codes::E0001)
}

// ── Entry points ───────────────────────────────────────────────────────────

pub fn parse_program(text: &str) -> Result<Program, DocumentError> {
    ProgramDocument::from_json(text)?.into_program()
}

pub fn load(path: &Path) -> Result<Program, DocumentError> {
    let text = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_program(&text)
}

/// Pretty JSON for `--emit json`.
pub fn to_json(program: &Program) -> Result<String, DocumentError> {
    Ok(serde_json::to_string_pretty(&ProgramDocument::from_program(program))?)
}

/// Compact JSON with deterministic ordering, used for fingerprints.
pub fn canonical_json(program: &Program) -> Result<String, DocumentError> {
    Ok(serde_json::to_string(&ProgramDocument::from_program(program))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Memlet, NodeId};
    use crate::symbolic::Expr;

    const JACOBI: &str = r#"{
        "name": "jacobi",
        "arrays": {
            "A": {"kind": "array", "shape": ["N"]},
            "B": {"kind": "array", "shape": ["N"]}
        },
        "nodes": [
            {"id": 0, "kind": "access", "data": "A"},
            {"id": 1, "kind": "map_entry", "label": "jacobi", "params": ["i"], "range": ["1:N-2"]},
            {"id": 2, "kind": "tasklet", "label": "jacobi", "inputs": ["l", "r"], "outputs": ["o"], "code": "o = l + r"},
            {"id": 3, "kind": "map_exit", "entry": 1},
            {"id": 4, "kind": "access", "data": "B"}
        ],
        "edges": [
            {"src": 0, "dst": 1, "dst_conn": "IN_A", "memlet": {"data": "A", "subset": "0:N-1"}},
            {"src": 1, "src_conn": "OUT_A", "dst": 2, "dst_conn": "l", "memlet": {"data": "A", "subset": "i - 1"}},
            {"src": 1, "src_conn": "OUT_A", "dst": 2, "dst_conn": "r", "memlet": {"data": "A", "subset": "i + 1"}},
            {"src": 2, "src_conn": "o", "dst": 3, "dst_conn": "IN_B", "memlet": {"data": "B", "subset": "i"}},
            {"src": 3, "src_conn": "OUT_B", "dst": 4, "memlet": {"data": "B", "subset": "0:N-1"}}
        ]
    }"#;

    fn codes_of(doc: &ProgramDocument) -> Vec<&'static str> {
        doc.validate()
            .iter()
            .filter_map(|d| d.code.map(|c| c.0))
            .collect()
    }

    #[test]
    fn loads_jacobi() {
        let program = parse_program(JACOBI).unwrap();
        assert_eq!(program.name, "jacobi");
        assert_eq!(program.state.node_count(), 5);
        assert_eq!(program.state.edge_count(), 5);
        assert_eq!(program.state.exit_node(NodeId(1)), Some(NodeId(3)));
        let scope = program.state.node(NodeId(1)).unwrap().as_map_entry().unwrap();
        assert_eq!(scope.range[0].end, "N - 2".parse::<Expr>().unwrap());
    }

    #[test]
    fn json_round_trip_preserves_program() {
        let program = parse_program(JACOBI).unwrap();
        let again = parse_program(&to_json(&program).unwrap()).unwrap();
        assert_eq!(again, program);
        assert_eq!(canonical_json(&again).unwrap(), canonical_json(&program).unwrap());
    }

    #[test]
    fn dangling_edge_is_reported() {
        let mut doc = ProgramDocument::from_json(JACOBI).unwrap();
        doc.edges[0].src = NodeId(42);
        assert_eq!(codes_of(&doc), vec!["E0001"]);
        assert!(matches!(doc.into_program(), Err(DocumentError::Invalid(_))));
    }

    #[test]
    fn unknown_data_is_reported() {
        let mut doc = ProgramDocument::from_json(JACOBI).unwrap();
        doc.arrays.remove("B");
        assert_eq!(codes_of(&doc), vec!["E0003", "E0002", "E0002"]);
    }

    #[test]
    fn exit_problems_are_reported() {
        let mut doc = ProgramDocument::from_json(JACOBI).unwrap();
        doc.nodes.push(Node {
            id: NodeId(5),
            kind: NodeKind::MapExit { entry: NodeId(1) },
        });
        doc.nodes.push(Node {
            id: NodeId(6),
            kind: NodeKind::MapExit { entry: NodeId(0) },
        });
        assert_eq!(codes_of(&doc), vec!["E0004", "E0004"]);
    }

    fn renumber_output(id: u64) -> String {
        JACOBI
            .replace(r#"{"id": 4, "kind""#, &format!(r#"{{"id": {id}, "kind""#))
            .replace(r#""dst": 4,"#, &format!(r#""dst": {id},"#))
    }

    #[test]
    fn huge_node_id_is_rejected() {
        let doc = ProgramDocument::from_json(&renumber_output(4_000_000_000)).unwrap();
        assert_eq!(codes_of(&doc), vec!["E0007"]);
        match doc.into_program() {
            Err(DocumentError::Invalid(diags)) => {
                assert_eq!(diags.len(), 1);
                assert_eq!(diags[0].node, Some(NodeId(4_000_000_000)));
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn sparse_node_ids_load() {
        let program = parse_program(&renumber_output(1000)).unwrap();
        assert_eq!(program.state.node_count(), 5);
        assert!(program.state.node(NodeId(1000)).is_some());
    }

    #[test]
    fn range_count_mismatch_is_reported() {
        let text = JACOBI.replace(r#""params": ["i"]"#, r#""params": ["i", "j"]"#);
        let doc = ProgramDocument::from_json(&text).unwrap();
        assert_eq!(codes_of(&doc), vec!["E0005"]);
    }

    #[test]
    fn malformed_subset_is_a_json_error() {
        let text = JACOBI.replace(r#""subset": "i - 1""#, r#""subset": "i -""#);
        assert!(matches!(parse_program(&text), Err(DocumentError::Json(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load(Path::new("/nonexistent/program.json")).unwrap_err();
        assert!(matches!(err, DocumentError::Io { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn programs_built_in_code_serialize() {
        let mut program = Program::new("p");
        program.add_array("A", DataDesc::array(vec![Expr::sym("N")]));
        program
            .add_mapped_tasklet(
                "copy",
                &[("i", "0:N-1".parse().unwrap())],
                &[("a", Memlet::simple("A", "i").unwrap())],
                "b = a",
                &[("b", Memlet::simple("A", "i").unwrap())],
            )
            .unwrap();
        let text = to_json(&program).unwrap();
        assert!(text.contains("\"kind\": \"map_entry\""));
        assert_eq!(parse_program(&text).unwrap(), program);
    }
}
