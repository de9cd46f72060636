// stencil.rs — Stencil node: the specialized replacement for a matched map
//
// Holds the rewritten body, the per-connector iterator mapping and the
// boundary policy for each output. Code generation consumes these three
// fields as-is.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// What happens where a neighborhood access would leave the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "btype", rename_all = "snake_case")]
pub enum BoundaryCondition {
    /// The output iteration domain contracts; nothing is padded.
    Shrink,
}

impl fmt::Display for BoundaryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryCondition::Shrink => write!(f, "shrink"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StencilNode {
    pub label: String,
    pub code: String,
    pub inputs: BTreeSet<String>,
    pub outputs: BTreeSet<String>,
    /// Per connector, per iteration dimension: does the dimension index it?
    pub iterator_mapping: BTreeMap<String, Vec<bool>>,
    pub boundary_conditions: BTreeMap<String, BoundaryCondition>,
}

impl fmt::Display for StencilNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(", ");
        writeln!(
            f,
            "stencil {} ({}) -> ({})",
            self.label,
            join(&self.inputs),
            join(&self.outputs)
        )?;
        for (conn, mapping) in &self.iterator_mapping {
            let flags: Vec<&str> = mapping.iter().map(|&b| if b { "1" } else { "0" }).collect();
            writeln!(f, "  map {conn}: [{}]", flags.join(", "))?;
        }
        for (conn, bc) in &self.boundary_conditions {
            writeln!(f, "  boundary {conn}: {bc}")?;
        }
        write!(f, "  code: {}", self.code)
    }
}
