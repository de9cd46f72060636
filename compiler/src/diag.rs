// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used by document validation, the
// eligibility analyzer and the pass manager.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::graph::NodeId;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0001`, `N0103`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Assigned diagnostic codes.
///
/// `E00xx` document validation, `E01xx` pass failures, `W00xx` pass
/// manager warnings, `N01xx` stencil rejection reasons.
pub mod codes {
    use super::DiagCode;

    pub const E0001: DiagCode = DiagCode("E0001"); // edge endpoint does not exist
    pub const E0002: DiagCode = DiagCode("E0002"); // memlet names unknown data
    pub const E0003: DiagCode = DiagCode("E0003"); // access node names unknown data
    pub const E0004: DiagCode = DiagCode("E0004"); // map exit without entry, or duplicate exit
    pub const E0005: DiagCode = DiagCode("E0005"); // map parameter/range count mismatch
    pub const E0006: DiagCode = DiagCode("E0006"); // duplicate node id
    pub const E0007: DiagCode = DiagCode("E0007"); // node id out of range

    pub const E0100: DiagCode = DiagCode("E0100"); // rewrite precondition violated

    pub const W0001: DiagCode = DiagCode("W0001"); // application limit reached

    pub const N0101: DiagCode = DiagCode("N0101"); // binding is not entry/tasklet/exit
    pub const N0102: DiagCode = DiagCode("N0102"); // exit belongs to another map
    pub const N0103: DiagCode = DiagCode("N0103"); // scope holds more than three nodes
    pub const N0104: DiagCode = DiagCode("N0104"); // memlet data has no descriptor
    pub const N0105: DiagCode = DiagCode("N0105"); // access covers several elements
    pub const N0106: DiagCode = DiagCode("N0106"); // relative offset is symbolic
    pub const N0107: DiagCode = DiagCode("N0107"); // accesses differ in dimensionality
    pub const N0108: DiagCode = DiagCode("N0108"); // index is not affine in one parameter
    pub const N0109: DiagCode = DiagCode("N0109"); // access misses an iteration parameter
    pub const N0110: DiagCode = DiagCode("N0110"); // output has write-conflict resolution
    pub const N0111: DiagCode = DiagCode("N0111"); // output container is not an array
    pub const N0112: DiagCode = DiagCode("N0112"); // no access has a non-zero offset
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagLevel {
    Error,
    Warning,
    Note,
}

// ── Related node ─────────────────────────────────────────────────────────

/// A secondary graph location providing context for a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedNode {
    pub node: NodeId,
    pub label: String,
}

// ── Cause record ─────────────────────────────────────────────────────────

/// One link in a cause chain explaining a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CauseRecord {
    pub message: String,
    pub node: Option<NodeId>,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by validation or by a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub node: Option<NodeId>,
    pub message: String,
    pub hint: Option<String>,
    pub related_nodes: Vec<RelatedNode>,
    pub cause_chain: Vec<CauseRecord>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, related nodes, or causes.
    pub fn new(level: DiagLevel, node: Option<NodeId>, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            node,
            message: message.into(),
            hint: None,
            related_nodes: Vec::new(),
            cause_chain: Vec::new(),
        }
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related node.
    pub fn with_related(mut self, node: NodeId, label: impl Into<String>) -> Self {
        self.related_nodes.push(RelatedNode {
            node,
            label: label.into(),
        });
        self
    }

    /// Attach a cause record to the chain.
    pub fn with_cause(mut self, message: impl Into<String>, node: Option<NodeId>) -> Self {
        self.cause_chain.push(CauseRecord {
            message: message.into(),
            node,
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
            DiagLevel::Note => "note",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(node) = self.node {
            write!(f, " (at {})", node)?;
        }
        for cause in &self.cause_chain {
            write!(f, "\n  caused by: {}", cause.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}
