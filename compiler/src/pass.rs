// pass.rs — Transformation pass contract: descriptor, trait, configuration
//
// Every graph transformation exposes the same three operations to the pass
// manager: the path templates it matches, an eligibility test for one
// binding, and the rewrite itself. Passes are plain values registered
// explicitly with a `PassManager`; there is no global registry.

use crate::diag::Diagnostic;
use crate::graph::Program;
use crate::pattern::{Binding, PathTemplate};
use crate::rewrite::RewriteError;

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a transformation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// One-line description for listings.
    pub summary: &'static str,
    /// What holds after `apply` (documentation only).
    pub invariants: &'static str,
}

// ── Transformation trait ───────────────────────────────────────────────────

pub trait Transformation {
    fn descriptor(&self) -> PassDescriptor;

    fn name(&self) -> &'static str {
        self.descriptor().name
    }

    /// Templates whose bindings are offered to `is_eligible`.
    fn pattern_templates(&self) -> Vec<PathTemplate>;

    /// Soft check; `false` leaves the binding alone.
    fn is_eligible(&self, program: &Program, binding: &Binding, strict: bool) -> bool;

    /// Rewrite an eligible binding in place. An error means an eligibility
    /// guarantee did not hold and the run must stop.
    fn apply(&self, program: &mut Program, binding: &Binding) -> Result<(), RewriteError>;

    /// Short label for a binding, used in reports.
    fn match_to_str(&self, program: &Program, binding: &Binding) -> String;

    /// Why a binding is not eligible, if the pass can tell.
    fn explain(&self, _program: &Program, _binding: &Binding) -> Option<Diagnostic> {
        None
    }
}

// ── Configuration ──────────────────────────────────────────────────────────

/// Options for one pass-manager run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassConfig {
    /// Forwarded to `is_eligible`.
    pub strict: bool,
    /// Stop after this many rewrites (all passes together).
    pub max_applications: Option<usize>,
    /// Record a note for every rejected binding.
    pub collect_rejections: bool,
    /// Print progress lines to stderr.
    pub verbose: bool,
}

impl Default for PassConfig {
    fn default() -> Self {
        PassConfig {
            strict: false,
            max_applications: None,
            collect_rejections: true,
            verbose: false,
        }
    }
}
