// stencil_detection.rs — The stencil detection transformation
//
// Matches `MapEntry -> Tasklet -> MapExit`, accepts the binding when the
// eligibility analysis finds a stencil, and replaces the map scope with a
// `StencilNode`.
//
// Preconditions: bindings come from `pattern_templates()[0]`.
// Postconditions: see `rewrite::apply_stencil_rewrite`.
// Failure modes: `apply` on an ineligible binding → `RewriteError`.
// Side effects: `tracing` events for rejections and rewrites.

use tracing::debug;

use crate::diag::Diagnostic;
use crate::eligibility::{check_candidate, Rejection};
use crate::graph::{Node, Program};
use crate::pass::{PassDescriptor, Transformation};
use crate::pattern::{Binding, NodeClass, PathTemplate};
use crate::rewrite::{apply_stencil_rewrite, RewriteError};

#[derive(Debug, Clone, Copy, Default)]
pub struct StencilDetection;

impl StencilDetection {
    /// Template roles.
    pub const MAP_ENTRY: usize = 0;
    pub const TASKLET: usize = 1;
    pub const MAP_EXIT: usize = 2;

    pub fn template() -> PathTemplate {
        PathTemplate::path(
            "map_entry -> tasklet -> map_exit",
            &[NodeClass::MapEntry, NodeClass::Tasklet, NodeClass::MapExit],
        )
    }

    /// Full verdict with the rejection reason.
    pub fn check(program: &Program, binding: &Binding) -> Result<(), Rejection> {
        match binding.nodes.as_slice() {
            [entry, tasklet, exit] => check_candidate(program, *entry, *tasklet, *exit),
            _ => Err(Rejection::PatternMismatch { node: None }),
        }
    }
}

impl Transformation for StencilDetection {
    fn descriptor(&self) -> PassDescriptor {
        PassDescriptor {
            name: "stencil_detection",
            summary: "replace single-tasklet neighborhood maps with stencil nodes",
            invariants: "external sources and sinks keep their data; scope nodes are removed",
        }
    }

    fn pattern_templates(&self) -> Vec<PathTemplate> {
        vec![Self::template()]
    }

    // `strict` does not change the rules of this pass.
    fn is_eligible(&self, program: &Program, binding: &Binding, _strict: bool) -> bool {
        match Self::check(program, binding) {
            Ok(()) => true,
            Err(rejection) => {
                debug!(
                    code = %rejection.code(),
                    candidate = %self.match_to_str(program, binding),
                    "{rejection}"
                );
                false
            }
        }
    }

    fn apply(&self, program: &mut Program, binding: &Binding) -> Result<(), RewriteError> {
        let entry = binding
            .node(Self::MAP_ENTRY)
            .ok_or(RewriteError::IncompleteBinding)?;
        apply_stencil_rewrite(program, entry).map(|_| ())
    }

    /// `label: [p0, p1]`
    fn match_to_str(&self, program: &Program, binding: &Binding) -> String {
        let scope = binding
            .node(Self::MAP_ENTRY)
            .and_then(|id| program.state.node(id))
            .and_then(Node::as_map_entry);
        match scope {
            Some(scope) => format!("{}: [{}]", scope.label, scope.params.join(", ")),
            None => format!("{:?}", binding.nodes),
        }
    }

    fn explain(&self, program: &Program, binding: &Binding) -> Option<Diagnostic> {
        let rejection = Self::check(program, binding).err()?;
        let entry = binding.node(Self::MAP_ENTRY)?;
        Some(rejection.to_diagnostic(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataDesc;
    use crate::diag::codes;
    use crate::graph::{Memlet, NodeKind};
    use crate::pattern::match_pattern;
    use crate::symbolic::Expr;

    fn program(left: &str, right: &str) -> Program {
        let mut p = Program::new("p");
        p.add_array("A", DataDesc::array(vec![Expr::sym("N")]));
        p.add_array("B", DataDesc::array(vec![Expr::sym("N")]));
        p.add_mapped_tasklet(
            "diff",
            &[("i", "1:N-2".parse().unwrap())],
            &[
                ("l", Memlet::simple("A", left).unwrap()),
                ("r", Memlet::simple("A", right).unwrap()),
            ],
            "o = r - l",
            &[("o", Memlet::simple("B", "i").unwrap())],
        )
        .unwrap();
        p
    }

    fn binding(p: &Program) -> Binding {
        let template = StencilDetection::template();
        let first = match_pattern(&p.state, &template).next().unwrap();
        first
    }

    #[test]
    fn strict_flag_does_not_change_verdict() {
        let p = program("i - 1", "i + 1");
        let b = binding(&p);
        assert!(StencilDetection.is_eligible(&p, &b, false));
        assert!(StencilDetection.is_eligible(&p, &b, true));
    }

    #[test]
    fn match_label_lists_parameters() {
        let p = program("i - 1", "i + 1");
        assert_eq!(StencilDetection.match_to_str(&p, &binding(&p)), "diff: [i]");
    }

    #[test]
    fn explain_reports_rejection_code() {
        let p = program("i", "i");
        let b = binding(&p);
        assert!(!StencilDetection.is_eligible(&p, &b, false));
        let diag = StencilDetection.explain(&p, &b).unwrap();
        assert_eq!(diag.code, Some(codes::N0112));
        assert_eq!(diag.node, b.node(StencilDetection::MAP_ENTRY));

        let ok = program("i - 1", "i + 1");
        assert!(StencilDetection.explain(&ok, &binding(&ok)).is_none());
    }

    #[test]
    fn wrong_arity_is_a_pattern_mismatch() {
        let p = program("i - 1", "i + 1");
        let short = Binding {
            nodes: binding(&p).nodes[..2].to_vec(),
        };
        assert_eq!(
            StencilDetection::check(&p, &short),
            Err(Rejection::PatternMismatch { node: None })
        );
    }

    #[test]
    fn apply_replaces_scope() {
        let mut p = program("i - 1", "i + 1");
        let b = binding(&p);
        StencilDetection.apply(&mut p, &b).unwrap();
        assert!(p
            .state
            .nodes()
            .any(|n| matches!(&n.kind, NodeKind::Stencil(s) if s.label == "diff_stencil")));
        let template = StencilDetection::template();
        assert_eq!(match_pattern(&p.state, &template).count(), 0);
    }
}
