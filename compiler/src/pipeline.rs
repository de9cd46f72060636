// pipeline.rs — Pass manager: explicit pass list and fixed-point rewriting
//
// Runs every registered transformation until no binding of any template is
// eligible. After each rewrite the matcher restarts from scratch, since the
// rewrite invalidates earlier bindings. All work happens on a copy of the
// program that replaces the caller's program only when the run completes.
//
// Preconditions: the program passed document validation (or was built in code).
// Postconditions: on `Ok`, the program is at a fixed point of all passes, or
//                 `max_applications` rewrites were applied (warning W0001).
// Failure modes: a pass's `apply` fails → `PipelineError::Precondition`,
//                program unchanged.
// Side effects: calls `on_applied` after each rewrite; verbose progress on stderr.

use std::fmt;
use std::time::{Duration, Instant};

use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::document::{canonical_json, DocumentError};
use crate::graph::Program;
use crate::pass::{PassConfig, Transformation};
use crate::pattern::{match_pattern, Binding};
use crate::rewrite::RewriteError;
use crate::stencil_detection::StencilDetection;

// ── Fingerprint ────────────────────────────────────────────────────────────

/// SHA-256 of a program's canonical compact JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn of(program: &Program) -> Result<Self, DocumentError> {
        use sha2::{Digest, Sha256};

        let canonical = canonical_json(program)?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        Ok(Fingerprint(hash))
    }

    /// Hex string (64 characters).
    pub fn hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
        }
        s
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex())
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum PipelineError {
    /// A pass could not apply a binding it had accepted.
    Precondition {
        pass: &'static str,
        candidate: String,
        source: RewriteError,
    },
    Document(DocumentError),
}

impl PipelineError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            PipelineError::Precondition {
                pass,
                candidate,
                source,
            } => Diagnostic::new(
                DiagLevel::Error,
                None,
                format!("{pass} failed on accepted candidate '{candidate}'"),
            )
            .with_code(codes::E0100)
            .with_cause(source.to_string(), None),
            PipelineError::Document(e) => Diagnostic::new(DiagLevel::Error, None, e.to_string()),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Precondition {
                pass,
                candidate,
                source,
            } => write!(f, "{pass}: precondition violated for '{candidate}': {source}"),
            PipelineError::Document(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Precondition { source, .. } => Some(source),
            PipelineError::Document(e) => Some(e),
        }
    }
}

impl From<DocumentError> for PipelineError {
    fn from(e: DocumentError) -> Self {
        PipelineError::Document(e)
    }
}

// ── Report ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTransformation {
    pub pass: &'static str,
    /// `match_to_str` of the binding, taken before the rewrite.
    pub candidate: String,
    /// 1-based sweep in which the rewrite happened.
    pub sweep: usize,
}

#[derive(Debug, Clone)]
pub struct PassReport {
    pub applied: Vec<AppliedTransformation>,
    /// Rejection notes (de-duplicated) and pass-manager warnings.
    pub diagnostics: Vec<Diagnostic>,
    pub sweeps: usize,
    pub limit_reached: bool,
    pub before: Fingerprint,
    pub after: Fingerprint,
    pub elapsed: Duration,
}

impl PassReport {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }

    /// Plain-text summary for `--emit report`.
    pub fn render(&self, program: &Program) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        writeln!(out, "program: {}", program.name).unwrap();
        writeln!(out, "sweeps: {}", self.sweeps).unwrap();
        writeln!(out, "applied: {}", self.applied.len()).unwrap();
        for a in &self.applied {
            writeln!(out, "  {} {}", a.pass, a.candidate).unwrap();
        }
        writeln!(out, "diagnostics: {}", self.diagnostics.len()).unwrap();
        for d in &self.diagnostics {
            for line in d.to_string().lines() {
                writeln!(out, "  {}", line).unwrap();
            }
        }
        writeln!(out, "before: {}", self.before).unwrap();
        writeln!(out, "after: {}", self.after).unwrap();
        out
    }
}

/// One binding and its verdict, from `PassManager::list_candidates`.
#[derive(Debug, Clone)]
pub struct CandidateReport {
    pub pass: &'static str,
    pub template: &'static str,
    pub binding: Binding,
    pub candidate: String,
    pub eligible: bool,
    pub reason: Option<Diagnostic>,
}

// ── Pass manager ───────────────────────────────────────────────────────────

pub struct PassManager {
    passes: Vec<Box<dyn Transformation>>,
    config: PassConfig,
}

impl PassManager {
    pub fn new(config: PassConfig) -> Self {
        PassManager {
            passes: Vec::new(),
            config,
        }
    }

    /// Manager with `StencilDetection` registered.
    pub fn with_default_passes(config: PassConfig) -> Self {
        let mut manager = PassManager::new(config);
        manager.register(Box::new(StencilDetection));
        manager
    }

    /// Append a pass; passes run in registration order.
    pub fn register(&mut self, pass: Box<dyn Transformation>) -> &mut Self {
        self.passes.push(pass);
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn config(&self) -> &PassConfig {
        &self.config
    }

    /// Apply all passes to a fixed point.
    ///
    /// Per-rewrite sequence: match → eligibility → apply → on_applied → rescan.
    pub fn run(
        &self,
        program: &mut Program,
        mut on_applied: impl FnMut(&AppliedTransformation),
    ) -> Result<PassReport, PipelineError> {
        let start = Instant::now();
        let before = Fingerprint::of(program)?;
        let mut working = program.clone();
        let mut applied: Vec<AppliedTransformation> = Vec::new();
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let mut sweeps = 0;
        let mut limit_reached = false;

        if self.config.verbose {
            eprintln!(
                "stencil-detect: running {} pass(es): {}",
                self.passes.len(),
                self.pass_names().join(", ")
            );
        }

        'fixed_point: loop {
            sweeps += 1;
            for pass in &self.passes {
                for template in pass.pattern_templates() {
                    let mut accepted = None;
                    for binding in match_pattern(&working.state, &template) {
                        if pass.is_eligible(&working, &binding, self.config.strict) {
                            accepted = Some(binding);
                            break;
                        }
                        if self.config.collect_rejections {
                            if let Some(note) = pass.explain(&working, &binding) {
                                if !diagnostics.contains(&note) {
                                    diagnostics.push(note);
                                }
                            }
                        }
                    }
                    let Some(binding) = accepted else {
                        continue;
                    };

                    if let Some(max) = self.config.max_applications {
                        if applied.len() >= max {
                            limit_reached = true;
                            diagnostics.push(
                                Diagnostic::new(
                                    DiagLevel::Warning,
                                    binding.node(0),
                                    format!("stopped after {max} rewrite(s); eligible candidates remain"),
                                )
                                .with_code(codes::W0001),
                            );
                            break 'fixed_point;
                        }
                    }

                    let candidate = pass.match_to_str(&working, &binding);
                    pass.apply(&mut working, &binding)
                        .map_err(|source| PipelineError::Precondition {
                            pass: pass.name(),
                            candidate: candidate.clone(),
                            source,
                        })?;
                    let record = AppliedTransformation {
                        pass: pass.name(),
                        candidate,
                        sweep: sweeps,
                    };
                    if self.config.verbose {
                        eprintln!("stencil-detect: {} applied to {}", record.pass, record.candidate);
                    }
                    on_applied(&record);
                    applied.push(record);
                    continue 'fixed_point;
                }
            }
            break;
        }

        let after = Fingerprint::of(&working)?;
        *program = working;
        let elapsed = start.elapsed();

        if self.config.verbose {
            eprintln!(
                "stencil-detect: fixed point after {} sweep(s), {} rewrite(s), {:.1}ms",
                sweeps,
                applied.len(),
                elapsed.as_secs_f64() * 1000.0
            );
        }

        Ok(PassReport {
            applied,
            diagnostics,
            sweeps,
            limit_reached,
            before,
            after,
            elapsed,
        })
    }

    /// Every binding of every pass with its verdict. Does not mutate.
    pub fn list_candidates(&self, program: &Program) -> Vec<CandidateReport> {
        let mut reports = Vec::new();
        for pass in &self.passes {
            for template in pass.pattern_templates() {
                for binding in match_pattern(&program.state, &template) {
                    let eligible = pass.is_eligible(program, &binding, self.config.strict);
                    let reason = if eligible {
                        None
                    } else {
                        pass.explain(program, &binding)
                    };
                    reports.push(CandidateReport {
                        pass: pass.name(),
                        template: template.name,
                        candidate: pass.match_to_str(program, &binding),
                        binding,
                        eligible,
                        reason,
                    });
                }
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataDesc;
    use crate::graph::{Memlet, NodeKind};
    use crate::pass::PassDescriptor;
    use crate::pattern::PathTemplate;
    use crate::symbolic::Expr;

    fn program(maps: &[(&str, &str)]) -> Program {
        let mut p = Program::new("p");
        p.add_array("A", DataDesc::array(vec![Expr::sym("N")]));
        p.add_array("B", DataDesc::array(vec![Expr::sym("N")]));
        for (k, (left, right)) in maps.iter().enumerate() {
            p.add_mapped_tasklet(
                &format!("m{k}"),
                &[("i", "1:N-2".parse().unwrap())],
                &[
                    ("l", Memlet::simple("A", left).unwrap()),
                    ("r", Memlet::simple("A", right).unwrap()),
                ],
                "o = l + r",
                &[("o", Memlet::simple("B", "i").unwrap())],
            )
            .unwrap();
        }
        p
    }

    fn stencil_count(p: &Program) -> usize {
        p.state
            .nodes()
            .filter(|n| matches!(n.kind, NodeKind::Stencil(_)))
            .count()
    }

    #[test]
    fn rewrites_every_eligible_map() {
        let mut p = program(&[("i - 1", "i + 1"), ("i", "i"), ("i - 2", "i")]);
        let manager = PassManager::with_default_passes(PassConfig::default());
        let mut seen = Vec::new();
        let report = manager.run(&mut p, |a| seen.push(a.candidate.clone())).unwrap();
        assert_eq!(seen, vec!["m0: [i]", "m2: [i]"]);
        assert_eq!(report.applied.len(), 2);
        assert_eq!(report.sweeps, 3);
        assert!(report.changed());
        assert_eq!(stencil_count(&p), 2);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].code, Some(codes::N0112));
    }

    #[test]
    fn second_run_is_a_no_op() {
        let mut p = program(&[("i - 1", "i + 1")]);
        let manager = PassManager::with_default_passes(PassConfig::default());
        manager.run(&mut p, |_| {}).unwrap();
        let snapshot = p.clone();
        let report = manager.run(&mut p, |_| {}).unwrap();
        assert!(report.applied.is_empty());
        assert!(!report.changed());
        assert_eq!(p, snapshot);
    }

    #[test]
    fn application_limit_warns() {
        let mut p = program(&[("i - 1", "i + 1"), ("i - 1", "i + 1")]);
        let config = PassConfig {
            max_applications: Some(1),
            ..PassConfig::default()
        };
        let report = PassManager::with_default_passes(config).run(&mut p, |_| {}).unwrap();
        assert!(report.limit_reached);
        assert_eq!(report.applied.len(), 1);
        assert!(report.diagnostics.iter().any(|d| d.code == Some(codes::W0001)));
        assert_eq!(stencil_count(&p), 1);
    }

    #[test]
    fn rejections_can_be_suppressed() {
        let mut p = program(&[("i", "i")]);
        let config = PassConfig {
            collect_rejections: false,
            ..PassConfig::default()
        };
        let report = PassManager::with_default_passes(config).run(&mut p, |_| {}).unwrap();
        assert!(report.diagnostics.is_empty());
        assert!(!report.changed());
    }

    /// Accepts every map, damages the graph, then fails.
    struct Saboteur;

    impl Transformation for Saboteur {
        fn descriptor(&self) -> PassDescriptor {
            PassDescriptor {
                name: "saboteur",
                summary: "fails after mutating",
                invariants: "none",
            }
        }
        fn pattern_templates(&self) -> Vec<PathTemplate> {
            vec![StencilDetection::template()]
        }
        fn is_eligible(&self, _: &Program, _: &Binding, _: bool) -> bool {
            true
        }
        fn apply(&self, program: &mut Program, binding: &Binding) -> Result<(), RewriteError> {
            program.state.remove_node(binding.nodes[1]);
            Err(RewriteError::MissingTasklet(binding.nodes[0]))
        }
        fn match_to_str(&self, _: &Program, binding: &Binding) -> String {
            format!("{:?}", binding.nodes)
        }
    }

    #[test]
    fn failed_apply_leaves_program_untouched() {
        let mut p = program(&[("i - 1", "i + 1"), ("i", "i")]);
        let original = p.clone();
        let mut manager = PassManager::with_default_passes(PassConfig::default());
        manager.register(Box::new(Saboteur));
        let err = manager.run(&mut p, |_| {}).unwrap_err();
        assert!(matches!(err, PipelineError::Precondition { pass: "saboteur", .. }));
        assert_eq!(err.to_diagnostic().code, Some(codes::E0100));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(p, original);
    }

    #[test]
    fn candidates_are_listed_without_mutation() {
        let p = program(&[("i - 1", "i + 1"), ("2*i", "i")]);
        let manager = PassManager::with_default_passes(PassConfig::default());
        let candidates = manager.list_candidates(&p);
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].eligible);
        assert!(candidates[0].reason.is_none());
        assert!(!candidates[1].eligible);
        assert_eq!(
            candidates[1].reason.as_ref().and_then(|d| d.code),
            Some(codes::N0108)
        );
        assert_eq!(stencil_count(&p), 0);
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let p = program(&[]);
        let fp = Fingerprint::of(&p).unwrap();
        assert_eq!(fp.hex().len(), 64);
        assert_eq!(fp, Fingerprint::of(&p.clone()).unwrap());
    }

    #[test]
    fn report_renders_summary() {
        let mut p = program(&[("i - 1", "i + 1")]);
        let report = PassManager::with_default_passes(PassConfig::default())
            .run(&mut p, |_| {})
            .unwrap();
        let text = report.render(&p);
        assert!(text.starts_with("program: p\nsweeps: 2\napplied: 1\n  stencil_detection m0: [i]\n"));
        assert!(text.contains(&format!("after: {}", report.after)));
    }
}
