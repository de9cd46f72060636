use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use stencil_detect::diag::DiagLevel;
use stencil_detect::document;
use stencil_detect::dot::emit_dot;
use stencil_detect::graph::Program;
use stencil_detect::pass::PassConfig;
use stencil_detect::pipeline::{PassManager, PassReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Emit {
    /// Rewritten program as JSON
    Json,
    /// Rewritten program as Graphviz DOT
    Dot,
    /// Candidate bindings and verdicts, without rewriting
    Matches,
    /// Summary of applied rewrites and diagnostics
    Report,
}

#[derive(Parser, Debug)]
#[command(
    name = "stencil-detect",
    version,
    about = "Replaces single-tasklet neighborhood maps in a dataflow program with stencil nodes"
)]
struct Cli {
    /// Input program (JSON document)
    input: PathBuf,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output form
    #[arg(long, value_enum, default_value_t = Emit::Json)]
    emit: Emit,

    /// Strict eligibility checking
    #[arg(long)]
    strict: bool,

    /// Stop after this many rewrites
    #[arg(long)]
    max_applications: Option<usize>,

    /// Print progress, timing and rejection reasons
    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    if cli.verbose {
        eprintln!("stencil-detect: input = {}", cli.input.display());
        eprintln!("stencil-detect: emit  = {:?}", cli.emit);
    }

    // ── Load and validate ──
    let mut program = match document::load(&cli.input) {
        Ok(p) => p,
        Err(document::DocumentError::Invalid(diagnostics)) => {
            for diag in &diagnostics {
                eprintln!("stencil-detect: {}", diag);
            }
            return ExitCode::from(2);
        }
        Err(e) => {
            eprintln!("stencil-detect: error: {}", e);
            return ExitCode::from(2);
        }
    };

    if cli.verbose {
        eprintln!(
            "stencil-detect: loaded '{}' ({} nodes, {} edges, {} containers)",
            program.name,
            program.state.node_count(),
            program.state.edge_count(),
            program.arrays.len()
        );
    }

    let config = PassConfig {
        strict: cli.strict,
        max_applications: cli.max_applications,
        collect_rejections: true,
        verbose: cli.verbose,
    };
    let manager = PassManager::with_default_passes(config);

    // ── Emit ──
    let text = match cli.emit {
        Emit::Matches => render_matches(&manager, &program),
        Emit::Json => {
            if let Err(code) = rewrite(&manager, &mut program, cli.verbose) {
                return code;
            }
            match document::to_json(&program) {
                Ok(json) => json + "\n",
                Err(e) => {
                    eprintln!("stencil-detect: error: {}", e);
                    return ExitCode::from(2);
                }
            }
        }
        Emit::Dot => {
            if let Err(code) = rewrite(&manager, &mut program, cli.verbose) {
                return code;
            }
            emit_dot(&program)
        }
        Emit::Report => match rewrite(&manager, &mut program, cli.verbose) {
            Ok(report) => report.render(&program),
            Err(code) => return code,
        },
    };

    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, text) {
                eprintln!("stencil-detect: error: {}: {}", path.display(), e);
                return ExitCode::from(2);
            }
        }
        None => print!("{text}"),
    }
    ExitCode::SUCCESS
}

/// Run the pass manager, printing diagnostics. Notes are shown only when verbose.
fn rewrite(manager: &PassManager, program: &mut Program, verbose: bool) -> Result<PassReport, ExitCode> {
    let report = manager.run(program, |_| {}).map_err(|e| {
        eprintln!("stencil-detect: {}", e.to_diagnostic());
        ExitCode::from(1)
    })?;
    for diag in &report.diagnostics {
        if verbose || diag.level != DiagLevel::Note {
            eprintln!("stencil-detect: {}", diag);
        }
    }
    Ok(report)
}

fn render_matches(manager: &PassManager, program: &Program) -> String {
    let mut out = String::new();
    for c in manager.list_candidates(program) {
        let verdict = if c.eligible { "eligible" } else { "rejected" };
        out.push_str(&format!("{} {} {}\n", c.pass, c.candidate, verdict));
        if let Some(reason) = &c.reason {
            for line in reason.to_string().lines() {
                out.push_str(&format!("  {}\n", line));
            }
        }
    }
    out
}
