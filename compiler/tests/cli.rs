// Integration tests for the `stencil-detect` binary.
//
// - Each --emit target produces its output on stdout
// - Invalid documents exit with status 2 and print validation diagnostics
// - Missing input files exit with status 2

use std::path::{Path, PathBuf};
use std::process::Command;

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_stencil-detect"))
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn run(args: &[&str], input: &Path) -> std::process::Output {
    Command::new(binary())
        .args(args)
        .arg(input)
        .output()
        .expect("failed to run stencil-detect")
}

#[test]
fn emit_json_rewrites_program() {
    let output = run(&["--emit", "json"], &fixture("jacobi.json"));
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let program = stencil_detect::document::parse_program(&String::from_utf8_lossy(&output.stdout))
        .expect("output must be a valid program document");
    assert_eq!(program.state.node_count(), 3);
    assert!(program
        .state
        .nodes()
        .any(|n| n.label() == "jacobi_stencil"));
}

#[test]
fn emit_dot_has_stencil_node() {
    let output = run(&["--emit", "dot"], &fixture("jacobi.json"));
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("digraph jacobi {"));
    assert!(stdout.contains("shape=box3d"));
}

#[test]
fn emit_matches_does_not_rewrite() {
    let output = run(&["--emit", "matches"], &fixture("pointwise.json"));
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("stencil_detection scale: [i] rejected\n"));
    assert!(stdout.contains("note[N0112]"));
}

#[test]
fn emit_report_lists_applied_rewrites() {
    let output = run(&["--emit", "report"], &fixture("jacobi.json"));
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("applied: 1\n  stencil_detection jacobi: [i]\n"));
}

#[test]
fn output_flag_writes_file() {
    let dir = std::env::temp_dir().join(format!("stencil-detect-cli-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let out = dir.join("out.json");
    let output = run(
        &["--emit", "json", "-o", out.to_str().unwrap()],
        &fixture("pointwise.json"),
    );
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    let text = std::fs::read_to_string(&out).unwrap();
    let program = stencil_detect::document::parse_program(&text).unwrap();
    assert_eq!(program.name, "scale");
    assert_eq!(program.state.node_count(), 5);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_document_exits_with_2() {
    let output = run(&[], &fixture("dangling_edge.json"));
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error[E0001]"), "stderr: {stderr}");
}

#[test]
fn missing_input_exits_with_2() {
    let output = run(&[], &fixture("does_not_exist.json"));
    assert_eq!(output.status.code(), Some(2));
}
