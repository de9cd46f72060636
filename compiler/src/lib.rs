// stencil-detect — Stencil detection for dataflow programs
//
// Library root. Modules in dependency order: symbolic expressions, the
// dataflow graph, matching, analysis, rewriting and the pass manager.

pub mod data;
pub mod diag;
pub mod document;
pub mod dot;
pub mod eligibility;
pub mod graph;
pub mod lexer;
pub mod parser;
pub mod pass;
pub mod pattern;
pub mod pipeline;
pub mod rewrite;
pub mod stencil;
pub mod stencil_detection;
pub mod subset;
pub mod symbolic;
