//! Offline analysis of `opt --print-callgraph` dumps.
//!
//! Parses the textual call graph, demangles symbol names, assigns each
//! function the affinity named by the last tag in its demangled name, and
//! runs a splitting strategy over the result.

pub mod demangle;
pub mod error;
pub mod graph;
pub mod output;
pub mod parser;
pub mod strategy;
pub mod tags;

pub use demangle::{from_command as demangler_from_command, CxxFilt, Demangler, Identity};
pub use error::CallGraphError;
pub use graph::CallGraph;
pub use output::write_split_list;
pub use parser::{parse_file, parse_reader, parse_str};
pub use strategy::Strategy;

use std::path::Path;

/// Parse, demangle and tag a call graph file in one step.
pub fn analyze_file(
    path: impl AsRef<Path>,
    demangler: &dyn Demangler,
) -> Result<CallGraph, CallGraphError> {
    let mut graph = parse_file(path)?;
    graph.compute_demangled(demangler)?;
    graph.compute_tags()?;
    Ok(graph)
}
