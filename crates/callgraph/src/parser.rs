//! Reader for the text emitted by `opt --print-callgraph`.
//!
//! ```text
//! Call graph node <<null function>><<0x55d0c1a0>>  #uses=0
//!   CS<None> calls function 'main'
//!
//! Call graph node for function: 'main'<<0x55d0c1f0>>  #uses=1
//!   CS<0x55d0c2a8> calls function '_Z6helperv'
//!   CS<0x55d0c2e0> calls external node
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::CallGraphError;
use crate::graph::CallGraph;

const ADDR: &str = "(?:0x[0-9a-f]*|None)";

static NULL_FUNC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^Call graph node <<null function>><<{ADDR}>>  #uses=[0-9]*$"
    ))
    .expect("null function pattern is valid")
});

static NEW_FUNC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^Call graph node for function: '(?P<name>.*)'<<{ADDR}>>  #uses=[0-9]*$"
    ))
    .expect("function node pattern is valid")
});

static CALL_FUNC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^  CS<{ADDR}> calls function '(?P<name>.*)'$"))
        .expect("call site pattern is valid")
});

static CALL_EXTERNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^  CS<{ADDR}> calls external node$"))
        .expect("external call pattern is valid")
});

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    NullNode,
    Node(&'a str),
    Call(&'a str),
    CallExternal,
}

fn classify(line: &str) -> Option<Line<'_>> {
    if NULL_FUNC.is_match(line) {
        return Some(Line::NullNode);
    }
    if let Some(caps) = NEW_FUNC.captures(line) {
        return caps.name("name").map(|m| Line::Node(m.as_str()));
    }
    if let Some(caps) = CALL_FUNC.captures(line) {
        return caps.name("name").map(|m| Line::Call(m.as_str()));
    }
    if CALL_EXTERNAL.is_match(line) {
        return Some(Line::CallExternal);
    }
    None
}

/// Build a call graph from already-read lines. Unrecognized lines are
/// logged and skipped.
pub fn parse_lines<I, S>(lines: I) -> CallGraph
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut graph = CallGraph::new();
    let mut caller: Option<String> = None;
    let mut skipped = 0usize;

    for (idx, line) in lines.into_iter().enumerate() {
        let line = line.as_ref().trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            continue;
        }
        match classify(line) {
            Some(Line::NullNode) => caller = None,
            Some(Line::Node(name)) => {
                graph.add_function(name);
                caller = Some(name.to_string());
            }
            Some(Line::Call(callee)) => {
                graph.add_function(callee);
                graph.add_call(caller.as_deref(), Some(callee));
            }
            Some(Line::CallExternal) => {
                if caller.is_some() {
                    graph.add_call(caller.as_deref(), None);
                }
            }
            None => {
                skipped += 1;
                warn!(line = idx + 1, text = line, "unrecognized call graph line");
            }
        }
    }

    debug!(functions = graph.len(), skipped, "call graph parsed");
    graph
}

pub fn parse_str(input: &str) -> CallGraph {
    parse_lines(input.lines())
}

pub fn parse_reader<R: BufRead>(reader: R) -> Result<CallGraph, CallGraphError> {
    let lines = reader.lines().collect::<Result<Vec<_>, _>>()?;
    Ok(parse_lines(lines))
}

pub fn parse_file(path: impl AsRef<Path>) -> Result<CallGraph, CallGraphError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| CallGraphError::Open {
        path: path.display().to_string(),
        source,
    })?;
    parse_reader(BufReader::new(file))
}
