//! Splitting strategies.
//!
//! A strategy takes a tagged [`CallGraph`] and returns the mangled names to
//! move into the deferred module. The `print-*` strategies only write a
//! report and never split anything.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use splitrt_core::Affinity;

use crate::error::CallGraphError;
use crate::graph::CallGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Split out exactly the functions tagged for the deferred module.
    OnlyEditorAnnotated,
    PrintFunctions,
    #[default]
    PrintCallgraph,
    PrintTagged,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::OnlyEditorAnnotated,
        Strategy::PrintFunctions,
        Strategy::PrintCallgraph,
        Strategy::PrintTagged,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::OnlyEditorAnnotated => "only-editor-annotated",
            Strategy::PrintFunctions => "print-functions",
            Strategy::PrintCallgraph => "print-callgraph",
            Strategy::PrintTagged => "print-tagged",
        }
    }

    /// Run the strategy, writing any report to `out`.
    pub fn run<W: Write>(self, graph: &CallGraph, out: &mut W) -> Result<Vec<String>, CallGraphError> {
        match self {
            Strategy::OnlyEditorAnnotated => only_editor_annotated(graph, out),
            Strategy::PrintFunctions => {
                print_functions(graph, out)?;
                Ok(Vec::new())
            }
            Strategy::PrintCallgraph => {
                print_callgraph(graph, out)?;
                Ok(Vec::new())
            }
            Strategy::PrintTagged => {
                print_tagged(graph, out)?;
                Ok(Vec::new())
            }
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = CallGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| CallGraphError::UnknownStrategy(s.to_string()))
    }
}

fn only_editor_annotated<W: Write>(
    graph: &CallGraph,
    out: &mut W,
) -> Result<Vec<String>, CallGraphError> {
    let split: Vec<String> = graph.tagged(Affinity::Deferred).iter().cloned().collect();
    writeln!(out, "{}", split.len())?;
    Ok(split)
}

fn print_functions<W: Write>(graph: &CallGraph, out: &mut W) -> Result<(), CallGraphError> {
    writeln!(out, "{} functions:", graph.len())?;
    for func in graph.functions() {
        writeln!(out, "{}", graph.demangled_name(func))?;
    }
    Ok(())
}

fn print_callgraph<W: Write>(graph: &CallGraph, out: &mut W) -> Result<(), CallGraphError> {
    writeln!(out, "{} functions", graph.len())?;
    writeln!(out)?;
    for func in graph.functions() {
        let tag = graph
            .affinity_of(func)
            .and_then(Affinity::tag)
            .unwrap_or("None");
        writeln!(out, "{func}")?;
        writeln!(out, "    Address taken: {}", py_bool(graph.address_taken(func)))?;
        writeln!(out, "    Calls indirectly: {}", py_bool(graph.calls_indirectly(func)))?;
        writeln!(out, "    Tag: {tag}")?;
        let callees = graph.callees(func);
        writeln!(out, "    Callees ({}):", callees.len())?;
        for callee in callees {
            writeln!(out, "        {callee}")?;
        }
        let callers = graph.callers(func);
        writeln!(out, "    Callers ({}):", callers.len())?;
        for caller in callers {
            writeln!(out, "        {caller}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn print_tagged<W: Write>(graph: &CallGraph, out: &mut W) -> Result<(), CallGraphError> {
    for affinity in Affinity::TAGGED {
        let Some(tag) = affinity.tag() else { continue };
        let tagged = graph.tagged(affinity);
        writeln!(out, "{tag} ({}):", tagged.len())?;
        for func in tagged {
            writeln!(out, "    {}", graph.demangled_name(func))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn py_bool(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demangle::Identity;
    use crate::parser::parse_str;

    fn graph() -> CallGraph {
        let mut graph = parse_str(
            "\
Call graph node <<null function>><<None>>  #uses=0
  CS<None> calls function '_EDITOR_WASM_::open'
Call graph node for function: 'main'<<0x1>>  #uses=1
  CS<0x2> calls function '_EDITOR_WASM_::open'
  CS<0x3> calls function '_MAIN_WASM_::tick'
Call graph node for function: '_EDITOR_WASM_::open'<<0x4>>  #uses=2
  CS<0x5> calls external node
",
        );
        graph.compute_demangled(&Identity).unwrap();
        graph.compute_tags().unwrap();
        graph
    }

    fn run(strategy: Strategy) -> (Vec<String>, String) {
        let mut out = Vec::new();
        let split = strategy.run(&graph(), &mut out).unwrap();
        (split, String::from_utf8(out).unwrap())
    }

    #[test]
    fn names_round_trip() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.as_str().parse::<Strategy>().unwrap(), strategy);
        }
        assert!(matches!(
            "split-everything".parse::<Strategy>(),
            Err(CallGraphError::UnknownStrategy(_))
        ));
        assert_eq!(Strategy::default(), Strategy::PrintCallgraph);
    }

    #[test]
    fn editor_annotated_splits_deferred_only() {
        let (split, report) = run(Strategy::OnlyEditorAnnotated);
        assert_eq!(split, vec!["_EDITOR_WASM_::open"]);
        assert_eq!(report, "1\n");
    }

    #[test]
    fn print_functions_lists_sorted_names() {
        let (split, report) = run(Strategy::PrintFunctions);
        assert!(split.is_empty());
        assert_eq!(
            report,
            "3 functions:\n_EDITOR_WASM_::open\n_MAIN_WASM_::tick\nmain\n"
        );
    }

    #[test]
    fn print_callgraph_block() {
        let (split, report) = run(Strategy::PrintCallgraph);
        assert!(split.is_empty());
        assert!(report.starts_with("3 functions\n\n"));
        let expected = "\
_EDITOR_WASM_::open
    Address taken: True
    Calls indirectly: True
    Tag: _EDITOR_WASM_
    Callees (0):
    Callers (1):
        main

";
        assert!(report.contains(expected), "{report}");
        assert!(report.contains("main\n    Address taken: False\n"));
        assert!(report.contains("    Callees (2):\n        _EDITOR_WASM_::open\n        _MAIN_WASM_::tick\n"));
    }

    #[test]
    fn print_tagged_groups_by_tag() {
        let (_, report) = run(Strategy::PrintTagged);
        assert_eq!(
            report,
            "\
_EDITOR_WASM_ (1):
    _EDITOR_WASM_::open

_MAIN_WASM_ (1):
    _MAIN_WASM_::tick

_RENDERER_WASM_ (0):

"
        );
    }
}
