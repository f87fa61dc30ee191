//! Affinity tags embedded in symbol names.
//!
//! Tags on a lambda override tags on the enclosing function, which override
//! tags on the enclosing class, so the last occurrence wins. Tags inside
//! template arguments or parameter lists do not count.

use splitrt_core::Affinity;

use crate::error::CallGraphError;

/// Operator names whose angle brackets are not template delimiters.
/// `operator<=>` goes first so its prefix `operator<=` does not eat it.
const BRACKET_OPERATORS: [&str; 6] = [
    "operator<=>",
    "operator->",
    "operator<=",
    "operator>=",
    "operator<",
    "operator>",
];

/// Drop bracket operators and everything nested inside `<...>` or `(...)`.
/// The opening bracket itself is kept. Returns `None` if the depth goes
/// negative.
pub fn strip_nested(demangled: &str) -> Option<String> {
    let mut name = demangled.to_string();
    for op in BRACKET_OPERATORS {
        name = name.replace(op, "");
    }

    let mut stripped = String::with_capacity(name.len());
    let mut depth: i32 = 0;
    for c in name.chars() {
        if depth == 0 {
            stripped.push(c);
        }
        match c {
            '<' | '(' => depth += 1,
            '>' | ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return None;
        }
    }
    Some(stripped)
}

/// The affinity named by the last top-level tag in `demangled`.
pub fn tag_of(symbol: &str, demangled: &str) -> Result<Option<Affinity>, CallGraphError> {
    let stripped =
        strip_nested(demangled).ok_or_else(|| CallGraphError::UnbalancedBrackets {
            symbol: symbol.to_string(),
            demangled: demangled.to_string(),
        })?;

    Ok(Affinity::TAGGED
        .into_iter()
        .filter_map(|a| Some((stripped.rfind(a.tag()?)?, a)))
        .max_by_key(|(pos, _)| *pos)
        .map(|(_, a)| a))
}
