//! Writing the split list consumed by the module splitter.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::error::CallGraphError;

/// Write one symbol per line to `dest`, or stdout when `dest` is `-`.
/// Returns the number of symbols written. An empty list writes nothing.
pub fn write_split_list(dest: &str, funcs: &[String]) -> Result<usize, CallGraphError> {
    if funcs.is_empty() {
        warn!("not splitting any functions");
        return Ok(0);
    }
    if dest == "-" {
        let stdout = io::stdout();
        write_lines(&mut stdout.lock(), funcs)?;
    } else {
        let file = File::create(Path::new(dest)).map_err(|source| CallGraphError::Open {
            path: dest.to_string(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        write_lines(&mut writer, funcs)?;
        writer.flush()?;
        info!(path = dest, count = funcs.len(), "split list written");
    }
    Ok(funcs.len())
}

pub fn write_lines<W: Write>(out: &mut W, funcs: &[String]) -> io::Result<()> {
    for func in funcs {
        writeln!(out, "{func}")?;
    }
    Ok(())
}
