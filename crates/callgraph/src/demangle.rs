//! Symbol demangling.

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::CallGraphError;

pub trait Demangler {
    /// Demangle `names` in order. The result has one entry per input.
    fn demangle(&self, names: &[&str]) -> Result<Vec<String>, CallGraphError>;
}

/// Pipes names through an external `c++filt -p`, which drops parameter and
/// return types so tags there cannot leak into the result.
#[derive(Debug, Clone)]
pub struct CxxFilt {
    command: String,
}

impl CxxFilt {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for CxxFilt {
    fn default() -> Self {
        Self::new("c++filt")
    }
}

impl Demangler for CxxFilt {
    fn demangle(&self, names: &[&str]) -> Result<Vec<String>, CallGraphError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        debug!(command = %self.command, count = names.len(), "running demangler");

        let mut child = Command::new(&self.command)
            .arg("-p")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CallGraphError::Demangler(format!("{}: {e}", self.command)))?;

        let input: String = names.iter().map(|n| format!("{n}\n")).collect();
        // Feed stdin from a separate thread so a large batch cannot deadlock
        // against a full stdout pipe.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CallGraphError::Demangler("stdin unavailable".into()))?;
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child.wait_with_output()?;
        writer
            .join()
            .map_err(|_| CallGraphError::Demangler("stdin writer panicked".into()))??;

        if !output.status.success() {
            return Err(CallGraphError::Demangler(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// Leaves names untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Demangler for Identity {
    fn demangle(&self, names: &[&str]) -> Result<Vec<String>, CallGraphError> {
        Ok(names.iter().map(|n| n.to_string()).collect())
    }
}

/// Build a demangler from a configured command; `none` selects [`Identity`].
pub fn from_command(command: &str) -> Box<dyn Demangler> {
    match command {
        "" | "none" => Box::new(Identity),
        cmd => Box::new(CxxFilt::new(cmd)),
    }
}
