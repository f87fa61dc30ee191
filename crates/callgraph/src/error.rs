use thiserror::Error;

#[derive(Error, Debug)]
pub enum CallGraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("negative bracket depth in {symbol} (demangled: {demangled})")]
    UnbalancedBrackets { symbol: String, demangled: String },

    #[error("demangler failed: {0}")]
    Demangler(String),

    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),
}
