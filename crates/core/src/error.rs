use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("unknown affinity: {0}")]
    UnknownAffinity(String),

    #[error("unknown shutdown policy '{0}', expected 'drain' or 'discard'")]
    UnknownPolicy(String),
}
