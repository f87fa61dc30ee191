pub mod affinity;
pub mod config;
pub mod error;

pub use affinity::Affinity;
pub use config::{CallGraphConfig, Config, SchedulerConfig, ShutdownPolicy};
pub use error::*;
