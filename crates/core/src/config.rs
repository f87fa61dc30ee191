use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

// ── Top-level config ──────────────────────────────────────────

/// Runtime and tooling configuration.
///
/// Layering: defaults, then an optional TOML file, then `SPLITRT_*`
/// environment overrides, then validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub callgraph: CallGraphConfig,
}

impl Config {
    /// Build config from defaults plus environment (call `load_dotenv()` first).
    /// Profile is read from `SPLITRT_PROFILE`.
    pub fn from_env() -> Result<Self, CoreError> {
        let mut config = Self::default();
        config.profile = env_opt("SPLITRT_PROFILE").unwrap_or_default().to_uppercase();
        let profile = config.profile.clone();
        config.apply_overrides(|key| profiled_env_opt(&profile, key))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse config from a TOML string, then apply environment overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, CoreError> {
        let mut config: Self = toml::from_str(toml_str)?;
        if config.profile.is_empty() {
            config.profile = env_opt("SPLITRT_PROFILE").unwrap_or_default();
        }
        config.profile = config.profile.to_uppercase();
        let profile = config.profile.clone();
        config.apply_overrides(|key| profiled_env_opt(&profile, key))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Load from `path` when given, otherwise from the environment alone.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Self::from_env(),
        }
    }

    /// Apply `SPLITRT_*` overrides read through `lookup`.
    ///
    /// - `SPLITRT_WORKER_NAME` → `scheduler.worker_name`
    /// - `SPLITRT_SHUTDOWN_POLICY` → `scheduler.shutdown_policy`
    /// - `SPLITRT_WORKER_STACK_KB` → `scheduler.worker_stack_kb`
    /// - `SPLITRT_DEMANGLER` → `callgraph.demangler`
    /// - `SPLITRT_STRATEGY` → `callgraph.default_strategy`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SPLITRT_WORKER_NAME") {
            self.scheduler.worker_name = v;
        }
        if let Some(v) = lookup("SPLITRT_SHUTDOWN_POLICY") {
            self.scheduler.shutdown_policy = v.parse()?;
        }
        if let Some(v) = lookup("SPLITRT_WORKER_STACK_KB") {
            let kb = v
                .parse::<u32>()
                .map_err(|_| CoreError::Config(format!("invalid SPLITRT_WORKER_STACK_KB '{v}'")))?;
            self.scheduler.worker_stack_kb = Some(kb);
        }
        if let Some(v) = lookup("SPLITRT_DEMANGLER") {
            self.callgraph.demangler = v;
        }
        if let Some(v) = lookup("SPLITRT_STRATEGY") {
            self.callgraph.default_strategy = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.scheduler.worker_name.trim().is_empty() {
            return Err(CoreError::Config("scheduler.worker_name must not be empty".into()));
        }
        if self.scheduler.worker_stack_kb == Some(0) {
            return Err(CoreError::Config("scheduler.worker_stack_kb must be positive".into()));
        }
        if self.callgraph.default_strategy.trim().is_empty() {
            return Err(CoreError::Config("callgraph.default_strategy must not be empty".into()));
        }
        Ok(())
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  scheduler:   worker={}, shutdown={}, stack_kb={:?}",
            self.scheduler.worker_name,
            self.scheduler.shutdown_policy,
            self.scheduler.worker_stack_kb
        );
        tracing::info!(
            "  callgraph:   demangler={}, strategy={}",
            self.callgraph.demangler,
            self.callgraph.default_strategy
        );
    }
}

// ── Scheduler ─────────────────────────────────────────────────

/// What the background worker does with tasks still queued at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Run everything queued before shutdown was requested, then exit.
    #[default]
    Drain,
    /// Exit as soon as shutdown is observed; queued tasks are dropped unrun.
    Discard,
}

impl std::fmt::Display for ShutdownPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownPolicy::Drain => f.write_str("drain"),
            ShutdownPolicy::Discard => f.write_str("discard"),
        }
    }
}

impl std::str::FromStr for ShutdownPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drain" => Ok(ShutdownPolicy::Drain),
            "discard" => Ok(ShutdownPolicy::Discard),
            _ => Err(CoreError::UnknownPolicy(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Thread name given to the background worker.
    #[serde(default = "default_worker_name")]
    pub worker_name: String,
    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,
    /// Worker stack size in KiB (platform default when unset).
    #[serde(default)]
    pub worker_stack_kb: Option<u32>,
}

fn default_worker_name() -> String {
    "splitrt-bg".into()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_name: default_worker_name(),
            shutdown_policy: ShutdownPolicy::default(),
            worker_stack_kb: None,
        }
    }
}

impl SchedulerConfig {
    pub fn with_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }
}

// ── Call graph ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallGraphConfig {
    /// Demangler command, or "none" to use raw symbol names.
    #[serde(default = "default_demangler")]
    pub demangler: String,
    #[serde(default = "default_strategy")]
    pub default_strategy: String,
}

fn default_demangler() -> String {
    "c++filt".into()
}

fn default_strategy() -> String {
    "print-callgraph".into()
}

impl Default for CallGraphConfig {
    fn default() -> Self {
        Self {
            demangler: default_demangler(),
            default_strategy: default_strategy(),
        }
    }
}
