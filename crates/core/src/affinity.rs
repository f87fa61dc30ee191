//! Affinity tags attached to task bodies.
//!
//! The runtime never looks at these. They exist so the offline call-graph
//! partitioner can decide which functions stay in the primary module and
//! which are extracted into the deferred module that is loaded on demand.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Where a piece of code is expected to be needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Affinity {
    /// Needed on the primary module even though the main-thread call graph
    /// does not reach it.
    Primary,
    /// Needed only by the worker context.
    Worker,
    /// Needed only for on-demand functionality; a candidate for splitting.
    Deferred,
    /// No annotation.
    #[default]
    Unspecified,
}

impl Affinity {
    /// Tagged variants in the order the analyzer reports them.
    pub const TAGGED: [Affinity; 3] = [Affinity::Deferred, Affinity::Primary, Affinity::Worker];

    /// The symbol tag that marks a function with this affinity.
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Affinity::Primary => Some("_MAIN_WASM_"),
            Affinity::Worker => Some("_RENDERER_WASM_"),
            Affinity::Deferred => Some("_EDITOR_WASM_"),
            Affinity::Unspecified => None,
        }
    }

    /// Inverse of [`Affinity::tag`].
    pub fn from_tag(tag: &str) -> Option<Affinity> {
        Self::TAGGED.into_iter().find(|a| a.tag() == Some(tag))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Affinity::Primary => "primary",
            Affinity::Worker => "worker",
            Affinity::Deferred => "deferred",
            Affinity::Unspecified => "unspecified",
        }
    }
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Affinity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "primary" | "main" => Ok(Affinity::Primary),
            "worker" | "renderer" => Ok(Affinity::Worker),
            "deferred" | "editor" => Ok(Affinity::Deferred),
            "unspecified" | "none" => Ok(Affinity::Unspecified),
            _ => Affinity::from_tag(s).ok_or_else(|| CoreError::UnknownAffinity(s.to_string())),
        }
    }
}
