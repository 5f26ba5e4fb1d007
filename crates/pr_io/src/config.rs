//! Engine configuration (JSON). Every field is optional; missing fields take defaults.

use std::path::Path;

use pr_core::variables::{ContestSettings, ResultPhase, SolverOptions};
use serde::{Deserialize, Serialize};

use crate::{read_json, IoResult};

pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    pub log_filter: String,
    pub settings: ContestSettings,
    pub solver: SolverOptions,
    pub phase: ResultPhase,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            settings: ContestSettings::default(),
            solver: SolverOptions::default(),
            phase: ResultPhase::Live,
        }
    }
}

/// `None` yields the defaults.
pub fn load_config(path: Option<&Path>) -> IoResult<EngineConfig> {
    match path {
        Some(p) => read_json(p),
        None => Ok(EngineConfig::default()),
    }
}
