use std::time::Duration;

use serde::Deserialize;

/// Runtime configuration, populated from `initializationOptions` and
/// `workspace/didChangeConfiguration`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub diagnostics: DiagnosticsConfig,
    pub analysis: AnalysisConfig,
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.analysis.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiagnosticsConfig {
    pub enable: bool,
    /// Upper bound on diagnostics per publication.
    pub max_count: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enable: true,
            max_count: crate::diagnostics::MAX_DIAGNOSTICS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisConfig {
    /// Background analysis budget per document version.
    pub timeout_ms: u64,
    /// Register the first analysis task of a document with the supervisor so
    /// that a quick follow-up edit can cancel it. Off by default, in which
    /// case the first task runs to completion unsupervised.
    pub register_initial_task: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            register_initial_task: false,
        }
    }
}
