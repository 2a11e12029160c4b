//! Runtime options shared by a parser and its prediction engine.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::atn::PredictionMode;
use crate::error::OptionsError;

/// Knobs controlling prediction and tree construction.
///
/// Serializable so a tool can ship tuned settings next to its grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// When SLL prediction escalates to full-context LL.
    pub prediction_mode: PredictionMode,
    /// Build a rule-context tree while parsing.
    pub build_parse_trees: bool,
    /// Forward ambiguity and context-sensitivity events to error listeners.
    pub report_diagnostics: bool,
    /// Keep per-decision counters in [`crate::DecisionStats`].
    pub collect_decision_stats: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeOptions {
            prediction_mode: PredictionMode::Ll,
            build_parse_trees: true,
            report_diagnostics: false,
            collect_decision_stats: false,
        }
    }
}

impl RuntimeOptions {
    pub fn with_prediction_mode(mut self, mode: PredictionMode) -> Self {
        self.prediction_mode = mode;
        self
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), OptionsError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Parse options from an embedded JSON string.
    pub fn from_json(json: &str) -> Result<Self, OptionsError> {
        Ok(serde_json::from_str(json)?)
    }
}
