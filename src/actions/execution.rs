//! Execution result serialization.
//!
//! One action run produces a JSON document combining the action outcome
//! and its resource stats, written to the output file for the external
//! scheduler to collect.

use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;

use super::stats::StatsResult;
use super::ActionResult;

/// The complete outcome of one action execution.
#[derive(Clone, Debug, Serialize)]
pub struct ExecutionResult {
    /// Action outcome.
    pub action: ActionResult,
    /// Resource consumption.
    pub stats: StatsResult,
}

impl ExecutionResult {
    /// Creates a result from its parts.
    #[must_use]
    pub fn new(action: ActionResult, stats: StatsResult) -> Self {
        Self { action, stats }
    }

    /// Serializes to the stable JSON shape.
    #[must_use]
    pub fn to_json(&self) -> String {
        // Serialization of this shape cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }

    /// Writes the JSON document to `path`.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.to_json())
    }
}
