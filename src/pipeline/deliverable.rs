use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;

use super::Stage;

/// How a stage resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    /// Non-blocking stage whose providers all failed.
    Degraded,
    /// Refinement skipped by the review gate.
    Skipped,
    /// Reused from a checkpoint.
    Restored,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub provider: String,
    pub duration: Duration,
    pub status: StageStatus,
}

/// Everything a finished workflow produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deliverable {
    pub plan: String,
    pub final_code: String,
    pub tests: Option<String>,
    pub documentation: Option<String>,
    pub review: String,
    pub stages: Vec<StageOutcome>,
}

impl Deliverable {
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages.iter().find(|o| o.stage == stage)
    }

    /// Plain-text rendering with section headers.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "--- FINAL CODE ---\n{}", self.final_code);
        if let Some(tests) = &self.tests {
            let _ = writeln!(out, "\n--- TESTS ---\n{}", tests);
        }
        let _ = writeln!(
            out,
            "\n--- DOCUMENTATION ---\n{}",
            self.documentation.as_deref().unwrap_or("(Missing due to error)")
        );
        let _ = write!(out, "\n--- REVIEW NOTES ---\n{}", self.review);
        out
    }
}
