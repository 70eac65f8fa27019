//! Six-stage workflow: plan, code, test, review, refine, document.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `engine` | `PipelineEngine`, the stage state machine |
//! | `prompts` | Role prompt templates and the refinement gate |
//! | `artifacts` | Best-effort per-stage output files |
//! | `deliverable` | Final assembled result and its rendering |

pub mod artifacts;
pub mod deliverable;
pub mod engine;
pub mod prompts;

pub use artifacts::ArtifactSink;
pub use deliverable::{Deliverable, StageOutcome, StageStatus};
pub use engine::PipelineEngine;

use serde::{Deserialize, Serialize};

/// Number of stages in a full run.
pub const STAGE_COUNT: usize = 6;

/// Who answers a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Planner,
    Coder,
    Tester,
    Reviewer,
    Documenter,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Planner,
        Role::Coder,
        Role::Tester,
        Role::Reviewer,
        Role::Documenter,
    ];

    /// Configuration key.
    pub fn key(self) -> &'static str {
        match self {
            Role::Planner => "planner",
            Role::Coder => "coder",
            Role::Tester => "tester",
            Role::Reviewer => "reviewer",
            Role::Documenter => "documenter",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Planner => "Planner",
            Role::Coder => "Coder",
            Role::Tester => "Tester",
            Role::Reviewer => "Reviewer",
            Role::Documenter => "Documenter",
        }
    }
}

/// Pipeline states, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planning,
    Coding,
    Testing,
    Reviewing,
    Refining,
    Documenting,
}

impl Stage {
    pub const ALL: [Stage; STAGE_COUNT] = [
        Stage::Planning,
        Stage::Coding,
        Stage::Testing,
        Stage::Reviewing,
        Stage::Refining,
        Stage::Documenting,
    ];

    /// Checkpoint step id.
    pub fn step_id(self) -> &'static str {
        match self {
            Stage::Planning => "planning",
            Stage::Coding => "coding",
            Stage::Testing => "testing",
            Stage::Reviewing => "reviewing",
            Stage::Refining => "refining",
            Stage::Documenting => "documenting",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Planning => "Planning",
            Stage::Coding => "Coding",
            Stage::Testing => "Testing",
            Stage::Reviewing => "Reviewing",
            Stage::Refining => "Refining",
            Stage::Documenting => "Documenting",
        }
    }

    /// 1-based position.
    pub fn number(self) -> usize {
        Stage::ALL.iter().position(|s| *s == self).unwrap_or(0) + 1
    }

    pub fn role(self) -> Role {
        match self {
            Stage::Planning => Role::Planner,
            Stage::Coding | Stage::Refining => Role::Coder,
            Stage::Testing => Role::Tester,
            Stage::Reviewing => Role::Reviewer,
            Stage::Documenting => Role::Documenter,
        }
    }

    /// A blocking stage aborts the workflow when every provider fails.
    pub fn is_blocking(self) -> bool {
        matches!(self, Stage::Planning | Stage::Coding)
    }

    /// Artifact file written on success.
    pub fn artifact(self) -> &'static str {
        match self {
            Stage::Planning => "1_plan.txt",
            Stage::Coding => "2_code.txt",
            Stage::Testing => "3_tests.txt",
            Stage::Reviewing => "4_review.txt",
            Stage::Refining => "5_final_code.txt",
            Stage::Documenting => "6_README.md",
        }
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_planner() -> Vec<String> {
    names(&["claude", "gemini", "ollama", "ollama_fallback"])
}

fn default_coder() -> Vec<String> {
    names(&["gemini", "claude", "ollama", "ollama_fallback"])
}

fn default_tester() -> Vec<String> {
    names(&["gemini", "claude", "ollama", "ollama_fallback"])
}

fn default_reviewer() -> Vec<String> {
    names(&["claude", "ollama", "gemini", "ollama_fallback"])
}

fn default_documenter() -> Vec<String> {
    names(&["ollama", "gemini", "claude", "ollama_fallback"])
}

/// Ordered provider names per role (`[roles]` in chorus.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePriorities {
    #[serde(default = "default_planner")]
    pub planner: Vec<String>,
    #[serde(default = "default_coder")]
    pub coder: Vec<String>,
    #[serde(default = "default_tester")]
    pub tester: Vec<String>,
    #[serde(default = "default_reviewer")]
    pub reviewer: Vec<String>,
    #[serde(default = "default_documenter")]
    pub documenter: Vec<String>,
}

impl Default for RolePriorities {
    fn default() -> Self {
        Self {
            planner: default_planner(),
            coder: default_coder(),
            tester: default_tester(),
            reviewer: default_reviewer(),
            documenter: default_documenter(),
        }
    }
}

impl RolePriorities {
    pub fn chain(&self, role: Role) -> &[String] {
        match role {
            Role::Planner => &self.planner,
            Role::Coder => &self.coder,
            Role::Tester => &self.tester,
            Role::Reviewer => &self.reviewer,
            Role::Documenter => &self.documenter,
        }
    }
}
