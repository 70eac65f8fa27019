//! Role prompt templates.

use regex::Regex;
use std::sync::LazyLock;

/// Reviews at or above this length are refined even if they say LGTM.
pub const LGTM_MAX_REVIEW_CHARS: usize = 200;

static LGTM_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bLGTM\b").unwrap());

pub fn plan(request: &str) -> String {
    format!(
        "Role: Senior Software Architect.\n\
         Task: Create a concise, step-by-step technical implementation plan for: '{}'.\n\
         Output: Numbered list of steps only. Focus on architecture and edge cases.",
        request
    )
}

pub fn code(plan: &str) -> String {
    format!(
        "Role: Senior Developer.\n\
         Task: Write the code based strictly on this plan.\n\
         Plan:\n{}\n\n\
         Output: The code block(s) only. Minimal explanation.",
        plan
    )
}

pub fn tests(code: &str) -> String {
    format!(
        "Role: QA Engineer.\n\
         Task: Write a comprehensive unit test suite for the following code.\n\
         Code:\n{}\n\n\
         Output: The test code block(s) only.",
        code
    )
}

pub fn review(code: &str, tests: &str) -> String {
    format!(
        "Role: Lead Developer.\n\
         Task: Review the Code and Tests for bugs, security issues, and coverage gaps.\n\
         Code:\n{}\n\n\
         Tests:\n{}\n\n\
         Output: A structured list of critical issues to fix. If none, say 'LGTM'.",
        code, tests
    )
}

pub fn refine(code: &str, review: &str) -> String {
    format!(
        "Role: Senior Developer.\n\
         Task: Synthesize the Final Version. Fix issues identified in the review.\n\
         Original Code:\n{}\n\
         Review Feedback:\n{}\n\n\
         Output: Provide ONLY the final corrected code block.",
        code, review
    )
}

pub fn document(request: &str, final_code: &str) -> String {
    format!(
        "Role: Technical Writer.\n\
         Task: Create a brief README.md content for this code.\n\
         Context: {}\n\
         Final Code:\n{}\n\n\
         Output: Markdown formatted text.",
        request, final_code
    )
}

/// Short reviews that approve with a whole-word LGTM skip refinement.
pub fn should_skip_refinement(review: &str) -> bool {
    LGTM_REGEX.is_match(review) && review.chars().count() < LGTM_MAX_REVIEW_CHARS
}
