use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::observer::{Event, Observer};
use crate::pipeline::{Deliverable, STAGE_COUNT, StageStatus};
use crate::ui::icons::{
    CHECK, CODE, CROSS, DOCS, HOURGLASS, PLAN, RESTORE, RETRY, REVIEW, SEARCH, SPARKLE, TEST, WARN,
};

const RULE_WIDTH: usize = 60;

/// Terminal rendering of orchestration events, via `indicatif`.
///
/// One spinner per in-flight provider request (several during a panel
/// fan-out), plus an optional stage bar for workflow runs.
pub struct ConsoleObserver {
    multi: MultiProgress,
    stage_bar: Option<ProgressBar>,
    requests: Mutex<HashMap<String, ProgressBar>>,
    verbose: bool,
}

impl ConsoleObserver {
    pub fn new(verbose: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            stage_bar: None,
            requests: Mutex::new(HashMap::new()),
            verbose,
        }
    }

    /// Observer with a stage progress bar for the six-stage workflow.
    pub fn for_workflow(verbose: bool) -> Self {
        let mut observer = Self::new(verbose);
        let bar = observer.multi.add(ProgressBar::new(STAGE_COUNT as u64));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .expect("progress bar template is a valid static string")
                .progress_chars("█▓▒░"),
        );
        bar.set_prefix("Stages");
        observer.stage_bar = Some(bar);
        observer
    }

    /// Stop all bars, leaving the stage bar at its final position.
    pub fn finish(&self) {
        if let Ok(mut requests) = self.requests.lock() {
            for (_, bar) in requests.drain() {
                bar.finish_and_clear();
            }
        }
        if let Some(bar) = &self.stage_bar {
            bar.finish();
        }
    }

    /// Print above the bars. Hidden draw targets (stderr not a terminal)
    /// swallow `println`, so write directly in that case.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.is_hidden() || self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    fn start_spinner(&self, provider: &str, message: String) {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {msg}")
                .expect("progress bar template is a valid static string"),
        );
        bar.set_message(message);
        bar.enable_steady_tick(Duration::from_millis(100));
        if let Ok(mut requests) = self.requests.lock() {
            if let Some(old) = requests.insert(provider.to_string(), bar) {
                old.finish_and_clear();
            }
        }
    }

    fn stop_spinner(&self, provider: &str) {
        if let Ok(mut requests) = self.requests.lock() {
            if let Some(bar) = requests.remove(provider) {
                bar.finish_and_clear();
            }
        }
    }

    fn stage_icon(label: &str) -> console::Emoji<'static, 'static> {
        match label {
            "Planning" => PLAN,
            "Coding" => CODE,
            "Testing" => TEST,
            "Reviewing" => REVIEW,
            "Refining" => SPARKLE,
            _ => DOCS,
        }
    }
}

impl Observer for ConsoleObserver {
    fn notify(&self, event: &Event<'_>) {
        match event {
            Event::RequestStarted {
                provider,
                model,
                timeout,
            } => {
                let model = model
                    .map(|m| format!(" with model {}", m))
                    .unwrap_or_default();
                self.start_spinner(
                    provider,
                    format!(
                        "{}[{}] Sending request{}... (timeout: {}s)",
                        HOURGLASS,
                        provider,
                        model,
                        timeout.as_secs()
                    ),
                );
            }
            Event::RequestFinished {
                provider,
                duration,
                success,
            } => {
                self.stop_spinner(provider);
                if self.verbose {
                    let status = if *success { "done" } else { "failed" };
                    self.print_line(format!(
                        "{}",
                        style(format!(
                            "   [{}] {} in {:.1}s",
                            provider,
                            status,
                            duration.as_secs_f64()
                        ))
                        .dim()
                    ));
                }
            }
            Event::RetryScheduled {
                provider,
                attempt,
                max_retries,
                delay,
                error,
            } => self.print_line(format!(
                "{}",
                style(format!(
                    "{}[{}] Attempt {} failed: {}. Retry {}/{} in {:.1}s...",
                    RETRY,
                    provider,
                    attempt,
                    error,
                    attempt,
                    max_retries,
                    delay.as_secs_f64()
                ))
                .yellow()
            )),
            Event::RetrySucceeded { provider, attempt } => self.print_line(format!(
                "{}",
                style(format!("{}[{}] Succeeded on attempt {}", CHECK, provider, attempt)).green()
            )),
            Event::CandidateStarted {
                role,
                provider,
                is_first,
            } => {
                let line = if *is_first {
                    format!("{}[{}] Trying {}...", SEARCH, role, provider)
                } else {
                    format!("{}[{}] Falling back to {}...", WARN, role, provider)
                };
                self.print_line(format!("{}", style(line).cyan()));
            }
            Event::CandidateSkipped {
                role,
                provider,
                reason,
            } => {
                if self.verbose {
                    self.print_line(format!(
                        "{}",
                        style(format!("   [{}] Skipping {} ({})", role, provider, reason)).dim()
                    ));
                }
            }
            Event::CandidateFailed {
                role,
                provider,
                quota,
                error,
            } => {
                let line = if *quota {
                    format!(
                        "{}[{}] {} quota exhausted. Falling back to next provider...",
                        WARN, role, provider
                    )
                } else {
                    format!("{}[{}] {} failed: {}", WARN, role, provider, error)
                };
                self.print_line(format!("{}", style(line).red()));
            }
            Event::CandidateSucceeded {
                role,
                provider,
                fell_back,
                request,
                total,
                chars,
            } => {
                let verb = if *fell_back {
                    "Successfully fell back to"
                } else {
                    "Completed with"
                };
                self.print_line(format!(
                    "{}",
                    style(format!(
                        "{}[{}] {} {} (request: {:.1}s, total: {:.1}s)",
                        CHECK,
                        role,
                        verb,
                        provider,
                        request.as_secs_f64(),
                        total.as_secs_f64()
                    ))
                    .green()
                ));
                self.print_line(format!(
                    "{}",
                    style(format!("   Response length: {} characters", chars)).green()
                ));
            }
            Event::StageStarted {
                number,
                total,
                label,
            } => {
                if let Some(bar) = &self.stage_bar {
                    bar.set_position(number.saturating_sub(1) as u64);
                    bar.set_message(label.to_string());
                }
                let rule = "=".repeat(RULE_WIDTH);
                self.print_line(format!("\n{}", style(&rule).bold()));
                self.print_line(format!(
                    "{}",
                    style(format!(
                        "[{}/{}] {}{}...",
                        number,
                        total,
                        Self::stage_icon(label),
                        label
                    ))
                    .bold()
                ));
                self.print_line(format!("{}", style(&rule).bold()));
            }
            Event::StageCompleted {
                label,
                provider,
                duration,
            } => {
                if let Some(bar) = &self.stage_bar {
                    bar.inc(1);
                }
                self.print_line(format!(
                    "{}",
                    style(format!(
                        "{}{} done by {} (Duration: {:.1}s)",
                        CHECK,
                        label,
                        provider,
                        duration.as_secs_f64()
                    ))
                    .green()
                ));
            }
            Event::StageDegraded { label, reason } => {
                if let Some(bar) = &self.stage_bar {
                    bar.inc(1);
                }
                self.print_line(format!(
                    "{}",
                    style(format!("{}{} failed: {}", CROSS, label, reason)).red()
                ));
                self.print_line(format!(
                    "{}",
                    style(format!("{}Continuing without {}...", WARN, label.to_lowercase()))
                        .yellow()
                ));
            }
            Event::RefinementSkipped => {
                if let Some(bar) = &self.stage_bar {
                    bar.inc(1);
                }
                self.print_line(format!(
                    "{}",
                    style(format!("{}No critical issues found. Skipping refinement.", CHECK))
                        .green()
                ));
            }
            Event::StageRestored { label } => {
                if let Some(bar) = &self.stage_bar {
                    bar.inc(1);
                }
                self.print_line(format!(
                    "{}",
                    style(format!("{}{} restored from checkpoint", RESTORE, label)).cyan()
                ));
            }
            Event::ArtifactWriteFailed { name, error } => self.print_line(format!(
                "{}",
                style(format!("{}Failed to save {}: {}", WARN, name, error)).red()
            )),
            Event::CheckpointWriteFailed { step_id, error } => self.print_line(format!(
                "{}",
                style(format!("{}Failed to record checkpoint '{}': {}", WARN, step_id, error))
                    .yellow()
            )),
            Event::PanelDraft {
                provider,
                duration,
                error,
            } => {
                let line = match error {
                    Some(e) => format!("{}", style(format!("[{}] failed: {}", provider, e)).red()),
                    None => format!(
                        "{}",
                        style(format!(
                            "[{}] finished in {:.2}s.",
                            provider,
                            duration.as_secs_f64()
                        ))
                        .green()
                    ),
                };
                self.print_line(line);
            }
            Event::CurationStarted { curator, drafts } => self.print_line(format!(
                "\n[Curator: {}] is synthesizing {} draft(s)...",
                style(curator).bold(),
                drafts
            )),
        }
    }
}

/// Bold section header between rules.
pub fn print_header(title: &str) {
    let rule = "=".repeat(RULE_WIDTH);
    println!("\n{}", style(&rule).bold());
    println!("{}", style(title).bold().cyan());
    println!("{}", style(&rule).bold());
}

/// Print the final workflow deliverable to stdout.
pub fn print_deliverable(deliverable: &Deliverable) {
    println!("{}", style("--- FINAL CODE ---").bold());
    println!("{}", deliverable.final_code);
    if let Some(tests) = &deliverable.tests {
        println!("\n{}", style("--- TESTS ---").bold());
        println!("{}", tests);
    }
    println!("\n{}", style("--- DOCUMENTATION ---").bold());
    match &deliverable.documentation {
        Some(docs) => println!("{}", docs),
        None => println!("{}", style("(Missing due to error)").red()),
    }
    println!("\n{}", style("--- REVIEW NOTES ---").bold());
    println!("{}", deliverable.review);
}

/// One line per stage: status, provider and duration.
pub fn print_stage_summary(deliverable: &Deliverable) {
    println!("\n{}", style("Run summary").bold());
    for outcome in &deliverable.stages {
        let status = match outcome.status {
            StageStatus::Completed => style("completed").green(),
            StageStatus::Restored => style("restored").cyan(),
            StageStatus::Skipped => style("skipped").dim(),
            StageStatus::Degraded => style("degraded").yellow(),
        };
        println!(
            "  {:<12} {:<10} {:<16} {:>7.1}s",
            outcome.stage.label(),
            status,
            outcome.provider,
            outcome.duration.as_secs_f64()
        );
    }
}
