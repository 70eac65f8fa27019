//! The workflow state machine.
//!
//! Stages run strictly in order. Planning and coding are blocking: when every
//! provider in the role chain fails, the run aborts. The remaining stages
//! degrade instead (placeholder tests, placeholder review, pre-refinement
//! code, missing documentation) and the run still produces a
//! [`Deliverable`].
//!
//! Every outcome is pushed to the checkpoint store, when one is attached, and
//! to the artifact sink. Both are best-effort: a failed write is reported to
//! the observer and the run goes on.

use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{
    ArtifactSink, Deliverable, Role, RolePriorities, STAGE_COUNT, Stage, StageOutcome,
    StageStatus, prompts,
};
use crate::checkpoint::{CheckpointStatus, CheckpointStore, WorkflowRecovery};
use crate::errors::OrchestratorError;
use crate::fallback::{FallbackResolver, NO_PROVIDER};
use crate::observer::{Event, SharedObserver};
use crate::provider::ProviderRegistry;
use crate::retry::RetryPolicy;

pub const TESTS_PLACEHOLDER: &str = "Tests unavailable due to generation error.";
pub const REVIEW_PLACEHOLDER: &str = "Review unavailable due to reviewer error.";

/// Stage payload reused from a previous run.
#[derive(Debug, Clone)]
struct CachedStage {
    content: String,
    provider: String,
    skipped: bool,
}

/// Result of resolving one stage.
enum StageResult {
    Done { content: String, outcome: StageOutcome },
    Failed { error: String, attempted: Vec<String> },
}

pub struct PipelineEngine {
    resolver: FallbackResolver,
    roles: RolePriorities,
    observer: SharedObserver,
    artifacts: ArtifactSink,
    checkpoints: Option<CheckpointStore>,
    cached: HashMap<Stage, CachedStage>,
}

impl PipelineEngine {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        policy: RetryPolicy,
        roles: RolePriorities,
        observer: SharedObserver,
    ) -> Self {
        Self {
            resolver: FallbackResolver::new(registry, policy, Arc::clone(&observer)),
            roles,
            observer,
            artifacts: ArtifactSink::default(),
            checkpoints: None,
            cached: HashMap::new(),
        }
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.artifacts = ArtifactSink::new(dir);
        self
    }

    /// Record stage outcomes in `store`.
    pub fn with_checkpoints(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Record into `store` and reuse every stage it already completed.
    pub fn resume(mut self, store: CheckpointStore) -> Self {
        {
            let recovery = WorkflowRecovery::new(&store);
            for stage in Stage::ALL {
                let Some(data) = recovery.cached_result(stage.step_id()) else {
                    continue;
                };
                let Some(content) = data.get("content").and_then(|v| v.as_str()) else {
                    continue;
                };
                self.cached.insert(
                    stage,
                    CachedStage {
                        content: content.to_string(),
                        provider: data
                            .get("provider")
                            .and_then(|v| v.as_str())
                            .unwrap_or(NO_PROVIDER)
                            .to_string(),
                        skipped: data.get("skipped").and_then(|v| v.as_bool()).unwrap_or(false),
                    },
                );
            }
        }
        tracing::info!(
            workflow_id = store.workflow_id(),
            restored = self.cached.len(),
            "resuming workflow"
        );
        self.checkpoints = Some(store);
        self
    }

    /// Stages that will be restored instead of executed.
    pub fn restored_stages(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| self.cached.contains_key(s))
            .collect()
    }

    pub fn checkpoints(&self) -> Option<&CheckpointStore> {
        self.checkpoints.as_ref()
    }

    /// Every role chain must name at least one registered, available provider.
    pub fn preflight(&self) -> Result<(), OrchestratorError> {
        let registry = self.resolver.registry();
        for role in Role::ALL {
            let chain = self.roles.chain(role);
            if !chain.iter().any(|name| registry.is_usable(name)) {
                return Err(OrchestratorError::NoAvailableProviders {
                    role: role.key().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Run with an overall deadline. On expiry the in-flight provider call is
    /// dropped (killing its process); files already written stay on disk.
    pub async fn run_with_timeout(
        &mut self,
        request: &str,
        limit: Duration,
    ) -> Result<Deliverable, OrchestratorError> {
        let start = Instant::now();
        match tokio::time::timeout(limit, self.run(request)).await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::WorkflowTimeout {
                limit_secs: limit.as_secs(),
                elapsed_secs: start.elapsed().as_secs_f64(),
            }),
        }
    }

    pub async fn run(&mut self, request: &str) -> Result<Deliverable, OrchestratorError> {
        self.preflight()?;
        if let Some(store) = self.checkpoints.as_mut() {
            if store.prompt().is_none() {
                if let Err(e) = store.set_prompt(request) {
                    tracing::warn!(error = %e, "failed to record workflow prompt");
                }
            }
        }

        let mut stages = Vec::with_capacity(STAGE_COUNT);

        let plan = self
            .blocking_stage(Stage::Planning, &prompts::plan(request), &mut stages)
            .await?;
        let code = self.blocking_stage(Stage::Coding, &prompts::code(&plan), &mut stages).await?;

        let tests = match self.stage(Stage::Testing, &prompts::tests(&code)).await {
            StageResult::Done { content, outcome } => {
                self.write_artifact(Stage::Testing, &content);
                stages.push(outcome);
                Some(content)
            }
            StageResult::Failed { error, .. } => {
                self.degrade(Stage::Testing, &error, &mut stages);
                None
            }
        };

        let tests_text = tests.as_deref().unwrap_or(TESTS_PLACEHOLDER);
        let review = match self.stage(Stage::Reviewing, &prompts::review(&code, tests_text)).await {
            StageResult::Done { content, outcome } => {
                stages.push(outcome);
                content
            }
            StageResult::Failed { error, .. } => {
                self.degrade(Stage::Reviewing, &error, &mut stages);
                REVIEW_PLACEHOLDER.to_string()
            }
        };
        self.write_artifact(Stage::Reviewing, &review);

        let final_code = self.refine(&code, &review, &mut stages).await;
        self.write_artifact(Stage::Refining, &final_code);

        let documentation = match self
            .stage(Stage::Documenting, &prompts::document(request, &final_code))
            .await
        {
            StageResult::Done { content, outcome } => {
                self.write_artifact(Stage::Documenting, &content);
                stages.push(outcome);
                Some(content)
            }
            StageResult::Failed { error, .. } => {
                self.degrade(Stage::Documenting, &error, &mut stages);
                None
            }
        };

        Ok(Deliverable {
            plan,
            final_code,
            tests,
            documentation,
            review,
            stages,
        })
    }

    async fn blocking_stage(
        &mut self,
        stage: Stage,
        prompt: &str,
        stages: &mut Vec<StageOutcome>,
    ) -> Result<String, OrchestratorError> {
        match self.stage(stage, prompt).await {
            StageResult::Done { content, outcome } => {
                self.write_artifact(stage, &content);
                stages.push(outcome);
                Ok(content)
            }
            StageResult::Failed { error, attempted } => {
                tracing::error!(stage = stage.label(), error = %error, "blocking stage failed");
                Err(OrchestratorError::StageFailed {
                    stage: stage.label().to_string(),
                    role: stage.role().label().to_string(),
                    attempted,
                    message: error,
                })
            }
        }
    }

    async fn refine(&mut self, code: &str, review: &str, stages: &mut Vec<StageOutcome>) -> String {
        let gate_passed = prompts::should_skip_refinement(review);
        let cached = self.cached.get(&Stage::Refining).cloned();
        if cached.is_some() || gate_passed {
            self.observer.notify(&Event::StageStarted {
                number: Stage::Refining.number(),
                total: STAGE_COUNT,
                label: Stage::Refining.label(),
            });
        }

        if let Some(cached) = cached {
            self.observer.notify(&Event::StageRestored {
                label: Stage::Refining.label(),
            });
            stages.push(StageOutcome {
                stage: Stage::Refining,
                provider: cached.provider,
                duration: Duration::ZERO,
                status: if cached.skipped {
                    StageStatus::Skipped
                } else {
                    StageStatus::Restored
                },
            });
            return cached.content;
        }

        if gate_passed {
            self.observer.notify(&Event::RefinementSkipped);
            self.record(
                Stage::Refining,
                CheckpointStatus::Completed,
                json!({"content": code, "provider": NO_PROVIDER, "skipped": true}),
                None,
                Duration::ZERO,
            );
            stages.push(StageOutcome {
                stage: Stage::Refining,
                provider: NO_PROVIDER.to_string(),
                duration: Duration::ZERO,
                status: StageStatus::Skipped,
            });
            return code.to_string();
        }

        match self.stage(Stage::Refining, &prompts::refine(code, review)).await {
            StageResult::Done { content, outcome } => {
                stages.push(outcome);
                content
            }
            StageResult::Failed { error, .. } => {
                self.degrade(Stage::Refining, &error, stages);
                code.to_string()
            }
        }
    }

    /// Resolve one stage from the cache or through the fallback chain, and
    /// record the outcome.
    async fn stage(&mut self, stage: Stage, prompt: &str) -> StageResult {
        self.observer.notify(&Event::StageStarted {
            number: stage.number(),
            total: STAGE_COUNT,
            label: stage.label(),
        });

        if let Some(cached) = self.cached.get(&stage).cloned() {
            self.observer.notify(&Event::StageRestored {
                label: stage.label(),
            });
            return StageResult::Done {
                content: cached.content,
                outcome: StageOutcome {
                    stage,
                    provider: cached.provider,
                    duration: Duration::ZERO,
                    status: StageStatus::Restored,
                },
            };
        }

        let start = Instant::now();
        let chain = self.roles.chain(stage.role()).to_vec();
        let resolution = self
            .resolver
            .ask_with_fallback(&chain, prompt, stage.role().label())
            .await;
        let duration = start.elapsed();

        if resolution.is_success() {
            let response = resolution.response;
            self.observer.notify(&Event::StageCompleted {
                label: stage.label(),
                provider: &response.provider_name,
                duration,
            });
            self.record(
                stage,
                CheckpointStatus::Completed,
                json!({"content": response.content, "provider": response.provider_name}),
                None,
                duration,
            );
            StageResult::Done {
                outcome: StageOutcome {
                    stage,
                    provider: response.provider_name,
                    duration,
                    status: StageStatus::Completed,
                },
                content: response.content,
            }
        } else {
            let error = resolution
                .response
                .error
                .unwrap_or_else(|| format!("{} produced no output", stage.label()));
            self.record(
                stage,
                CheckpointStatus::Failed,
                json!({}),
                Some(error.clone()),
                duration,
            );
            StageResult::Failed {
                error,
                attempted: resolution.attempted,
            }
        }
    }

    fn degrade(&self, stage: Stage, error: &str, stages: &mut Vec<StageOutcome>) {
        self.observer.notify(&Event::StageDegraded {
            label: stage.label(),
            reason: error,
        });
        stages.push(StageOutcome {
            stage,
            provider: NO_PROVIDER.to_string(),
            duration: Duration::ZERO,
            status: StageStatus::Degraded,
        });
    }

    fn write_artifact(&self, stage: Stage, content: &str) {
        self.artifacts
            .write(stage.artifact(), content, self.observer.as_ref());
    }

    fn record(
        &mut self,
        stage: Stage,
        status: CheckpointStatus,
        data: serde_json::Value,
        error: Option<String>,
        duration: Duration,
    ) {
        let Some(store) = self.checkpoints.as_mut() else {
            return;
        };
        if let Err(e) = store.create_checkpoint(
            stage.step_id(),
            stage.label(),
            status,
            data,
            error,
            duration.as_secs_f64(),
        ) {
            self.observer.notify(&Event::CheckpointWriteFailed {
                step_id: stage.step_id(),
                error: &e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::noop;
    use crate::observer::recording::RecordingObserver;
    use crate::provider::Provider;
    use crate::provider::scripted::{Reply, ScriptedProvider};
    use std::fs;
    use tempfile::TempDir;

    fn registry(providers: Vec<Arc<dyn Provider>>) -> Arc<ProviderRegistry> {
        let mut reg = ProviderRegistry::default();
        for p in providers {
            reg.insert(p);
        }
        Arc::new(reg)
    }

    fn single_chain(name: &str) -> RolePriorities {
        let chain = vec![name.to_string()];
        RolePriorities {
            planner: chain.clone(),
            coder: chain.clone(),
            tester: chain.clone(),
            reviewer: chain.clone(),
            documenter: chain,
        }
    }

    fn engine(reg: Arc<ProviderRegistry>, roles: RolePriorities) -> PipelineEngine {
        PipelineEngine::new(reg, RetryPolicy::new(0, Duration::ZERO), roles, noop())
    }

    /// Scripted answers for plan, code, tests, review, (refine), docs.
    fn scripted(name: &str, replies: &[&str]) -> Arc<ScriptedProvider> {
        Arc::new(ScriptedProvider::new(
            name,
            replies.iter().map(|r| Reply::Ok(r.to_string())).collect(),
        ))
    }

    #[tokio::test]
    async fn test_lgtm_skips_refinement() {
        let p = scripted("p", &["plan", "code v1", "tests", "LGTM", "# Docs"]);
        let mut e = engine(registry(vec![p.clone()]), single_chain("p"));
        let d = e.run("build a todo app").await.unwrap();
        assert_eq!(d.final_code, "code v1");
        assert_eq!(d.tests.as_deref(), Some("tests"));
        assert_eq!(d.documentation.as_deref(), Some("# Docs"));
        assert_eq!(d.outcome(Stage::Refining).unwrap().status, StageStatus::Skipped);
        assert_eq!(p.calls(), 5);
    }

    #[tokio::test]
    async fn test_review_findings_trigger_refinement() {
        let p = scripted(
            "p",
            &["plan", "code v1", "tests", "1. off-by-one in loop", "code v2", "# Docs"],
        );
        let mut e = engine(registry(vec![p.clone()]), single_chain("p"));
        let d = e.run("build a todo app").await.unwrap();
        assert_eq!(d.final_code, "code v2");
        assert_eq!(p.calls(), 6);
        let refine_prompt = &p.prompts()[4];
        assert!(refine_prompt.contains("Original Code:\ncode v1"));
        assert!(refine_prompt.contains("1. off-by-one in loop"));
    }

    #[tokio::test]
    async fn test_planning_failure_aborts() {
        let p = Arc::new(ScriptedProvider::failing("p", "quota exceeded"));
        let mut e = engine(registry(vec![p]), single_chain("p"));
        let err = e.run("build a todo app").await.unwrap_err();
        match err {
            OrchestratorError::StageFailed {
                stage,
                role,
                attempted,
                ..
            } => {
                assert_eq!(stage, "Planning");
                assert_eq!(role, "Planner");
                assert_eq!(attempted, vec!["p"]);
            }
            other => panic!("Expected StageFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_blocking_failures_degrade() {
        let good = scripted("good", &["plan", "code v1"]);
        let bad = Arc::new(ScriptedProvider::failing("bad", "quota"));
        let roles = RolePriorities {
            planner: vec!["good".into()],
            coder: vec!["good".into()],
            tester: vec!["bad".into()],
            reviewer: vec!["bad".into()],
            documenter: vec!["bad".into()],
        };
        let obs = Arc::new(RecordingObserver::default());
        let mut e = PipelineEngine::new(
            registry(vec![good.clone(), bad.clone()]),
            RetryPolicy::new(0, Duration::ZERO),
            roles,
            obs.clone(),
        );
        let d = e.run("build a todo app").await.unwrap();
        assert_eq!(d.tests, None);
        assert_eq!(d.review, REVIEW_PLACEHOLDER);
        assert_eq!(d.documentation, None);
        // placeholder review has no LGTM, so refinement ran on `good` and
        // the scripted provider repeated its last answer
        assert_eq!(d.final_code, "code v1");
        assert_eq!(d.outcome(Stage::Testing).unwrap().status, StageStatus::Degraded);
        assert_eq!(obs.count_matching("StageDegraded"), 3);

        let review_prompt = bad
            .prompts()
            .into_iter()
            .find(|p| p.starts_with("Role: Lead Developer"))
            .unwrap();
        assert!(review_prompt.contains(TESTS_PLACEHOLDER));
    }

    #[tokio::test]
    async fn test_refinement_failure_keeps_original_code() {
        let p = Arc::new(ScriptedProvider::new(
            "p",
            vec![
                Reply::Ok("plan".into()),
                Reply::Ok("code v1".into()),
                Reply::Ok("tests".into()),
                Reply::Ok("needs work".into()),
                Reply::Fail("quota exceeded".into()),
                Reply::Ok("# Docs".into()),
            ],
        ));
        let mut e = engine(registry(vec![p]), single_chain("p"));
        let d = e.run("build a todo app").await.unwrap();
        assert_eq!(d.final_code, "code v1");
        assert_eq!(d.outcome(Stage::Refining).unwrap().status, StageStatus::Degraded);
        assert_eq!(d.documentation.as_deref(), Some("# Docs"));
    }

    #[tokio::test]
    async fn test_preflight_names_missing_role() {
        let roles = RolePriorities {
            planner: vec!["p".into()],
            coder: vec!["p".into()],
            tester: vec!["p".into()],
            reviewer: vec!["ghost".into()],
            documenter: vec!["p".into()],
        };
        let e = engine(registry(vec![scripted("p", &["x"])]), roles);
        let err = e.preflight().unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::NoAvailableProviders { ref role } if role == "reviewer"
        ));
    }

    #[tokio::test]
    async fn test_all_unavailable_fails_before_any_call() {
        let p = Arc::new(ScriptedProvider::unavailable("p"));
        let mut e = engine(registry(vec![p.clone()]), single_chain("p"));
        let err = e.run("build a todo app").await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::NoAvailableProviders { ref role } if role == "planner"
        ));
        assert_eq!(p.calls(), 0);
    }

    #[tokio::test]
    async fn test_artifacts_written() {
        let out = TempDir::new().unwrap();
        let p = scripted("p", &["plan", "code v1", "tests", "LGTM", "# Docs"]);
        let mut e = engine(registry(vec![p]), single_chain("p"))
            .with_output_dir(Some(out.path().to_path_buf()));
        e.run("build a todo app").await.unwrap();
        for (name, content) in [
            ("1_plan.txt", "plan"),
            ("2_code.txt", "code v1"),
            ("3_tests.txt", "tests"),
            ("4_review.txt", "LGTM"),
            ("5_final_code.txt", "code v1"),
            ("6_README.md", "# Docs"),
        ] {
            assert_eq!(fs::read_to_string(out.path().join(name)).unwrap(), content);
        }
    }

    #[tokio::test]
    async fn test_checkpoints_recorded_per_stage() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open("wf", dir.path()).unwrap();
        let p = scripted("p", &["plan", "code v1", "tests", "LGTM", "# Docs"]);
        let mut e = engine(registry(vec![p]), single_chain("p")).with_checkpoints(store);
        e.run("build a todo app").await.unwrap();

        let store = e.checkpoints().unwrap();
        assert_eq!(store.get_resume_point(), None);
        assert_eq!(store.prompt(), Some("build a todo app"));
        let refining = store.get_checkpoint("refining").unwrap();
        assert_eq!(refining.data["skipped"], true);
        assert_eq!(refining.data["provider"], "none");
        assert_eq!(store.get_step_data("planning").unwrap()["provider"], "p");
    }

    #[tokio::test]
    async fn test_blocking_failure_recorded_before_abort() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open("wf", dir.path()).unwrap();
        let p = Arc::new(ScriptedProvider::new(
            "p",
            vec![Reply::Ok("plan".into()), Reply::Fail("quota".into())],
        ));
        let mut e = engine(registry(vec![p]), single_chain("p")).with_checkpoints(store);
        assert!(e.run("build a todo app").await.is_err());
        let store = e.checkpoints().unwrap();
        assert_eq!(
            store.get_checkpoint("coding").unwrap().status,
            CheckpointStatus::Failed
        );
        assert_eq!(store.get_resume_point(), Some("coding"));
    }

    #[tokio::test]
    async fn test_resume_reuses_completed_stages() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = CheckpointStore::open("wf", dir.path()).unwrap();
            for (step, content) in [("planning", "cached plan"), ("coding", "cached code")] {
                store
                    .create_checkpoint(
                        step,
                        step,
                        CheckpointStatus::Completed,
                        json!({"content": content, "provider": "old"}),
                        None,
                        1.0,
                    )
                    .unwrap();
            }
        }
        let store = CheckpointStore::open("wf", dir.path()).unwrap();
        let p = scripted("p", &["tests", "LGTM", "# Docs"]);
        let mut e = engine(registry(vec![p.clone()]), single_chain("p")).resume(store);
        assert_eq!(e.restored_stages(), vec![Stage::Planning, Stage::Coding]);

        let d = e.run("build a todo app").await.unwrap();
        assert_eq!(d.plan, "cached plan");
        assert_eq!(d.final_code, "cached code");
        assert_eq!(d.outcome(Stage::Coding).unwrap().status, StageStatus::Restored);
        assert_eq!(p.calls(), 3);
        assert!(p.prompts()[0].contains("cached code"));
    }

    #[tokio::test]
    async fn test_checkpoint_write_failure_does_not_abort_run() {
        let dir = TempDir::new().unwrap();
        let ckpt_dir = dir.path().join("ckpt");
        let store = CheckpointStore::open("wf", &ckpt_dir).unwrap();
        fs::remove_dir_all(&ckpt_dir).unwrap();

        let obs = Arc::new(RecordingObserver::default());
        let p = scripted("p", &["plan", "code v1", "tests", "LGTM", "# Docs"]);
        let mut e = PipelineEngine::new(
            registry(vec![p]),
            RetryPolicy::new(0, Duration::ZERO),
            single_chain("p"),
            obs.clone(),
        )
        .with_checkpoints(store);
        let d = e.run("build a todo app").await.unwrap();
        assert_eq!(d.final_code, "code v1");
        assert!(obs.count_matching("CheckpointWriteFailed") >= 6);
        assert!(!ckpt_dir.exists());
    }

    #[tokio::test]
    async fn test_workflow_timeout() {
        let p = Arc::new(
            ScriptedProvider::ok("p", "slow answer").with_delay(Duration::from_secs(5)),
        );
        let mut e = engine(registry(vec![p]), single_chain("p"));
        let err = e
            .run_with_timeout("build a todo app", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::WorkflowTimeout { .. }));
    }
}
