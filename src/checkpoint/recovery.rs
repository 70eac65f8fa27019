use serde::Serialize;

use super::{CheckpointStatus, CheckpointStore};

/// What a resumed run would do.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryPlan {
    pub can_recover: bool,
    pub resume_from: Option<String>,
    pub completed_steps: Vec<String>,
    pub failed_steps: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Read-only view over a [`CheckpointStore`] used when resuming.
pub struct WorkflowRecovery<'a> {
    store: &'a CheckpointStore,
}

impl<'a> WorkflowRecovery<'a> {
    pub fn new(store: &'a CheckpointStore) -> Self {
        Self { store }
    }

    pub fn recovery_plan(&self) -> RecoveryPlan {
        let resume_from = self.store.get_resume_point().map(str::to_string);
        let completed_steps = self.store.get_completed_steps();

        let mut failed_steps: Vec<String> = Vec::new();
        for record in self.store.records() {
            if record.status == CheckpointStatus::Failed && !failed_steps.contains(&record.step_id)
            {
                failed_steps.push(record.step_id.clone());
            }
        }

        let mut recommendations = Vec::new();
        if !failed_steps.is_empty() {
            recommendations.push(format!(
                "Review errors in failed steps: {}",
                failed_steps.join(", ")
            ));
        }
        if let Some(step) = &resume_from {
            recommendations.push(format!("Resume workflow from step: {}", step));
        }

        RecoveryPlan {
            can_recover: self.store.can_resume(),
            resume_from,
            completed_steps,
            failed_steps,
            recommendations,
        }
    }

    /// A step's payload can be reused when it has a completed record with
    /// non-null data.
    pub fn can_use_cached_step(&self, step_id: &str) -> bool {
        self.store
            .get_completed_checkpoint(step_id)
            .is_some_and(|r| !r.data.is_null())
    }

    pub fn cached_result(&self, step_id: &str) -> Option<&'a serde_json::Value> {
        if !self.can_use_cached_step(step_id) {
            return None;
        }
        self.store.get_completed_checkpoint(step_id).map(|r| &r.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_recovery_plan_lists_failed_and_resume_point() {
        let dir = TempDir::new().unwrap();
        let mut store = CheckpointStore::open("wf", dir.path()).unwrap();
        store
            .create_checkpoint(
                "planning",
                "Planning",
                CheckpointStatus::Completed,
                json!({"content": "plan", "provider": "claude"}),
                None,
                1.0,
            )
            .unwrap();
        store
            .create_checkpoint(
                "coding",
                "Coding",
                CheckpointStatus::Failed,
                json!({}),
                Some("boom".into()),
                1.0,
            )
            .unwrap();

        let plan = WorkflowRecovery::new(&store).recovery_plan();
        assert!(plan.can_recover);
        assert_eq!(plan.resume_from.as_deref(), Some("coding"));
        assert_eq!(plan.completed_steps, vec!["planning"]);
        assert_eq!(plan.failed_steps, vec!["coding"]);
        assert_eq!(
            plan.recommendations,
            vec![
                "Review errors in failed steps: coding".to_string(),
                "Resume workflow from step: coding".to_string(),
            ]
        );
    }

    #[test]
    fn test_cached_result_only_for_completed() {
        let dir = TempDir::new().unwrap();
        let mut store = CheckpointStore::open("wf", dir.path()).unwrap();
        store
            .create_checkpoint(
                "planning",
                "Planning",
                CheckpointStatus::Completed,
                json!({"content": "plan"}),
                None,
                1.0,
            )
            .unwrap();
        store
            .create_checkpoint("coding", "Coding", CheckpointStatus::Failed, json!({}), None, 0.0)
            .unwrap();
        store
            .create_checkpoint(
                "testing",
                "Testing",
                CheckpointStatus::Completed,
                serde_json::Value::Null,
                None,
                0.0,
            )
            .unwrap();

        let recovery = WorkflowRecovery::new(&store);
        assert_eq!(recovery.cached_result("planning").unwrap()["content"], "plan");
        assert!(recovery.cached_result("coding").is_none());
        assert!(!recovery.can_use_cached_step("testing"));
        assert!(recovery.cached_result("missing").is_none());
    }

    #[test]
    fn test_cached_result_survives_later_failed_attempt() {
        let dir = TempDir::new().unwrap();
        let mut store = CheckpointStore::open("wf", dir.path()).unwrap();
        store
            .create_checkpoint(
                "planning",
                "Planning",
                CheckpointStatus::Completed,
                json!({"content": "first plan"}),
                None,
                1.0,
            )
            .unwrap();
        store
            .create_checkpoint(
                "planning",
                "Planning",
                CheckpointStatus::Failed,
                json!({}),
                Some("timeout".into()),
                0.0,
            )
            .unwrap();

        let recovery = WorkflowRecovery::new(&store);
        assert_eq!(recovery.cached_result("planning").unwrap()["content"], "first plan");
        let plan = recovery.recovery_plan();
        assert_eq!(plan.completed_steps, vec!["planning"]);
        assert_eq!(plan.resume_from.as_deref(), Some("coding"));
    }
}
