//! Durable, append-only log of workflow stage outcomes.
//!
//! One JSON file per workflow (`checkpoint_<workflow_id>.json`) holds every
//! record in creation order. Each mutation rewrites the whole file through a
//! temp file and a rename, so a crash never leaves a half-written log.

pub mod recovery;

pub use recovery::{RecoveryPlan, WorkflowRecovery};

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::CheckpointError;

/// The well-known step ids, in pipeline order.
pub const WORKFLOW_STEPS: [&str; 6] = [
    "planning",
    "coding",
    "testing",
    "reviewing",
    "refining",
    "documenting",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CheckpointStatus::InProgress => "in_progress",
            CheckpointStatus::Completed => "completed",
            CheckpointStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One recorded stage outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub step_id: String,
    pub step_name: String,
    pub timestamp: DateTime<Utc>,
    pub status: CheckpointStatus,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub duration: f64,
}

/// On-disk layout of a checkpoint file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointFile {
    workflow_id: String,
    last_updated: DateTime<Utc>,
    total_checkpoints: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prompt: Option<String>,
    checkpoints: Vec<CheckpointRecord>,
}

#[derive(Debug, Serialize)]
struct ExportFile<'a> {
    workflow_id: &'a str,
    exported_at: DateTime<Utc>,
    checkpoints: &'a [CheckpointRecord],
}

/// Counts and resume information for one workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointSummary {
    pub workflow_id: String,
    pub total_checkpoints: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub can_resume: bool,
    pub resume_point: Option<String>,
    pub last_checkpoint: Option<CheckpointRecord>,
}

/// A checkpoint file found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowListing {
    pub workflow_id: String,
    pub path: PathBuf,
    pub last_updated: DateTime<Utc>,
    pub total_checkpoints: usize,
}

pub struct CheckpointStore {
    workflow_id: String,
    path: PathBuf,
    prompt: Option<String>,
    records: Vec<CheckpointRecord>,
}

impl CheckpointStore {
    /// Open the store for `workflow_id` under `dir`, loading any existing
    /// file. A file that cannot be parsed is logged and ignored.
    pub fn open(workflow_id: &str, dir: &Path) -> Result<Self, CheckpointError> {
        fs::create_dir_all(dir).map_err(|source| CheckpointError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = checkpoint_path(dir, workflow_id);
        let mut store = Self {
            workflow_id: workflow_id.to_string(),
            path,
            prompt: None,
            records: Vec::new(),
        };

        if store.path.exists() {
            match read_file(&store.path) {
                Ok(file) => {
                    tracing::debug!(
                        workflow_id,
                        records = file.checkpoints.len(),
                        "loaded checkpoints"
                    );
                    store.prompt = file.prompt;
                    store.records = file.checkpoints;
                }
                Err(CheckpointError::Parse { path, source }) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %source,
                        "ignoring unreadable checkpoint file"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(store)
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The prompt the workflow was started with, if recorded.
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    /// Record the workflow prompt so a later resume can reuse it.
    pub fn set_prompt(&mut self, prompt: &str) -> Result<(), CheckpointError> {
        self.prompt = Some(prompt.to_string());
        self.persist()
    }

    pub fn records(&self) -> &[CheckpointRecord] {
        &self.records
    }

    /// Append a record and re-persist the whole log.
    pub fn create_checkpoint(
        &mut self,
        step_id: &str,
        step_name: &str,
        status: CheckpointStatus,
        data: serde_json::Value,
        error: Option<String>,
        duration: f64,
    ) -> Result<&CheckpointRecord, CheckpointError> {
        self.records.push(CheckpointRecord {
            step_id: step_id.to_string(),
            step_name: step_name.to_string(),
            timestamp: Utc::now(),
            status,
            data,
            error,
            duration,
        });
        self.persist()?;
        tracing::debug!(step_id, %status, "checkpoint recorded");
        Ok(&self.records[self.records.len() - 1])
    }

    /// Most recent record for `step_id`.
    pub fn get_checkpoint(&self, step_id: &str) -> Option<&CheckpointRecord> {
        self.records.iter().rev().find(|r| r.step_id == step_id)
    }

    pub fn get_last_checkpoint(&self) -> Option<&CheckpointRecord> {
        self.records.last()
    }

    /// Most recent completed record for `step_id`. A later failed or
    /// in-progress attempt does not hide it; `mark_failed` rewrites a record
    /// in place and so does.
    pub fn get_completed_checkpoint(&self, step_id: &str) -> Option<&CheckpointRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.step_id == step_id && r.status == CheckpointStatus::Completed)
    }

    /// Step ids with at least one completed record, in first-seen order.
    pub fn get_completed_steps(&self) -> Vec<String> {
        let mut steps: Vec<String> = Vec::new();
        for record in &self.records {
            if record.status == CheckpointStatus::Completed && !steps.contains(&record.step_id) {
                steps.push(record.step_id.clone());
            }
        }
        steps
    }

    pub fn should_skip_step(&self, step_id: &str) -> bool {
        self.get_completed_checkpoint(step_id).is_some()
    }

    pub fn get_step_data(&self, step_id: &str) -> Option<&serde_json::Value> {
        self.get_checkpoint(step_id).map(|r| &r.data)
    }

    /// First well-known step that is not completed; `None` once all are.
    pub fn get_resume_point(&self) -> Option<&'static str> {
        WORKFLOW_STEPS
            .iter()
            .copied()
            .find(|step| !self.should_skip_step(step))
    }

    pub fn can_resume(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn mark_failed(&mut self, step_id: &str, error: &str) -> Result<(), CheckpointError> {
        let record = self.latest_mut(step_id)?;
        record.status = CheckpointStatus::Failed;
        record.error = Some(error.to_string());
        self.persist()
    }

    pub fn mark_completed(&mut self, step_id: &str) -> Result<(), CheckpointError> {
        let record = self.latest_mut(step_id)?;
        record.status = CheckpointStatus::Completed;
        self.persist()
    }

    pub fn summary(&self) -> CheckpointSummary {
        let count = |status: CheckpointStatus| {
            self.records.iter().filter(|r| r.status == status).count()
        };
        CheckpointSummary {
            workflow_id: self.workflow_id.clone(),
            total_checkpoints: self.records.len(),
            completed: count(CheckpointStatus::Completed),
            failed: count(CheckpointStatus::Failed),
            in_progress: count(CheckpointStatus::InProgress),
            can_resume: self.can_resume(),
            resume_point: self.get_resume_point().map(str::to_string),
            last_checkpoint: self.records.last().cloned(),
        }
    }

    /// Drop every record and delete the file.
    pub fn clear_checkpoints(&mut self) -> Result<(), CheckpointError> {
        self.records.clear();
        self.prompt = None;
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|source| CheckpointError::Remove {
                path: self.path.clone(),
                source,
            })?;
        }
        tracing::info!(workflow_id = %self.workflow_id, "cleared checkpoints");
        Ok(())
    }

    /// Write the records to an arbitrary location.
    pub fn export_to_file(&self, path: &Path) -> Result<(), CheckpointError> {
        let export = ExportFile {
            workflow_id: &self.workflow_id,
            exported_at: Utc::now(),
            checkpoints: &self.records,
        };
        let json = serde_json::to_string_pretty(&export).map_err(CheckpointError::Serialize)?;
        fs::write(path, json).map_err(|source| CheckpointError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    fn latest_mut(&mut self, step_id: &str) -> Result<&mut CheckpointRecord, CheckpointError> {
        self.records
            .iter_mut()
            .rev()
            .find(|r| r.step_id == step_id)
            .ok_or_else(|| CheckpointError::UnknownStep {
                step_id: step_id.to_string(),
            })
    }

    fn persist(&self) -> Result<(), CheckpointError> {
        let file = CheckpointFile {
            workflow_id: self.workflow_id.clone(),
            last_updated: Utc::now(),
            total_checkpoints: self.records.len(),
            prompt: self.prompt.clone(),
            checkpoints: self.records.clone(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(CheckpointError::Serialize)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| CheckpointError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| CheckpointError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

fn checkpoint_path(dir: &Path, workflow_id: &str) -> PathBuf {
    dir.join(format!("checkpoint_{}.json", workflow_id))
}

fn read_file(path: &Path) -> Result<CheckpointFile, CheckpointError> {
    let content = fs::read_to_string(path).map_err(|source| CheckpointError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| CheckpointError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Every parseable checkpoint file in `dir`, most recently updated first.
pub fn list_workflows(dir: &Path) -> Result<Vec<WorkflowListing>, CheckpointError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let pattern = dir.join("checkpoint_*.json");
    let mut listings = Vec::new();
    let entries = glob::glob(&pattern.to_string_lossy()).map_err(|e| CheckpointError::Read {
        path: dir.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
    })?;
    for path in entries.flatten() {
        match read_file(&path) {
            Ok(file) => listings.push(WorkflowListing {
                workflow_id: file.workflow_id,
                path,
                last_updated: file.last_updated,
                total_checkpoints: file.total_checkpoints,
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping checkpoint file")
            }
        }
    }
    listings.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
    Ok(listings)
}

/// `<mode>_<first 8 hex chars of sha256(prompt)>_<YYYYmmdd_HHMMSS>` using
/// the current local time.
pub fn workflow_id(mode: &str, prompt: &str) -> String {
    workflow_id_at(mode, prompt, Local::now().naive_local())
}

pub fn workflow_id_at(mode: &str, prompt: &str, at: NaiveDateTime) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    let hash: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}_{}_{}", mode, hash, at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup_store() -> (CheckpointStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open("wf_test", dir.path()).unwrap();
        (store, dir)
    }

    fn complete(store: &mut CheckpointStore, step: &str) {
        store
            .create_checkpoint(
                step,
                step,
                CheckpointStatus::Completed,
                json!({"content": format!("{step} output"), "provider": "claude"}),
                None,
                1.5,
            )
            .unwrap();
    }

    #[test]
    fn test_fresh_store_resumes_at_planning() {
        let (store, _dir) = setup_store();
        assert!(!store.can_resume());
        assert_eq!(store.get_resume_point(), Some("planning"));
        assert!(store.get_completed_steps().is_empty());
    }

    #[test]
    fn test_resume_point_after_two_steps() {
        let (mut store, _dir) = setup_store();
        complete(&mut store, "planning");
        complete(&mut store, "coding");
        assert_eq!(store.get_resume_point(), Some("testing"));
        assert!(store.should_skip_step("coding"));
        assert!(!store.should_skip_step("testing"));
    }

    #[test]
    fn test_resume_point_none_when_all_completed() {
        let (mut store, _dir) = setup_store();
        for step in WORKFLOW_STEPS {
            complete(&mut store, step);
        }
        assert_eq!(store.get_resume_point(), None);
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let before = {
            let mut store = CheckpointStore::open("wf_reload", dir.path()).unwrap();
            store.set_prompt("build a cli").unwrap();
            complete(&mut store, "planning");
            store
                .create_checkpoint(
                    "testing",
                    "Testing",
                    CheckpointStatus::Failed,
                    json!({}),
                    Some("All providers failed".into()),
                    0.2,
                )
                .unwrap();
            store.records().to_vec()
        };
        let store = CheckpointStore::open("wf_reload", dir.path()).unwrap();
        assert_eq!(store.records(), before.as_slice());
        assert_eq!(store.records().len(), 2);
        assert_eq!(store.prompt(), Some("build a cli"));
        assert_eq!(store.get_completed_steps(), vec!["planning"]);
        assert_eq!(
            store.get_checkpoint("testing").unwrap().error.as_deref(),
            Some("All providers failed")
        );
        assert_eq!(
            store.get_step_data("planning").unwrap()["content"],
            "planning output"
        );
    }

    #[test]
    fn test_file_layout() {
        let (mut store, _dir) = setup_store();
        complete(&mut store, "planning");
        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["workflow_id"], "wf_test");
        assert_eq!(value["total_checkpoints"], 1);
        assert_eq!(value["checkpoints"][0]["status"], "completed");
        assert_eq!(value["checkpoints"][0]["duration"], 1.5);
        assert!(value["last_updated"].is_string());
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_yields_empty_store() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("checkpoint_bad.json"), "{not json").unwrap();
        let store = CheckpointStore::open("bad", dir.path()).unwrap();
        assert!(store.records().is_empty());
    }

    #[test]
    fn test_lookup_returns_most_recent_record() {
        let (mut store, _dir) = setup_store();
        store
            .create_checkpoint(
                "coding",
                "Coding",
                CheckpointStatus::InProgress,
                json!({}),
                None,
                0.0,
            )
            .unwrap();
        complete(&mut store, "coding");
        assert_eq!(
            store.get_checkpoint("coding").unwrap().status,
            CheckpointStatus::Completed
        );
    }

    #[test]
    fn test_mark_failed_and_completed() {
        let (mut store, _dir) = setup_store();
        store
            .create_checkpoint(
                "coding",
                "Coding",
                CheckpointStatus::InProgress,
                json!({}),
                None,
                0.0,
            )
            .unwrap();
        store.mark_failed("coding", "timeout").unwrap();
        assert_eq!(
            store.get_checkpoint("coding").unwrap().status,
            CheckpointStatus::Failed
        );
        store.mark_completed("coding").unwrap();
        assert!(store.should_skip_step("coding"));

        let err = store.mark_completed("ghost").unwrap_err();
        assert!(matches!(err, CheckpointError::UnknownStep { .. }));
    }

    #[test]
    fn test_clear_removes_file() {
        let (mut store, _dir) = setup_store();
        complete(&mut store, "planning");
        assert!(store.path().exists());
        store.clear_checkpoints().unwrap();
        assert!(!store.path().exists());
        assert!(store.records().is_empty());
    }

    #[test]
    fn test_clear_forgets_prompt() {
        let (mut store, dir) = setup_store();
        store.set_prompt("build a cli").unwrap();
        complete(&mut store, "planning");
        store.clear_checkpoints().unwrap();
        assert_eq!(store.prompt(), None);

        complete(&mut store, "planning");
        let reopened = CheckpointStore::open("wf_test", dir.path()).unwrap();
        assert_eq!(reopened.prompt(), None);
    }

    #[test]
    fn test_later_failure_keeps_step_completed() {
        let (mut store, _dir) = setup_store();
        complete(&mut store, "planning");
        store
            .create_checkpoint(
                "planning",
                "Planning",
                CheckpointStatus::Failed,
                json!({}),
                Some("rate limited".into()),
                0.4,
            )
            .unwrap();
        assert_eq!(store.get_completed_steps(), vec!["planning"]);
        assert!(store.should_skip_step("planning"));
        assert_eq!(store.get_resume_point(), Some("coding"));
        assert_eq!(
            store.get_completed_checkpoint("planning").unwrap().data["content"],
            "planning output"
        );
    }

    #[test]
    fn test_mark_failed_uncompletes_step() {
        let (mut store, _dir) = setup_store();
        complete(&mut store, "planning");
        store.mark_failed("planning", "bad output").unwrap();
        assert!(!store.should_skip_step("planning"));
        assert_eq!(store.get_resume_point(), Some("planning"));
    }

    #[test]
    fn test_summary_counts() {
        let (mut store, _dir) = setup_store();
        complete(&mut store, "planning");
        store
            .create_checkpoint(
                "coding",
                "Coding",
                CheckpointStatus::Failed,
                json!({}),
                Some("x".into()),
                0.0,
            )
            .unwrap();
        let summary = store.summary();
        assert_eq!(summary.total_checkpoints, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.in_progress, 0);
        assert!(summary.can_resume);
        assert_eq!(summary.resume_point.as_deref(), Some("coding"));
        assert_eq!(summary.last_checkpoint.unwrap().step_id, "coding");
    }

    #[test]
    fn test_export_to_file() {
        let (mut store, dir) = setup_store();
        complete(&mut store, "planning");
        let out = dir.path().join("export.json");
        store.export_to_file(&out).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(value["workflow_id"], "wf_test");
        assert!(value["exported_at"].is_string());
        assert_eq!(value["checkpoints"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_list_workflows() {
        let dir = TempDir::new().unwrap();
        let mut a = CheckpointStore::open("wf_a", dir.path()).unwrap();
        complete(&mut a, "planning");
        let mut b = CheckpointStore::open("wf_b", dir.path()).unwrap();
        complete(&mut b, "planning");
        complete(&mut b, "coding");
        fs::write(dir.path().join("checkpoint_junk.json"), "oops").unwrap();
        fs::write(dir.path().join("notes.json"), "{}").unwrap();

        let listings = list_workflows(dir.path()).unwrap();
        let mut ids: Vec<_> = listings.iter().map(|l| l.workflow_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["wf_a", "wf_b"]);
        let b = listings.iter().find(|l| l.workflow_id == "wf_b").unwrap();
        assert_eq!(b.total_checkpoints, 2);
    }

    #[test]
    fn test_list_workflows_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(list_workflows(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_workflow_id_format() {
        let at = chrono::NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(9, 26, 53)
            .unwrap();
        let id = workflow_id_at("workflow", "hello", at);
        // sha256("hello") = 2cf24dba...
        assert_eq!(id, "workflow_2cf24dba_20250314_092653");
    }
}
