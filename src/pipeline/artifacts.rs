use std::fs;
use std::path::{Path, PathBuf};

use crate::observer::{Event, Observer};

/// Writes stage outputs into the workflow output directory, if one is set.
/// Write failures are reported to the observer and otherwise ignored.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSink {
    dir: Option<PathBuf>,
}

impl ArtifactSink {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Returns whether the file was written.
    pub fn write(&self, name: &str, content: &str, observer: &dyn Observer) -> bool {
        let Some(dir) = &self.dir else {
            return false;
        };
        let path = dir.join(name);
        match fs::write(&path, content) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "artifact written");
                true
            }
            Err(e) => {
                observer.notify(&Event::ArtifactWriteFailed {
                    name,
                    error: &e.to_string(),
                });
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::observer::recording::RecordingObserver;
    use tempfile::TempDir;

    #[test]
    fn test_disabled_sink_writes_nothing() {
        assert!(!ArtifactSink::default().write("1_plan.txt", "x", &NoopObserver));
    }

    #[test]
    fn test_writes_into_dir() {
        let dir = TempDir::new().unwrap();
        let sink = ArtifactSink::new(Some(dir.path().to_path_buf()));
        assert!(sink.write("1_plan.txt", "the plan", &NoopObserver));
        assert_eq!(
            fs::read_to_string(dir.path().join("1_plan.txt")).unwrap(),
            "the plan"
        );
    }

    #[test]
    fn test_failure_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let sink = ArtifactSink::new(Some(dir.path().join("missing")));
        let obs = RecordingObserver::default();
        assert!(!sink.write("1_plan.txt", "x", &obs));
        assert_eq!(obs.count_matching("ArtifactWriteFailed"), 1);
    }
}
