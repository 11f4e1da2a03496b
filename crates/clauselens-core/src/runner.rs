//! Analysis stage runner
//!
//! Drives a document through the fixed stage sequence
//! `extracting (25) → classifying (50) → analyzing (75) → complete (100)`,
//! one detached task per document, fully decoupled from the upload request
//! that started it. Each stage boundary re-reads the record before
//! writing: a concurrently deleted document makes the step a silent no-op.
//! A persistence failure stops the sequence and best-effort writes a
//! terminal `error` status rather than leaving the record silently stuck.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::analyzer::AnalysisProducer;
use crate::config::RunnerConfig;
use crate::store::{AnalysisStore, DocumentStore, ProfileStore};
use crate::types::AnalysisStatus;

/// The fixed stage table: status label and the progress it publishes.
pub const STAGES: &[(AnalysisStatus, i32)] = &[
    (AnalysisStatus::Extracting, 25),
    (AnalysisStatus::Classifying, 50),
    (AnalysisStatus::Analyzing, 75),
    (AnalysisStatus::Complete, 100),
];

/// Result of one stage step.
#[derive(Debug, PartialEq, Eq)]
enum StepOutcome {
    /// Record found; status and progress persisted.
    Applied,
    /// Record concurrently deleted; nothing written.
    Skipped,
}

/// Runs the staged pseudo-analysis for uploaded documents.
#[derive(Clone)]
pub struct StageRunner {
    documents: DocumentStore,
    analyses: AnalysisStore,
    profiles: ProfileStore,
    producer: Arc<dyn AnalysisProducer>,
    config: RunnerConfig,
}

impl StageRunner {
    pub fn new(
        documents: DocumentStore,
        analyses: AnalysisStore,
        profiles: ProfileStore,
        producer: Arc<dyn AnalysisProducer>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            documents,
            analyses,
            profiles,
            producer,
            config,
        }
    }

    /// Start the stage sequence for one document on a detached task.
    ///
    /// Returns immediately; the upload response never waits on analysis.
    /// Runners for different documents proceed concurrently with no
    /// ordering between them.
    pub fn spawn(&self, document_id: String, owner_id: String) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move {
            runner.run(&document_id, &owner_id).await;
        })
    }

    async fn run(&self, document_id: &str, owner_id: &str) {
        tokio::time::sleep(self.config.start_delay).await;

        for &(status, progress) in STAGES {
            tokio::time::sleep(self.config.step_delay).await;

            match self.apply_stage(document_id, owner_id, status, progress).await {
                Ok(StepOutcome::Applied) => {
                    debug!(document_id, %status, progress, "analysis stage applied");
                }
                Ok(StepOutcome::Skipped) => {
                    debug!(document_id, %status, "document gone, stage skipped");
                }
                Err(e) => {
                    error!(document_id, %status, "analysis stage failed: {e}");
                    self.mark_errored(document_id, owner_id).await;
                    return;
                }
            }
        }

        info!(document_id, owner_id, "analysis complete");
    }

    /// One stage step: re-read, overwrite status/progress, persist. At the
    /// terminal stage the analysis record is stored *before* the status
    /// flips to `complete`, so a poller can never observe `complete`
    /// without an analysis.
    async fn apply_stage(
        &self,
        document_id: &str,
        owner_id: &str,
        status: AnalysisStatus,
        progress: i32,
    ) -> anyhow::Result<StepOutcome> {
        let Some(mut document) = self.documents.get(owner_id, document_id).await? else {
            return Ok(StepOutcome::Skipped);
        };

        if status == AnalysisStatus::Complete {
            let analysis = self.producer.produce(&document).await?;
            self.analyses.put(owner_id, &analysis).await?;
        }

        document.analysis_status = status;
        // Progress is non-decreasing by contract
        document.analysis_progress = progress.max(document.analysis_progress);
        self.documents.update(&document).await?;

        if status == AnalysisStatus::Complete {
            match self.profiles.increment_analyzed(owner_id).await {
                Ok(true) => {}
                Ok(false) => debug!(owner_id, "no profile, analyzed counter skipped"),
                // Document is already terminal; an error status here would
                // contradict the stored analysis.
                Err(e) => error!(owner_id, "analyzed counter update failed: {e}"),
            }
        }

        Ok(StepOutcome::Applied)
    }

    /// Best-effort terminal `error` status. Progress keeps its last
    /// successfully published value.
    async fn mark_errored(&self, document_id: &str, owner_id: &str) {
        match self.documents.get(owner_id, document_id).await {
            Ok(Some(mut document)) => {
                document.analysis_status = AnalysisStatus::Error;
                if let Err(e) = self.documents.update(&document).await {
                    error!(document_id, "failed to record error status: {e}");
                }
            }
            Ok(None) => {}
            Err(e) => error!(document_id, "failed to record error status: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::CannedAnalyzer;
    use crate::kv::{KvError, KvStore, MemoryKv};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::time::Duration;

    fn test_config() -> RunnerConfig {
        RunnerConfig {
            start_delay: Duration::from_millis(1),
            step_delay: Duration::from_millis(1),
        }
    }

    struct Harness {
        documents: DocumentStore,
        analyses: AnalysisStore,
        profiles: ProfileStore,
        runner: StageRunner,
    }

    fn harness_with(kv: Arc<dyn KvStore>) -> Harness {
        let documents = DocumentStore::new(Arc::clone(&kv));
        let analyses = AnalysisStore::new(Arc::clone(&kv));
        let profiles = ProfileStore::new(Arc::clone(&kv));
        let runner = StageRunner::new(
            documents.clone(),
            analyses.clone(),
            profiles.clone(),
            Arc::new(CannedAnalyzer),
            test_config(),
        );
        Harness {
            documents,
            analyses,
            profiles,
            runner,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn full_sequence_reaches_complete() {
        let h = harness();
        h.profiles.create("user-a", "Ada", "ada@example.com").await.unwrap();
        let doc = h
            .documents
            .create("user-a", "contract.pdf", "user-a/x/contract.pdf", "application/pdf", 100)
            .await
            .unwrap();

        h.runner.spawn(doc.id.clone(), "user-a".into()).await.unwrap();

        let done = h.documents.get("user-a", &doc.id).await.unwrap().unwrap();
        assert_eq!(done.analysis_status, AnalysisStatus::Complete);
        assert_eq!(done.analysis_progress, 100);

        let analysis = h.analyses.get("user-a", &doc.id).await.unwrap().unwrap();
        assert_eq!(analysis.clauses.len(), 3);
        assert_eq!(analysis.overall_risk_score, 4.3);
        assert_eq!(analysis.compliance_score, 78);

        let profile = h.profiles.get("user-a").await.unwrap().unwrap();
        assert_eq!(profile.documents_analyzed, 1);
    }

    #[tokio::test]
    async fn counter_increments_once_per_completion() {
        let h = harness();
        h.profiles.create("user-a", "Ada", "ada@example.com").await.unwrap();

        for _ in 0..3 {
            let doc = h
                .documents
                .create("user-a", "c.pdf", "user-a/x/c.pdf", "application/pdf", 1)
                .await
                .unwrap();
            h.runner.spawn(doc.id, "user-a".into()).await.unwrap();
        }

        let profile = h.profiles.get("user-a").await.unwrap().unwrap();
        assert_eq!(profile.documents_analyzed, 3);
    }

    #[tokio::test]
    async fn deleted_document_is_silently_skipped() {
        let h = harness();
        h.profiles.create("user-a", "Ada", "ada@example.com").await.unwrap();
        let doc = h
            .documents
            .create("user-a", "c.pdf", "user-a/x/c.pdf", "application/pdf", 1)
            .await
            .unwrap();
        h.documents.delete("user-a", &doc.id).await.unwrap();

        h.runner.spawn(doc.id.clone(), "user-a".into()).await.unwrap();

        assert!(h.documents.get("user-a", &doc.id).await.unwrap().is_none());
        assert!(h.analyses.get("user-a", &doc.id).await.unwrap().is_none());
        let profile = h.profiles.get("user-a").await.unwrap().unwrap();
        assert_eq!(profile.documents_analyzed, 0);
    }

    #[tokio::test]
    async fn missing_profile_does_not_block_completion() {
        let h = harness();
        let doc = h
            .documents
            .create("user-a", "c.pdf", "user-a/x/c.pdf", "application/pdf", 1)
            .await
            .unwrap();

        h.runner.spawn(doc.id.clone(), "user-a".into()).await.unwrap();

        let done = h.documents.get("user-a", &doc.id).await.unwrap().unwrap();
        assert_eq!(done.analysis_status, AnalysisStatus::Complete);
        assert!(h.analyses.get("user-a", &doc.id).await.unwrap().is_some());
        assert!(h.profiles.get("user-a").await.unwrap().is_none());
    }

    // ── Ordering: progress is non-decreasing, analysis precedes complete ──

    /// Records every write so tests can assert over the observable
    /// sequence of stage updates.
    struct RecordingKv {
        inner: MemoryKv,
        log: Mutex<Vec<(String, Value)>>,
    }

    impl RecordingKv {
        fn new() -> Self {
            Self {
                inner: MemoryKv::new(),
                log: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl KvStore for RecordingKv {
        async fn get(&self, ns: &str, key: &str) -> Result<Option<Value>, KvError> {
            self.inner.get(ns, key).await
        }
        async fn set(&self, ns: &str, key: &str, value: Value) -> Result<(), KvError> {
            self.log
                .lock()
                .unwrap()
                .push((ns.to_string(), value.clone()));
            self.inner.set(ns, key, value).await
        }
        async fn delete(&self, ns: &str, key: &str) -> Result<(), KvError> {
            self.inner.delete(ns, key).await
        }
        async fn scan(&self, ns: &str, prefix: &str) -> Result<Vec<(String, Value)>, KvError> {
            self.inner.scan(ns, prefix).await
        }
        async fn modify(
            &self,
            ns: &str,
            key: &str,
            f: &(dyn Fn(Option<Value>) -> Option<Value> + Send + Sync),
        ) -> Result<Option<Value>, KvError> {
            let stored = self.inner.modify(ns, key, f).await?;
            if let Some(value) = &stored {
                self.log
                    .lock()
                    .unwrap()
                    .push((ns.to_string(), value.clone()));
            }
            Ok(stored)
        }
    }

    #[tokio::test]
    async fn stages_publish_exact_progression_in_order() {
        let kv = Arc::new(RecordingKv::new());
        let h = harness_with(Arc::<RecordingKv>::clone(&kv) as Arc<dyn KvStore>);
        let doc = h
            .documents
            .create("user-a", "c.pdf", "user-a/x/c.pdf", "application/pdf", 1)
            .await
            .unwrap();

        h.runner.spawn(doc.id.clone(), "user-a".into()).await.unwrap();

        let log = kv.log.lock().unwrap();
        let progressions: Vec<(String, i64)> = log
            .iter()
            .filter(|(ns, _)| ns == "documents")
            .map(|(_, v)| {
                (
                    v["analysis_status"].as_str().unwrap().to_string(),
                    v["analysis_progress"].as_i64().unwrap(),
                )
            })
            .collect();

        let expected: Vec<(String, i64)> = [
            ("pending", 0),
            ("extracting", 25),
            ("classifying", 50),
            ("analyzing", 75),
            ("complete", 100),
        ]
        .iter()
        .map(|(s, p)| (s.to_string(), *p))
        .collect();
        assert_eq!(progressions, expected);

        // The analysis write lands before the status flips to complete
        let analysis_pos = log.iter().position(|(ns, _)| ns == "analyses").unwrap();
        let complete_pos = log
            .iter()
            .position(|(ns, v)| ns == "documents" && v["analysis_status"] == "complete")
            .unwrap();
        assert!(analysis_pos < complete_pos);
    }

    // ── Failure: persistence errors end in a terminal `error` status ──

    /// Fails every write to one namespace.
    struct FailingKv {
        inner: MemoryKv,
        fail_ns: &'static str,
    }

    #[async_trait]
    impl KvStore for FailingKv {
        async fn get(&self, ns: &str, key: &str) -> Result<Option<Value>, KvError> {
            self.inner.get(ns, key).await
        }
        async fn set(&self, ns: &str, key: &str, value: Value) -> Result<(), KvError> {
            if ns == self.fail_ns {
                return Err(KvError::Backend(sqlx::Error::PoolClosed));
            }
            self.inner.set(ns, key, value).await
        }
        async fn delete(&self, ns: &str, key: &str) -> Result<(), KvError> {
            self.inner.delete(ns, key).await
        }
        async fn scan(&self, ns: &str, prefix: &str) -> Result<Vec<(String, Value)>, KvError> {
            self.inner.scan(ns, prefix).await
        }
        async fn modify(
            &self,
            ns: &str,
            key: &str,
            f: &(dyn Fn(Option<Value>) -> Option<Value> + Send + Sync),
        ) -> Result<Option<Value>, KvError> {
            if ns == self.fail_ns {
                return Err(KvError::Backend(sqlx::Error::PoolClosed));
            }
            self.inner.modify(ns, key, f).await
        }
    }

    #[tokio::test]
    async fn persistence_failure_writes_terminal_error_status() {
        let kv = Arc::new(FailingKv {
            inner: MemoryKv::new(),
            fail_ns: "analyses",
        });
        let h = harness_with(kv as Arc<dyn KvStore>);
        h.profiles.create("user-a", "Ada", "ada@example.com").await.unwrap();
        let doc = h
            .documents
            .create("user-a", "c.pdf", "user-a/x/c.pdf", "application/pdf", 1)
            .await
            .unwrap();

        h.runner.spawn(doc.id.clone(), "user-a".into()).await.unwrap();

        let stuck = h.documents.get("user-a", &doc.id).await.unwrap().unwrap();
        assert_eq!(stuck.analysis_status, AnalysisStatus::Error);
        // Progress keeps the last successfully published value
        assert_eq!(stuck.analysis_progress, 75);
        assert!(h.analyses.get("user-a", &doc.id).await.unwrap().is_none());
        let profile = h.profiles.get("user-a").await.unwrap().unwrap();
        assert_eq!(profile.documents_analyzed, 0);
    }
}
