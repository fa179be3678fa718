use super::*;
use crate::collaborators::{Archiver, BackupProducer, ProduceRequest};
use crate::error::Error;
use crate::lifecycle::ArtifactState;
use crate::lock::{ExclusiveRegion, LockNamespace, LockStatus, WaitPolicy};
use crate::naming;
use crate::progress::{CollectingObserver, NoOpObserver, Progress, ProgressSink};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Timelike};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Clone, Copy)]
enum Produce {
    Write,
    Fail,
}

struct FakeProducer {
    behavior: Produce,
    calls: AtomicUsize,
    region: ExclusiveRegion,
    lock_seen: Mutex<Option<LockStatus>>,
}

impl FakeProducer {
    fn new(behavior: Produce, region: &ExclusiveRegion) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            region: region.clone(),
            lock_seen: Mutex::new(None),
        }
    }
}

#[async_trait]
impl BackupProducer for FakeProducer {
    fn name(&self) -> &str {
        "fake"
    }

    async fn produce(
        &self,
        request: &ProduceRequest,
        progress: &dyn ProgressSink,
    ) -> anyhow::Result<PathBuf> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.lock_seen.lock().unwrap() = Some(self.region.probe(None)?);

        match self.behavior {
            Produce::Write => {
                progress.emit(Progress::percent(50, "50 percent processed."));
                let path = request.artifact_path();
                std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)?
                    .write_all(format!("backup {}", call).as_bytes())?;
                progress.emit(Progress::percent(100, "100 percent processed."));
                Ok(path)
            }
            Produce::Fail => bail!(
                "cannot find a backup source named [{}]",
                request.target
            ),
        }
    }
}

#[derive(Clone, Copy)]
enum Compress {
    Write,
    Fail,
    /// Compress, then remove the source behind the pipeline's back
    WriteAndRemoveSource,
}

#[derive(Clone, Copy)]
enum Verify {
    Pass,
    Corrupt,
    Error,
}

struct FakeArchiver {
    compress: Compress,
    verify: Verify,
}

#[async_trait]
impl Archiver for FakeArchiver {
    fn name(&self) -> &str {
        "fake-gz"
    }

    async fn compress(
        &self,
        source: &Path,
        progress: &dyn ProgressSink,
    ) -> anyhow::Result<PathBuf> {
        if let Compress::Fail = self.compress {
            // leave a partial archive behind like a real failure would
            std::fs::write(naming::archive_path(source, "gz"), b"partial")?;
            bail!("no space left on device");
        }
        let archive = naming::archive_path(source, "gz");
        std::fs::copy(source, &archive)?;
        progress.emit(Progress::percent(100, "compressed"));
        if let Compress::WriteAndRemoveSource = self.compress {
            std::fs::remove_file(source)?;
        }
        Ok(archive)
    }

    async fn verify(&self, archive: &Path) -> anyhow::Result<bool> {
        match self.verify {
            Verify::Pass => Ok(archive.exists()),
            Verify::Corrupt => Ok(false),
            Verify::Error => Err(anyhow!("unexpected end of file")),
        }
    }
}

struct Harness {
    temp: TempDir,
    region: ExclusiveRegion,
}

impl Harness {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("out")).unwrap();
        let region = ExclusiveRegion::new(LockNamespace::global_in(temp.path().join("locks")));
        Self { temp, region }
    }

    fn output_dir(&self) -> PathBuf {
        self.temp.path().join("out")
    }

    fn orchestrator(
        &self,
        producer: Arc<FakeProducer>,
        compress: Compress,
        verify: Verify,
        max_lock_wait: Option<Duration>,
    ) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            self.region.clone(),
            producer,
            Arc::new(FakeArchiver { compress, verify }),
            PipelineSettings {
                output_dir: self.output_dir(),
                max_lock_wait,
            },
        )
    }

    fn output_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<_> = std::fs::read_dir(self.output_dir())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        files.sort();
        files
    }
}

#[tokio::test]
async fn test_completed_run_deletes_original() {
    let harness = Harness::new();
    let producer = Arc::new(FakeProducer::new(Produce::Write, &harness.region));
    let orchestrator = harness.orchestrator(producer, Compress::Write, Verify::Pass, None);

    let report = orchestrator
        .run(&RunRequest::new("Orders"), &NoOpObserver)
        .await
        .unwrap();

    let artifact = report.artifact_path.clone().unwrap();
    let archive = report.archive_path.clone().unwrap();
    assert_eq!(
        report.outcome,
        RunOutcome::Completed {
            archive_path: archive.clone(),
            deleted_original: true
        }
    );
    assert_eq!(report.stage, Stage::Completed);
    assert!(report.deleted_original());
    assert_eq!(
        report.lifecycle,
        vec![
            ArtifactState::Created,
            ArtifactState::Compressed,
            ArtifactState::Verified,
            ArtifactState::Deleted
        ]
    );

    assert_eq!(artifact.parent(), Some(harness.output_dir().as_path()));
    let name = artifact.file_name().unwrap().to_str().unwrap();
    let stamp = name
        .strip_prefix("Orders_")
        .and_then(|rest| rest.strip_suffix(".bak"))
        .unwrap();
    let produced_at = NaiveDateTime::parse_from_str(stamp, naming::TIMESTAMP_FORMAT).unwrap();
    assert!(produced_at >= report.started_at.naive_local().with_nanosecond(0).unwrap());
    assert_eq!(archive, naming::archive_path(&artifact, "gz"));
    assert!(archive.exists());
    assert!(!artifact.exists());
    assert_eq!(harness.output_files(), vec![archive]);
}

#[tokio::test]
async fn test_lock_held_without_waiting_is_skipped() {
    let harness = Harness::new();
    let _held = harness
        .region
        .acquire(Some("jobA"), WaitPolicy::FailFast)
        .unwrap();

    let producer = Arc::new(FakeProducer::new(Produce::Write, &harness.region));
    let orchestrator =
        harness.orchestrator(Arc::clone(&producer), Compress::Write, Verify::Pass, None);

    let request = RunRequest::new("Orders").with_lock_name("jobA");
    let report = orchestrator.run(&request, &NoOpObserver).await.unwrap();

    assert_eq!(
        report.outcome,
        RunOutcome::LockSkipped {
            lock: "Global\\jobA".to_string()
        }
    );
    assert_eq!(report.stage, Stage::LockSkipped);
    assert_eq!(producer.calls.load(Ordering::SeqCst), 0);
    assert!(report.artifact_path.is_none());
    assert!(harness.output_files().is_empty());
}

#[tokio::test]
async fn test_production_error_releases_lock() {
    let harness = Harness::new();
    let producer = Arc::new(FakeProducer::new(Produce::Fail, &harness.region));
    let orchestrator = harness.orchestrator(producer, Compress::Write, Verify::Pass, None);

    let report = orchestrator
        .run(&RunRequest::new("Missing"), &NoOpObserver)
        .await
        .unwrap();

    match &report.outcome {
        RunOutcome::Failed { kind, message } => {
            assert_eq!(*kind, FailureKind::Production);
            assert!(message.contains("cannot find a backup source named [Missing]"));
        }
        other => panic!("expected production failure, got {:?}", other),
    }
    assert!(report.archive_path.is_none());
    assert!(report.lifecycle.is_empty());
    assert!(harness.output_files().is_empty());

    assert_eq!(harness.region.probe(None).unwrap(), LockStatus::Free);
    assert!(harness.region.acquire(None, WaitPolicy::FailFast).is_ok());
}

#[tokio::test]
async fn test_lock_is_held_only_while_producing() {
    let harness = Harness::new();
    let producer = Arc::new(FakeProducer::new(Produce::Write, &harness.region));
    let orchestrator =
        harness.orchestrator(Arc::clone(&producer), Compress::Write, Verify::Pass, None);

    orchestrator
        .run(&RunRequest::new("Orders"), &NoOpObserver)
        .await
        .unwrap();

    let seen = producer.lock_seen.lock().unwrap().clone();
    assert!(matches!(seen, Some(LockStatus::Held { .. })));
    assert_eq!(harness.region.probe(None).unwrap(), LockStatus::Free);
}

#[tokio::test]
async fn test_compression_error_keeps_artifact() {
    let harness = Harness::new();
    let producer = Arc::new(FakeProducer::new(Produce::Write, &harness.region));
    let orchestrator = harness.orchestrator(producer, Compress::Fail, Verify::Pass, None);

    let report = orchestrator
        .run(&RunRequest::new("Orders"), &NoOpObserver)
        .await
        .unwrap();

    assert_eq!(report.outcome.failure_kind(), Some(FailureKind::Compression));
    assert_eq!(report.stage, Stage::Failed(FailureKind::Compression));
    assert!(report.archive_path.is_none());
    assert!(report.artifact_path.unwrap().exists());
    assert_eq!(
        report.lifecycle,
        vec![ArtifactState::Created, ArtifactState::Abandoned]
    );
}

#[tokio::test]
async fn test_failed_verification_keeps_artifact() {
    for verify in [Verify::Corrupt, Verify::Error] {
        let harness = Harness::new();
        let producer = Arc::new(FakeProducer::new(Produce::Write, &harness.region));
        let orchestrator = harness.orchestrator(producer, Compress::Write, verify, None);

        let report = orchestrator
            .run(&RunRequest::new("Orders"), &NoOpObserver)
            .await
            .unwrap();

        assert_eq!(report.outcome.failure_kind(), Some(FailureKind::Verification));
        assert!(report.artifact_path.as_ref().unwrap().exists());
        assert!(report.archive_path.as_ref().unwrap().exists());
        assert!(!report.deleted_original());
        assert_eq!(
            report.lifecycle,
            vec![
                ArtifactState::Created,
                ArtifactState::Compressed,
                ArtifactState::Abandoned
            ]
        );
    }
}

#[tokio::test]
async fn test_missing_artifact_at_cleanup_still_completes() {
    let harness = Harness::new();
    let producer = Arc::new(FakeProducer::new(Produce::Write, &harness.region));
    let orchestrator =
        harness.orchestrator(producer, Compress::WriteAndRemoveSource, Verify::Pass, None);

    let report = orchestrator
        .run(&RunRequest::new("Orders"), &NoOpObserver)
        .await
        .unwrap();

    assert!(report.outcome.is_completed());
    assert!(!report.deleted_original());
    assert_eq!(report.lifecycle.last(), Some(&ArtifactState::Verified));
}

#[tokio::test]
async fn test_progress_is_relayed_in_order_with_stage() {
    let harness = Harness::new();
    let producer = Arc::new(FakeProducer::new(Produce::Write, &harness.region));
    let orchestrator = harness.orchestrator(producer, Compress::Write, Verify::Pass, None);
    let observer = CollectingObserver::new();

    orchestrator
        .run(&RunRequest::new("Orders"), &observer)
        .await
        .unwrap();

    let seen: Vec<_> = observer
        .events()
        .into_iter()
        .map(|e| (e.stage, e.percent_complete, e.message))
        .collect();
    assert_eq!(
        seen,
        vec![
            (Stage::Producing, Some(50), "50 percent processed.".to_string()),
            (Stage::Producing, Some(100), "100 percent processed.".to_string()),
            (Stage::Compressing, Some(100), "compressed".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_bounded_wait_expiry_is_lock_failure() {
    let harness = Harness::new();
    let _held = harness.region.acquire(None, WaitPolicy::FailFast).unwrap();

    let producer = Arc::new(FakeProducer::new(Produce::Write, &harness.region));
    let orchestrator = harness.orchestrator(
        Arc::clone(&producer),
        Compress::Write,
        Verify::Pass,
        Some(Duration::from_millis(200)),
    );

    let request = RunRequest::new("Orders").wait_for_lock(true);
    let report = orchestrator.run(&request, &NoOpObserver).await.unwrap();

    assert_eq!(report.outcome.failure_kind(), Some(FailureKind::Lock));
    assert_eq!(report.stage, Stage::Failed(FailureKind::Lock));
    assert_eq!(producer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_waiting_run_proceeds_after_release() {
    let harness = Harness::new();
    let held = harness.region.acquire(None, WaitPolicy::FailFast).unwrap();
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        drop(held);
    });

    let producer = Arc::new(FakeProducer::new(Produce::Write, &harness.region));
    let orchestrator = harness.orchestrator(producer, Compress::Write, Verify::Pass, None);

    let request = RunRequest::new("Orders").wait_for_lock(true);
    let report = orchestrator.run(&request, &NoOpObserver).await.unwrap();

    assert!(report.outcome.is_completed());
    releaser.join().unwrap();
}

#[tokio::test]
async fn test_bad_requests_are_errors() {
    let harness = Harness::new();
    let producer = Arc::new(FakeProducer::new(Produce::Write, &harness.region));
    let orchestrator =
        harness.orchestrator(Arc::clone(&producer), Compress::Write, Verify::Pass, None);

    let err = orchestrator
        .run(&RunRequest::new(""), &NoOpObserver)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest { .. }));

    let err = orchestrator
        .run(&RunRequest::new("Orders").with_lock_name("***"), &NoOpObserver)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidLockName { .. }));
    assert_eq!(producer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_same_second_runs_keep_separate_files() {
    let harness = Harness::new();
    let held = harness.region.acquire(None, WaitPolicy::FailFast).unwrap();
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        drop(held);
    });

    let producer = Arc::new(FakeProducer::new(Produce::Write, &harness.region));
    let orchestrator = harness.orchestrator(producer, Compress::Write, Verify::Pass, None);
    let request = RunRequest::new("Orders").wait_for_lock(true);

    let (first, second) = tokio::join!(
        orchestrator.run(&request, &NoOpObserver),
        orchestrator.run(&request, &NoOpObserver)
    );
    releaser.join().unwrap();
    let (first, second) = (first.unwrap(), second.unwrap());

    assert!(first.outcome.is_completed(), "{:?}", first.outcome);
    assert!(second.outcome.is_completed(), "{:?}", second.outcome);
    assert!(first.deleted_original() && second.deleted_original());
    assert_ne!(first.artifact_path, second.artifact_path);
    assert_ne!(first.archive_path, second.archive_path);

    let archives = harness.output_files();
    assert_eq!(archives.len(), 2);
    let mut contents: Vec<_> = archives
        .iter()
        .map(|path| std::fs::read_to_string(path).unwrap())
        .collect();
    contents.sort();
    assert_eq!(contents, vec!["backup 0", "backup 1"]);
}

#[tokio::test]
async fn test_leftover_files_from_this_second_are_not_reused() {
    let harness = Harness::new();
    let producer = Arc::new(FakeProducer::new(Produce::Write, &harness.region));
    let orchestrator = harness.orchestrator(producer, Compress::Write, Verify::Pass, None);

    let first = orchestrator
        .run(&RunRequest::new("Orders"), &NoOpObserver)
        .await
        .unwrap();
    // a failed run from the same second left its artifact behind
    let first_archive = first.archive_path.clone().unwrap();
    let leftover = first.artifact_path.clone().unwrap();
    std::fs::write(&leftover, b"kept for inspection").unwrap();

    let second = orchestrator
        .run(&RunRequest::new("Orders"), &NoOpObserver)
        .await
        .unwrap();

    assert!(second.outcome.is_completed());
    assert_ne!(second.artifact_path.as_ref(), Some(&leftover));
    assert_eq!(std::fs::read(&leftover).unwrap(), b"kept for inspection");
    assert_eq!(std::fs::read_to_string(&first_archive).unwrap(), "backup 0");
}
