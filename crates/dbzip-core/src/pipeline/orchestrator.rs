//! Drives one backup run through the pipeline

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, error, info, warn};

use super::request::{RunOutcome, RunReport, RunRequest};
use super::run::PipelineRun;
use super::stage::{FailureKind, Stage};
use crate::collaborators::{Archiver, BackupProducer, ProduceRequest};
use crate::error::Result;
use crate::lifecycle::ArtifactRecord;
use crate::lock::{ExclusiveRegion, WaitPolicy};
use crate::naming;
use crate::progress::{ProgressObserver, StageRelay};

/// Settings that apply to every run of an orchestrator
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Directory the producer writes artifacts into
    pub output_dir: PathBuf,

    /// Upper bound on waiting for the lock when a request asks to wait; `None` waits forever
    pub max_lock_wait: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            max_lock_wait: None,
        }
    }
}

/// Sequences lock, production, compression, verification and cleanup
pub struct PipelineOrchestrator {
    region: ExclusiveRegion,
    producer: Arc<dyn BackupProducer>,
    archiver: Arc<dyn Archiver>,
    settings: PipelineSettings,
}

impl PipelineOrchestrator {
    pub fn new(
        region: ExclusiveRegion,
        producer: Arc<dyn BackupProducer>,
        archiver: Arc<dyn Archiver>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            region,
            producer,
            archiver,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Execute one run.
    ///
    /// Stage failures and lock contention come back as a [`RunReport`] with the
    /// matching [`RunOutcome`]. `Err` is reserved for bad requests and for
    /// internal bookkeeping defects.
    pub async fn run(
        &self,
        request: &RunRequest,
        observer: &dyn ProgressObserver,
    ) -> Result<RunReport> {
        request.validate()?;
        let lock_name = self.region.namespace().name(request.lock_name.as_deref())?;

        let mut run = PipelineRun::new(request.target.trim());
        run.advance(Stage::AcquiringLock)?;

        let policy = WaitPolicy::for_wait(request.wait_for_lock, self.settings.max_lock_wait);
        debug!(lock = %lock_name, policy = %policy, "Acquiring lock");

        let mut lock = match self
            .region
            .acquire_async(Some(lock_name.id().to_string()), policy)
            .await
        {
            Ok(handle) => handle,
            Err(e) if e.is_lock_contention() && policy.is_fail_fast() => {
                info!(lock = %lock_name, "A backup is already in progress, skipping: {}", e);
                run.advance(Stage::LockSkipped)?;
                return Ok(run.finish(
                    RunOutcome::LockSkipped {
                        lock: lock_name.to_string(),
                    },
                    None,
                ));
            }
            Err(e) => {
                error!(lock = %lock_name, "{}", e);
                return fail(run, None, FailureKind::Lock, e.to_string());
            }
        };

        run.advance(Stage::Producing)?;
        let timer = Instant::now();
        let produced = match self.produce_request(&run, request) {
            Ok(produce_request) => {
                info!("Backing up: [{}] with {}", run.target(), self.producer.name());
                self.producer
                    .produce(&produce_request, &StageRelay::new(Stage::Producing, observer))
                    .await
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to pick an artifact name")),
        };

        // The contended resource is no longer touched past this point
        if let Err(e) = lock.release() {
            warn!(lock = %lock_name, "Failed to release lock: {}", e);
        }
        drop(lock);

        let artifact = match produced {
            Ok(path) => path,
            Err(e) => {
                error!("Backup of [{}] failed: {:#}", run.target(), e);
                return fail(run, None, FailureKind::Production, format!("{:#}", e));
            }
        };
        info!("Backed up in {} ms", timer.elapsed().as_millis());

        run.set_artifact(artifact.clone());
        let mut record = ArtifactRecord::created(&artifact);
        run.advance(Stage::Compressing)?;

        info!("Compressing: [{}] with {}", artifact.display(), self.archiver.name());
        let timer = Instant::now();
        let compressed = self
            .archiver
            .compress(&artifact, &StageRelay::new(Stage::Compressing, observer))
            .await;
        let archive = match compressed {
            Ok(path) => path,
            Err(e) => {
                error!("Compression of [{}] failed: {:#}", artifact.display(), e);
                return fail(
                    run,
                    Some(&mut record),
                    FailureKind::Compression,
                    format!("{:#}", e),
                );
            }
        };
        info!("Compressed in {} ms", timer.elapsed().as_millis());

        record.mark_compressed()?;
        run.set_archive(archive.clone())?;
        run.advance(Stage::Verifying)?;

        info!("Verifying: [{}]", archive.display());
        let timer = Instant::now();
        let failure = match self.archiver.verify(&archive).await {
            Ok(true) => None,
            Ok(false) => Some(format!("archive {} failed verification", archive.display())),
            Err(e) => Some(format!("{:#}", e)),
        };
        if let Some(message) = failure {
            error!(
                "Verification failed in {} ms: {}",
                timer.elapsed().as_millis(),
                message
            );
            return fail(
                run,
                Some(&mut record),
                FailureKind::Verification,
                message,
            );
        }
        info!("Verification passed in {} ms", timer.elapsed().as_millis());
        record.mark_verified()?;

        run.advance(Stage::CleaningUp)?;
        let deleted_original = delete_artifact(&mut record).await?;

        run.advance(Stage::Completed)?;
        info!("Completed: [{}]", archive.display());
        Ok(run.finish(
            RunOutcome::Completed {
                archive_path: archive,
                deleted_original,
            },
            Some(&record),
        ))
    }
}

impl PipelineOrchestrator {
    /// Stamp the production request once the lock is held. Earlier runs of the
    /// same target may still own artifacts or archives stamped in this second,
    /// so the first sequence none of them uses is taken.
    fn produce_request(
        &self,
        run: &PipelineRun,
        request: &RunRequest,
    ) -> std::io::Result<ProduceRequest> {
        let started_at = Local::now();
        let sequence = naming::next_free_sequence(
            &self.settings.output_dir,
            run.target(),
            &started_at,
            request.options.kind.extension(),
        )?;
        Ok(ProduceRequest {
            target: run.target().to_string(),
            options: request.options.clone(),
            output_dir: self.settings.output_dir.clone(),
            started_at,
            sequence,
        })
    }
}

/// Move the run into `Failed(kind)`, abandoning the artifact if one exists.
/// Files stay on disk.
fn fail(
    mut run: PipelineRun,
    mut record: Option<&mut ArtifactRecord>,
    kind: FailureKind,
    message: String,
) -> Result<RunReport> {
    run.advance(Stage::Failed(kind))?;
    if let Some(record) = record.as_mut() {
        record.mark_abandoned()?;
        warn!(
            "Leaving [{}] in place for inspection",
            record.path().display()
        );
    }
    Ok(run.finish(
        RunOutcome::Failed { kind, message },
        record.as_deref(),
    ))
}

/// Best-effort removal of a verified artifact. Returns whether this call deleted it.
async fn delete_artifact(record: &mut ArtifactRecord) -> Result<bool> {
    let path = record.path().to_path_buf();
    info!("Deleting: [{}]", path.display());

    match tokio::fs::remove_file(&path).await {
        Ok(()) => {
            record.mark_deleted()?;
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("[{}] is already gone", path.display());
            Ok(false)
        }
        Err(e) => {
            warn!("Could not delete [{}]: {}", path.display(), e);
            Ok(false)
        }
    }
}
