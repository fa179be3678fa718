//! Producer that runs an external dump tool

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use dbzip_core::progress::{Progress, ProgressSink};
use dbzip_core::{BackupProducer, ProduceRequest};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Matches progress lines such as "40 percent processed." or "40%"
static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})\s*(?:%|percent\b)").expect("percent regex is valid")
});

/// Runs `program args..` to write the artifact.
///
/// Arguments may contain `{target}`, `{output}`, `{kind}` and `{expires}`,
/// replaced per run with the target, the artifact path, `full`/`log` and the
/// RFC 3339 expiry (empty when unset).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandProducer {
    program: String,
    args: Vec<String>,
}

impl CommandProducer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments for one run with every placeholder filled in
    pub fn render_args(&self, request: &ProduceRequest, output: &Path) -> Vec<String> {
        let output = output.display().to_string();
        let expires = request
            .options
            .expires_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_default();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{target}", &request.target)
                    .replace("{output}", &output)
                    .replace("{kind}", request.options.kind.as_str())
                    .replace("{expires}", &expires)
            })
            .collect()
    }

    fn resolve_program(&self) -> Result<PathBuf> {
        if self.program.trim().is_empty() {
            bail!("No backup command configured");
        }
        which::which(&self.program)
            .map_err(|_| anyhow!("Backup command '{}' not found on PATH", self.program))
    }
}

#[async_trait]
impl BackupProducer for CommandProducer {
    fn name(&self) -> &str {
        &self.program
    }

    async fn produce(&self, request: &ProduceRequest, progress: &dyn ProgressSink) -> Result<PathBuf> {
        if request.target.trim().is_empty() {
            bail!("Backup target must not be empty");
        }
        let program = self.resolve_program()?;
        let output = request.artifact_path();
        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .with_context(|| format!("Failed to create output directory {}", request.output_dir.display()))?;

        if tokio::fs::try_exists(&output).await.unwrap_or(true) {
            bail!("Artifact {} already exists", output.display());
        }

        let args = self.render_args(request, &output);
        debug!(program = %program.display(), ?args, "running backup command");

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn backup command {}", self.program))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, tx.clone());
        }
        drop(tx);

        let relay = async {
            while let Some(line) = rx.recv().await {
                info!("{}: {}", self.program, line);
                progress.emit(parse_progress(&line));
            }
            child.wait().await
        };

        let status = match request.options.operation_timeout {
            Some(limit) => {
                let timed = tokio::time::timeout(limit, relay).await;
                match timed {
                    Ok(status) => status,
                    Err(_) => {
                        if let Err(e) = child.kill().await {
                            warn!("Failed to kill timed out backup command: {}", e);
                        }
                        bail!(
                            "Backup command {} timed out after {:?}",
                            self.program,
                            limit
                        );
                    }
                }
            }
            None => relay.await,
        }
        .with_context(|| format!("Failed to wait for backup command {}", self.program))?;

        if !status.success() {
            bail!("Backup command {} failed with {}", self.program, status);
        }
        if tokio::fs::metadata(&output).await.is_err() {
            bail!(
                "Backup command {} exited successfully but did not create {}",
                self.program,
                output.display()
            );
        }
        Ok(output)
    }
}

fn spawn_line_reader<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if !line.is_empty() && tx.send(line).is_err() {
                break;
            }
        }
    });
}

/// Turn one line of tool output into progress, picking up a percentage if present
pub fn parse_progress(line: &str) -> Progress {
    let percent = PERCENT_RE
        .captures(line)
        .and_then(|caps| caps[1].parse::<u16>().ok())
        .filter(|p| *p <= 100);

    match percent {
        Some(p) => Progress::percent(p as u8, line),
        None => Progress::message(line),
    }
}
