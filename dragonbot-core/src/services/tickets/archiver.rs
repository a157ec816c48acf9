// File: dragonbot-core/src/services/tickets/archiver.rs
//
// Transcript export. The exporter is a blocking child process, so every export runs on
// tokio's blocking pool inside its own scratch directory.

use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use twilight_model::id::marker::ChannelMarker;
use twilight_model::id::Id;

use dragonbot_common::error::ArchiveError;

const TRANSCRIPT_FORMAT: &str = "HtmlDark";
const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(600);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Writes the history of one channel to `output`.
#[cfg_attr(test, mockall::automock)]
pub trait TranscriptExporter: Send + Sync {
    fn export(&self, channel_id: Id<ChannelMarker>, output: &Path) -> Result<(), ArchiveError>;
}

/// Runs `<program> [leading args] export -t <token> -c <channel> -f HtmlDark -o <file>`.
pub struct CommandExporter {
    program: PathBuf,
    leading_args: Vec<String>,
    token: String,
    timeout: Duration,
}

impl CommandExporter {
    pub fn new(program: impl Into<PathBuf>, token: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            token: token.into(),
            timeout: DEFAULT_EXPORT_TIMEOUT,
        }
    }

    /// A run that takes longer than `timeout` is killed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments placed before `export`, e.g. the assembly path when `program` is `dotnet`.
    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }
}

impl TranscriptExporter for CommandExporter {
    fn export(&self, channel_id: Id<ChannelMarker>, output: &Path) -> Result<(), ArchiveError> {
        // stderr is captured next to the output file
        let log_path = output.with_extension("log");
        let log = File::create(&log_path).map_err(ArchiveError::Output)?;

        let spawned = Command::new(&self.program)
            .args(&self.leading_args)
            .arg("export")
            .arg("-t")
            .arg(&self.token)
            .arg("-c")
            .arg(channel_id.to_string())
            .arg("-f")
            .arg(TRANSCRIPT_FORMAT)
            .arg("-o")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ArchiveError::ExporterMissing(self.program.display().to_string()));
            }
            Err(e) => return Err(ArchiveError::Output(e)),
        };

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait().map_err(ArchiveError::Output)? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    warn!(%channel_id, timeout = ?self.timeout, "Killing stuck transcript exporter");
                    if let Err(e) = child.kill() {
                        warn!(%channel_id, "Could not kill transcript exporter: {}", e);
                    }
                    let _ = child.wait();
                    return Err(ArchiveError::TimedOut(self.timeout));
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        if !status.success() {
            let stderr = std::fs::read_to_string(&log_path).unwrap_or_default();
            return Err(ArchiveError::ExporterFailed {
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub bytes: Vec<u8>,
    pub filename: String,
}

#[derive(Clone)]
pub struct Archiver {
    exporter: Arc<dyn TranscriptExporter>,
}

impl Archiver {
    pub fn new(exporter: Arc<dyn TranscriptExporter>) -> Self {
        Self { exporter }
    }

    /// Exports `channel_id` and returns the file as `<channel_name>.html`.
    pub async fn archive(&self, channel_id: Id<ChannelMarker>, channel_name: &str) -> Result<Transcript, ArchiveError> {
        let exporter = Arc::clone(&self.exporter);
        debug!(%channel_id, "Exporting transcript");

        let task = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ArchiveError> {
            let scratch = tempfile::tempdir().map_err(ArchiveError::Output)?;
            let path = scratch.path().join(format!("{channel_id}.html"));
            exporter.export(channel_id, &path)?;
            std::fs::read(&path).map_err(ArchiveError::Output)
        });

        let bytes = match task.await {
            Ok(result) => result,
            Err(join_err) => Err(ArchiveError::Worker(join_err.to_string())),
        }
        .inspect_err(|e| error!(%channel_id, "Transcript export failed: {}", e))?;

        info!(%channel_id, size = bytes.len(), "Transcript exported");
        Ok(Transcript {
            bytes,
            filename: format!("{channel_name}.html"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn returns_exported_bytes_named_after_channel() {
        let mut exporter = MockTranscriptExporter::new();
        exporter
            .expect_export()
            .with(eq(Id::<ChannelMarker>::new(42)), mockall::predicate::always())
            .times(1)
            .returning(|_, path| {
                std::fs::write(path, b"<html>hi</html>").map_err(ArchiveError::Output)
            });

        let archiver = Archiver::new(Arc::new(exporter));
        let transcript = archiver.archive(Id::new(42), "purchase-0007-CLOSED").await.unwrap();

        assert_eq!(transcript.filename, "purchase-0007-CLOSED.html");
        assert_eq!(transcript.bytes, b"<html>hi</html>");
    }

    #[tokio::test]
    async fn exporter_failure_is_surfaced() {
        let mut exporter = MockTranscriptExporter::new();
        exporter.expect_export().returning(|_, _| {
            Err(ArchiveError::ExporterFailed {
                status: "exit status: 1".into(),
                stderr: "token rejected".into(),
            })
        });

        let archiver = Archiver::new(Arc::new(exporter));
        let err = archiver.archive(Id::new(1), "other-0001-CLOSED").await.unwrap_err();
        assert!(matches!(err, ArchiveError::ExporterFailed { .. }));
    }

    #[tokio::test]
    async fn exporter_that_writes_nothing_is_an_output_error() {
        let mut exporter = MockTranscriptExporter::new();
        exporter.expect_export().returning(|_, _| Ok(()));

        let archiver = Archiver::new(Arc::new(exporter));
        let err = archiver.archive(Id::new(1), "other-0001-CLOSED").await.unwrap_err();
        assert!(matches!(err, ArchiveError::Output(_)));
    }

    #[test]
    fn missing_binary_is_reported_as_missing() {
        let exporter = CommandExporter::new("/nonexistent/dragonbot-exporter", "token");
        let scratch = tempfile::tempdir().unwrap();
        let err = exporter.export(Id::new(1), &scratch.path().join("out.html")).unwrap_err();
        assert!(matches!(err, ArchiveError::ExporterMissing(p) if p.contains("dragonbot-exporter")));
    }

    #[cfg(unix)]
    #[test]
    fn hung_exporter_is_killed_at_the_deadline() {
        let exporter = CommandExporter::new("sh", "token")
            .with_leading_args(vec!["-c".into(), "sleep 30".into(), "sh".into()])
            .with_timeout(Duration::from_millis(300));
        let scratch = tempfile::tempdir().unwrap();

        let started = Instant::now();
        let err = exporter.export(Id::new(1), &scratch.path().join("out.html")).unwrap_err();
        assert!(matches!(err, ArchiveError::TimedOut(t) if t == Duration::from_millis(300)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn failing_exporter_reports_its_stderr() {
        let exporter = CommandExporter::new("sh", "token")
            .with_leading_args(vec!["-c".into(), "echo token rejected >&2; exit 3".into(), "sh".into()]);
        let scratch = tempfile::tempdir().unwrap();

        let err = exporter.export(Id::new(1), &scratch.path().join("out.html")).unwrap_err();
        assert!(matches!(err, ArchiveError::ExporterFailed { stderr, .. } if stderr == "token rejected"));
    }
}
