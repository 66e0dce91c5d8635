//! Generator invocation
//!
//! The generator is an external program treated as a black box: it is started with the bundle root as its
//! working directory, writes its output into the bundle's generated tree, and reports success through its
//! exit status. Nothing else about it is assumed.
//!
//! ## I/O Boundaries
//!
//! The [`Generator`] trait is the seam between orchestration and process execution. [`CommandGenerator`]
//! is the production implementation; tests substitute in-process fakes.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::future::Future;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::debug;

use crate::registry::{Bundle, Layout};

/// Errors that make a bundle's generation step fail.
///
/// All of them are fatal to the bundle being evaluated and harmless to every other bundle.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("generator '{program}' is unavailable: {source}")]
    Unavailable {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("generator {}", describe_exit(*exit_code))]
    Failed {
        /// `None` when the process was terminated by a signal
        exit_code: Option<i32>,
        diagnostics: String,
    },

    #[error("generator timed out after {}s", after.as_secs())]
    TimedOut {
        after: Duration,
        /// Output read before the generator was killed
        diagnostics: String,
    },

    #[error("failed to clear generated tree '{}': {source}", path.display())]
    Prepare {
        path: std::path::PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running generator: {0}")]
    Io(#[from] io::Error),
}

impl GenerateError {
    /// Captured generator output, when the generator ran far enough to produce any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            GenerateError::Failed { diagnostics, .. } | GenerateError::TimedOut { diagnostics, .. }
                if !diagnostics.is_empty() =>
            {
                Some(diagnostics)
            }
            _ => None,
        }
    }

    /// Stable machine-readable name for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerateError::Unavailable { .. } => "generator_unavailable",
            GenerateError::Failed { .. } => "generator_failed",
            GenerateError::TimedOut { .. } => "generator_timeout",
            GenerateError::Prepare { .. } | GenerateError::Io(_) => "generator_io",
        }
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

/// Result of a successful generator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl GenerateOutcome {
    /// Standard error followed by standard output, trimmed.
    pub fn diagnostics(&self) -> String {
        combine_streams(&self.stdout, &self.stderr)
    }
}

fn combine_streams(stdout: &str, stderr: &str) -> String {
    let parts: Vec<&str> = [stderr.trim_end(), stdout.trim_end()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    parts.join("\n")
}

/// Produces a bundle's generated tree.
pub trait Generator: Send + Sync {
    /// Run the generator for `bundle`. Non-zero exit is an error.
    fn generate(&self, bundle: &Bundle) -> impl Future<Output = Result<GenerateOutcome, GenerateError>> + Send;
}

// ============================================================================
// Subprocess generator
// ============================================================================

/// Program, arguments and environment additions used to start the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Default for GeneratorCommand {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-m".to_string(), "stdoc".to_string(), ".".to_string()],
            env: BTreeMap::new(),
        }
    }
}

impl fmt::Display for GeneratorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{key}={value} ")?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs the generator as a child process in the bundle root.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: GeneratorCommand,
    timeout: Option<Duration>,
}

impl CommandGenerator {
    pub fn new(command: GeneratorCommand) -> Self {
        Self { command, timeout: None }
    }

    /// Kill the generator and fail the bundle if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Generator for CommandGenerator {
    #[tracing::instrument(skip_all, fields(bundle = %bundle.name))]
    async fn generate(&self, bundle: &Bundle) -> Result<GenerateOutcome, GenerateError> {
        let start = Instant::now();
        debug!(command = %self.command, cwd = %bundle.root.display(), "starting generator");

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .envs(&self.command.env)
            .current_dir(&bundle.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => GenerateError::Unavailable {
                    program: self.command.program.clone(),
                    source,
                },
                _ => GenerateError::Io(source),
            })?;

        let mut stdout = Capture::start(child.stdout.take());
        let mut stderr = Capture::start(child.stderr.take());

        // If this future is dropped (cancellation), `kill_on_drop` takes the child down.
        let status = match self.timeout {
            Some(limit) => match time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    if let Err(err) = child.kill().await {
                        debug!(error = %err, "could not kill timed out generator");
                    }
                    let diagnostics = combine_streams(&stdout.partial().await, &stderr.partial().await);
                    return Err(GenerateError::TimedOut { after: limit, diagnostics });
                }
            },
            None => child.wait().await?,
        };

        let duration = start.elapsed();
        let stdout = stdout.finish().await;
        let stderr = stderr.finish().await;
        debug!(%status, elapsed_ms = duration.as_millis() as u64, "generator finished");

        if !status.success() {
            return Err(GenerateError::Failed {
                exit_code: status.code(),
                diagnostics: combine_streams(&stdout, &stderr),
            });
        }

        Ok(GenerateOutcome {
            exit_code: status.code(),
            stdout,
            stderr,
            duration,
        })
    }
}

/// How long a killed generator's pipes are drained before the captured output is taken as final.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Collects one output stream of a child process in the background.
///
/// The buffer is shared with the reader task so that output read before a kill survives it.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl Capture {
    fn start<R>(stream: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let task = tokio::spawn(async move {
            let Some(mut stream) = stream else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
                }
            }
        });
        Self { buf, task }
    }

    /// Everything the stream produced up to EOF.
    async fn finish(&mut self) -> String {
        let _ = (&mut self.task).await;
        self.contents().await
    }

    /// Whatever has been read so far. A grandchild may still hold the pipe open, so EOF is not awaited.
    async fn partial(&mut self) -> String {
        let _ = time::timeout(DRAIN_GRACE, &mut self.task).await;
        self.task.abort();
        self.contents().await
    }

    async fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().await).into_owned()
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Remove the bundle's generated tree so the next run starts from nothing.
///
/// Only the generated entry itself is touched; a symlink there is unlinked, never followed.
pub fn clear_generated_tree(bundle: &Bundle, layout: &Layout) -> Result<(), GenerateError> {
    let path = bundle.generated_dir(layout);
    let prepare_err = |source| GenerateError::Prepare {
        path: path.clone(),
        source,
    };

    let metadata = match fs::symlink_metadata(&path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(prepare_err(err)),
    };

    debug!(bundle = %bundle.name, path = %path.display(), "clearing generated tree");
    if metadata.is_dir() {
        fs::remove_dir_all(&path).map_err(prepare_err)
    } else {
        fs::remove_file(&path).map_err(prepare_err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::Path;

    fn bundle_in(dir: &Path) -> Bundle {
        Bundle::new("basic", dir)
    }

    #[test]
    fn test_default_command_runs_stdoc_module() {
        let command = GeneratorCommand::default();
        assert_eq!(command.to_string(), "python3 -m stdoc .");
    }

    #[test]
    fn test_command_display_includes_env() {
        let mut command = GeneratorCommand::default();
        command.env.insert("PYTHONPATH".to_string(), "/src".to_string());
        assert_eq!(command.to_string(), "PYTHONPATH=/src python3 -m stdoc .");
    }

    #[test]
    fn test_combine_streams() {
        assert_eq!(combine_streams("out\n", "err\n"), "err\nout");
        assert_eq!(combine_streams("", "err\n"), "err");
        assert_eq!(combine_streams("", ""), "");
    }

    #[test]
    fn test_failed_error_messages() {
        let failed = GenerateError::Failed {
            exit_code: Some(2),
            diagnostics: "boom".to_string(),
        };
        assert_eq!(failed.to_string(), "generator exited with status 2");
        assert_eq!(failed.diagnostics(), Some("boom"));
        assert_eq!(failed.kind(), "generator_failed");

        let killed = GenerateError::Failed {
            exit_code: None,
            diagnostics: String::new(),
        };
        assert_eq!(killed.to_string(), "generator was terminated by a signal");
        assert_eq!(killed.diagnostics(), None);
    }

    #[test]
    fn test_clear_generated_tree_removes_only_generated() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::default();
        let bundle = bundle_in(dir.path());
        fs::create_dir_all(bundle.generated_dir(&layout).join("nested")).unwrap();
        fs::write(bundle.generated_dir(&layout).join("nested/stale.html"), "old").unwrap();
        fs::create_dir_all(bundle.reference_dir(&layout)).unwrap();
        fs::write(bundle.reference_dir(&layout).join("index.html"), "hello").unwrap();

        clear_generated_tree(&bundle, &layout).unwrap();

        assert!(!bundle.generated_dir(&layout).exists());
        assert!(bundle.reference_dir(&layout).join("index.html").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_clear_unlinks_generated_symlink_without_following_it() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("published");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("index.html"), "keep me").unwrap();
        let root = dir.path().join("basic");
        fs::create_dir_all(&root).unwrap();
        let layout = Layout::default();
        let bundle = bundle_in(&root);
        symlink(&outside, bundle.generated_dir(&layout)).unwrap();

        clear_generated_tree(&bundle, &layout).unwrap();

        assert!(fs::symlink_metadata(bundle.generated_dir(&layout)).is_err());
        assert_eq!(fs::read_to_string(outside.join("index.html")).unwrap(), "keep me");
    }

    #[test]
    fn test_clear_missing_generated_tree_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        clear_generated_tree(&bundle_in(dir.path()), &Layout::default()).unwrap();
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let generator = CommandGenerator::new(GeneratorCommand {
            program: "stdoc-golden-no-such-generator".to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
        });

        let err = generator.generate(&bundle_in(dir.path())).await.unwrap_err();
        assert!(matches!(err, GenerateError::Unavailable { .. }), "got {err:?}");
    }

    #[cfg(unix)]
    fn sh(script: &str) -> CommandGenerator {
        CommandGenerator::new(GeneratorCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: BTreeMap::from([("GREETING".to_string(), "hello".to_string())]),
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_generator_runs_in_bundle_root_with_env() {
        let dir = tempfile::tempdir().unwrap();
        let generator = sh("mkdir -p generated && printf \"$GREETING\" > generated/index.html && echo done");

        let outcome = generator.generate(&bundle_in(dir.path())).await.unwrap();

        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout.trim(), "done");
        let written = fs::read_to_string(dir.path().join("generated/index.html")).unwrap();
        assert_eq!(written, "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure_with_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let generator = sh("echo 'error: unresolved label @intro' >&2; exit 3");

        let err = generator.generate(&bundle_in(dir.path())).await.unwrap_err();
        match err {
            GenerateError::Failed { exit_code, diagnostics } => {
                assert_eq!(exit_code, Some(3));
                assert!(diagnostics.contains("unresolved label @intro"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_killed_by_signal_has_no_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let generator = sh("echo 'rendering' >&2; kill -9 $$");

        let err = generator.generate(&bundle_in(dir.path())).await.unwrap_err();
        match err {
            GenerateError::Failed { exit_code, diagnostics } => {
                assert_eq!(exit_code, None);
                assert!(diagnostics.contains("rendering"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_keeps_output_read_before_kill() {
        let dir = tempfile::tempdir().unwrap();
        let generator = sh("echo 'rendering index' >&2; sleep 5").with_timeout(Some(Duration::from_millis(500)));

        let started = Instant::now();
        let err = generator.generate(&bundle_in(dir.path())).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(matches!(err, GenerateError::TimedOut { .. }), "got {err:?}");
        assert_eq!(err.kind(), "generator_timeout");
        assert_eq!(err.diagnostics(), Some("rendering index"));
    }
}
