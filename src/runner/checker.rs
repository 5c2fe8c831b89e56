//! External consistency checker invocation.
//!
//! The checker is an opaque program configured as a command line. Each case
//! call appends `--input-path`, `--output-path`, `--case-id` and the resolved
//! approach flags. Exit code 0 is success.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::debug;

use super::args::{emit_flags, ArgValues};
use super::config::ApproachConfig;
use crate::error::{CheckerError, RunError};
use crate::utils::split_command_line;

/// One case invocation.
#[derive(Debug, Clone)]
pub struct CaseInvocation {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub case_id: String,
    pub args: ArgValues,
    /// Prefix forwarded output lines with `[case_id] `.
    pub prefix_output: bool,
}

/// A consistency checker under evaluation.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Runs the checker on one materialized variant, writing its result JSON
    /// to `invocation.output_path`.
    async fn run_case(&self, invocation: &CaseInvocation) -> Result<(), CheckerError>;

    /// One-off preparation before any case runs.
    async fn prepare(&self, _args: &ArgValues, _config_path: &Path) -> Result<(), CheckerError> {
        Ok(())
    }
}

/// Runs the configured entrypoints as child processes.
#[derive(Debug, Clone)]
pub struct ProcessChecker {
    run_case: Vec<String>,
    prepare: Option<Vec<String>>,
    pythonpath: Option<PathBuf>,
    forward_output: bool,
}

impl ProcessChecker {
    /// Builds a checker from the `run_case` command line.
    pub fn new(run_case: &str) -> Result<Self, CheckerError> {
        Ok(Self {
            run_case: parse_command(run_case)?,
            prepare: None,
            pythonpath: None,
            forward_output: true,
        })
    }

    /// Builds a checker from an approach config's entrypoints.
    pub fn from_config(config: &ApproachConfig) -> Result<Self, RunError> {
        let mut checker = Self::new(config.run_case_command()?)?;
        if let Some(prepare) = config.prepare_command() {
            checker.prepare = Some(parse_command(prepare)?);
        }
        Ok(checker)
    }

    /// Directory prepended to the child's `PYTHONPATH`.
    pub fn with_pythonpath(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pythonpath = Some(dir.into());
        self
    }

    /// Captures output without echoing it.
    pub fn quiet(mut self) -> Self {
        self.forward_output = false;
        self
    }

    /// Full argument vector for a case invocation.
    pub fn case_argv(&self, invocation: &CaseInvocation) -> Vec<String> {
        let mut argv = self.run_case.clone();
        argv.extend([
            "--input-path".to_string(),
            invocation.input_path.display().to_string(),
            "--output-path".to_string(),
            invocation.output_path.display().to_string(),
            "--case-id".to_string(),
            invocation.case_id.clone(),
        ]);
        argv.extend(emit_flags(&invocation.args));
        argv
    }

    async fn execute(&self, argv: &[String], prefix: Option<String>) -> Result<(), CheckerError> {
        let (program, rest) = argv.split_first().ok_or(CheckerError::EmptyCommand)?;
        let mut cmd = Command::new(program);
        cmd.args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &self.pythonpath {
            let mut parts = vec![dir.clone()];
            if let Some(existing) = std::env::var_os("PYTHONPATH").filter(|v| !v.is_empty()) {
                parts.extend(std::env::split_paths(&existing));
            }
            if let Ok(joined) = std::env::join_paths(parts) {
                cmd.env("PYTHONPATH", joined);
            }
        }

        debug!(command = %argv.join(" "), "Spawning checker");
        let mut child = cmd.spawn().map_err(|source| CheckerError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdout = child.stdout.take().map(|out| {
            forward_stream(out, tokio::io::stdout(), prefix.clone(), self.forward_output)
        });
        let stderr = child.stderr.take().map(|err| {
            forward_stream(err, tokio::io::stderr(), prefix.clone(), self.forward_output)
        });

        let status = child.wait().await?;
        let stdout = join_reader(stdout).await;
        let stderr = join_reader(stderr).await;

        if status.success() {
            Ok(())
        } else {
            Err(CheckerError::NonZeroExit {
                command: argv.join(" "),
                code: status.code(),
                stdout: stdout.trim().to_string(),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl Checker for ProcessChecker {
    async fn run_case(&self, invocation: &CaseInvocation) -> Result<(), CheckerError> {
        let prefix = invocation
            .prefix_output
            .then(|| format!("[{}] ", invocation.case_id));
        self.execute(&self.case_argv(invocation), prefix).await
    }

    async fn prepare(&self, args: &ArgValues, config_path: &Path) -> Result<(), CheckerError> {
        let Some(prepare) = &self.prepare else {
            return Ok(());
        };
        let mut argv = prepare.clone();
        argv.extend(emit_flags(args));
        argv.extend(["--config".to_string(), config_path.display().to_string()]);
        self.execute(&argv, None).await
    }
}

fn parse_command(line: &str) -> Result<Vec<String>, CheckerError> {
    match split_command_line(line) {
        Some(words) if !words.is_empty() => Ok(words),
        _ => Err(CheckerError::EmptyCommand),
    }
}

/// Reads `stream` line by line, echoing each line to `sink` (when `forward`)
/// and returning everything read once the stream closes. Lines are raw bytes;
/// invalid UTF-8 is forwarded unchanged and captured lossily.
fn forward_stream<R, W>(
    stream: R,
    mut sink: W,
    prefix: Option<String>,
    forward: bool,
) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = String::new();
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "Checker output stream closed with an error");
                    break;
                }
            }
            if !line.ends_with(b"\n") {
                line.push(b'\n');
            }
            if forward {
                // a closed sink must not stop draining the child's pipe
                if let Some(p) = &prefix {
                    let _ = sink.write_all(p.as_bytes()).await;
                }
                let _ = sink.write_all(&line).await;
                let _ = sink.flush().await;
            }
            buffer.push_str(&String::from_utf8_lossy(&line));
        }
        buffer
    })
}

async fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}
