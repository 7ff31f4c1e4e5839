//! External antivirus scanner.
//!
//! The scanner is a subprocess invoked with a single absolute file path.
//! Exit status 0 means clean, 1 means infected, anything else is an error.

use async_trait::async_trait;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Outcome of scanning one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    Infected { threat: String },
    Error { message: String },
}

impl ScanVerdict {
    fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// A virus scanner.
#[async_trait]
pub trait VirusScanner: Send + Sync {
    /// Scan the file at `path`. Failures to run the scanner are reported as
    /// [`ScanVerdict::Error`].
    async fn scan(&self, path: &Path) -> ScanVerdict;
}

/// Runs a clamscan-compatible binary.
#[derive(Debug, Clone)]
pub struct ClamScanner {
    binary: String,
    timeout: Duration,
}

impl ClamScanner {
    #[must_use]
    pub const fn new(binary: String, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    /// Scanner configured from the `kyc` config section.
    #[must_use]
    pub fn from_config(config: &kyc_common::KycConfig) -> Self {
        Self::new(
            config.clamscan_binary.clone(),
            Duration::from_secs(config.clamscan_timeout),
        )
    }

    fn interpret(status: ExitStatus, stdout: &str, stderr: &str) -> ScanVerdict {
        match status.code() {
            Some(0) => ScanVerdict::Clean,
            Some(1) => ScanVerdict::Infected {
                threat: parse_threat(stdout),
            },
            code => {
                let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                ScanVerdict::error(format!(
                    "scanner exited with {code}: {}",
                    combined_output(stdout, stderr)
                ))
            }
        }
    }
}

#[async_trait]
impl VirusScanner for ClamScanner {
    async fn scan(&self, path: &Path) -> ScanVerdict {
        let mut child = match Command::new(&self.binary)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return ScanVerdict::error(format!("failed to start {}: {e}", self.binary));
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let run = async {
            let (status, stdout, stderr) =
                tokio::join!(child.wait(), drain(stdout), drain(stderr));
            (status, stdout, stderr)
        };

        match tokio::time::timeout(self.timeout, run).await {
            Ok((Ok(status), stdout, stderr)) => Self::interpret(status, &stdout, &stderr),
            Ok((Err(e), _, _)) => ScanVerdict::error(format!("failed to wait for scanner: {e}")),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill timed out scanner");
                }
                ScanVerdict::error(format!(
                    "scanner timed out after {}s",
                    self.timeout.as_secs()
                ))
            }
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        // A read error leaves whatever was captured so far.
        let _ = pipe.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Threat name from `<path>: <threat> FOUND` lines, or the trimmed output.
fn parse_threat(stdout: &str) -> String {
    let threats: Vec<&str> = stdout
        .lines()
        .filter_map(|line| line.trim_end().strip_suffix(" FOUND"))
        .filter_map(|rest| rest.rsplit_once(": ").map(|(_, threat)| threat.trim()))
        .filter(|threat| !threat.is_empty())
        .collect();

    if threats.is_empty() {
        stdout.trim().to_string()
    } else {
        threats.join(", ")
    }
}

fn combined_output(stdout: &str, stderr: &str) -> String {
    match (stdout.trim(), stderr.trim()) {
        ("", "") => "no output".to_string(),
        (out, "") => out.to_string(),
        ("", err) => err.to_string(),
        (out, err) => format!("{out}\n{err}"),
    }
}
