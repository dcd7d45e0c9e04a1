//! External document converter (intermediate document → page document).
//!
//! The converter program is a single shared resource that is not reentrant,
//! so every conversion holds one lock for its whole run. Each run is bounded
//! by a timeout; the child is killed when the wait is abandoned.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use packetmaker_shared::ConverterConfig;

/// Bytes of converter stderr kept in a failure reason.
const STDERR_TAIL: usize = 512;

/// Result of one conversion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// The page document was written to this path.
    Converted(PathBuf),
    /// The converter failed; no page document is available.
    Failed { reason: String },
}

/// Runs the configured converter program.
#[derive(Debug)]
pub struct DocumentConverter {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    lock: Mutex<()>,
}

impl DocumentConverter {
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            lock: Mutex::new(()),
        }
    }

    /// Convert `input` into `<input dir>/<input stem>.pdf`.
    ///
    /// Argument placeholders: `{input}`, `{outdir}` and `{output}`.
    #[instrument(skip_all, fields(input = %input.display()))]
    pub async fn convert(&self, input: &Path) -> ConversionOutcome {
        let input = std::path::absolute(input).unwrap_or_else(|_| input.to_path_buf());
        let output = input.with_extension("pdf");
        let outdir = input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input.to_string_lossy())
                    .replace("{outdir}", &outdir.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
            })
            .collect();

        let _guard = self.lock.lock().await;

        // A stale page document from an earlier run must not pass for this one.
        if output.exists() {
            if let Err(e) = std::fs::remove_file(&output) {
                return ConversionOutcome::Failed {
                    reason: format!("cannot replace {}: {e}", output.display()),
                };
            }
        }

        debug!(program = %self.program, ?args, "running converter");
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .current_dir(&outdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let result = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                return ConversionOutcome::Failed {
                    reason: format!("{} timed out after {:?}", self.program, self.timeout),
                };
            }
            Ok(Err(e)) => {
                return ConversionOutcome::Failed {
                    reason: format!("failed to run {}: {e}", self.program),
                };
            }
            Ok(Ok(result)) => result,
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let start = stderr.len().saturating_sub(STDERR_TAIL);
            let tail = stderr.get(start..).unwrap_or_default().trim();
            return ConversionOutcome::Failed {
                reason: format!("{} exited with {}: {tail}", self.program, result.status),
            };
        }

        if !output.is_file() {
            return ConversionOutcome::Failed {
                reason: format!("{} produced no {}", self.program, output.display()),
            };
        }

        ConversionOutcome::Converted(output)
    }
}
