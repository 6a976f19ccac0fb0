//! External codec invocation: program name + arguments in, combined output
//! and exit code out.

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info};

use crate::error::ProcessingError;
use crate::metrics;

/// Runs an external command, capturing stdout and stderr.
///
/// Success is exit code 0; the combined output is returned for parsing. A
/// non-zero exit raises [`ProcessingError::CommandFailed`] carrying the
/// combined output for diagnostics. The child is killed when it outlives
/// `timeout_secs`.
pub(crate) async fn run_command(
    program: &Path,
    args: &[String],
    timeout_secs: u64,
) -> Result<String, ProcessingError> {
    let program_name = program
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("codec")
        .to_string();

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessingError::command_failed(
                    &program_name,
                    format!("binary not found at {}", program.display()),
                )
            } else {
                ProcessingError::Io(e)
            }
        })?;

    info!(
        "'{}' started with PID {:?}",
        program_name,
        child.id()
    );
    debug!("{} args: {:?}", program_name, args);

    let mut stdout = child.stdout.take().expect("stdout should be captured");
    let mut stderr = child.stderr.take().expect("stderr should be captured");

    let waited = timeout(Duration::from_secs(timeout_secs), async {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let (out_read, err_read) = tokio::join!(
            stdout.read_to_end(&mut out),
            stderr.read_to_end(&mut err)
        );
        out_read?;
        err_read?;
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((status, out, err))
    })
    .await;

    let (status, out, err) = match waited {
        Ok(Ok(parts)) => parts,
        Ok(Err(e)) => return Err(ProcessingError::Io(e)),
        Err(_) => {
            let _ = child.kill().await;
            metrics::CODEC_INVOCATIONS
                .with_label_values(&[&program_name, "timeout"])
                .inc();
            return Err(ProcessingError::command_failed(
                &program_name,
                format!("timed out after {timeout_secs} seconds and was killed"),
            ));
        }
    };

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&out).trim(),
        String::from_utf8_lossy(&err).trim()
    );

    if status.success() {
        metrics::CODEC_INVOCATIONS
            .with_label_values(&[&program_name, "success"])
            .inc();
        debug!("{} done", program_name);
        Ok(combined)
    } else {
        metrics::CODEC_INVOCATIONS
            .with_label_values(&[&program_name, "failure"])
            .inc();
        error!(
            "{} exited with {:?}: {}",
            program_name,
            status.code(),
            combined
        );
        Err(ProcessingError::command_failed(program_name, combined))
    }
}
