use crate::error::ConfigError;
use std::io;
use std::process::{Command, Output};

/// Runs `program` with `args`, classifying the common failure shapes.
///
/// `idempotent_markers` are stderr substrings that mean "already configured"
/// — those runs are logged and reported as success per spec's idempotency
/// requirement.
pub(crate) fn run(
    program: &str,
    args: &[String],
    idempotent_markers: &[&str],
) -> Result<Output, ConfigError> {
    run_with(program, args, idempotent_markers, |_| {})
}

/// Like [`run`] but lets the caller tweak the `Command` before it spawns
/// (Windows uses this to suppress the console window PowerShell opens).
pub(crate) fn run_with(
    program: &str,
    args: &[String],
    idempotent_markers: &[&str],
    configure: impl FnOnce(&mut Command),
) -> Result<Output, ConfigError> {
    tracing::debug!(program, args = ?args, "running administrative command");

    let mut command = Command::new(program);
    command.args(args);
    configure(&mut command);

    let output = match command.output() {
        Ok(output) => output,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ConfigError::ToolingMissing(program.to_string()))
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };

    if output.status.success() {
        return Ok(output);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);

    if idempotent_markers.iter().any(|marker| stderr.contains(marker)) {
        tracing::debug!(program, %stderr, "treating failure as idempotent success");
        return Ok(output);
    }

    let lower = stderr.to_lowercase();
    if lower.contains("permission denied") || lower.contains("operation not permitted") {
        return Err(ConfigError::PermissionDenied);
    }

    Err(ConfigError::ConfigurationFailed(stderr.trim().to_string()))
}
