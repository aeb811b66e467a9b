// ABOUTME: Apply stage: feeds the rewritten dump to psql on the target
// ABOUTME: Failures surface the tool diagnostic; nothing is rolled back

use crate::config::ConnectionConfig;
use crate::error::MoveError;
use crate::mover::tools::{self, ToolRunner};
use std::path::Path;
use std::time::Duration;

/// Run the rewritten script against the target database
///
/// With `stop_on_error` psql halts at the first failing statement and exits
/// non-zero. Statements that already ran stay applied either way.
pub async fn apply_script(
    conn: &ConnectionConfig,
    runner: &ToolRunner,
    script_path: &Path,
    stop_on_error: bool,
    timeout: Option<Duration>,
) -> Result<(), MoveError> {
    tracing::info!("Applying {} to {}", script_path.display(), conn);
    if !stop_on_error {
        tracing::warn!("⚠ ON_ERROR_STOP disabled: failing statements will not fail the job");
    }

    let invocation = runner.apply_command(conn, stop_on_error);
    let output = tools::run(&invocation, Some(script_path), None, timeout)
        .await
        .map_err(|failure| MoveError::Apply {
            cause: format!("{} {}", invocation.tool, failure),
        })?;

    if !output.stdout.trim().is_empty() {
        tracing::debug!("psql output: {}", output.stdout.trim());
    }
    if !output.stderr.trim().is_empty() {
        // Without ON_ERROR_STOP statement errors only show up here
        tracing::warn!("⚠ psql reported: {}", output.stderr.trim());
    }

    tracing::info!("✓ Applied {}", script_path.display());
    Ok(())
}
