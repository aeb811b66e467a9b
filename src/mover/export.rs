// ABOUTME: Export stage: pg_dump of a single schema-qualified table
// ABOUTME: Streams the tool's stdout into a fresh dump artifact

use crate::config::ConnectionConfig;
use crate::error::MoveError;
use crate::mover::job::BackupJob;
use crate::mover::tools::{self, ToolRunner};
use std::path::Path;
use std::time::Duration;

/// Dump `source_schema.table_name` into `dump_path`
///
/// Returns the artifact size in bytes. Any failure to start the tool, a
/// non-zero exit or a timeout aborts the job; nothing is retried since these
/// are almost always credential or connectivity problems.
pub async fn export_table(
    job: &BackupJob,
    conn: &ConnectionConfig,
    runner: &ToolRunner,
    dump_path: &Path,
    timeout: Option<Duration>,
) -> Result<u64, MoveError> {
    let table = job.source_qualified();
    tracing::info!("Exporting {} from {}", table, conn);

    let invocation = runner.dump_command(conn, &table);
    let output = tools::run(&invocation, None, Some(dump_path), timeout)
        .await
        .map_err(|failure| MoveError::Export {
            cause: format!("{} {}", invocation.tool, failure),
        })?;

    if !output.stderr.trim().is_empty() {
        tracing::debug!("pg_dump stderr: {}", output.stderr.trim());
    }

    let size = tokio::fs::metadata(dump_path)
        .await
        .map_err(|e| MoveError::Export {
            cause: format!("dump artifact {} unreadable: {}", dump_path.display(), e),
        })?
        .len();

    tracing::info!("✓ Exported {} ({} bytes) to {}", table, size, dump_path.display());
    Ok(size)
}
