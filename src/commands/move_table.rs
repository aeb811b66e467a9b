// ABOUTME: Move command: copy one table between schemas
// ABOUTME: Checks tools, confirms with the operator, then runs the mover

use crate::config::MoverConfig;
use crate::mover::{self, BackupJob, MoveReport};
use crate::{interactive, utils};
use anyhow::{bail, Context, Result};

/// Copy `job`'s table from its source schema into its target schema
///
/// Steps:
/// 1. Verifies the client tools (or docker) are installed
/// 2. Prompts for confirmation (unless skip_confirmation is true)
/// 3. Runs export, rewrite, apply and cleanup
///
/// # Errors
///
/// Returns an error tagged with the failing stage (`export failed: ...`,
/// `rewrite failed ...`, `apply failed: ...`). Artifacts are removed before
/// this returns either way.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use postgres_table_mover::commands::move_table;
/// # use postgres_table_mover::config::{ConnectionConfig, MoverConfig};
/// # use postgres_table_mover::mover::BackupJob;
/// # async fn example() -> Result<()> {
/// let job = BackupJob::new("public", "public_test", "readings")?;
/// let config = MoverConfig::new(ConnectionConfig::default());
/// move_table(job, config, true).await?;
/// # Ok(())
/// # }
/// ```
pub async fn move_table(
    job: BackupJob,
    config: MoverConfig,
    skip_confirmation: bool,
) -> Result<MoveReport> {
    utils::check_required_tools(&config.runner)?;

    if !config.work_dir.is_dir() {
        bail!(
            "Working directory {} does not exist or is not a directory",
            config.work_dir.display()
        );
    }

    if !skip_confirmation && !interactive::confirm_move(&job, &config.source, &config.target)? {
        bail!("Table move cancelled by user");
    }

    let source = job.source_qualified();
    let report = mover::move_table(job, config)
        .await
        .with_context(|| format!("Failed to move {}", source))?;

    print_summary(&report);
    Ok(report)
}

fn print_summary(report: &MoveReport) {
    tracing::info!(
        "Dump size: {} | schema references rewritten: {}",
        crate::postgres::format_bytes(report.dump_bytes as i64),
        report.replacements
    );
    for (stage, elapsed) in &report.stage_timings {
        tracing::info!("  {:<8} {:.2?}", stage.as_str(), elapsed);
    }
    if !report.cleanup_warnings.is_empty() {
        tracing::warn!(
            "⚠ {} artifact(s) could not be removed; delete them manually",
            report.cleanup_warnings.len()
        );
    }
}
