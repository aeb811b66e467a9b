// ABOUTME: Table snapshot mover: export, rewrite, apply, cleanup
// ABOUTME: Sequences the stages as a state machine and always removes artifacts

pub mod apply;
pub mod cleanup;
pub mod export;
pub mod job;
pub mod rewrite;
pub mod tools;

pub use apply::apply_script;
pub use cleanup::ArtifactGuard;
pub use export::export_table;
pub use job::{validate_identifier, ArtifactPaths, BackupJob};
pub use rewrite::{replace_literal, rewrite_schema, RewriteOutcome};
pub use tools::{Program, ToolRunner};

use crate::config::MoverConfig;
use crate::error::{CleanupWarning, MoveError, Stage};
use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle of one job
///
/// `Idle → Exporting → Rewriting → Applying → CleaningUp → Done | Failed`.
/// Cleanup is entered from every state once a stage has started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Exporting,
    Rewriting,
    Applying,
    CleaningUp,
    Done,
    Failed(Stage),
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Idle => f.write_str("idle"),
            JobState::Exporting => f.write_str("exporting"),
            JobState::Rewriting => f.write_str("rewriting"),
            JobState::Applying => f.write_str("applying"),
            JobState::CleaningUp => f.write_str("cleaning up"),
            JobState::Done => f.write_str("done"),
            JobState::Failed(stage) => write!(f, "failed ({})", stage),
        }
    }
}

/// Summary of a successful move
#[derive(Debug)]
pub struct MoveReport {
    pub dump_bytes: u64,
    pub replacements: usize,
    pub stage_timings: Vec<(Stage, Duration)>,
    pub cleanup_warnings: Vec<CleanupWarning>,
    /// Every state the job passed through, starting with `Idle`
    pub history: Vec<JobState>,
}

impl MoveReport {
    pub fn final_state(&self) -> JobState {
        self.history.last().copied().unwrap_or(JobState::Idle)
    }
}

/// Single-use runner for one [`BackupJob`]
pub struct TableMover {
    job: BackupJob,
    config: MoverConfig,
    history: Vec<JobState>,
    timings: Vec<(Stage, Duration)>,
}

impl TableMover {
    pub fn new(job: BackupJob, config: MoverConfig) -> Self {
        Self {
            job,
            config,
            history: vec![JobState::Idle],
            timings: Vec::new(),
        }
    }

    pub fn job(&self) -> &BackupJob {
        &self.job
    }

    /// Run every stage; consumes the mover so a job cannot run twice
    pub async fn run(mut self) -> Result<MoveReport, MoveError> {
        let paths = self.job.artifacts_in(&self.config.work_dir);
        let mut guard = ArtifactGuard::new(paths);

        let result = self.run_stages(guard.paths()).await;

        self.transition(JobState::CleaningUp);
        let started = Instant::now();
        let cleanup_warnings = guard.cleanup();
        self.timings.push((Stage::Cleanup, started.elapsed()));

        match result {
            Ok((dump_bytes, rewrite)) => {
                self.transition(JobState::Done);
                tracing::info!(
                    "✅ Moved {} to {}",
                    self.job.source_qualified(),
                    self.job.target_qualified()
                );
                Ok(MoveReport {
                    dump_bytes,
                    replacements: rewrite.replacements,
                    stage_timings: self.timings,
                    cleanup_warnings,
                    history: self.history,
                })
            }
            Err(e) => {
                self.transition(JobState::Failed(e.stage()));
                tracing::error!("✗ {} stage failed for {}", e.stage(), self.job.source_qualified());
                Err(e)
            }
        }
    }

    async fn run_stages(
        &mut self,
        paths: &ArtifactPaths,
    ) -> Result<(u64, RewriteOutcome), MoveError> {
        let timeout = self.config.stage_timeout;

        self.transition(JobState::Exporting);
        let started = Instant::now();
        let dump_bytes = export_table(
            &self.job,
            &self.config.source,
            &self.config.runner,
            &paths.dump,
            timeout,
        )
        .await?;
        self.timings.push((Stage::Export, started.elapsed()));

        self.transition(JobState::Rewriting);
        let started = Instant::now();
        let rewrite = rewrite_schema(&self.job, paths).await?;
        self.timings.push((Stage::Rewrite, started.elapsed()));

        self.transition(JobState::Applying);
        let started = Instant::now();
        apply_script(
            &self.config.target,
            &self.config.runner,
            &paths.rewritten,
            self.config.stop_on_error,
            timeout,
        )
        .await?;
        self.timings.push((Stage::Apply, started.elapsed()));

        Ok((dump_bytes, rewrite))
    }

    fn transition(&mut self, next: JobState) {
        tracing::debug!(
            "{}: {} -> {}",
            self.job.table_name(),
            self.history.last().copied().unwrap_or(JobState::Idle),
            next
        );
        self.history.push(next);
    }
}

/// Move `job`'s table from its source schema to its target schema
///
/// Returns the first failing stage's error. Both artifacts are removed
/// before this returns, whatever the outcome.
pub async fn move_table(job: BackupJob, config: MoverConfig) -> Result<MoveReport, MoveError> {
    TableMover::new(job, config).run().await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use std::path::Path;

    fn sh_program(script: &str, name: &str) -> Program {
        Program::new("/bin/sh").with_args(["-c", script, name])
    }

    fn config_with(work_dir: &Path, dump_script: &str, apply_script: &str) -> MoverConfig {
        MoverConfig::new(ConnectionConfig::default())
            .with_work_dir(work_dir)
            .with_runner(ToolRunner::Local {
                pg_dump: sh_program(dump_script, "pg_dump"),
                psql: sh_program(apply_script, "psql"),
            })
            .with_stage_timeout(Some(Duration::from_secs(10)))
    }

    fn job() -> BackupJob {
        BackupJob::new("public", "public_test", "readings").unwrap()
    }

    #[tokio::test]
    async fn test_successful_run_walks_every_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(
            dir.path(),
            "echo 'CREATE TABLE public.readings (id int);'",
            "cat > /dev/null",
        );

        let report = move_table(job(), config).await.unwrap();

        assert_eq!(
            report.history,
            vec![
                JobState::Idle,
                JobState::Exporting,
                JobState::Rewriting,
                JobState::Applying,
                JobState::CleaningUp,
                JobState::Done,
            ]
        );
        assert_eq!(report.final_state(), JobState::Done);
        assert_eq!(report.replacements, 1);
        assert!(report.dump_bytes > 0);
        let stages: Vec<Stage> = report.stage_timings.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            stages,
            vec![Stage::Export, Stage::Rewrite, Stage::Apply, Stage::Cleanup]
        );
        assert!(report.cleanup_warnings.is_empty());
    }

    #[tokio::test]
    async fn test_export_failure_reports_export_stage() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(
            dir.path(),
            "echo 'pg_dump: error: could not translate host name' >&2; exit 1",
            "cat > /dev/null",
        );

        let err = move_table(job(), config).await.unwrap_err();

        assert_eq!(err.stage(), Stage::Export);
        assert!(err.to_string().contains("could not translate host name"));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(JobState::Failed(Stage::Apply).to_string(), "failed (apply)");
        assert_eq!(JobState::CleaningUp.to_string(), "cleaning up");
    }
}
