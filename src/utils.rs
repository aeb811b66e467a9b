// ABOUTME: Utility functions for tool discovery and error handling
// ABOUTME: Provides tool checks, retry logic, and identifier sanitizing

use crate::mover::ToolRunner;
use anyhow::{bail, Context, Result};
use std::future::Future;
use std::time::Duration;
use which::which;

/// Check that the programs a tool runner needs are available
///
/// For local runs that is `pg_dump` and `psql`; for docker runs only the
/// `docker` CLI has to be on PATH. The error lists install hints.
pub fn check_required_tools(runner: &ToolRunner) -> Result<()> {
    let missing: Vec<String> = runner
        .required_programs()
        .into_iter()
        .filter(|program| which(program).is_err())
        .map(|program| program.display().to_string())
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    match runner {
        ToolRunner::Local { .. } => bail!(
            "Missing required PostgreSQL client tools: {}\n\
             \n\
             Please install PostgreSQL client tools:\n\
             - Ubuntu/Debian: sudo apt-get install postgresql-client\n\
             - macOS: brew install postgresql\n\
             - RHEL/CentOS: sudo yum install postgresql\n\
             - Or run the tools in a container with --docker-image postgres:15.8",
            missing.join(", ")
        ),
        ToolRunner::Docker { .. } => bail!(
            "Missing required tools: {}\n\
             Install Docker or drop --docker-image to use local PostgreSQL client tools.",
            missing.join(", ")
        ),
    }
}

/// Drive `work` to completion unless `interrupt` resolves first
///
/// When interrupted, `work` is dropped in place: a running mover removes its
/// artifacts through its guard and any child tool is killed.
pub async fn run_until_interrupted<W, I>(work: W, interrupt: I) -> Result<W::Output>
where
    W: Future,
    I: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        output = work => Ok(output),
        signal = interrupt => {
            signal.context("Failed to listen for the interrupt signal")?;
            tracing::warn!("⚠ Interrupted, in-flight stage aborted");
            bail!("Interrupted before the move finished")
        }
    }
}

/// Retry `operation` up to `max_retries` more times, doubling the delay
///
/// Used for the preflight connection only; the move stages never retry.
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = initial_delay;
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt >= max_retries => return Err(e),
            Err(e) => {
                attempt += 1;
                tracing::warn!(
                    "Attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}

/// Strip control characters and cap the length before echoing user input
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mover::Program;

    #[test]
    fn test_check_required_tools() {
        // Passes either way; on hosts without the client tools the error must name them
        let result = check_required_tools(&ToolRunner::default());

        if let Err(err) = result {
            let err_msg = err.to_string();
            assert!(err_msg.contains("Missing required PostgreSQL client tools"));
            assert!(err_msg.contains("pg_dump") || err_msg.contains("psql"));
        }
    }

    #[test]
    fn test_check_required_tools_reports_missing_program() {
        let runner = ToolRunner::Local {
            pg_dump: Program::new("pg_dump-missing-for-test"),
            psql: Program::new("psql-missing-for-test"),
        };
        let err = check_required_tools(&runner).unwrap_err().to_string();
        assert!(err.contains("pg_dump-missing-for-test, psql-missing-for-test"));
    }

    #[test]
    fn test_check_required_tools_docker() {
        let runner = ToolRunner::Docker {
            docker: Program::new("docker-missing-for-test"),
            image: "postgres:15.8".to_string(),
        };
        let err = check_required_tools(&runner).unwrap_err().to_string();
        assert!(err.contains("docker-missing-for-test"));
        assert!(err.contains("Install Docker"));
    }

    #[test]
    fn test_sanitize_identifier_for_messages() {
        assert_eq!(sanitize_identifier("readings"), "readings");
        assert_eq!(sanitize_identifier("read\x1b[2Jings\n"), "read[2Jings");
        assert_eq!(sanitize_identifier(&"r".repeat(200)).len(), 100);
    }

    #[tokio::test]
    async fn test_run_until_interrupted_passes_output_through() {
        let result = run_until_interrupted(async { 7 }, std::future::pending()).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_run_until_interrupted_drops_work() {
        struct Dropped<'a>(&'a std::cell::Cell<bool>);
        impl Drop for Dropped<'_> {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let dropped = std::cell::Cell::new(false);
        let work = async {
            let _marker = Dropped(&dropped);
            std::future::pending::<()>().await
        };
        let interrupt = async {
            tokio::task::yield_now().await;
            Ok(())
        };
        let err = run_until_interrupted(work, interrupt).await.unwrap_err();

        assert!(err.to_string().contains("Interrupted"));
        assert!(dropped.get());
    }

    #[tokio::test]
    async fn test_retry_with_backoff_success() {
        let mut attempts = 0;
        let result = retry_with_backoff(
            || {
                attempts += 1;
                async move {
                    if attempts < 3 {
                        anyhow::bail!("Temporary failure")
                    } else {
                        Ok("Success")
                    }
                }
            },
            5,
            Duration::from_millis(10),
        )
        .await;

        assert_eq!(result.unwrap(), "Success");
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_with_backoff_failure() {
        let mut attempts = 0;
        let result: Result<&str> = retry_with_backoff(
            || {
                attempts += 1;
                async move { anyhow::bail!("Permanent failure") }
            },
            2,
            Duration::from_millis(10),
        )
        .await;

        assert!(result.unwrap_err().to_string().contains("Permanent failure"));
        assert_eq!(attempts, 3);
    }
}
