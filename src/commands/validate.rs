// ABOUTME: Pre-flight validation command for a table move
// ABOUTME: Checks tools, connectivity, source table, and target schema

use crate::config::MoverConfig;
use crate::mover::BackupJob;
use crate::{postgres, utils};
use anyhow::{bail, Context, Result};

/// Verify a move can start without running it
///
/// Nothing is written to either database. A target table that already
/// exists is reported as a warning because the restore's `CREATE TABLE` will
/// fail on it.
pub async fn validate(job: &BackupJob, config: &MoverConfig) -> Result<()> {
    tracing::info!("Starting validation...");

    // Step 1: Client tools
    tracing::info!("Checking client tools...");
    utils::check_required_tools(&config.runner)?;
    tracing::info!("✓ Required tools found");

    // Step 2: Connect to source
    tracing::info!("Connecting to source database {}...", config.source);
    let source_client = postgres::connect_with_retry(&config.source)
        .await
        .context("Failed to connect to source database")?;
    tracing::info!("✓ Connected to source");

    // Step 3: Source table
    tracing::info!("Looking up {}...", job.source_qualified());
    let Some(table) =
        postgres::find_table(&source_client, job.source_schema(), job.table_name()).await?
    else {
        bail!(
            "Source table {} does not exist on {}",
            job.source_qualified(),
            config.source
        );
    };
    let source_privs =
        postgres::check_source_privileges(&source_client, &table.schema, &table.name).await?;
    if !source_privs.can_select && !source_privs.is_superuser {
        bail!(
            "User '{}' lacks SELECT on {}. Grant with: GRANT SELECT ON {} TO {};",
            config.source.user,
            job.source_qualified(),
            job.source_qualified(),
            config.source.user
        );
    }
    tracing::info!(
        "✓ Source table found (~{} rows, {})",
        table.row_count_estimate,
        postgres::format_bytes(table.total_bytes)
    );

    // Step 4: Connect to target
    tracing::info!("Connecting to target database {}...", config.target);
    let target_client = postgres::connect_with_retry(&config.target)
        .await
        .context("Failed to connect to target database")?;
    tracing::info!("✓ Connected to target");

    // Step 5: Target schema
    if !postgres::schema_exists(&target_client, job.target_schema()).await? {
        bail!(
            "Target schema '{}' does not exist on {}. Create it with: CREATE SCHEMA {};",
            job.target_schema(),
            config.target,
            job.target_schema()
        );
    }
    let target_privs = postgres::check_target_privileges(&target_client, job.target_schema()).await?;
    if !target_privs.can_create && !target_privs.is_superuser {
        bail!(
            "User '{}' lacks CREATE on schema '{}'. Grant with: GRANT CREATE ON SCHEMA {} TO {};",
            config.target.user,
            job.target_schema(),
            job.target_schema(),
            config.target.user
        );
    }
    tracing::info!("✓ Target schema '{}' is writable", job.target_schema());

    if postgres::find_table(&target_client, job.target_schema(), job.table_name())
        .await?
        .is_some()
    {
        tracing::warn!(
            "⚠ {} already exists on the target; the restore will fail on CREATE TABLE",
            job.target_qualified()
        );
        tracing::warn!("  Drop it first if you want a fresh copy");
    }

    tracing::info!("✅ Validation complete - ready to move {}", job.source_qualified());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, ConnectionOverrides};

    #[tokio::test]
    #[ignore]
    async fn test_validate_against_env_database() {
        let mut conn = ConnectionConfig::default();
        ConnectionOverrides::from_env().unwrap().apply_to(&mut conn);
        let job = BackupJob::new("pg_catalog", "public", "pg_class").unwrap();

        // pg_class exists everywhere; only the target privileges may vary
        match validate(&job, &MoverConfig::new(conn)).await {
            Ok(()) => println!("✓ Validation passed"),
            Err(e) => println!("Validation failed: {:?}", e),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_validate_with_unreachable_source_fails() {
        let conn = ConnectionConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..ConnectionConfig::default()
        };
        let job = BackupJob::new("public", "public_test", "readings").unwrap();
        let config = MoverConfig::new(conn).with_runner(crate::mover::ToolRunner::Local {
            pg_dump: crate::mover::Program::new("/bin/sh"),
            psql: crate::mover::Program::new("/bin/sh"),
        });

        assert!(validate(&job, &config).await.is_err());
    }
}
