// ABOUTME: CLI entry point for postgres-table-mover
// ABOUTME: Parses commands, resolves configuration, and routes to handlers

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use postgres_table_mover::config::{self, CliSettings, ConnectionOverrides, FileConfig};
use postgres_table_mover::{commands, interactive, mover::BackupJob, utils};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "postgres-table-mover")]
#[command(about = "Copy a PostgreSQL table between schemas (e.g. public -> public_test)", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

// Source connection; unset flags fall back to PG_HOST, PG_PORT, PG_USER, PG_DB.
// The password is only read from PGPASSWORD or the config file.
#[derive(Args, Clone, Default)]
struct ConnectionArgs {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    dbname: Option<String>,
    /// Path to a TOML file with [source], [target] and [job] tables
    #[arg(long = "config")]
    config_path: Option<PathBuf>,
}

#[derive(Args, Clone, Default)]
struct TableArgs {
    /// Table to copy (prompted for when omitted)
    #[arg(long)]
    table: Option<String>,
    /// Schema the table is read from
    #[arg(long)]
    source_schema: Option<String>,
    /// Schema the table is restored into
    #[arg(long)]
    target_schema: Option<String>,
    /// Fail instead of prompting for missing values
    #[arg(long)]
    no_interactive: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump a table, rewrite its schema, and restore it into the target schema
    Move {
        #[command(flatten)]
        table: TableArgs,
        #[command(flatten)]
        connection: ConnectionArgs,
        /// Directory for the transient dump files (default: current directory)
        #[arg(long)]
        work_dir: Option<PathBuf>,
        /// Run pg_dump/psql inside this docker image instead of local binaries
        #[arg(long)]
        docker_image: Option<String>,
        /// Per-stage timeout in seconds, 0 disables (default: 3600)
        #[arg(long)]
        stage_timeout: Option<u64>,
        /// Keep applying after a failing statement (psql without ON_ERROR_STOP)
        #[arg(long)]
        no_stop_on_error: bool,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Check that a move can run: tools, connectivity, table, and target schema
    Validate {
        #[command(flatten)]
        table: TableArgs,
        #[command(flatten)]
        connection: ConnectionArgs,
        /// Check for this docker image's runner instead of local binaries
        #[arg(long)]
        docker_image: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Move {
            table,
            connection,
            work_dir,
            docker_image,
            stage_timeout,
            no_stop_on_error,
            yes,
        } => {
            // --yes implies automation, so it disables prompting as well
            let job = build_job(&table, table.no_interactive || yes)?;
            let settings = CliSettings {
                connection: connection_overrides(&connection),
                work_dir,
                docker_image,
                stage_timeout_secs: stage_timeout,
                no_stop_on_error,
            };
            let config = resolve_config(&connection, &settings)?;
            // ctrl-c drops the mover so its guard removes the artifacts
            utils::run_until_interrupted(
                commands::move_table(job, config, yes),
                tokio::signal::ctrl_c(),
            )
            .await??;
            Ok(())
        }
        Commands::Validate {
            table,
            connection,
            docker_image,
        } => {
            let job = build_job(&table, table.no_interactive)?;
            let settings = CliSettings {
                connection: connection_overrides(&connection),
                docker_image,
                ..CliSettings::default()
            };
            let config = resolve_config(&connection, &settings)?;
            utils::run_until_interrupted(commands::validate(&job, &config), tokio::signal::ctrl_c())
                .await?
        }
    }
}

fn build_job(args: &TableArgs, no_interactive: bool) -> anyhow::Result<BackupJob> {
    if no_interactive {
        let table = args
            .table
            .clone()
            .context("--table is required with --no-interactive or --yes")?;
        let source = args.source_schema.clone().unwrap_or_else(|| "public".to_string());
        let target = args
            .target_schema
            .clone()
            .unwrap_or_else(|| "public_test".to_string());
        return BackupJob::new(source, target, table).context("Invalid table move parameters");
    }

    interactive::complete_job(
        args.table.clone(),
        args.source_schema.clone(),
        args.target_schema.clone(),
    )
}

fn connection_overrides(args: &ConnectionArgs) -> ConnectionOverrides {
    ConnectionOverrides {
        host: args.host.clone(),
        port: args.port,
        user: args.user.clone(),
        password: None,
        database: args.dbname.clone(),
    }
}

fn resolve_config(
    args: &ConnectionArgs,
    settings: &CliSettings,
) -> anyhow::Result<config::MoverConfig> {
    let file: Option<FileConfig> = match &args.config_path {
        Some(path) => Some(config::load_config_file(path)?),
        None => None,
    };
    let env = ConnectionOverrides::from_env()?;
    Ok(config::resolve(file.as_ref(), &env, settings))
}
