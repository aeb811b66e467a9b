// ABOUTME: Connection and job configuration for the table mover
// ABOUTME: Layers defaults, TOML file, environment variables, and CLI flags

use crate::mover::tools::ToolRunner;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default per-stage timeout for external tools (one hour)
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 3600;

pub const ENV_HOST: &str = "PG_HOST";
pub const ENV_PORT: &str = "PG_PORT";
pub const ENV_USER: &str = "PG_USER";
pub const ENV_PASSWORD: &str = "PGPASSWORD";
pub const ENV_DATABASE: &str = "PG_DB";

/// Parameters needed to reach one PostgreSQL database
///
/// The mover treats this as opaque input; credential resolution happens in
/// this module and the CLI, never inside the workflow stages.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: None,
            database: "postgres".to_string(),
        }
    }
}

// Keep passwords out of logs and panic messages
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .finish()
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

impl ConnectionConfig {
    /// Build a tokio-postgres config for preflight queries
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .dbname(&self.database)
            .application_name("postgres-table-mover");
        if let Some(password) = &self.password {
            config.password(password);
        }
        config
    }
}

/// Partial connection settings from one configuration layer
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl ConnectionOverrides {
    /// Read `PG_HOST`, `PG_PORT`, `PG_USER`, `PGPASSWORD` and `PG_DB`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match non_empty(ENV_PORT) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u16>()
                    .with_context(|| format!("{} must be a port number, got '{}'", ENV_PORT, raw))?,
            ),
            None => None,
        };

        Ok(Self {
            host: non_empty(ENV_HOST),
            port,
            user: non_empty(ENV_USER),
            password: lookup(ENV_PASSWORD),
            database: non_empty(ENV_DATABASE),
        })
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Overwrite every field of `base` this layer sets
    pub fn apply_to(&self, base: &mut ConnectionConfig) {
        if let Some(host) = &self.host {
            base.host = host.clone();
        }
        if let Some(port) = self.port {
            base.port = port;
        }
        if let Some(user) = &self.user {
            base.user = user.clone();
        }
        if let Some(password) = &self.password {
            base.password = Some(password.clone());
        }
        if let Some(database) = &self.database {
            base.database = database.clone();
        }
    }
}

/// `[job]` table of the configuration file
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct JobSection {
    pub work_dir: Option<PathBuf>,
    pub docker_image: Option<String>,
    pub stage_timeout_secs: Option<u64>,
    pub stop_on_error: Option<bool>,
}

/// Contents of a `table-mover.toml` file
///
/// ```toml
/// [source]
/// host = "db.internal"
/// user = "analytics"
/// database = "metering"
///
/// [target]
/// database = "metering_test"
///
/// [job]
/// docker_image = "postgres:15.8"
/// stage_timeout_secs = 600
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub source: ConnectionOverrides,
    pub target: Option<ConnectionOverrides>,
    pub job: JobSection,
}

impl FileConfig {
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse configuration file")
    }
}

/// Load a TOML configuration file from disk
pub fn load_config_file(path: &Path) -> Result<FileConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
    FileConfig::parse(&contents)
        .with_context(|| format!("Invalid configuration file {}", path.display()))
}

/// Everything the mover needs besides the job identifiers
#[derive(Debug, Clone)]
pub struct MoverConfig {
    pub source: ConnectionConfig,
    pub target: ConnectionConfig,
    pub runner: ToolRunner,
    /// Directory holding the transient artifacts
    pub work_dir: PathBuf,
    /// `None` lets a stage block forever
    pub stage_timeout: Option<Duration>,
    /// Run psql with `ON_ERROR_STOP=1` so a failing statement fails the stage
    pub stop_on_error: bool,
}

impl MoverConfig {
    /// Same connection for export and apply, local tools, current directory
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            source: connection.clone(),
            target: connection,
            runner: ToolRunner::default(),
            work_dir: PathBuf::from("."),
            stage_timeout: Some(Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS)),
            stop_on_error: true,
        }
    }

    pub fn with_target(mut self, target: ConnectionConfig) -> Self {
        self.target = target;
        self
    }

    pub fn with_runner(mut self, runner: ToolRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }
}

/// Settings supplied on the command line, highest precedence
#[derive(Debug, Clone, Default)]
pub struct CliSettings {
    pub connection: ConnectionOverrides,
    pub work_dir: Option<PathBuf>,
    pub docker_image: Option<String>,
    pub stage_timeout_secs: Option<u64>,
    pub no_stop_on_error: bool,
}

/// Resolve the final configuration: CLI > environment > file > defaults
///
/// Environment and CLI connection settings describe the source; the target
/// starts as a copy of the resolved source and then takes the file's
/// `[target]` overrides.
pub fn resolve(
    file: Option<&FileConfig>,
    env: &ConnectionOverrides,
    cli: &CliSettings,
) -> MoverConfig {
    let default_file = FileConfig::default();
    let file = file.unwrap_or(&default_file);

    let mut source = ConnectionConfig::default();
    file.source.apply_to(&mut source);
    env.apply_to(&mut source);
    cli.connection.apply_to(&mut source);

    let mut target = source.clone();
    if let Some(target_overrides) = &file.target {
        target_overrides.apply_to(&mut target);
    }

    let runner = match cli.docker_image.as_ref().or(file.job.docker_image.as_ref()) {
        Some(image) => ToolRunner::docker(image.clone()),
        None => ToolRunner::default(),
    };

    let timeout_secs = cli
        .stage_timeout_secs
        .or(file.job.stage_timeout_secs)
        .unwrap_or(DEFAULT_STAGE_TIMEOUT_SECS);
    let stage_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

    let stop_on_error = !cli.no_stop_on_error && file.job.stop_on_error.unwrap_or(true);

    let work_dir = cli
        .work_dir
        .clone()
        .or_else(|| file.job.work_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    MoverConfig::new(source)
        .with_target(target)
        .with_runner(runner)
        .with_work_dir(work_dir)
        .with_stage_timeout(stage_timeout)
        .with_stop_on_error(stop_on_error)
}
