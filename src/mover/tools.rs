// ABOUTME: Structured invocation of pg_dump and psql, locally or in docker
// ABOUTME: Builds explicit argument lists and runs them with an optional timeout

use crate::config::{ConnectionConfig, ENV_PASSWORD};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::Command;

/// An executable plus arguments that always precede the generated ones
///
/// Leading arguments allow wrappers such as `sudo -u postgres pg_dump`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub path: PathBuf,
    pub leading_args: Vec<String>,
}

impl Program {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Where the PostgreSQL client tools run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRunner {
    /// Binaries on this host
    Local { pg_dump: Program, psql: Program },
    /// A throwaway `docker run --rm` container of the given image
    Docker { docker: Program, image: String },
}

impl Default for ToolRunner {
    fn default() -> Self {
        ToolRunner::Local {
            pg_dump: Program::new("pg_dump"),
            psql: Program::new("psql"),
        }
    }
}

impl ToolRunner {
    pub fn docker(image: impl Into<String>) -> Self {
        ToolRunner::Docker {
            docker: Program::new("docker"),
            image: image.into(),
        }
    }

    /// Executables that must be on PATH for this runner
    pub fn required_programs(&self) -> Vec<&Path> {
        match self {
            ToolRunner::Local { pg_dump, psql } => vec![pg_dump.path.as_path(), psql.path.as_path()],
            ToolRunner::Docker { docker, .. } => vec![docker.path.as_path()],
        }
    }

    /// Command exporting one table to stdout
    pub fn dump_command(&self, conn: &ConnectionConfig, qualified_table: &str) -> ToolInvocation {
        let mut args = connection_args(conn);
        args.push("--table".to_string());
        args.push(qualified_table.to_string());
        self.invocation("pg_dump", args, conn, false)
    }

    /// Command applying a SQL script read from stdin
    pub fn apply_command(&self, conn: &ConnectionConfig, stop_on_error: bool) -> ToolInvocation {
        let mut args = connection_args(conn);
        args.push("--no-psqlrc".to_string());
        args.push("--quiet".to_string());
        if stop_on_error {
            args.push("--set".to_string());
            args.push("ON_ERROR_STOP=1".to_string());
        }
        args.push("--file=-".to_string());
        self.invocation("psql", args, conn, true)
    }

    fn invocation(
        &self,
        tool: &'static str,
        tool_args: Vec<String>,
        conn: &ConnectionConfig,
        needs_stdin: bool,
    ) -> ToolInvocation {
        let env = conn
            .password
            .as_ref()
            .map(|password| vec![(ENV_PASSWORD.to_string(), password.clone())])
            .unwrap_or_default();

        match self {
            ToolRunner::Local { pg_dump, psql } => {
                let program = if tool == "pg_dump" { pg_dump } else { psql };
                let mut args = program.leading_args.clone();
                args.extend(tool_args);
                ToolInvocation {
                    tool,
                    program: program.path.clone(),
                    args,
                    env,
                    container: None,
                }
            }
            ToolRunner::Docker { docker, image } => {
                let container = Container {
                    docker: docker.clone(),
                    name: container_name(tool),
                };
                let mut args = docker.leading_args.clone();
                args.push("run".to_string());
                args.push("--rm".to_string());
                args.push("--name".to_string());
                args.push(container.name.clone());
                if needs_stdin {
                    args.push("-i".to_string());
                }
                if conn.password.is_some() {
                    // Forward by name so the secret never lands in argv
                    args.push("-e".to_string());
                    args.push(ENV_PASSWORD.to_string());
                }
                args.push(image.clone());
                args.push(tool.to_string());
                args.extend(tool_args);
                ToolInvocation {
                    tool,
                    program: docker.path.clone(),
                    args,
                    env,
                    container: Some(container),
                }
            }
        }
    }
}

fn connection_args(conn: &ConnectionConfig) -> Vec<String> {
    vec![
        "--host".to_string(),
        conn.host.clone(),
        "--port".to_string(),
        conn.port.to_string(),
        "--username".to_string(),
        conn.user.clone(),
        "--dbname".to_string(),
        conn.database.clone(),
    ]
}

/// Unique per process and call, so a stuck container can be stopped by name
fn container_name(tool: &str) -> String {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    format!(
        "postgres-table-mover-{}-{}-{}",
        tool.replace('_', "-"),
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    )
}

const KILL_TIMEOUT: Duration = Duration::from_secs(30);

/// A named `docker run` container backing an invocation
///
/// Killing the docker CLI does not stop the container, so it has to be
/// stopped through the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub docker: Program,
    pub name: String,
}

impl Container {
    fn kill_args(&self) -> Vec<String> {
        let mut args = self.docker.leading_args.clone();
        args.push("kill".to_string());
        args.push(self.name.clone());
        args
    }

    /// `docker kill <name>`, waiting for the daemon to confirm
    pub async fn kill(&self) {
        let mut cmd = Command::new(&self.docker.path);
        cmd.args(self.kill_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(KILL_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                tracing::info!("Stopped container {}", self.name)
            }
            Ok(Ok(output)) => tracing::warn!(
                "⚠ docker kill {} failed: {}",
                self.name,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Ok(Err(e)) => tracing::warn!("⚠ Could not run docker kill {}: {}", self.name, e),
            Err(_) => tracing::warn!("⚠ docker kill {} did not finish in {:?}", self.name, KILL_TIMEOUT),
        }
    }

    /// Fire-and-forget kill for paths that cannot await
    fn kill_detached(&self) {
        let spawned = std::process::Command::new(&self.docker.path)
            .args(self.kill_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        if let Err(e) = spawned {
            tracing::warn!("⚠ Could not run docker kill {}: {}", self.name, e);
        }
    }
}

/// Stops the container if the run is abandoned before the tool exits
struct ContainerReaper<'a>(Option<&'a Container>);

impl Drop for ContainerReaper<'_> {
    fn drop(&mut self) {
        if let Some(container) = self.0.take() {
            container.kill_detached();
        }
    }
}

/// A fully specified external command
#[derive(Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Logical tool name used in diagnostics (`pg_dump`, `psql`)
    pub tool: &'static str,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Set when the tool runs inside a docker container
    pub container: Option<Container>,
}

impl fmt::Debug for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("ToolInvocation")
            .field("tool", &self.tool)
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env_keys)
            .field("container", &self.container.as_ref().map(|c| c.name.as_str()))
            .finish()
    }
}

/// Why an external tool run did not succeed
#[derive(Debug)]
pub enum ToolFailure {
    /// Could not open the stdin source or create the stdout sink
    Io { path: PathBuf, source: std::io::Error },
    Spawn { program: PathBuf, source: std::io::Error },
    Wait(std::io::Error),
    Exit { status: ExitStatus, diagnostic: String },
    Timeout(Duration),
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolFailure::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            ToolFailure::Spawn { program, source } => write!(
                f,
                "could not start {}: {}. Is the PostgreSQL client (or docker) installed?",
                program.display(),
                source
            ),
            ToolFailure::Wait(source) => write!(f, "failed waiting for process: {}", source),
            ToolFailure::Exit { status, diagnostic } => {
                match status.code() {
                    Some(code) => write!(f, "exited with status {}", code)?,
                    None => write!(f, "terminated by signal")?,
                }
                if !diagnostic.is_empty() {
                    write!(f, ": {}", diagnostic)?;
                }
                Ok(())
            }
            ToolFailure::Timeout(limit) => write!(f, "timed out after {:?}", limit),
        }
    }
}

/// Captured result of a successful run
#[derive(Debug, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run an invocation to completion
///
/// `stdin_from` streams a file into the child; `stdout_to` truncates or
/// creates a file and sends the child's stdout there, otherwise stdout is
/// captured. The child is killed if the timeout elapses; a docker-backed run
/// also has its container killed, both on timeout and when the returned future
/// is dropped early.
pub async fn run(
    invocation: &ToolInvocation,
    stdin_from: Option<&Path>,
    stdout_to: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<ToolOutput, ToolFailure> {
    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &invocation.env {
        cmd.env(key, value);
    }

    match stdin_from {
        Some(path) => {
            let file = std::fs::File::open(path).map_err(|source| ToolFailure::Io {
                path: path.to_path_buf(),
                source,
            })?;
            cmd.stdin(Stdio::from(file));
        }
        None => {
            cmd.stdin(Stdio::null());
        }
    }

    match stdout_to {
        Some(path) => {
            let file = std::fs::File::create(path).map_err(|source| ToolFailure::Io {
                path: path.to_path_buf(),
                source,
            })?;
            cmd.stdout(Stdio::from(file));
        }
        None => {
            cmd.stdout(Stdio::piped());
        }
    }

    tracing::debug!("Running {:?}", invocation);

    let child = cmd.spawn().map_err(|source| ToolFailure::Spawn {
        program: invocation.program.clone(),
        source,
    })?;

    let mut reaper = ContainerReaper(invocation.container.as_ref());
    let wait = child.wait_with_output();
    let waited = match timeout {
        Some(limit) => match tokio::time::timeout(limit, wait).await {
            Ok(waited) => waited,
            Err(_) => {
                if let Some(container) = reaper.0.take() {
                    container.kill().await;
                }
                return Err(ToolFailure::Timeout(limit));
            }
        },
        None => wait.await,
    };
    reaper.0 = None;
    let output = waited.map_err(ToolFailure::Wait)?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let diagnostic = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(ToolFailure::Exit {
            status: output.status,
            diagnostic,
        });
    }

    Ok(ToolOutput { stdout, stderr })
}
