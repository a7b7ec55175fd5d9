//! External command runner.
//!
//! Every collector obtains its raw input by running one LSF user command
//! (`bhosts`, `lsload`, ...) through a [`CommandSource`]. The production
//! source is [`CommandRunner`], which spawns the program inside an
//! [`LsfEnvironment`] validated once at startup.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

use crate::config::{ConfigError, LsfConfig, require_dir};

/// Errors raised while invoking an external command.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The program could not be started or its output could not be read.
    #[error("error while calling '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The program exited unsuccessfully.
    #[error("error while calling '{}': {}: {}", .command, exit_desc(.code), .stderr)]
    Status {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The program exceeded the configured command timeout and was killed.
    #[error("error while calling '{command}': timed out after {after:?}")]
    Timeout { command: String, after: Duration },
}

fn exit_desc(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

impl ExecutionError {
    /// Standard error captured from a program that exited unsuccessfully.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Status { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Source of raw command output.
#[async_trait::async_trait]
pub trait CommandSource: Send + Sync + 'static {
    /// Run `program` with `args` and return its standard output.
    async fn output(&self, program: &str, args: &[&str]) -> Result<Vec<u8>, ExecutionError>;
}

/// Validated LSF directory layout and the child environment derived from it.
#[derive(Debug, Clone)]
pub struct LsfEnvironment {
    envdir: PathBuf,
    bindir: PathBuf,
    serverdir: PathBuf,
    libdir: Option<PathBuf>,
}

impl LsfEnvironment {
    /// Check that the configured directories exist.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` naming the first missing directory.
    pub fn new(config: &LsfConfig) -> Result<Self, ConfigError> {
        let env = Self {
            envdir: config.envdir_path(),
            bindir: config.bindir_path(),
            serverdir: config.serverdir_path(),
            libdir: config.libdir_path(),
        };

        require_dir("LSF_ENVDIR", &env.envdir)?;
        require_dir("LSF_BINDIR", &env.bindir)?;
        require_dir("LSF_SERVERDIR", &env.serverdir)?;
        if let Some(libdir) = &env.libdir {
            require_dir("LSF_LIBDIR", libdir)?;
        }

        Ok(env)
    }

    /// Directory holding the LSF user commands.
    pub fn bindir(&self) -> &Path {
        &self.bindir
    }

    /// Environment variables set on every child process.
    pub fn vars(&self) -> Vec<(&'static str, OsString)> {
        let mut vars = vec![
            (
                "PATH",
                prepend_paths(&[&self.bindir, &self.serverdir], std::env::var_os("PATH")),
            ),
            ("LSF_ENVDIR", self.envdir.clone().into_os_string()),
            ("LSF_BINDIR", self.bindir.clone().into_os_string()),
            ("LSF_SERVERDIR", self.serverdir.clone().into_os_string()),
        ];
        if let Some(libdir) = &self.libdir {
            vars.push(("LSF_LIBDIR", libdir.clone().into_os_string()));
            vars.push((
                "LD_LIBRARY_PATH",
                prepend_paths(&[libdir], std::env::var_os("LD_LIBRARY_PATH")),
            ));
        }
        vars
    }

    /// Resolve a program name, preferring the copy in `LSF_BINDIR`.
    pub fn resolve(&self, program: &str) -> PathBuf {
        let candidate = self.bindir.join(program);
        if candidate.is_file() {
            candidate
        } else {
            PathBuf::from(program)
        }
    }
}

fn prepend_paths(dirs: &[&PathBuf], inherited: Option<OsString>) -> OsString {
    let inherited = inherited.unwrap_or_default();
    let paths = dirs
        .iter()
        .map(|d| d.to_path_buf())
        .chain(std::env::split_paths(&inherited));
    std::env::join_paths(paths).unwrap_or(inherited)
}

/// Spawns LSF commands as child processes.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    env: LsfEnvironment,
    timeout: Option<Duration>,
}

impl CommandRunner {
    /// Create a runner for the given environment.
    pub fn new(env: LsfEnvironment) -> Self {
        Self { env, timeout: None }
    }

    /// Kill commands that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl CommandSource for CommandRunner {
    async fn output(&self, program: &str, args: &[&str]) -> Result<Vec<u8>, ExecutionError> {
        let command = command_line(program, args);
        tracing::debug!(command = %command, "Running LSF command");

        let mut cmd = Command::new(self.env.resolve(program));
        cmd.args(args)
            .envs(self.env.vars())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(after) => tokio::time::timeout(after, cmd.output())
                .await
                .map_err(|_| ExecutionError::Timeout {
                    command: command.clone(),
                    after,
                })?,
            None => cmd.output().await,
        }
        .map_err(|source| ExecutionError::Spawn {
            command: command.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(ExecutionError::Status {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

/// Render `program args...` for log and error messages.
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
