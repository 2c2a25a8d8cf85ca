//! Shell command execution.
//!
//! Runs configured command templates (task tracker updates, step executors)
//! through the platform shell and captures their output.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command as ProcessCommand, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").unwrap());

/// Result of executing a command.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Exit status of the command
    pub status: ExitStatus,

    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Time taken to execute
    pub duration: Duration,
}

impl ExecutionResult {
    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code.
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// Short description of a failure, preferring stderr.
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        let detail = if stderr.is_empty() { self.stdout.trim() } else { stderr };
        match self.code() {
            Some(code) if detail.is_empty() => format!("exited with code {code}"),
            Some(code) => format!("exited with code {code}: {detail}"),
            None => format!("terminated by signal: {detail}"),
        }
    }
}

/// Runs shell commands with captured output.
#[derive(Debug, Default, Clone)]
pub struct ShellRunner {
    /// Working directory for spawned commands
    pub working_dir: Option<PathBuf>,

    /// Extra environment variables
    pub env: HashMap<String, String>,
}

impl ShellRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Run a command line through the shell.
    pub fn run(&self, command: &str) -> anyhow::Result<ExecutionResult> {
        let start = Instant::now();
        let (shell, shell_arg) = get_shell();

        let mut cmd = ProcessCommand::new(shell);
        cmd.arg(shell_arg).arg(command);

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        tracing::debug!(command = command, "Running shell command");
        let output = cmd.output()?;

        Ok(ExecutionResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration: start.elapsed(),
        })
    }
}

/// Replace `{{ name }}` placeholders with shell-quoted values.
///
/// Unknown placeholders are left in place.
pub fn render_template(template: &str, vars: &HashMap<&str, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            vars.get(name).map_or_else(|| caps[0].to_string(), |value| shell_quote(value))
        })
        .to_string()
}

/// Quote a value for POSIX shells.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Get the shell and argument for the current platform.
fn get_shell() -> (&'static str, &'static str) {
    if cfg!(target_os = "windows") {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    }
}
