// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Stage execution logic.
//!
//! Every stage boils down to one external process, e.g., `ansible-playbook` or
//! `helm`. Execution only captures what that process did: the exit status, and
//! whatever it wrote to stdout and stderr. Zero exit status means the stage
//! succeeded, anything else means it failed. The captured text is never
//! interpreted.

use crate::{pipeline::stage::{Criticality, Stage}, target::TargetEnvironment};

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    process::{Command, Stdio},
    time::Duration,
};
use tracing::{debug, info, instrument, warn};

/// Fully rendered external command.
///
/// Never passed through a shell. Arguments reach the program as-is.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    /// Construct new invocation of target program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Bind invocation to target environment.
    ///
    /// Runs inside the plan root with the target's runtime variables.
    pub fn within(mut self, target: &TargetEnvironment) -> Self {
        self.env = target.environment();
        self.current_dir = Some(target.root().to_path_buf());
        self
    }
}

impl Display for Invocation {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&quote(&self.program))?;
        for arg in &self.args {
            write!(fmt, " {}", quote(arg))?;
        }

        Ok(())
    }
}

fn quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+%".contains(c))
    {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Raw output of finished external process.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    /// Exit code, or [`None`] if the process was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    pub fn success() -> Self {
        Self {
            status: Some(0),
            ..Default::default()
        }
    }

    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stderr: stderr.into(),
            ..Default::default()
        }
    }
}

/// Layer of indirection for spawning external processes.
///
/// Implementations must block until the process finishes.
pub trait CommandRunner {
    /// Run invocation to completion under a human readable label.
    fn run(&self, label: &str, invocation: &Invocation) -> Result<Captured>;
}

impl<R> CommandRunner for &R
where
    R: CommandRunner,
{
    fn run(&self, label: &str, invocation: &Invocation) -> Result<Captured> {
        (**self).run(label, invocation)
    }
}

/// Run external processes through [`std::process::Command`].
///
/// Shows a spinner with the label of the current invocation on stderr while
/// waiting. The spinner hides itself when stderr is not a terminal.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner {
    quiet: bool,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never draw the spinner.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    fn spinner(&self, label: &str) -> Result<ProgressBar> {
        if self.quiet {
            return Ok(ProgressBar::hidden());
        }

        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.yellow} {elapsed_precise:.green}  {msg}")?;
        bar.set_style(style);
        bar.set_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        Ok(bar)
    }
}

impl CommandRunner for ProcessRunner {
    #[instrument(skip(self, invocation), level = "debug")]
    fn run(&self, label: &str, invocation: &Invocation) -> Result<Captured> {
        debug!("spawn {invocation}");
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null());
        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir);
        }

        let bar = self.spinner(label)?;
        let output = command.output();
        bar.finish_and_clear();

        let output = output.map_err(|source| ExecError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        Ok(Captured {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Result of one stage execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub stage_name: String,
    pub criticality: Criticality,
    pub succeeded: bool,

    /// Exit status of the external process, `-1` if it never produced one.
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl StepResult {
    fn from_captured(stage: &Stage, captured: Captured) -> Self {
        Self {
            stage_name: stage.name.clone(),
            criticality: stage.criticality,
            succeeded: captured.status == Some(0),
            exit_status: captured.status.unwrap_or(-1),
            stdout: captured.stdout,
            stderr: captured.stderr,
        }
    }

    fn from_error(stage: &Stage, error: &ExecError) -> Self {
        Self {
            stage_name: stage.name.clone(),
            criticality: stage.criticality,
            succeeded: false,
            exit_status: -1,
            stdout: String::new(),
            stderr: error.to_string(),
        }
    }

    /// Captured text worth showing to the operator about a failure.
    ///
    /// Tools like `ansible-playbook` report failed tasks on stdout and
    /// warnings on stderr, so both streams are kept: stdout then stderr.
    pub fn diagnostic(&self) -> String {
        diagnostic(&self.stdout, &self.stderr)
    }
}

/// Join trimmed stdout and stderr, skipping whichever is blank.
pub(crate) fn diagnostic(stdout: &str, stderr: &str) -> String {
    [stdout.trim(), stderr.trim()]
        .into_iter()
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Execute stages against a target environment.
#[derive(Debug, Default, Clone)]
pub struct StepExecutor<R = ProcessRunner>
where
    R: CommandRunner,
{
    runner: R,
}

impl<R> StepExecutor<R>
where
    R: CommandRunner,
{
    /// Construct new step executor.
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Execute stage once.
    ///
    /// Never retries, and never rolls back. A process that cannot be spawned
    /// counts as a failed stage, with the spawn error recorded as stderr.
    #[instrument(skip(self, stage, target), fields(stage = %stage.name), level = "debug")]
    pub fn execute(&self, stage: &Stage, target: &TargetEnvironment) -> StepResult {
        let invocation = stage.action.invocation(target);
        info!("{} ({}): {invocation}", stage.name, stage.criticality);

        let result = match self.runner.run(stage.label(), &invocation) {
            Ok(captured) => StepResult::from_captured(stage, captured),
            Err(error) => StepResult::from_error(stage, &error),
        };

        if result.succeeded {
            info!("{} finished", stage.name);
        } else {
            warn!("{} failed with exit status {}", stage.name, result.exit_status);
        }

        result
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// External process cannot be spawned, e.g., program is not installed.
    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Style template cannot be set for spinner.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = ExecError> = std::result::Result<T, E>;
