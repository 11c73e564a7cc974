// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Staged deployment pipeline.
//!
//! A __pipeline__ drives a plan against its target environment in four steps:
//!
//! 1. Validate that every artifact and tool the plan needs exists.
//! 2. Probe the target environment to check that it is reachable.
//! 3. Run each stage in plan order.
//! 4. Hand the finished [`PipelineOutcome`] over to the
//!    [`Reporter`](crate::report::Reporter).
//!
//! # Criticality
//!
//! Each stage is either __required__ or __optional__. A failed required stage
//! aborts the pipeline, later stages are never attempted. A failed optional
//! stage is recorded as degraded, and the pipeline moves on. Later stages
//! assume the effects of earlier required stages exist, e.g., a cluster must
//! exist before workloads can be installed into it, while optional stages
//! like Wake-on-LAN setup or boot notifications never block that.
//!
//! # State Machine
//!
//! ```text
//! Idle -> Validating -> Probing -> Running(0) -> ... -> Running(n) -> Completed
//!              |            |          |
//!              +------------+----------+--> Aborted
//! ```
//!
//! The machine is single-threaded and synchronous. Every stage runs to
//! completion before the next one is considered. Nothing is rolled back: a
//! change applied by a finished stage stays applied, even when the pipeline
//! aborts later on. No state survives between runs.
//!
//! # Operator Gate
//!
//! Plans that mutate a shared target environment ask the operator for an
//! explicit yes once, before the pipeline leaves [`PipelineState::Idle`].

pub mod exec;
pub mod gate;
pub mod precondition;
pub mod probe;
pub mod stage;

use crate::{
    config::PlanDefinition,
    pipeline::{
        exec::{CommandRunner, ProcessRunner, StepExecutor, StepResult},
        gate::Operator,
        precondition::{PreconditionError, PreconditionValidator},
        stage::{Criticality, Stage},
    },
    target::TargetEnvironment,
};

use std::{collections::HashSet, path::PathBuf};
use tracing::{debug, info, instrument, warn};

/// States of the pipeline state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Validating,
    Probing,

    /// Running stage at given index.
    Running(usize),
    Completed,
    Aborted(AbortReason),
}

/// Why a pipeline aborted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbortReason {
    /// Operator declined the confirmation gate.
    #[error("cancelled by operator")]
    OperatorCancelled,

    /// Required artifact is missing.
    #[error("required artifact {:?} is missing or unreadable", .0.display())]
    MissingArtifact(PathBuf),

    /// Required tool is not installed.
    #[error("required tool {0:?} is not installed")]
    MissingTool(String),

    /// Connectivity probe failed.
    #[error("target {target:?} is unreachable")]
    Unreachable { target: String, diagnostic: String },

    /// Required stage failed.
    #[error("required stage {0:?} failed")]
    StageFailed(String),
}

impl From<PreconditionError> for AbortReason {
    fn from(error: PreconditionError) -> Self {
        match error {
            PreconditionError::MissingArtifact(path) => Self::MissingArtifact(path),
            PreconditionError::MissingTool(tool) => Self::MissingTool(tool),
        }
    }
}

/// Final outcome of one pipeline run.
///
/// # Invariant
///
/// - An aborted outcome holds results for a strict prefix of the configured
///   stages.
/// - A completed outcome holds no failed required stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    results: Vec<StepResult>,
    abort_reason: Option<AbortReason>,
}

impl PipelineOutcome {
    fn completed(results: Vec<StepResult>) -> Self {
        Self {
            results,
            abort_reason: None,
        }
    }

    fn aborted(results: Vec<StepResult>, reason: AbortReason) -> Self {
        Self {
            results,
            abort_reason: Some(reason),
        }
    }

    /// Step results in stage order.
    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_reason.is_some()
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        self.abort_reason.as_ref()
    }

    /// Names of attempted stages in order.
    pub fn attempted(&self) -> Vec<&str> {
        self.results
            .iter()
            .map(|result| result.stage_name.as_str())
            .collect()
    }

    /// Failed optional stages.
    pub fn degraded(&self) -> impl Iterator<Item = &StepResult> {
        self.results
            .iter()
            .filter(|result| result.criticality == Criticality::Optional && !result.succeeded)
    }

    /// Process exit code for this outcome.
    ///
    /// Degraded optional stages do not affect the exit code.
    pub fn exit_code(&self) -> i32 {
        if self.is_aborted() {
            1
        } else {
            0
        }
    }
}

/// Staged deployment pipeline.
#[derive(Debug)]
pub struct Pipeline<R = ProcessRunner>
where
    R: CommandRunner,
{
    description: String,
    confirm: bool,
    target: TargetEnvironment,
    validator: PreconditionValidator,
    stages: Vec<Stage>,
    executor: StepExecutor<R>,
}

impl<R> Pipeline<R>
where
    R: CommandRunner,
{
    /// Construct pipeline from plan definition.
    ///
    /// Relative paths in the plan resolve against `root`, i.e., the directory
    /// containing the plan file.
    ///
    /// # Errors
    ///
    /// - Return [`PipelineError::DuplicateStage`] if two stages share a name.
    pub fn from_plan(plan: &PlanDefinition, root: impl Into<PathBuf>, runner: R) -> Result<Self> {
        let target = TargetEnvironment::resolve(&plan.target, root);
        let validator = PreconditionValidator::for_plan(&plan.preconditions, &target, &plan.stages);

        Ok(Self::new(target, validator, plan.stages.clone(), runner)?
            .with_description(plan.settings.description.clone())
            .with_confirmation(plan.settings.confirm))
    }

    /// Construct pipeline from its parts.
    ///
    /// Confirmation is off by default.
    ///
    /// # Errors
    ///
    /// - Return [`PipelineError::DuplicateStage`] if two stages share a name.
    pub fn new(
        target: TargetEnvironment,
        validator: PreconditionValidator,
        stages: Vec<Stage>,
        runner: R,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        if let Some(stage) = stages.iter().find(|stage| !seen.insert(stage.name.as_str())) {
            return Err(PipelineError::DuplicateStage(stage.name.clone()));
        }

        Ok(Self {
            description: target.name().to_string(),
            confirm: false,
            target,
            validator,
            stages,
            executor: StepExecutor::new(runner),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Require operator confirmation before running.
    pub fn with_confirmation(mut self, confirm: bool) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn target(&self) -> &TargetEnvironment {
        &self.target
    }

    pub fn validator(&self) -> &PreconditionValidator {
        &self.validator
    }

    /// Configured stages in order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Run full pipeline.
    ///
    /// Asks operator for confirmation first if the plan requires it.
    #[instrument(skip(self, operator), fields(target = %self.target.name()), level = "debug")]
    pub fn run(&self, operator: &impl Operator) -> PipelineOutcome {
        if self.confirm && !operator.confirm(&self.confirmation_message(), &self.confirmation_details()) {
            warn!("run of {:?} cancelled by operator", self.description);
            return PipelineOutcome::aborted(Vec::new(), AbortReason::OperatorCancelled);
        }

        self.drive(Mode::Full)
    }

    /// Validate preconditions and probe target, without running any stage.
    #[instrument(skip(self), fields(target = %self.target.name()), level = "debug")]
    pub fn check(&self) -> PipelineOutcome {
        self.drive(Mode::CheckOnly)
    }

    fn confirmation_message(&self) -> String {
        format!(
            "Run {} stages against {:?}?",
            self.stages.len(),
            self.target.name()
        )
    }

    fn confirmation_details(&self) -> String {
        let mut details = self.description.clone();
        for (index, stage) in self.stages.iter().enumerate() {
            details.push_str(&format!(
                "\n  {}. {} ({})",
                index + 1,
                stage.label(),
                stage.criticality
            ));
        }

        details
    }

    fn drive(&self, mode: Mode) -> PipelineOutcome {
        let mut results = Vec::with_capacity(self.stages.len());
        let mut state = PipelineState::Idle;

        loop {
            debug!("pipeline state {state:?}");
            state = match state {
                PipelineState::Idle => PipelineState::Validating,
                PipelineState::Validating => match self.validator.check() {
                    Ok(()) => PipelineState::Probing,
                    Err(error) => PipelineState::Aborted(error.into()),
                },
                PipelineState::Probing => {
                    let report = probe::probe(self.executor.runner(), &self.target);
                    if !report.reachable {
                        PipelineState::Aborted(AbortReason::Unreachable {
                            target: self.target.name().to_string(),
                            diagnostic: report.diagnostic,
                        })
                    } else if mode == Mode::CheckOnly || self.stages.is_empty() {
                        PipelineState::Completed
                    } else {
                        PipelineState::Running(0)
                    }
                }
                PipelineState::Running(index) => {
                    let stage = &self.stages[index];
                    let result = self.executor.execute(stage, &self.target);
                    let fatal = stage.is_required() && !result.succeeded;
                    if !result.succeeded && !fatal {
                        warn!("optional stage {:?} degraded, continuing", stage.name);
                    }
                    results.push(result);

                    if fatal {
                        PipelineState::Aborted(AbortReason::StageFailed(stage.name.clone()))
                    } else if index + 1 == self.stages.len() {
                        PipelineState::Completed
                    } else {
                        PipelineState::Running(index + 1)
                    }
                }
                PipelineState::Completed => {
                    info!("pipeline for {:?} completed", self.target.name());
                    return PipelineOutcome::completed(results);
                }
                PipelineState::Aborted(reason) => {
                    warn!("pipeline for {:?} aborted: {reason}", self.target.name());
                    return PipelineOutcome::aborted(results, reason);
                }
            };
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Full,
    CheckOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Two stages share the same name.
    #[error("stage {0:?} is defined more than once")]
    DuplicateStage(String),
}

/// Friendly result alias :3
type Result<T, E = PipelineError> = std::result::Result<T, E>;
