// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Precondition validation.
//!
//! Checks that every file a plan depends on exists and can be read, and that
//! every external tool the plan calls is installed, before anything runs.
//! Only the first failure is reported.

use crate::{config::Preconditions, pipeline::stage::Stage, target::TargetEnvironment};

use std::{
    env,
    ffi::OsString,
    fs::{self, File},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Validate plan preconditions.
///
/// # Invariant
///
/// - Artifacts are checked in insertion order, without duplicates.
/// - Tools are checked only after all artifacts exist.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PreconditionValidator {
    artifacts: Vec<PathBuf>,
    tools: Vec<String>,
    search_path: Option<OsString>,
}

impl PreconditionValidator {
    /// Construct new validator from absolute artifact paths and tool names.
    pub fn new(
        artifacts: impl IntoIterator<Item = impl Into<PathBuf>>,
        tools: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut validator = Self::default();
        for artifact in artifacts {
            validator.push_artifact(artifact.into());
        }
        validator.tools = tools.into_iter().map(Into::into).collect();

        validator
    }

    /// Collect everything a plan needs before it can run.
    ///
    /// Explicit artifacts come first, then the target's variables file and
    /// inventory, then every file referenced by a stage in stage order.
    pub fn for_plan(
        preconditions: &Preconditions,
        target: &TargetEnvironment,
        stages: &[Stage],
    ) -> Self {
        let mut artifacts = preconditions
            .artifacts
            .iter()
            .map(|path| target.resolve_path(path))
            .collect::<Vec<_>>();
        artifacts.extend(target.vars_file().map(Path::to_path_buf));
        artifacts.extend(target.inventory().map(Path::to_path_buf));
        artifacts.extend(
            stages
                .iter()
                .flat_map(|stage| stage.action.artifacts())
                .map(|path| target.resolve_path(path)),
        );

        Self::new(artifacts, preconditions.tools.iter().cloned())
    }

    /// Look up tools in given search path instead of `$PATH`.
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    pub fn tools(&self) -> &[String] {
        &self.tools
    }

    fn push_artifact(&mut self, path: PathBuf) {
        if !self.artifacts.contains(&path) {
            self.artifacts.push(path);
        }
    }

    /// Check all preconditions.
    ///
    /// # Errors
    ///
    /// - Return [`PreconditionError::MissingArtifact`] for the first artifact
    ///   that does not exist or cannot be read.
    /// - Return [`PreconditionError::MissingTool`] for the first tool that is
    ///   not an executable in the search path.
    #[instrument(skip(self), level = "debug")]
    pub fn check(&self) -> Result<()> {
        for artifact in &self.artifacts {
            debug!("check artifact {:?}", artifact.display());
            if !is_readable(artifact) {
                return Err(PreconditionError::MissingArtifact(artifact.clone()));
            }
        }
        info!("all {} required artifacts exist", self.artifacts.len());

        let search_path = self.search_path.clone().or_else(|| env::var_os("PATH"));
        for tool in &self.tools {
            debug!("check tool {tool:?}");
            if !is_installed(tool, search_path.as_deref()) {
                return Err(PreconditionError::MissingTool(tool.clone()));
            }
        }
        if !self.tools.is_empty() {
            info!("all {} required tools installed", self.tools.len());
        }

        Ok(())
    }
}

fn is_readable(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => fs::read_dir(path).is_ok(),
        Ok(_) => File::open(path).is_ok(),
        Err(_) => false,
    }
}

fn is_installed(tool: &str, search_path: Option<&std::ffi::OsStr>) -> bool {
    // INVARIANT: Tool names with a separator are paths, never searched for.
    if tool.contains(std::path::MAIN_SEPARATOR) {
        return is_executable(Path::new(tool));
    }

    search_path
        .map(|paths| env::split_paths(paths).any(|dir| is_executable(&dir.join(tool))))
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

/// Unmet precondition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    /// Required artifact does not exist, or cannot be read.
    #[error("required artifact {:?} is missing or unreadable", .0.display())]
    MissingArtifact(PathBuf),

    /// Required tool is not installed.
    #[error("required tool {0:?} is not installed")]
    MissingTool(String),
}

/// Friendly result alias :3
pub type Result<T, E = PreconditionError> = std::result::Result<T, E>;
