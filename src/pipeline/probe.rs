// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Connectivity probing.
//!
//! Before any stage mutates the target environment, a read-only probe checks
//! that the target is reachable at all. The probe is attempted exactly once.
//! A failed probe is a hard gate: no stage runs afterwards.

use crate::{
    pipeline::exec::{self, CommandRunner, Invocation},
    target::TargetEnvironment,
};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Read-only probe against target environment.
#[derive(Default, Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Probe {
    /// Skip probing, target is always considered reachable.
    #[default]
    None,

    /// Ansible ping module against host pattern.
    AnsiblePing { host_pattern: String },

    /// List cluster nodes through kubectl.
    KubectlNodes,

    /// Run arbitrary read-only program.
    Command {
        program: String,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
}

impl Probe {
    /// Render probe into external command for target environment.
    ///
    /// Returns [`None`] if there is nothing to run.
    pub fn invocation(&self, target: &TargetEnvironment) -> Option<Invocation> {
        let invocation = match self {
            Self::None => return None,
            Self::AnsiblePing { host_pattern } => {
                let mut invocation = Invocation::new("ansible").args([host_pattern.as_str(), "-m", "ping"]);
                if let Some(inventory) = target.inventory() {
                    invocation = invocation.arg("-i").arg(inventory.to_string_lossy());
                }
                if let Some(vars_file) = target.vars_file() {
                    invocation = invocation
                        .arg("--extra-vars")
                        .arg(format!("@{}", vars_file.display()));
                }
                invocation
            }
            Self::KubectlNodes => Invocation::new("kubectl").args(["get", "nodes"]),
            Self::Command { program, args } => Invocation::new(program).args(args),
        };

        Some(invocation.within(target))
    }
}

/// Outcome of a connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub reachable: bool,

    /// Captured probe output, empty when nothing was run.
    pub diagnostic: String,
}

/// Probe target environment once.
///
/// A probe whose process cannot be spawned is treated as unreachable.
#[instrument(skip(runner, target), fields(target = %target.name()), level = "debug")]
pub fn probe<R>(runner: &R, target: &TargetEnvironment) -> ProbeReport
where
    R: CommandRunner,
{
    let Some(invocation) = target.probe().invocation(target) else {
        info!("no connectivity probe configured for {:?}", target.name());
        return ProbeReport {
            reachable: true,
            diagnostic: String::new(),
        };
    };

    info!("probe {:?}: {invocation}", target.name());
    let label = format!("probe {}", target.name());
    let report = match runner.run(&label, &invocation) {
        Ok(captured) => ProbeReport {
            reachable: captured.status == Some(0),
            diagnostic: exec::diagnostic(&captured.stdout, &captured.stderr),
        },
        Err(error) => ProbeReport {
            reachable: false,
            diagnostic: error.to_string(),
        },
    };

    if report.reachable {
        info!("{:?} is reachable", target.name());
    } else {
        warn!("{:?} is unreachable", target.name());
    }

    report
}
