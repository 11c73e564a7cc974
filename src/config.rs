// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for plan files to simplify the process of serialization
//! and deserialization. File I/O is left to the caller to figure out.

use crate::pipeline::{
    probe::Probe,
    stage::{Action, Stage},
};

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Plan definition layout.
///
/// A __plan__ declares everything a deployment pipeline needs: the target
/// environment to provision, the preconditions to check beforehand, and the
/// ordered listing of stages to run.
///
/// # General Layout
///
/// A plan is composed of four parts: settings, target, preconditions, and
/// stages. The settings section describes the plan itself, and whether the
/// operator must confirm a run. The target section names the environment and
/// how to probe it. The preconditions section lists extra files and tools
/// that must exist. The stage section lists each stage in the order they run.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PlanDefinition {
    /// Settings for the plan.
    pub settings: PlanSettings,

    /// Target environment to provision.
    pub target: TargetSettings,

    /// Extra preconditions beyond files referenced by stages.
    #[serde(default)]
    pub preconditions: Preconditions,

    /// Ordered listing of stages.
    #[serde(rename = "stage", default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<Stage>,
}

impl FromStr for PlanDefinition {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut plan: PlanDefinition = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: No two stages share a name.
        let mut seen = HashSet::new();
        if let Some(stage) = plan.stages.iter().find(|stage| !seen.insert(stage.name.as_str())) {
            return Err(ConfigError::DuplicateStage(stage.name.clone()));
        }

        // INVARIANT: Perform shell expansion on every path and variable value.
        let target = &mut plan.target;
        for path in [
            &mut target.inventory,
            &mut target.vars_file,
            &mut target.kubeconfig,
        ]
        .into_iter()
        .flatten()
        {
            *path = expand_path(path)?;
        }
        for value in target.variables.values_mut() {
            *value = expand(value)?;
        }
        for path in &mut plan.preconditions.artifacts {
            *path = expand_path(path)?;
        }
        for stage in &mut plan.stages {
            match &mut stage.action {
                Action::Playbook { path, .. } => *path = expand_path(path)?,
                Action::HelmRelease { values, .. } => {
                    for path in values {
                        *path = expand_path(path)?;
                    }
                }
                _ => {}
            }
        }

        Ok(plan)
    }
}

impl Display for PlanDefinition {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand(value: &str) -> Result<String> {
    Ok(shellexpand::full(value)
        .map_err(ConfigError::ShellExpansion)?
        .into_owned())
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    expand(path.to_string_lossy().as_ref()).map(PathBuf::from)
}

/// Plan settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PlanSettings {
    /// Brief description of what the plan provisions.
    pub description: String,

    /// Ask operator for confirmation before running.
    #[serde(default = "default_confirm")]
    pub confirm: bool,

    /// Post-deployment guidance shown after a completed run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guidance: Vec<String>,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            description: String::new(),
            confirm: default_confirm(),
            guidance: Vec::new(),
        }
    }
}

fn default_confirm() -> bool {
    true
}

/// Target environment settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct TargetSettings {
    /// Name of target environment.
    pub name: String,

    /// Ansible inventory file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<PathBuf>,

    /// Variables file forwarded to Ansible as extra vars.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vars_file: Option<PathBuf>,

    /// Kubeconfig forwarded to kubectl and helm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// Default namespace for kubectl and helm stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Runtime variables forwarded as environment to every stage.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,

    /// Connectivity probe to run before any stage.
    #[serde(default)]
    pub probe: Probe,
}

/// Extra preconditions.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Preconditions {
    /// Files that must exist and be readable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,

    /// Programs that must be installed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Two stages share the same name.
    #[error("stage {0:?} is defined more than once")]
    DuplicateStage(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::Criticality;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("BLAH", "/home/blah"), ("WEBHOOK", "https://hooks.slack.com/blah")])]
    fn deserialize_plan_definition() -> anyhow::Result<()> {
        let result: PlanDefinition = r#"
            [settings]
            description = "blah blah blah"
            guidance = ["export KUBECONFIG=$BLAH/.kube/homelab-config"]

            [target]
            name = "homelab"
            inventory = "inventory/hosts.yml"
            vars_file = "$BLAH/vars/main.yml"

            [target.variables]
            SLACK_WEBHOOK_URL = "$WEBHOOK"

            [target.probe]
            kind = "ansible-ping"
            host_pattern = "homelab"

            [preconditions]
            tools = ["ansible-playbook"]

            [[stage]]
            name = "ubuntu-setup"
            description = "Ubuntu initial setup"

            [stage.action]
            kind = "playbook"
            path = "$BLAH/playbooks/ubuntu-setup.yml"

            [[stage]]
            name = "wakeonlan-setup"
            criticality = "optional"

            [stage.action]
            kind = "playbook"
            path = "playbooks/wakeonlan-setup.yml"
        "#
        .parse()?;

        let expect = PlanDefinition {
            settings: PlanSettings {
                description: "blah blah blah".into(),
                confirm: true,
                // Guidance is shown verbatim, never expanded.
                guidance: vec!["export KUBECONFIG=$BLAH/.kube/homelab-config".into()],
            },
            target: TargetSettings {
                name: "homelab".into(),
                inventory: Some("inventory/hosts.yml".into()),
                vars_file: Some("/home/blah/vars/main.yml".into()),
                kubeconfig: None,
                namespace: None,
                variables: BTreeMap::from([(
                    "SLACK_WEBHOOK_URL".into(),
                    "https://hooks.slack.com/blah".into(),
                )]),
                probe: Probe::AnsiblePing {
                    host_pattern: "homelab".into(),
                },
            },
            preconditions: Preconditions {
                artifacts: vec![],
                tools: vec!["ansible-playbook".into()],
            },
            stages: vec![
                Stage::required(
                    "ubuntu-setup",
                    Action::Playbook {
                        path: "/home/blah/playbooks/ubuntu-setup.yml".into(),
                        extra_args: vec![],
                    },
                )
                .with_description("Ubuntu initial setup"),
                Stage::new(
                    "wakeonlan-setup",
                    Criticality::Optional,
                    Action::Playbook {
                        path: "playbooks/wakeonlan-setup.yml".into(),
                        extra_args: vec![],
                    },
                ),
            ],
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn serialize_plan_definition() -> anyhow::Result<()> {
        let plan = PlanDefinition {
            settings: PlanSettings {
                description: "blah blah blah".into(),
                confirm: false,
                guidance: vec!["kubectl get nodes".into()],
            },
            target: TargetSettings {
                name: "signoz".into(),
                namespace: Some("signoz".into()),
                probe: Probe::KubectlNodes,
                ..Default::default()
            },
            preconditions: Preconditions {
                artifacts: vec!["signoz-values.yaml".into()],
                tools: vec!["helm".into()],
            },
            stages: vec![Stage::required(
                "signoz",
                Action::HelmRelease {
                    release: "signoz".into(),
                    chart: "signoz/signoz".into(),
                    namespace: None,
                    values: vec!["signoz-values.yaml".into()],
                    create_namespace: true,
                    wait: true,
                    timeout: Some("1h".into()),
                },
            )],
        };
        let result = plan.to_string();

        for line in [
            "[settings]",
            "confirm = false",
            "[target.probe]",
            r#"kind = "kubectl-nodes""#,
            "[[stage]]",
            "[stage.action]",
            r#"kind = "helm-release""#,
            "create_namespace = true",
        ] {
            assert!(result.lines().any(|l| l == line), "missing {line:?} in:\n{result}");
        }
        assert!(!result.contains("extra_args"));
        assert_eq!(result.parse::<PlanDefinition>()?, plan);

        Ok(())
    }

    #[test]
    fn reject_duplicate_stage_names() {
        let result = r#"
            [settings]
            description = "blah"

            [target]
            name = "homelab"

            [[stage]]
            name = "k3s-install"
            action = { kind = "helm-repo-update" }

            [[stage]]
            name = "k3s-install"
            action = { kind = "helm-repo-update" }
        "#
        .parse::<PlanDefinition>();

        assert!(matches!(result, Err(ConfigError::DuplicateStage(name)) if name == "k3s-install"));
    }

    #[test]
    fn reject_unset_variable() {
        let result = r#"
            [settings]
            description = "blah"

            [target]
            name = "homelab"
            vars_file = "$HOMELAB_UNSET_BLAH/vars/main.yml"
        "#
        .parse::<PlanDefinition>();

        assert!(matches!(result, Err(ConfigError::ShellExpansion(_))));
    }
}
