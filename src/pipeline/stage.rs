// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Stage layout.
//!
//! A __stage__ is one named unit of provisioning work. Each stage carries an
//! action that names the external tool to run, and a criticality that decides
//! whether failure of the stage aborts the rest of the pipeline.

use crate::{pipeline::exec::Invocation, target::TargetEnvironment};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};

/// Whether stage failure aborts the pipeline.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    /// Failure aborts all remaining stages.
    #[default]
    Required,

    /// Failure is recorded, but the pipeline continues.
    Optional,
}

impl Display for Criticality {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Required => fmt.write_str("required"),
            Self::Optional => fmt.write_str("optional"),
        }
    }
}

/// One named unit of provisioning work.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Stage {
    /// Unique name of stage within its plan.
    pub name: String,

    /// Brief description shown while the stage runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub criticality: Criticality,

    /// Show captured stdout in the final report even when the stage succeeds.
    #[serde(default, skip_serializing_if = "is_false")]
    pub report_output: bool,

    /// External provisioning action to perform.
    pub action: Action,
}

impl Stage {
    /// Construct new stage.
    pub fn new(name: impl Into<String>, criticality: Criticality, action: Action) -> Self {
        Self {
            name: name.into(),
            description: None,
            criticality,
            report_output: false,
            action,
        }
    }

    pub fn required(name: impl Into<String>, action: Action) -> Self {
        Self::new(name, Criticality::Required, action)
    }

    pub fn optional(name: impl Into<String>, action: Action) -> Self {
        Self::new(name, Criticality::Optional, action)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_report_output(mut self) -> Self {
        self.report_output = true;
        self
    }

    pub fn is_required(&self) -> bool {
        self.criticality == Criticality::Required
    }

    /// Human readable label, description if there is one, name otherwise.
    pub fn label(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.name)
    }
}

fn is_false(value: &bool) -> bool {
    !value
}

/// External provisioning action of a stage.
///
/// What the tool does with its inputs is opaque. An action only knows how to
/// render the command line, and which files that command line references.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Action {
    /// Run Ansible playbook against the target inventory.
    Playbook {
        path: PathBuf,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        extra_args: Vec<String>,
    },

    /// Register Helm chart repository.
    HelmRepo { name: String, url: String },

    /// Refresh all registered Helm chart repositories.
    HelmRepoUpdate,

    /// Install or upgrade Helm release.
    HelmRelease {
        release: String,
        chart: String,

        /// Namespace to install into, falls back to target namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        values: Vec<PathBuf>,

        #[serde(default, skip_serializing_if = "is_false")]
        create_namespace: bool,

        #[serde(default, skip_serializing_if = "is_false")]
        wait: bool,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<String>,
    },

    /// Run kubectl, scoped to a namespace if one is known.
    Kubectl {
        args: Vec<String>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,
    },

    /// Run arbitrary program.
    Command {
        program: String,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
}

impl Action {
    /// Render action into external command for target environment.
    pub fn invocation(&self, target: &TargetEnvironment) -> Invocation {
        let invocation = match self {
            Self::Playbook { path, extra_args } => {
                let mut invocation = Invocation::new("ansible-playbook");
                if let Some(inventory) = target.inventory() {
                    invocation = invocation.arg("-i").arg(inventory.to_string_lossy());
                }
                invocation = invocation.arg(target.resolve_path(path).to_string_lossy());
                if let Some(vars_file) = target.vars_file() {
                    invocation = invocation
                        .arg("--extra-vars")
                        .arg(format!("@{}", vars_file.display()));
                }
                invocation.args(extra_args)
            }
            Self::HelmRepo { name, url } => Invocation::new("helm").args([
                "repo",
                "add",
                "--force-update",
                name.as_str(),
                url.as_str(),
            ]),
            Self::HelmRepoUpdate => Invocation::new("helm").args(["repo", "update"]),
            Self::HelmRelease {
                release,
                chart,
                namespace,
                values,
                create_namespace,
                wait,
                timeout,
            } => {
                let mut invocation = Invocation::new("helm").args([
                    "upgrade",
                    "--install",
                    release.as_str(),
                    chart.as_str(),
                ]);
                if let Some(namespace) = namespace.as_deref().or(target.namespace()) {
                    invocation = invocation.arg("--namespace").arg(namespace);
                }
                if *create_namespace {
                    invocation = invocation.arg("--create-namespace");
                }
                if *wait {
                    invocation = invocation.arg("--wait");
                }
                if let Some(timeout) = timeout {
                    invocation = invocation.arg("--timeout").arg(timeout);
                }
                for file in values {
                    invocation = invocation
                        .arg("-f")
                        .arg(target.resolve_path(file).to_string_lossy());
                }
                invocation
            }
            Self::Kubectl { args, namespace } => {
                let mut invocation = Invocation::new("kubectl");
                if let Some(namespace) = namespace.as_deref().or(target.namespace()) {
                    invocation = invocation.arg("-n").arg(namespace);
                }
                invocation.args(args)
            }
            Self::Command { program, args } => Invocation::new(program).args(args),
        };

        invocation.within(target)
    }

    /// Files that this action reads, relative to the plan root.
    pub fn artifacts(&self) -> Vec<PathBuf> {
        match self {
            Self::Playbook { path, .. } => vec![path.clone()],
            Self::HelmRelease { values, .. } => values.clone(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    fn cluster_target() -> TargetEnvironment {
        let settings = crate::config::TargetSettings {
            name: "homelab".into(),
            inventory: Some("inventory/hosts.yml".into()),
            vars_file: Some("vars/main.yml".into()),
            ..Default::default()
        };
        TargetEnvironment::resolve(&settings, "/srv/homelab")
    }

    #[test]
    fn playbook_forwards_inventory_and_vars_file() {
        let action = Action::Playbook {
            path: "playbooks/k3s-install.yml".into(),
            extra_args: vec!["-v".into()],
        };
        let invocation = action.invocation(&cluster_target());

        let expect = vec![
            "-i",
            "/srv/homelab/inventory/hosts.yml",
            "/srv/homelab/playbooks/k3s-install.yml",
            "--extra-vars",
            "@/srv/homelab/vars/main.yml",
            "-v",
        ];
        assert_eq!(invocation.program, "ansible-playbook");
        assert_eq!(invocation.args, expect);
        assert_eq!(invocation.current_dir, Some(PathBuf::from("/srv/homelab")));
    }

    #[test]
    fn helm_release_falls_back_to_target_namespace() {
        let action = Action::HelmRelease {
            release: "signoz".into(),
            chart: "signoz/signoz".into(),
            namespace: None,
            values: vec!["signoz-values.yaml".into()],
            create_namespace: true,
            wait: true,
            timeout: Some("1h".into()),
        };
        let target = TargetEnvironment::new("signoz", "/srv/signoz").with_namespace("signoz");

        assert_eq!(
            action.invocation(&target).to_string(),
            "helm upgrade --install signoz signoz/signoz --namespace signoz \
             --create-namespace --wait --timeout 1h -f /srv/signoz/signoz-values.yaml"
        );
    }

    #[test_case(None, "kubectl -n signoz get pods"; "target namespace")]
    #[test_case(Some("kube-system"), "kubectl -n kube-system get pods"; "own namespace")]
    #[test]
    fn kubectl_namespace_selection(namespace: Option<&str>, expect: &str) {
        let action = Action::Kubectl {
            args: vec!["get".into(), "pods".into()],
            namespace: namespace.map(Into::into),
        };
        let target = TargetEnvironment::new("signoz", ".").with_namespace("signoz");

        assert_eq!(action.invocation(&target).to_string(), expect);
    }

    #[test]
    fn artifacts_lists_referenced_files() {
        let playbook = Action::Playbook {
            path: "playbooks/ubuntu-setup.yml".into(),
            extra_args: vec![],
        };
        let repo = Action::HelmRepo {
            name: "signoz".into(),
            url: "https://charts.signoz.io".into(),
        };

        assert_eq!(
            playbook.artifacts(),
            vec![PathBuf::from("playbooks/ubuntu-setup.yml")]
        );
        assert_eq!(repo.artifacts(), Vec::<PathBuf>::new());
    }

    #[test]
    fn stage_defaults_to_required() -> anyhow::Result<()> {
        let stage: Stage = toml::from_str(
            r#"
            name = "helm-repo-update"

            [action]
            kind = "helm-repo-update"
            "#,
        )?;

        assert_eq!(
            stage,
            Stage::required("helm-repo-update", Action::HelmRepoUpdate)
        );

        Ok(())
    }
}
