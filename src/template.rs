// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Built-in plan templates.
//!
//! Two plans come with homelab out of the box:
//!
//! - __cluster__: bring up a home server from a fresh Ubuntu 24 install to a
//!   running K3s cluster through Ansible playbooks.
//! - __observability__: install the SigNoz observability stack into that
//!   cluster through Helm charts.
//!
//! Templates only reference playbooks, variable files, and chart values by
//! path. Those files are supplied by the operator next to the plan file.

use crate::{
    config::{PlanDefinition, PlanSettings, Preconditions, TargetSettings},
    pipeline::{
        probe::Probe,
        stage::{Action, Stage},
    },
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::info;

/// Built-in plan template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Cluster,
    Observability,
}

impl Template {
    pub const ALL: [Template; 2] = [Template::Cluster, Template::Observability];

    /// Build plan definition of template.
    pub fn definition(&self) -> PlanDefinition {
        match self {
            Self::Cluster => cluster(),
            Self::Observability => observability(),
        }
    }

    /// Default file name of template in the plan store.
    pub fn file_name(&self) -> String {
        format!("{self}.toml")
    }

    /// Write plan definition of template to target path.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// - Return [`TemplateError::AlreadyExists`] if target path exists and
    ///   `force` is not set.
    /// - Return [`TemplateError::Write`] if target path cannot be written.
    pub fn write_to(&self, path: impl AsRef<Path>, force: bool) -> Result<()> {
        let path = path.as_ref();
        if path.exists() && !force {
            return Err(TemplateError::AlreadyExists(path.to_path_buf()));
        }

        let write_error = |source: std::io::Error| TemplateError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_error)?;
        }

        info!("write {self} plan to {:?}", path.display());
        fs::write(path, self.definition().to_string()).map_err(write_error)?;

        Ok(())
    }
}

impl Display for Template {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Cluster => fmt.write_str("cluster"),
            Self::Observability => fmt.write_str("observability"),
        }
    }
}

impl FromStr for Template {
    type Err = UnknownTemplate;

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|template| template.to_string() == name)
            .ok_or_else(|| UnknownTemplate(name.to_string()))
    }
}

fn playbook(path: &str) -> Action {
    Action::Playbook {
        path: format!("playbooks/{path}").into(),
        extra_args: vec!["-v".into()],
    }
}

fn cluster() -> PlanDefinition {
    PlanDefinition {
        settings: PlanSettings {
            description: "Home server bring-up: Ubuntu 24 initial setup (APT mirror, SSH \
                          hardening, timezone), Wake-on-LAN, K3s cluster, and Slack boot \
                          alerts"
                .into(),
            confirm: true,
            guidance: vec![
                "1. ~/.kube/homelab-config has been created.".into(),
                "2. Access the cluster with kubectl:".into(),
                "     export KUBECONFIG=~/.kube/homelab-config".into(),
                "     kubectl get nodes".into(),
                "3. Slack boot alerts are sent from the next boot on (if a webhook URL is set).".into(),
            ],
        },
        target: TargetSettings {
            name: "homelab".into(),
            inventory: Some("inventory/hosts.yml".into()),
            vars_file: Some("vars/main.yml".into()),
            probe: Probe::AnsiblePing {
                host_pattern: "homelab".into(),
            },
            ..Default::default()
        },
        preconditions: Preconditions {
            artifacts: vec![],
            tools: vec!["ansible".into(), "ansible-playbook".into()],
        },
        stages: vec![
            Stage::required("ubuntu-setup", playbook("ubuntu-setup.yml"))
                .with_description("Ubuntu initial setup"),
            Stage::optional("wakeonlan-setup", playbook("wakeonlan-setup.yml"))
                .with_description("Wake-on-LAN setup"),
            Stage::required("k3s-install", playbook("k3s-install.yml"))
                .with_description("K3s install"),
            Stage::optional("slack-alert", playbook("slack-alert.yml"))
                .with_description("Slack boot alert setup"),
        ],
    }
}

fn kubectl_get(resource: &str) -> Action {
    Action::Kubectl {
        args: vec!["get".into(), resource.into(), "-o".into(), "wide".into()],
        namespace: None,
    }
}

fn observability() -> PlanDefinition {
    let namespace = "signoz";

    PlanDefinition {
        settings: PlanSettings {
            description: "SigNoz observability stack on the home K3s cluster".into(),
            confirm: true,
            guidance: vec![
                "1. Port-forward the SigNoz frontend:".into(),
                format!("     kubectl port-forward -n {namespace} svc/signoz 28080:8080"),
                "2. Open http://localhost:28080 in a browser.".into(),
                "3. Default login: admin@signoz.io / admin".into(),
                "Host and K8s metrics show up in SigNoz after a few minutes.".into(),
            ],
        },
        target: TargetSettings {
            name: "signoz".into(),
            namespace: Some(namespace.into()),
            probe: Probe::KubectlNodes,
            ..Default::default()
        },
        preconditions: Preconditions {
            artifacts: vec![],
            tools: vec!["kubectl".into(), "helm".into()],
        },
        stages: vec![
            Stage::required(
                "helm-repo-add",
                Action::HelmRepo {
                    name: "signoz".into(),
                    url: "https://charts.signoz.io".into(),
                },
            )
            .with_description("Add SigNoz Helm repository"),
            Stage::required("helm-repo-update", Action::HelmRepoUpdate)
                .with_description("Update Helm repositories"),
            Stage::required(
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
            )
            .with_description("Install SigNoz (may take several minutes)"),
            Stage::required(
                "k8s-infra",
                Action::HelmRelease {
                    release: "k8s-infra".into(),
                    chart: "signoz/k8s-infra".into(),
                    namespace: None,
                    values: vec!["signoz-k8s-values.yaml".into()],
                    create_namespace: false,
                    wait: true,
                    timeout: Some("30m".into()),
                },
            )
            .with_description("Install K8s metric collection agents"),
            Stage::optional("verify-pods", kubectl_get("pods"))
                .with_description("Pod status")
                .with_report_output(),
            Stage::optional("verify-services", kubectl_get("svc"))
                .with_description("Service status")
                .with_report_output(),
            Stage::optional("verify-daemonsets", kubectl_get("daemonset"))
                .with_description("DaemonSet status")
                .with_report_output(),
            Stage::optional(
                "verify-releases",
                Action::Command {
                    program: "helm".into(),
                    args: vec!["list".into(), "-n".into(), namespace.into()],
                },
            )
            .with_description("Helm release status")
            .with_report_output(),
        ],
    }
}

/// Template name is not known.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown template {0:?}, expected one of: cluster, observability")]
pub struct UnknownTemplate(pub String);

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// Plan file exists, and overwriting was not asked for.
    #[error("plan {:?} already exists, use --force to overwrite", .0.display())]
    AlreadyExists(PathBuf),

    #[error("failed to write plan {:?}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Friendly result alias :3
pub type Result<T, E = TemplateError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::Criticality;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    #[test_case(Template::Cluster; "cluster")]
    #[test_case(Template::Observability; "observability")]
    #[test]
    fn template_parses_back_into_itself(template: Template) {
        let definition = template.definition();
        let result = definition.to_string().parse::<PlanDefinition>().unwrap();

        assert_eq!(result, definition);
    }

    #[test]
    fn cluster_stage_order_and_criticality() {
        let stages = Template::Cluster
            .definition()
            .stages
            .into_iter()
            .map(|stage| (stage.name, stage.criticality))
            .collect::<Vec<_>>();

        let expect = vec![
            ("ubuntu-setup".to_string(), Criticality::Required),
            ("wakeonlan-setup".to_string(), Criticality::Optional),
            ("k3s-install".to_string(), Criticality::Required),
            ("slack-alert".to_string(), Criticality::Optional),
        ];
        assert_eq!(stages, expect);
    }

    #[test]
    fn template_names() {
        assert_eq!("observability".parse::<Template>(), Ok(Template::Observability));
        assert_eq!(
            "signoz".parse::<Template>(),
            Err(UnknownTemplate("signoz".into()))
        );
        assert_eq!(Template::Cluster.file_name(), "cluster.toml");
    }

    #[sealed_test]
    fn write_to_creates_missing_parents() -> anyhow::Result<()> {
        Template::Observability.write_to("plans/observability.toml", false)?;
        let result: PlanDefinition = fs::read_to_string("plans/observability.toml")?.parse()?;

        assert_eq!(result, Template::Observability.definition());

        Ok(())
    }

    #[sealed_test]
    fn write_to_refuses_existing_plan() -> anyhow::Result<()> {
        fs::write("cluster.toml", "# hand edited\n")?;
        let result = Template::Cluster.write_to("cluster.toml", false);

        assert!(matches!(
            result,
            Err(TemplateError::AlreadyExists(path)) if path == Path::new("cluster.toml")
        ));
        assert_eq!(fs::read_to_string("cluster.toml")?, "# hand edited\n");

        Ok(())
    }

    #[sealed_test]
    fn write_to_overwrites_existing_plan_with_force() -> anyhow::Result<()> {
        fs::write("cluster.toml", "# hand edited\n")?;
        Template::Cluster.write_to("cluster.toml", true)?;
        let result: PlanDefinition = fs::read_to_string("cluster.toml")?.parse()?;

        assert_eq!(result, Template::Cluster.definition());

        Ok(())
    }
}
