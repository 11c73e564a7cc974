// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Pipeline reporting.
//!
//! The reporter only formats what a finished pipeline already decided. It
//! never takes part in the run itself.

use crate::pipeline::{
    exec::{CommandRunner, StepResult},
    stage::Stage,
    AbortReason, Pipeline, PipelineOutcome,
};

use std::io::{Result, Write};

/// Write pipeline summaries to any [`Write`] sink.
#[derive(Debug)]
pub struct Reporter<W>
where
    W: Write,
{
    out: W,
}

impl<W> Reporter<W>
where
    W: Write,
{
    /// Construct new reporter.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Give back the underlying sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Write final summary of a pipeline run.
    ///
    /// Lists every configured stage in order with its outcome. Stages that
    /// never ran because of an abort are listed as skipped. Guidance is only
    /// written for completed runs.
    pub fn summary(
        &mut self,
        stages: &[Stage],
        outcome: &PipelineOutcome,
        guidance: &[String],
    ) -> Result<()> {
        writeln!(self.out, "==== deployment summary ====")?;
        for stage in stages {
            let result = outcome
                .results()
                .iter()
                .find(|result| result.stage_name == stage.name);
            self.stage_line(stage, result)?;
        }
        writeln!(self.out)?;

        self.verdict(outcome)?;
        if outcome.is_aborted() {
            return Ok(());
        }

        let degraded = outcome.degraded().collect::<Vec<_>>();
        if !degraded.is_empty() {
            writeln!(self.out, "degraded optional stages:")?;
            for result in degraded {
                writeln!(
                    self.out,
                    "  - {} (exit status {})",
                    result.stage_name, result.exit_status
                )?;
            }
        }

        if !guidance.is_empty() {
            writeln!(self.out)?;
            writeln!(self.out, "next steps:")?;
            for line in guidance {
                writeln!(self.out, "  {line}")?;
            }
        }

        Ok(())
    }

    /// Write final verdict of a pipeline run.
    ///
    /// Includes probe output if the target was unreachable.
    pub fn verdict(&mut self, outcome: &PipelineOutcome) -> Result<()> {
        match outcome.abort_reason() {
            None => writeln!(self.out, "verdict: completed")?,
            Some(reason) => {
                writeln!(self.out, "verdict: aborted, {reason}")?;
                if let AbortReason::Unreachable { diagnostic, .. } = reason {
                    self.indented(diagnostic)?;
                }
            }
        }

        Ok(())
    }

    fn stage_line(&mut self, stage: &Stage, result: Option<&StepResult>) -> Result<()> {
        let Some(result) = result else {
            return writeln!(
                self.out,
                "  [skipped] {} ({})",
                stage.name, stage.criticality
            );
        };

        if result.succeeded {
            writeln!(self.out, "  [ok]      {} ({})", stage.name, stage.criticality)?;
            if stage.report_output {
                self.indented(&result.stdout)?;
            }
        } else {
            writeln!(
                self.out,
                "  [failed]  {} ({}), exit status {}",
                stage.name, stage.criticality, result.exit_status
            )?;
            self.indented(&result.diagnostic())?;
        }

        Ok(())
    }

    fn indented(&mut self, text: &str) -> Result<()> {
        for line in text.trim_end().lines() {
            writeln!(self.out, "      {line}")?;
        }

        Ok(())
    }

    /// Write what a pipeline would do without running anything.
    pub fn plan<R>(&mut self, pipeline: &Pipeline<R>) -> Result<()>
    where
        R: CommandRunner,
    {
        let target = pipeline.target();
        writeln!(self.out, "{}", pipeline.description())?;
        writeln!(self.out)?;
        writeln!(self.out, "target: {}", target.name())?;
        if let Some(invocation) = target.probe().invocation(target) {
            writeln!(self.out, "probe: {invocation}")?;
        }
        if !target.variables().is_empty() {
            writeln!(self.out, "variables:")?;
            for (key, value) in target.variables() {
                writeln!(self.out, "  {key}={value}")?;
            }
        }

        let validator = pipeline.validator();
        if !validator.artifacts().is_empty() {
            writeln!(self.out, "artifacts:")?;
            for artifact in validator.artifacts() {
                writeln!(self.out, "  - {}", artifact.display())?;
            }
        }
        if !validator.tools().is_empty() {
            writeln!(self.out, "tools:")?;
            for tool in validator.tools() {
                writeln!(self.out, "  - {tool}")?;
            }
        }

        writeln!(self.out, "stages:")?;
        for (index, stage) in pipeline.stages().iter().enumerate() {
            writeln!(
                self.out,
                "  {}. {} ({})",
                index + 1,
                stage.label(),
                stage.criticality
            )?;
            writeln!(self.out, "     $ {}", stage.action.invocation(target))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pipeline::{
            exec::{Captured, Invocation},
            gate::AssumeYes,
            precondition::PreconditionValidator,
            probe::Probe,
            stage::{Action, Criticality},
        },
        target::TargetEnvironment,
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    struct FailingRunner(&'static str);

    impl CommandRunner for FailingRunner {
        fn run(
            &self,
            label: &str,
            _invocation: &Invocation,
        ) -> crate::pipeline::exec::Result<Captured> {
            if label == self.0 {
                Ok(Captured::failure(2, "fatal: [homelab]: FAILED!\nretry later\n"))
            } else {
                Ok(Captured {
                    status: Some(0),
                    stdout: "NAME   READY\nsignoz 1/1\n".into(),
                    stderr: String::new(),
                })
            }
        }
    }

    fn stage(name: &str, criticality: Criticality) -> Stage {
        Stage::new(
            name,
            criticality,
            Action::Command {
                program: "true".into(),
                args: vec![],
            },
        )
    }

    fn report(pipeline: &Pipeline<FailingRunner>, guidance: &[String]) -> String {
        let outcome = pipeline.run(&AssumeYes);
        let mut reporter = Reporter::new(Vec::new());
        reporter.summary(pipeline.stages(), &outcome, guidance).unwrap();
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn completed_run_lists_degraded_stages_and_guidance() {
        let pipeline = Pipeline::new(
            TargetEnvironment::new("homelab", "."),
            PreconditionValidator::default(),
            vec![
                stage("ubuntu-setup", Criticality::Required),
                stage("wakeonlan-setup", Criticality::Optional),
                stage("k3s-install", Criticality::Required).with_report_output(),
            ],
            FailingRunner("wakeonlan-setup"),
        )
        .unwrap();
        let result = report(&pipeline, &["export KUBECONFIG=~/.kube/homelab-config".into()]);

        let expect = indoc! {"
            ==== deployment summary ====
              [ok]      ubuntu-setup (required)
              [failed]  wakeonlan-setup (optional), exit status 2
                  fatal: [homelab]: FAILED!
                  retry later
              [ok]      k3s-install (required)
                  NAME   READY
                  signoz 1/1

            verdict: completed
            degraded optional stages:
              - wakeonlan-setup (exit status 2)

            next steps:
              export KUBECONFIG=~/.kube/homelab-config
        "};
        assert_eq!(result, expect);
    }

    #[test]
    fn aborted_run_lists_skipped_stages_without_guidance() {
        let pipeline = Pipeline::new(
            TargetEnvironment::new("homelab", "."),
            PreconditionValidator::default(),
            vec![
                stage("ubuntu-setup", Criticality::Required),
                stage("k3s-install", Criticality::Required),
            ],
            FailingRunner("ubuntu-setup"),
        )
        .unwrap();
        let result = report(&pipeline, &["kubectl get nodes".into()]);

        let expect = indoc! {r#"
            ==== deployment summary ====
              [failed]  ubuntu-setup (required), exit status 2
                  fatal: [homelab]: FAILED!
                  retry later
              [skipped] k3s-install (required)

            verdict: aborted, required stage "ubuntu-setup" failed
        "#};
        assert_eq!(result, expect);
    }

    struct PlaybookRunner;

    impl CommandRunner for PlaybookRunner {
        fn run(
            &self,
            _label: &str,
            _invocation: &Invocation,
        ) -> crate::pipeline::exec::Result<Captured> {
            Ok(Captured {
                status: Some(2),
                stdout: "fatal: [homelab]: FAILED! => {\"msg\": \"k3s not found\"}\n".into(),
                stderr: "[WARNING]: Invalid characters were found in group names\n".into(),
            })
        }
    }

    #[test]
    fn failed_stage_shows_stdout_and_stderr() {
        let pipeline = Pipeline::new(
            TargetEnvironment::new("homelab", "."),
            PreconditionValidator::default(),
            vec![stage("k3s-install", Criticality::Required)],
            PlaybookRunner,
        )
        .unwrap();
        let outcome = pipeline.run(&AssumeYes);
        let mut reporter = Reporter::new(Vec::new());
        reporter.summary(pipeline.stages(), &outcome, &[]).unwrap();
        let result = String::from_utf8(reporter.into_inner()).unwrap();

        let expect = indoc! {r#"
            ==== deployment summary ====
              [failed]  k3s-install (required), exit status 2
                  fatal: [homelab]: FAILED! => {"msg": "k3s not found"}
                  [WARNING]: Invalid characters were found in group names

            verdict: aborted, required stage "k3s-install" failed
        "#};
        assert_eq!(result, expect);
    }

    #[test]
    fn unreachable_target_shows_probe_output() {
        let pipeline = Pipeline::new(
            TargetEnvironment::new("homelab", ".").with_probe(Probe::AnsiblePing {
                host_pattern: "homelab".into(),
            }),
            PreconditionValidator::default(),
            vec![stage("ubuntu-setup", Criticality::Required)],
            FailingRunner("probe homelab"),
        )
        .unwrap();
        let result = report(&pipeline, &[]);

        let expect = indoc! {r#"
            ==== deployment summary ====
              [skipped] ubuntu-setup (required)

            verdict: aborted, target "homelab" is unreachable
                  fatal: [homelab]: FAILED!
                  retry later
        "#};
        assert_eq!(result, expect);
    }

    #[test]
    fn plan_lists_rendered_commands() {
        let pipeline = Pipeline::new(
            TargetEnvironment::new("signoz", "/srv/signoz")
                .with_namespace("signoz")
                .with_variable("SIGNOZ_VERSION", "0.55.0")
                .with_probe(Probe::KubectlNodes),
            PreconditionValidator::new(["/srv/signoz/signoz-values.yaml"], ["helm", "kubectl"]),
            vec![
                Stage::required(
                    "helm-repo-add",
                    Action::HelmRepo {
                        name: "signoz".into(),
                        url: "https://charts.signoz.io".into(),
                    },
                )
                .with_description("Add SigNoz Helm repository"),
                Stage::optional(
                    "verify-pods",
                    Action::Kubectl {
                        args: vec!["get".into(), "pods".into()],
                        namespace: None,
                    },
                ),
            ],
            FailingRunner(""),
        )
        .unwrap()
        .with_description("SigNoz observability stack");

        let mut reporter = Reporter::new(Vec::new());
        reporter.plan(&pipeline).unwrap();
        let result = String::from_utf8(reporter.into_inner()).unwrap();

        let expect = indoc! {"
            SigNoz observability stack

            target: signoz
            probe: kubectl get nodes
            variables:
              SIGNOZ_VERSION=0.55.0
            artifacts:
              - /srv/signoz/signoz-values.yaml
            tools:
              - helm
              - kubectl
            stages:
              1. Add SigNoz Helm repository (required)
                 $ helm repo add --force-update signoz https://charts.signoz.io
              2. verify-pods (optional)
                 $ kubectl -n signoz get pods
        "};
        assert_eq!(result, expect);
    }
}
