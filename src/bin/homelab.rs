// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use homelab::{
    config::PlanDefinition,
    path::{default_plan_store_dir, locate_plan, plan_root},
    pipeline::{
        exec::ProcessRunner,
        gate::{AssumeYes, InquireOperator},
        Pipeline, PipelineOutcome,
    },
    report::Reporter,
    template::Template,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::{
    fs,
    io::{stdout, Write},
    path::PathBuf,
    process::exit,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "homelab [options] <homelab-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Run(opts) => run_run(opts),
            Command::Check(opts) => run_check(opts),
            Command::Show(opts) => run_show(opts),
            Command::Init(opts) => run_init(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run every stage of a plan against its target environment.
    #[command(override_usage = "homelab run [options] <plan>")]
    Run(RunOptions),

    /// Validate preconditions and probe target without running any stage.
    #[command(override_usage = "homelab check [options] <plan>")]
    Check(CheckOptions),

    /// Show target, preconditions, and rendered stage commands of a plan.
    #[command(override_usage = "homelab show <plan>")]
    Show(ShowOptions),

    /// Write built-in plan template.
    #[command(override_usage = "homelab init [options] <template>")]
    Init(InitOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RunOptions {
    /// Path to plan file, or name of plan in plan store.
    #[arg(required = true, value_name = "plan")]
    pub plan: String,

    /// Answer yes to confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,

    /// Do not show progress spinners.
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CheckOptions {
    /// Path to plan file, or name of plan in plan store.
    #[arg(required = true, value_name = "plan")]
    pub plan: String,

    /// Do not show progress spinners.
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ShowOptions {
    /// Path to plan file, or name of plan in plan store.
    #[arg(required = true, value_name = "plan")]
    pub plan: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Built-in template to write: cluster or observability.
    #[arg(required = true, value_name = "template")]
    pub template: Template,

    /// Write plan to path instead of the plan store.
    #[arg(short, long, value_name = "path")]
    pub path: Option<PathBuf>,

    /// Overwrite existing plan file.
    #[arg(short, long)]
    pub force: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn load_pipeline(plan: &str, quiet: bool) -> Result<(Pipeline, PlanDefinition)> {
    let path = locate_plan(plan)?;
    let data = fs::read_to_string(&path)
        .with_context(|| format!("failed to read plan {:?}", path.display()))?;
    let definition: PlanDefinition = data
        .parse()
        .with_context(|| format!("invalid plan {:?}", path.display()))?;
    let pipeline = Pipeline::from_plan(
        &definition,
        plan_root(&path),
        ProcessRunner::new().quiet(quiet),
    )?;

    Ok((pipeline, definition))
}

fn into_result(outcome: &PipelineOutcome) -> Result<()> {
    match outcome.abort_reason() {
        Some(reason) => bail!("deployment aborted: {reason}"),
        None => Ok(()),
    }
}

fn run_run(opts: RunOptions) -> Result<()> {
    let (pipeline, definition) = load_pipeline(&opts.plan, opts.quiet)?;
    let outcome = if opts.yes {
        pipeline.run(&AssumeYes)
    } else {
        pipeline.run(&InquireOperator::new())
    };

    let mut reporter = Reporter::new(stdout().lock());
    reporter.summary(pipeline.stages(), &outcome, &definition.settings.guidance)?;
    reporter.into_inner().flush()?;

    into_result(&outcome)
}

fn run_check(opts: CheckOptions) -> Result<()> {
    let (pipeline, _) = load_pipeline(&opts.plan, opts.quiet)?;
    let outcome = pipeline.check();
    let mut reporter = Reporter::new(stdout().lock());
    reporter.verdict(&outcome)?;
    reporter.into_inner().flush()?;

    into_result(&outcome)?;
    info!("plan {:?} is ready to run", opts.plan);

    Ok(())
}

fn run_show(opts: ShowOptions) -> Result<()> {
    let (pipeline, _) = load_pipeline(&opts.plan, true)?;
    let mut reporter = Reporter::new(stdout().lock());
    reporter.plan(&pipeline)?;
    reporter.into_inner().flush()?;

    Ok(())
}

fn run_init(opts: InitOptions) -> Result<()> {
    let path = match opts.path {
        Some(path) => path,
        None => default_plan_store_dir()?.join(opts.template.file_name()),
    };
    opts.template.write_to(path, opts.force)?;

    Ok(())
}
