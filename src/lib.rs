// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Staged deployment orchestration for a home lab.
//!
//! Homelab drives external provisioning tools, e.g., Ansible playbooks and
//! Helm charts, through a fixed sequence of __stages__ declared in a
//! __plan__ file. Before anything touches the target environment, the
//! pipeline checks that every file and tool the plan needs exists, and that
//! the target is reachable. Each stage is either required, such that its
//! failure aborts the run, or optional, such that its failure is recorded and
//! the run moves on.
//!
//! # See Also
//!
//! 1. [`pipeline`]
//! 2. [`PlanDefinition`](crate::config::PlanDefinition)

pub mod config;
pub mod path;
pub mod pipeline;
pub mod report;
pub mod target;
pub mod template;
