// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Target environment resolution.
//!
//! A __target environment__ is the external system that a plan provisions,
//! e.g., a home server reachable through an Ansible inventory, or a namespace
//! in a Kubernetes cluster. It is resolved once from the plan before the
//! pipeline starts, and is only ever read afterwards.

use crate::{config::TargetSettings, pipeline::probe::Probe};

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Resolved target environment.
///
/// Holds the runtime variables that every stage invocation receives. All
/// relative paths are resolved against the plan root, i.e., the directory
/// that contains the plan file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEnvironment {
    name: String,
    root: PathBuf,
    inventory: Option<PathBuf>,
    vars_file: Option<PathBuf>,
    kubeconfig: Option<PathBuf>,
    namespace: Option<String>,
    variables: BTreeMap<String, String>,
    probe: Probe,
}

impl TargetEnvironment {
    /// Construct bare target environment with no runtime variables.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            inventory: None,
            vars_file: None,
            kubeconfig: None,
            namespace: None,
            variables: BTreeMap::new(),
            probe: Probe::default(),
        }
    }

    /// Resolve target environment from plan settings.
    ///
    /// Paths in the settings are expected to be shell expanded already, which
    /// the plan parser takes care of.
    pub fn resolve(settings: &TargetSettings, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let join = |path: &PathBuf| absolutize(&root, path);

        Self {
            name: settings.name.clone(),
            inventory: settings.inventory.as_ref().map(join),
            vars_file: settings.vars_file.as_ref().map(join),
            kubeconfig: settings.kubeconfig.as_ref().map(join),
            namespace: settings.namespace.clone(),
            variables: settings.variables.clone(),
            probe: settings.probe.clone(),
            root,
        }
    }

    pub fn with_probe(mut self, probe: Probe) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory that relative stage paths are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn inventory(&self) -> Option<&Path> {
        self.inventory.as_deref()
    }

    pub fn vars_file(&self) -> Option<&Path> {
        self.vars_file.as_deref()
    }

    pub fn kubeconfig(&self) -> Option<&Path> {
        self.kubeconfig.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    /// Resolve path relative to plan root.
    ///
    /// Absolute paths are returned untouched.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        absolutize(&self.root, path.as_ref())
    }

    /// Environment forwarded to every external invocation.
    ///
    /// Contains all runtime variables, plus `KUBECONFIG` if the target names a
    /// kubeconfig file.
    pub fn environment(&self) -> Vec<(String, String)> {
        let mut env = self
            .variables
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect::<Vec<_>>();

        if let Some(kubeconfig) = &self.kubeconfig {
            env.push((
                "KUBECONFIG".into(),
                kubeconfig.to_string_lossy().into_owned(),
            ));
        }

        env
    }
}

fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
