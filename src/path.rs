// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for plan files, and the directory
//! that relative paths inside a plan resolve against.

use std::path::{Path, PathBuf};

/// Determine default absolute path to plan store directory.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/homelab` as the default
/// absolute path for the plan store. Does not check if the path returned
/// actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory path cannot be
///   determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_plan_store_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("homelab"))
        .ok_or(NoWayHome)
}

/// Locate plan file by path or by name.
///
/// Anything that looks like a path, i.e., has a `.toml` extension, contains a
/// separator, or names an existing file, is taken as-is. A bare name is looked
/// up as `<name>.toml` in the plan store, even if a directory of that name
/// exists in the current directory.
///
/// # Errors
///
/// - Return [`NoWayHome`] if a bare name is given and the plan store
///   directory cannot be determined.
pub fn locate_plan(plan: impl AsRef<str>) -> Result<PathBuf> {
    let plan = plan.as_ref();
    let path = Path::new(plan);
    if path.extension().is_some_and(|ext| ext == "toml")
        || path.components().count() > 1
        || path.is_file()
    {
        return Ok(path.to_path_buf());
    }

    default_plan_store_dir().map(|dir| dir.join(format!("{plan}.toml")))
}

/// Directory that relative paths in a plan file resolve against.
///
/// This is the directory containing the plan file itself, or the current
/// directory for a bare file name.
pub fn plan_root(plan_file: impl AsRef<Path>) -> PathBuf {
    match plan_file.as_ref().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
