// src/core/directory.rs

use crate::{
    constants::{
        ASSETS_DIR, COMPOSE_SOURCE_FILENAME, CONFIG_DIR, DATA_DIR, MAX_ROOT_HOPS, NGINX_DIR,
    },
    errors::TaskError,
};
use std::env;
use std::path::{Path, PathBuf};

/// A declarative description of what a directory must (`true`) or must not
/// (`false`) contain, keyed by relative path.
pub type DirectoryRules = [(&'static str, bool)];

/// The entries that identify a platform root.
pub const PROJECT_ROOT_RULES: &DirectoryRules = &[
    (ASSETS_DIR, true),
    (CONFIG_DIR, true),
    (DATA_DIR, true),
    (NGINX_DIR, true),
    (COMPOSE_SOURCE_FILENAME, true),
];

/// Returns true when every rule holds for `path`.
pub fn matches(rules: &DirectoryRules, path: &Path) -> bool {
    rules
        .iter()
        .all(|(fragment, must_exist)| path.join(fragment).exists() == *must_exist)
}

/// Walks upward from `start` until a directory matches `rules`.
///
/// `start` itself is checked first; at most `max_hops` parents are visited
/// after it.
pub fn find_upwards(
    start: &Path,
    rules: &DirectoryRules,
    max_hops: usize,
) -> Result<PathBuf, TaskError> {
    let mut current = Some(start);
    let mut hops = 0;

    while let Some(dir) = current {
        if matches(rules, dir) {
            log::debug!("Directory '{}' matched after {} hop(s).", dir.display(), hops);
            return Ok(dir.to_path_buf());
        }
        if hops == max_hops {
            break;
        }
        hops += 1;
        current = dir.parent();
    }

    Err(TaskError::RootNotFound {
        start: start.to_path_buf(),
        hops: max_hops,
    })
}

/// Finds the platform root above `start` without touching the working
/// directory.
///
/// `start` is canonicalized first, so relative paths and `..` components walk
/// the real parents rather than the lexical ones.
pub fn locate_project_root(start: &Path, max_hops: usize) -> Result<PathBuf, TaskError> {
    let start = dunce::canonicalize(start).map_err(|e| TaskError::io(start, e))?;
    find_upwards(&start, PROJECT_ROOT_RULES, max_hops)
}

/// Finds the platform root above `start` and makes it the working directory.
///
/// On failure the working directory is left untouched.
pub fn enter_project_root_from(start: &Path, max_hops: usize) -> Result<PathBuf, TaskError> {
    let root = locate_project_root(start, max_hops)?;
    env::set_current_dir(&root).map_err(|e| TaskError::io(&root, e))?;
    log::debug!("Working directory set to platform root '{}'.", root.display());
    Ok(root)
}

/// Finds the platform root above the current directory, using the default
/// hop bound.
pub fn enter_project_root() -> Result<PathBuf, TaskError> {
    let cwd = env::current_dir().map_err(|e| TaskError::io(".", e))?;
    enter_project_root_from(&cwd, MAX_ROOT_HOPS)
}
