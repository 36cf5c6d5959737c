// src/core/dependencies.rs

use crate::errors::TaskError;
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Checks that every executable in `names` can be found on `PATH`.
///
/// All missing names are reported together, in the order they were requested.
pub fn ensure_available(names: &[&str]) -> Result<(), TaskError> {
    let path_var = env::var_os("PATH").unwrap_or_default();
    let missing = find_missing(names, &path_var);
    if missing.is_empty() {
        log::debug!("All dependencies resolved: {:?}", names);
        Ok(())
    } else {
        Err(TaskError::MissingDependencies(missing))
    }
}

/// Returns the subset of `names` that cannot be resolved against `path_var`.
pub fn find_missing(names: &[&str], path_var: &OsStr) -> Vec<String> {
    names
        .iter()
        .filter(|name| resolve(name, path_var).is_none())
        .map(|name| name.to_string())
        .collect()
}

/// Resolves an executable name to its full path.
///
/// Names that already contain a path separator are checked as given.
pub fn resolve(name: &str, path_var: &OsStr) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| candidate_names(name).into_iter().map(move |n| dir.join(n)))
        .find(|path| is_executable(path))
}

#[cfg(windows)]
fn candidate_names(name: &str) -> Vec<OsString> {
    let exts = env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
    let mut names = vec![OsString::from(name)];
    names.extend(
        exts.split(';')
            .filter(|ext| !ext.is_empty())
            .map(|ext| OsString::from(format!("{name}{ext}"))),
    );
    names
}

#[cfg(not(windows))]
fn candidate_names(name: &str) -> Vec<OsString> {
    vec![OsString::from(name)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn make_file(dir: &Path, name: &str, mode: u32) {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_resolves_executables_across_path_entries() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        make_file(first.path(), "git", 0o755);
        make_file(second.path(), "docker", 0o755);

        let path_var = env::join_paths([first.path(), second.path()]).unwrap();
        assert!(find_missing(&["git", "docker"], &path_var).is_empty());
        assert_eq!(
            resolve("docker", &path_var),
            Some(second.path().join("docker"))
        );
    }

    #[test]
    fn test_reports_every_missing_name() {
        let dir = tempdir().unwrap();
        make_file(dir.path(), "git", 0o755);
        make_file(dir.path(), "docker", 0o644); // not executable

        let path_var = env::join_paths([dir.path()]).unwrap();
        assert_eq!(
            find_missing(&["docker", "git", "node"], &path_var),
            vec!["docker".to_string(), "node".to_string()]
        );
    }

    #[test]
    fn test_explicit_paths_skip_the_search() {
        let dir = tempdir().unwrap();
        make_file(dir.path(), "tool", 0o755);
        let explicit = dir.path().join("tool");

        assert!(resolve(explicit.to_str().unwrap(), OsStr::new("")).is_some());
        assert!(resolve("tool", OsStr::new("")).is_none());
    }
}
