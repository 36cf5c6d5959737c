// src/core/env_file.rs

use crate::{core::patcher::write_atomically, errors::TaskError};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Reads a `.env` file as ordered key/value pairs.
///
/// Best-effort: a missing or unreadable file yields an empty list, and lines
/// that fail to parse are skipped.
pub fn read(path: &Path) -> Vec<(String, String)> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) => {
            log::debug!("No usable env file at '{}': {}", path.display(), e);
            return Vec::new();
        }
    };

    iter.filter_map(|item| match item {
        Ok(pair) => Some(pair),
        Err(e) => {
            log::warn!("Skipping malformed line in '{}': {}", path.display(), e);
            None
        }
    })
    .collect()
}

/// Returns the value of `key`, if present.
pub fn lookup(path: &Path, key: &str) -> Option<String> {
    read(path).into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// Rewrites the file with `updates` applied.
///
/// The file is edited as text: comments, blank lines and the raw values of
/// other keys stay byte-for-byte. The first assignment of an updated key is
/// replaced in place and unknown keys are appended in the order given.
pub fn update(path: &Path, updates: &[(String, String)]) -> Result<(), TaskError> {
    let original = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(TaskError::io(path, e)),
    };

    let mut lines: Vec<String> = original.lines().map(str::to_string).collect();
    for (key, value) in updates {
        let assignment = format!("{key}={}", quote(value));
        match lines.iter_mut().find(|line| assigned_key(line) == Some(key.as_str())) {
            Some(line) => *line = assignment,
            None => lines.push(assignment),
        }
    }

    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    write_atomically(path, &content)
}

/// The key a `KEY=value` (or `export KEY=value`) line assigns, if any.
fn assigned_key(line: &str) -> Option<&str> {
    let line = line.trim_start();
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, _) = line.split_once('=')?;
    let key = key.trim();
    let valid = !key.is_empty()
        && !key.starts_with('#')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.'));
    valid.then_some(key)
}

fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '$' | '\\'));
    if needs_quotes {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('$', "\\$");
        format!("\"{escaped}\"")
    } else {
        value.to_string()
    }
}
