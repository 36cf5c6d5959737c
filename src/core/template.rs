// src/core/template.rs

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

lazy_static! {
    /// Matches `[key]` placeholders. Keys start with a letter or underscore so
    /// that index expressions such as `list[0]` are never touched.
    static ref PLACEHOLDER_RE: Regex =
        Regex::new(r"\[([A-Za-z_][A-Za-z0-9_]*)\]").expect("placeholder regex is valid");
}

/// Substitution values for a template.
pub type TemplateData = BTreeMap<String, String>;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template '{id}' not found in '{}'", .dir.display())]
    NotFound { id: String, dir: PathBuf },
    #[error("Could not read template '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Destination '{}' already exists.", .0.display())]
    DestinationExists(PathBuf),
    #[error("Could not write '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not walk template directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Replaces every `[key]` whose key is present in `data`. Unknown keys are
/// left as they are.
pub fn render_str(template: &str, data: &TemplateData) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            caps.get(1)
                .and_then(|key| data.get(key.as_str()))
                .map_or_else(|| whole.to_string(), Clone::clone)
        })
        .into_owned()
}

/// Resolves template identifiers relative to a templates directory.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of a template, failing when it does not exist.
    pub fn path_of(&self, id: &str) -> Result<PathBuf, TemplateError> {
        let path = self.dir.join(id);
        if path.exists() {
            Ok(path)
        } else {
            Err(TemplateError::NotFound {
                id: id.to_string(),
                dir: self.dir.clone(),
            })
        }
    }

    /// Reads the template file `id` and renders it with `data`.
    pub fn render(&self, id: &str, data: &TemplateData) -> Result<String, TemplateError> {
        let path = self.path_of(id)?;
        let content = fs::read_to_string(&path).map_err(|e| TemplateError::Read {
            path: path.clone(),
            source: e,
        })?;
        Ok(render_str(&content, data))
    }

    /// Renders template `id` into `dest`, creating parent directories. An
    /// existing destination is never overwritten.
    pub fn render_to(&self, id: &str, dest: &Path, data: &TemplateData) -> Result<(), TemplateError> {
        if dest.exists() {
            return Err(TemplateError::DestinationExists(dest.to_path_buf()));
        }
        let content = self.render(id, data)?;
        write_file(dest, &content)
    }

    /// Copies the template directory `id` to `dest`, rendering both the file
    /// contents and the path components. Returns the files written.
    pub fn scaffold_dir(
        &self,
        id: &str,
        dest: &Path,
        data: &TemplateData,
    ) -> Result<Vec<PathBuf>, TemplateError> {
        let src = self.path_of(id)?;
        if dest.exists() {
            return Err(TemplateError::DestinationExists(dest.to_path_buf()));
        }

        let mut written = Vec::new();
        for entry in WalkDir::new(&src).sort_by_file_name() {
            let entry = entry?;
            let Ok(relative) = entry.path().strip_prefix(&src) else {
                continue;
            };
            let target = dest.join(render_str(&relative.to_string_lossy(), data));

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).map_err(|e| TemplateError::Write {
                    path: target.clone(),
                    source: e,
                })?;
                continue;
            }

            match fs::read_to_string(entry.path()) {
                Ok(content) => write_file(&target, &render_str(&content, data))?,
                // Binary assets are copied untouched.
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    copy_file(entry.path(), &target)?;
                }
                Err(e) => {
                    return Err(TemplateError::Read {
                        path: entry.path().to_path_buf(),
                        source: e,
                    });
                }
            }
            log::debug!("Scaffolded '{}'.", target.display());
            written.push(target);
        }
        Ok(written)
    }
}

fn write_file(dest: &Path, content: &str) -> Result<(), TemplateError> {
    let to_err = |e| TemplateError::Write {
        path: dest.to_path_buf(),
        source: e,
    };
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(to_err)?;
    }
    fs::write(dest, content).map_err(to_err)
}

fn copy_file(src: &Path, dest: &Path) -> Result<(), TemplateError> {
    let to_err = |e| TemplateError::Write {
        path: dest.to_path_buf(),
        source: e,
    };
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(to_err)?;
    }
    fs::copy(src, dest).map(|_| ()).map_err(to_err)
}

/// Builds a `TemplateData` map from key/value pairs.
pub fn data<K, V, I>(pairs: I) -> TemplateData
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
