// src/core/patcher.rs

use crate::{
    core::template::{TemplateData, TemplateStore},
    errors::TaskError,
};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A declarative instruction to insert a rendered template right after the
/// first line containing `tag` in `file`.
///
/// Patching is not idempotent: applying the same descriptor twice inserts the
/// block twice. Callers apply each descriptor at most once per file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatchDescriptor {
    pub file: PathBuf,
    pub tag: String,
    pub template: String,
    #[serde(default)]
    pub data: TemplateData,
    #[serde(default)]
    pub log: String,
}

/// Applies every descriptor in order, stopping at the first failure.
///
/// Files patched before the failing descriptor keep their new content.
pub fn apply_all(patches: &[PatchDescriptor], store: &TemplateStore) -> Result<(), TaskError> {
    for patch in patches {
        apply(patch, store)?;
        if !patch.log.is_empty() {
            println!("  {} {}", "patched".green(), patch.log);
        }
    }
    Ok(())
}

/// Applies a single descriptor.
pub fn apply(patch: &PatchDescriptor, store: &TemplateStore) -> Result<(), TaskError> {
    let original = fs::read_to_string(&patch.file).map_err(|e| TaskError::io(&patch.file, e))?;
    let block = store.render(&patch.template, &patch.data)?;

    let patched = insert_after_tag(&original, &patch.tag, &block).ok_or_else(|| {
        TaskError::TagNotFound {
            file: patch.file.clone(),
            tag: patch.tag.clone(),
        }
    })?;

    write_atomically(&patch.file, &patched)?;
    log::debug!("Patched '{}' after tag '{}'.", patch.file.display(), patch.tag);
    Ok(())
}

/// Inserts `block` after the first line equal to or containing `tag`.
/// Returns `None` when no line carries the tag.
pub fn insert_after_tag(content: &str, tag: &str, block: &str) -> Option<String> {
    let mut out = String::with_capacity(content.len() + block.len() + 1);
    let mut inserted = false;

    for line in content.split_inclusive('\n') {
        out.push_str(line);
        if inserted || !line.trim_end_matches(['\r', '\n']).contains(tag) {
            continue;
        }
        if !line.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(block);
        if !block.ends_with('\n') {
            out.push('\n');
        }
        inserted = true;
    }

    inserted.then_some(out)
}

/// Writes `content` to a sibling temp file and renames it over `path`, so a
/// failed write never leaves a torn file behind.
pub fn write_atomically(path: &Path, content: &str) -> Result<(), TaskError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| TaskError::io(dir, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| TaskError::io(tmp.path(), e))?;
    if let Some(permissions) = permissions_for(path) {
        tmp.as_file()
            .set_permissions(permissions)
            .map_err(|e| TaskError::io(tmp.path(), e))?;
    }
    tmp.persist(path).map_err(|e| TaskError::io(path, e.error))?;
    Ok(())
}

/// The replaced file keeps its mode. New files get the usual 0644 rather than
/// the temp file's private 0600.
fn permissions_for(path: &Path) -> Option<fs::Permissions> {
    fs::metadata(path)
        .map(|meta| meta.permissions())
        .ok()
        .or_else(new_file_permissions)
}

#[cfg(unix)]
fn new_file_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<fs::Permissions> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SITE_USER_TAG;
    use crate::core::template::data;
    use tempfile::tempdir;

    const SEED: &str = "INSERT INTO roles VALUES (1);\n# Insert site_user Data #\nCOMMIT;\n";

    fn setup() -> (tempfile::TempDir, TemplateStore, PathBuf) {
        let dir = tempdir().unwrap();
        let templates = dir.path().join("templates");
        fs::create_dir_all(templates.join("sql")).unwrap();
        fs::write(
            templates.join("sql/site_user.sql"),
            "INSERT INTO site_user (email) VALUES ('[email]');\n",
        )
        .unwrap();
        let seed = dir.path().join("site_users.sql");
        fs::write(&seed, SEED).unwrap();
        (dir, TemplateStore::new(templates), seed)
    }

    fn descriptor(file: &Path, tag: &str) -> PatchDescriptor {
        PatchDescriptor {
            file: file.to_path_buf(),
            tag: tag.to_string(),
            template: "sql/site_user.sql".to_string(),
            data: data([("email", "ops@example.com")]),
            log: String::new(),
        }
    }

    #[test]
    fn test_block_lands_right_after_tag() {
        let (_dir, store, seed) = setup();
        apply(&descriptor(&seed, SITE_USER_TAG), &store).unwrap();

        let lines: Vec<String> = fs::read_to_string(&seed)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(
            lines,
            vec![
                "INSERT INTO roles VALUES (1);",
                "# Insert site_user Data #",
                "INSERT INTO site_user (email) VALUES ('ops@example.com');",
                "COMMIT;",
            ]
        );
    }

    #[test]
    fn test_missing_tag_leaves_file_untouched() {
        let (_dir, store, seed) = setup();
        let err = apply(&descriptor(&seed, "# Insert tenant Data #"), &store).unwrap_err();

        assert!(matches!(err, TaskError::TagNotFound { .. }));
        assert_eq!(fs::read(&seed).unwrap(), SEED.as_bytes());
    }

    #[test]
    fn test_batch_stops_at_first_failure() {
        let (dir, store, seed) = setup();
        let other = dir.path().join("other.sql");
        fs::write(&other, SEED).unwrap();

        let patches = vec![
            descriptor(&seed, SITE_USER_TAG),
            descriptor(&seed, "missing tag"),
            descriptor(&other, SITE_USER_TAG),
        ];
        assert!(apply_all(&patches, &store).is_err());

        // The first patch stays applied, the third never ran.
        assert!(fs::read_to_string(&seed).unwrap().contains("ops@example.com"));
        assert_eq!(fs::read_to_string(&other).unwrap(), SEED);
    }

    #[test]
    fn test_reapplying_duplicates_the_block() {
        let (_dir, store, seed) = setup();
        apply(&descriptor(&seed, SITE_USER_TAG), &store).unwrap();
        apply(&descriptor(&seed, SITE_USER_TAG), &store).unwrap();

        let content = fs::read_to_string(&seed).unwrap();
        assert_eq!(content.matches("ops@example.com").count(), 2);
    }

    #[test]
    fn test_insert_only_after_first_match_and_without_trailing_newline() {
        let out = insert_after_tag("a\n// TAG\nb\n// TAG", "TAG", "x").unwrap();
        assert_eq!(out, "a\n// TAG\nx\nb\n// TAG");

        let out = insert_after_tag("// TAG", "TAG", "x\n").unwrap();
        assert_eq!(out, "// TAG\nx\n");

        assert!(insert_after_tag("nothing here\n", "TAG", "x").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrite_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store, seed) = setup();
        fs::set_permissions(&seed, fs::Permissions::from_mode(0o640)).unwrap();

        apply(&descriptor(&seed, SITE_USER_TAG), &store).unwrap();

        let mode = fs::metadata(&seed).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn test_new_file_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let target = dir.path().join("docker-compose.yml");

        write_atomically(&target, "services: {}\n").unwrap();

        let mode = fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }
}
