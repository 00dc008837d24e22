use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use similar::TextDiff;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

/// Replace `path` with `content` atomically unless the bytes already match.
/// In dry-run mode nothing is written and a unified diff is returned instead.
pub fn write_if_changed(path: &Path, content: &str, dry_run: bool) -> Result<WriteOutcome> {
    let existing = if path.exists() {
        Some(fs::read(path).with_context(|| format!("failed to read {}", path.display()))?)
    } else {
        None
    };
    let changed = existing.as_deref() != Some(content.as_bytes());

    if dry_run {
        let diff = changed.then(|| {
            let label = path.to_string_lossy().replace('\\', "/");
            let before = existing
                .as_deref()
                .map(String::from_utf8_lossy)
                .unwrap_or_default();
            TextDiff::from_lines(before.as_ref(), content)
                .unified_diff()
                .context_radius(3)
                .header(&label, &label)
                .to_string()
        });
        return Ok(WriteOutcome {
            path: path.to_path_buf(),
            changed,
            diff,
        });
    }

    if changed {
        write_atomic(path, content)?;
    }
    Ok(WriteOutcome {
        path: path.to_path_buf(),
        changed,
        diff: None,
    })
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("path has no file name: {}", path.display()))?;
    let mut temp_name = file_name.to_os_string();
    temp_name.push(".tmp");
    let temp_path = parent.join(temp_name);
    fs::write(&temp_path, content)
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            temp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}
