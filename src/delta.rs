//! Delta orchestrator (component F): generates vcdiff deltas between a
//! complete version and its immediate predecessor by shelling out to
//! `xdelta3`.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::cancel::CancellationToken;

#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("xdelta3 was not found on PATH")]
    ToolMissing,
    #[error("xdelta3 exited with status {status}")]
    ToolFailed { status: String },
    #[error("delta generation cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Given the version directory's contents, compute `(source filename,
/// target delta filename)` pairs for every squashfs/qcow2 item, relative to
/// `prev`'s version name.
fn delta_targets(cur_dir: &Path, prev_version: &str) -> io::Result<Vec<(String, String)>> {
    let mut targets = Vec::new();
    for entry in std::fs::read_dir(cur_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(stem) = name.strip_suffix(".squashfs") {
            let delta_name = format!("{stem}.{prev_version}.vcdiff");
            targets.push((name, delta_name));
        } else if let Some(stem) = name.strip_suffix(".qcow2") {
            let delta_name = format!("{stem}.{prev_version}.qcow2.vcdiff");
            targets.push((name, delta_name));
        }
    }
    targets.sort();
    Ok(targets)
}

/// Generates every missing delta for `cur`, given the full ascending,
/// alphabetically-sorted list of a product's complete version names. A
/// no-op if `cur` is the oldest (index 0) — the oldest version is never a
/// delta target.
///
/// Returns the paths of newly created delta files.
pub fn generate_deltas(
    product_dir: &Path,
    sorted_versions: &[String],
    cur: &str,
    cancel: &CancellationToken,
) -> Result<Vec<PathBuf>, DeltaError> {
    let Some(pos) = sorted_versions.iter().position(|v| v == cur) else {
        return Ok(Vec::new());
    };
    if pos == 0 {
        return Ok(Vec::new());
    }
    let prev = &sorted_versions[pos - 1];

    let cur_dir = product_dir.join(cur);
    let prev_dir = product_dir.join(prev);

    let mut generated = Vec::new();

    for (source_name, delta_name) in delta_targets(&cur_dir, prev)? {
        if cancel.is_cancelled() {
            return Err(DeltaError::Cancelled);
        }

        let delta_path = cur_dir.join(&delta_name);
        if delta_path.exists() {
            continue;
        }

        let source_path = prev_dir.join(&source_name);
        if !source_path.exists() {
            // Gap: the predecessor doesn't have a same-named rootfs file.
            continue;
        }

        let target_path = cur_dir.join(&source_name);
        run_xdelta3(&source_path, &target_path, &delta_path)?;
        generated.push(delta_path);
    }

    Ok(generated)
}

fn run_xdelta3(source: &Path, target: &Path, output: &Path) -> Result<(), DeltaError> {
    let result = Command::new("xdelta3")
        .arg("-e")
        .arg("-s")
        .arg(source)
        .arg(target)
        .arg(output)
        .output();

    let output_result = match result {
        Ok(o) => o,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(DeltaError::ToolMissing),
        Err(err) => return Err(DeltaError::Io(err)),
    };

    if !output_result.status.success() {
        let _ = std::fs::remove_file(output);
        return Err(DeltaError::ToolFailed {
            status: output_result.status.to_string(),
        });
    }

    Ok(())
}
