//! Atomic publisher (component H): stages catalog and index JSON to
//! hidden, same-directory temp files and renames them into place,
//! catalogs first and the index last, so no reader ever observes an index
//! referencing a catalog that doesn't exist yet.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{CATALOG_DATATYPE, CATALOG_FORMAT, Catalog, Index, IndexStream};

const PUBLISHED_MODE: u32 = 0o644;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to stage {path}: {source}")]
    Stage { path: String, source: std::io::Error },
    #[error("failed to rename {from} into place at {to}: {source}")]
    Rename { from: String, to: String, source: std::io::Error },
    #[error("failed to set permissions on {path}: {source}")]
    Permissions { path: String, source: std::io::Error },
    #[error("failed to serialize {path}: {source}")]
    Serialize { path: String, source: serde_json::Error },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

struct Staged {
    staging: PathBuf,
    final_path: PathBuf,
}

fn staging_path(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .expect("publish target always has a file name")
        .to_string_lossy();
    final_path.with_file_name(format!(".{name}.tmp"))
}

fn stage_json<T: serde::Serialize>(final_path: &Path, value: &T) -> Result<Staged, PublishError> {
    let staging = staging_path(final_path);
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| PublishError::Serialize {
        path: final_path.display().to_string(),
        source,
    })?;

    let mut file = File::create(&staging).map_err(|source| PublishError::Stage {
        path: staging.display().to_string(),
        source,
    })?;
    file.write_all(&bytes).map_err(|source| PublishError::Stage {
        path: staging.display().to_string(),
        source,
    })?;

    Ok(Staged { staging, final_path: final_path.to_path_buf() })
}

fn finalize(staged: &Staged) -> Result<(), PublishError> {
    fs::rename(&staged.staging, &staged.final_path).map_err(|source| PublishError::Rename {
        from: staged.staging.display().to_string(),
        to: staged.final_path.display().to_string(),
        source,
    })?;

    let permissions = std::fs::Permissions::from_mode(PUBLISHED_MODE);
    fs::set_permissions(&staged.final_path, permissions).map_err(|source| PublishError::Permissions {
        path: staged.final_path.display().to_string(),
        source,
    })
}

fn cleanup(staged: &[Staged]) {
    for s in staged {
        let _ = fs::remove_file(&s.staging);
    }
}

fn build_index(stream_version: &str, catalogs: &BTreeMap<String, Catalog>) -> Index {
    let updated = OffsetDateTime::now_utc();
    let mut index = Index::default();
    for (stream, catalog) in catalogs {
        index.index.insert(
            stream.clone(),
            IndexStream {
                path: format!("streams/{stream_version}/{stream}.json"),
                format: CATALOG_FORMAT.to_string(),
                datatype: CATALOG_DATATYPE.to_string(),
                updated,
                products: catalog.products.keys().cloned().collect(),
            },
        );
    }
    index
}

/// Writes every stream's catalog plus the stream-version index, atomically
/// with respect to any concurrent reader: all catalogs are staged and
/// renamed before the index is staged and renamed, and nothing partial is
/// left behind on failure.
pub fn publish(root: &Path, stream_version: &str, catalogs: &BTreeMap<String, Catalog>) -> Result<(), PublishError> {
    let streams_dir = root.join("streams").join(stream_version);
    fs::create_dir_all(&streams_dir)?;

    let mut staged_catalogs = Vec::with_capacity(catalogs.len());
    for (stream, catalog) in catalogs {
        let final_path = streams_dir.join(format!("{stream}.json"));
        match stage_json(&final_path, catalog) {
            Ok(staged) => staged_catalogs.push(staged),
            Err(err) => {
                cleanup(&staged_catalogs);
                return Err(err);
            }
        }
    }

    let index = build_index(stream_version, catalogs);
    let index_path = streams_dir.join("index.json");
    let staged_index = match stage_json(&index_path, &index) {
        Ok(staged) => staged,
        Err(err) => {
            cleanup(&staged_catalogs);
            return Err(err);
        }
    };

    for staged in &staged_catalogs {
        if let Err(err) = finalize(staged) {
            let _ = fs::remove_file(&staged_index.staging);
            return Err(err);
        }
    }
    finalize(&staged_index)?;

    Ok(())
}
