//! Prune engine (component I): quota (and folded-in age) retention, the
//! dangling-version sweep, and bottom-up empty-directory cleanup.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;
use time::OffsetDateTime;
use walkdir::WalkDir;

use crate::model::{Catalog, ProductKey};
use crate::scan;

/// Default freshness window for the dangling sweep (§4.I): an unreferenced
/// version younger than this is assumed to be an upload still in flight.
pub const DEFAULT_FRESHNESS_HOURS: i64 = 6;

#[derive(Debug, Error)]
pub enum PruneError {
    #[error("--retain-builds must be >= 1")]
    InvalidRetainBuilds,
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn youngest_mtime(dir: &Path) -> Option<OffsetDateTime> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok()?.modified().ok())
        .max()
        .and_then(|t| OffsetDateTime::try_from(t).ok())
}

/// Quota retention for one stream's already-loaded catalog, with age
/// retention (§4.J) folded in as a stricter filter ahead of the "keep
/// newest `keep`" cut: a version survives only if it is both in the
/// top-`keep` set and, when `retain_days` is set, newer than the cutoff.
/// Mutates the catalog's version maps to match what survives on disk and
/// removes the superseded directories; does not publish.
pub fn prune_quota(
    root: &Path,
    stream: &str,
    mut catalog: Catalog,
    keep: usize,
    retain_days: Option<u64>,
) -> Result<Catalog, PruneError> {
    if keep == 0 {
        return Err(PruneError::InvalidRetainBuilds);
    }

    let cutoff = retain_days
        .filter(|days| *days > 0)
        .map(|days| OffsetDateTime::now_utc() - time::Duration::days(days as i64));

    for (id, product) in catalog.products.iter_mut() {
        let Some(key) = ProductKey::parse_id(id) else { continue };
        let product_dir = scan::product_dir(root, stream, &key);
        let on_disk = scan::list_on_disk_versions(root, stream, &key)?;

        let mut complete: Vec<String> = on_disk
            .iter()
            .filter(|name| {
                let version_rel = Path::new(stream).join(key.rel_path()).join(name);
                scan::get_version(root, &version_rel, false).is_ok()
            })
            .cloned()
            .collect();
        complete.sort();

        let keep_n = keep.min(complete.len());
        let mut retained: BTreeSet<String> = complete[complete.len() - keep_n..].iter().cloned().collect();

        if let Some(cutoff) = cutoff {
            retained.retain(|name| youngest_mtime(&product_dir.join(name)).map(|t| t >= cutoff).unwrap_or(true));
        }

        for name in &on_disk {
            if retained.contains(name) {
                continue;
            }
            let dir = product_dir.join(name);
            if let Err(err) = fs::remove_dir_all(&dir) {
                tracing::warn!(product = %id, version = %name, error = %err, "failed to remove pruned version directory");
            }
        }

        product.versions.retain(|name, _| retained.contains(name));
    }

    Ok(catalog)
}

/// Deletes on-disk versions not referenced by `catalog` — including whole
/// product directories the catalog has never heard of — but only those
/// whose youngest file is older than `freshness`, to avoid racing an
/// upload in progress. Never mutates `catalog`: a dangling version is by
/// definition already unreferenced.
pub fn prune_dangling(root: &Path, stream: &str, catalog: &Catalog, freshness: time::Duration) -> Result<(), PruneError> {
    let cutoff = OffsetDateTime::now_utc() - freshness;

    let mut keys: BTreeSet<ProductKey> = scan::discover_product_keys(root, stream).into_iter().collect();
    for id in catalog.products.keys() {
        if let Some(key) = ProductKey::parse_id(id) {
            keys.insert(key);
        }
    }

    for key in keys {
        let id = key.id();
        let referenced = catalog.products.get(&id).map(|p| &p.versions);
        let product_dir = scan::product_dir(root, stream, &key);
        let on_disk = scan::list_on_disk_versions(root, stream, &key)?;

        for name in &on_disk {
            if referenced.map(|versions| versions.contains_key(name)).unwrap_or(false) {
                continue;
            }
            let dir = product_dir.join(name);
            let Some(youngest) = youngest_mtime(&dir) else { continue };
            if youngest >= cutoff {
                continue;
            }
            if let Err(err) = fs::remove_dir_all(&dir) {
                tracing::warn!(product = %id, version = %name, error = %err, "failed to remove dangling version directory");
            }
        }
    }

    Ok(())
}

fn clean_path(path: &Path) -> std::path::PathBuf {
    let mut out = std::path::PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Removes `dir` if, after recursing, it ends up with no regular files or
/// symlinks anywhere beneath it. Symlinks are never followed or deleted,
/// and their presence makes every ancestor directory non-empty.
fn remove_if_empty(dir: &Path) -> io::Result<bool> {
    let mut empty = true;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if !remove_if_empty(&entry.path())? {
                empty = false;
            }
        } else {
            empty = false;
        }
    }
    if empty {
        fs::remove_dir(dir)?;
    }
    Ok(empty)
}

/// Bottom-up removal of every empty directory beneath `root`. When
/// `keep_root` is true, `root` itself is retained even if it ends up
/// empty; otherwise `root` is removed too if nothing survives beneath it.
pub fn prune_empty_dirs(root: &Path, keep_root: bool) -> io::Result<()> {
    let root = clean_path(root);
    if keep_root {
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                remove_if_empty(&entry.path())?;
            }
        }
        Ok(())
    } else {
        remove_if_empty(&root).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Product;
    use std::fs;

    fn write_file(path: &Path, contents: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn product_dir_for(root: &Path, stream: &str, key: &ProductKey) -> std::path::PathBuf {
        scan::product_dir(root, stream, key)
    }

    #[test]
    fn quota_retention_keeps_only_the_newest_n_complete_versions() {
        let dir = tempfile::tempdir().unwrap();
        let key = ProductKey {
            distro: "ubuntu".into(),
            release: "lunar".into(),
            arch: "amd64".into(),
            variant: "cloud".into(),
        };
        let product_dir = product_dir_for(dir.path(), "images", &key);
        for v in ["A", "B", "C", "D"] {
            write_file(&product_dir.join(v).join("lxd.tar.xz"), b"meta");
            write_file(&product_dir.join(v).join("rootfs.squashfs"), b"rootfs-bytes");
        }

        let mut catalog = Catalog::default();
        let mut product = Product::new(&key);
        for v in ["A", "B", "C", "D"] {
            product.versions.insert(v.to_string(), Default::default());
        }
        catalog.products.insert(key.id(), product);

        let pruned = prune_quota(dir.path(), "images", catalog, 3, None).unwrap();
        let remaining: Vec<&String> = pruned.products[&key.id()].versions.keys().collect();
        assert_eq!(remaining, vec!["B", "C", "D"]);
        assert!(!product_dir.join("A").exists());
        assert!(product_dir.join("D").exists());
    }

    #[test]
    fn quota_retention_rejects_zero_keep() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::default();
        let err = prune_quota(dir.path(), "images", catalog, 0, None).unwrap_err();
        assert!(matches!(err, PruneError::InvalidRetainBuilds));
    }

    #[test]
    fn dangling_sweep_spares_fresh_unreferenced_versions() {
        let dir = tempfile::tempdir().unwrap();
        let key = ProductKey {
            distro: "ubuntu".into(),
            release: "lunar".into(),
            arch: "amd64".into(),
            variant: "cloud".into(),
        };
        let product_dir = product_dir_for(dir.path(), "images", &key);
        write_file(&product_dir.join("1.0").join("lxd.tar.xz"), b"meta");
        write_file(&product_dir.join("2.0").join("lxd.tar.xz"), b"meta-fresh");

        let mut catalog = Catalog::default();
        let mut product = Product::new(&key);
        product.versions.insert("1.0".to_string(), Default::default());
        catalog.products.insert(key.id(), product);

        prune_dangling(dir.path(), "images", &catalog, time::Duration::hours(DEFAULT_FRESHNESS_HOURS)).unwrap();

        assert!(product_dir.join("1.0").exists());
        assert!(product_dir.join("2.0").exists(), "fresh dangling version should survive");
    }

    #[test]
    fn dangling_sweep_removes_stale_unreferenced_versions() {
        let dir = tempfile::tempdir().unwrap();
        let key = ProductKey {
            distro: "ubuntu".into(),
            release: "lunar".into(),
            arch: "amd64".into(),
            variant: "cloud".into(),
        };
        let product_dir = product_dir_for(dir.path(), "images", &key);
        write_file(&product_dir.join("2.0").join("lxd.tar.xz"), b"meta-old");

        let catalog = Catalog::default();

        // A negative freshness window treats every file as "older" than
        // the cutoff, simulating an upload well past the freshness window
        // without needing to backdate file mtimes.
        prune_dangling(dir.path(), "images", &catalog, time::Duration::seconds(-1)).unwrap();

        assert!(!product_dir.join("2.0").exists());
    }

    #[test]
    fn empty_dirs_are_removed_bottom_up_but_root_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        write_file(&dir.path().join("x/file"), b"keep me");

        prune_empty_dirs(dir.path(), true).unwrap();

        assert!(dir.path().exists());
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().join("x/file").exists());
    }
}
