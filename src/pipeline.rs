//! Build pipeline (component G): loads each stream's previously published
//! catalog, discovers newly-arrived versions, and runs them through a
//! bounded worker pool — delta, then hash, then checksum verification,
//! then catalog insertion under a single mutex.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::bounded;

use crate::cancel::CancellationToken;
use crate::checksums;
use crate::delta;
use crate::io_json;
use crate::model::{self, Catalog, Product, ProductKey};
use crate::scan;

struct Job {
    stream: String,
    product_id: String,
    key: ProductKey,
    version_name: String,
}

/// Runs one build pass across `streams`, returning the resulting catalog
/// for each. Per-version failures (delta, hashing, checksum mismatch) are
/// logged and drop only that version; only failures outside a job — e.g.
/// an unreadable previous catalog — abort the whole stream.
pub fn run_build(
    root: &Path,
    stream_version: &str,
    streams: &[String],
    workers: usize,
    cancel: &CancellationToken,
) -> Result<BTreeMap<String, Catalog>> {
    let workers = workers.max(1);
    let mut final_catalogs = BTreeMap::new();

    for stream in streams {
        if cancel.is_cancelled() {
            anyhow::bail!("build cancelled before processing stream {stream}");
        }

        let catalog_path = root.join("streams").join(stream_version).join(format!("{stream}.json"));
        let old_catalog = io_json::read_optional::<Catalog>(&catalog_path)
            .with_context(|| format!("reading previous catalog for stream {stream}"))?
            .unwrap_or_default();

        let discovered = scan::get_products(root, stream);
        let (_removed, added) = model::diff(&old_catalog, &discovered);

        let mut jobs = Vec::new();
        for (product_id, product) in &added {
            let key = ProductKey::parse_id(product_id).expect("catalog ids are always well-formed");
            for version_name in product.versions.keys() {
                jobs.push(Job {
                    stream: stream.clone(),
                    product_id: product_id.clone(),
                    key: key.clone(),
                    version_name: version_name.clone(),
                });
            }
        }

        let catalog = Arc::new(Mutex::new(old_catalog));
        let discovered = Arc::new(discovered);
        run_jobs(root, jobs, workers, cancel, &discovered, &catalog);

        let catalog = Arc::try_unwrap(catalog)
            .unwrap_or_else(|_| panic!("all pipeline workers join before the catalog is unwrapped"))
            .into_inner()
            .expect("pipeline mutex is never poisoned");
        final_catalogs.insert(stream.clone(), catalog);
    }

    Ok(final_catalogs)
}

fn run_jobs(
    root: &Path,
    jobs: Vec<Job>,
    workers: usize,
    cancel: &CancellationToken,
    discovered: &Arc<BTreeMap<String, Product>>,
    catalog: &Arc<Mutex<Catalog>>,
) {
    let (tx, rx) = bounded::<Job>(workers);
    let mut handles = Vec::with_capacity(workers);

    for _ in 0..workers {
        let rx = rx.clone();
        let catalog = Arc::clone(catalog);
        let discovered = Arc::clone(discovered);
        let cancel = cancel.clone();
        let root = root.to_path_buf();

        handles.push(thread::spawn(move || {
            while let Ok(job) = rx.recv() {
                if cancel.is_cancelled() {
                    break;
                }
                if let Some((product_meta, version_name, version)) = process_job(&root, &job, &discovered, &cancel) {
                    let mut catalog = catalog.lock().expect("pipeline mutex is never poisoned");
                    let entry = catalog.products.entry(job.product_id.clone()).or_insert(product_meta);
                    entry.versions.insert(version_name, version);
                }
            }
        }));
    }

    for job in jobs {
        if tx.send(job).is_err() {
            break;
        }
    }
    drop(tx);

    for handle in handles {
        let _ = handle.join();
    }
}

/// Runs one `(product, version)` job to completion: delta generation, then
/// hashing, then checksum verification. Returns `None` — logging why — for
/// any of the per-version failure modes in §7, none of which should abort
/// sibling jobs.
fn process_job(
    root: &Path,
    job: &Job,
    discovered: &BTreeMap<String, Product>,
    cancel: &CancellationToken,
) -> Option<(Product, String, crate::model::Version)> {
    let product = discovered.get(&job.product_id)?;
    let product_dir = scan::product_dir(root, &job.stream, &job.key);

    let mut sorted_versions: Vec<String> = product.versions.keys().cloned().collect();
    sorted_versions.sort();

    if let Err(err) = delta::generate_deltas(&product_dir, &sorted_versions, &job.version_name, cancel) {
        tracing::warn!(
            product = %job.product_id,
            version = %job.version_name,
            error = %err,
            "delta generation failed, dropping version from this build"
        );
        return None;
    }

    let version_rel_path: PathBuf = Path::new(&job.stream).join(job.key.rel_path()).join(&job.version_name);
    let mut version = match scan::get_version(root, &version_rel_path, true) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(
                product = %job.product_id,
                version = %job.version_name,
                error = %err,
                "failed to read/hash version, dropping from this build"
            );
            return None;
        }
    };

    if let Some(expected) = version.checksums.take() {
        let checksums_path = root.join(&version_rel_path).join(checksums::CHECKSUMS_FILENAME);
        for item in version.items.values() {
            match expected.get(&item.name) {
                Some(hex) => {
                    if item.sha256.as_deref() != Some(hex.as_str()) {
                        tracing::warn!(
                            product = %job.product_id,
                            version = %job.version_name,
                            item = %item.name,
                            "checksum mismatch, dropping version from this build"
                        );
                        return None;
                    }
                }
                None if item.ftype.is_vcdiff() => {
                    let Some(hex) = &item.sha256 else { continue };
                    if let Err(err) = checksums::append_checksum(&checksums_path, &item.name, hex) {
                        tracing::warn!(
                            product = %job.product_id,
                            version = %job.version_name,
                            error = %err,
                            "failed to append checksum, dropping version from this build"
                        );
                        return None;
                    }
                }
                None => {
                    tracing::warn!(
                        product = %job.product_id,
                        version = %job.version_name,
                        item = %item.name,
                        "checksum missing for non-delta item, dropping version from this build"
                    );
                    return None;
                }
            }
        }
    }

    let mut product_meta = product.clone();
    product_meta.versions.clear();

    Some((product_meta, job.version_name.clone(), version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_file(path: &Path, contents: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn build_discovers_and_inserts_new_complete_version() {
        let dir = tempfile::tempdir().unwrap();
        let product_rel = Path::new("images/ubuntu/lunar/amd64/cloud");
        let v1 = dir.path().join(product_rel).join("2024_01_01");
        write_file(&v1.join("lxd.tar.xz"), b"meta");
        write_file(&v1.join("rootfs.squashfs"), b"rootfs-bytes");

        let cancel = CancellationToken::new();
        let catalogs = run_build(dir.path(), "v1", &["images".to_string()], 2, &cancel).unwrap();

        let catalog = &catalogs["images"];
        let product = &catalog.products["ubuntu:lunar:amd64:cloud"];
        assert!(product.versions.contains_key("2024_01_01"));
    }

    #[test]
    fn rerunning_build_is_a_no_op_for_already_published_versions() {
        let dir = tempfile::tempdir().unwrap();
        let product_rel = Path::new("images/ubuntu/lunar/amd64/cloud");
        let v1 = dir.path().join(product_rel).join("2024_01_01");
        write_file(&v1.join("lxd.tar.xz"), b"meta");
        write_file(&v1.join("rootfs.squashfs"), b"rootfs-bytes");

        let cancel = CancellationToken::new();
        let first = run_build(dir.path(), "v1", &["images".to_string()], 2, &cancel).unwrap();
        crate::publish::publish(dir.path(), "v1", &first).unwrap();

        let second = run_build(dir.path(), "v1", &["images".to_string()], 2, &cancel).unwrap();
        assert_eq!(
            second["images"].products["ubuntu:lunar:amd64:cloud"].versions.len(),
            1
        );
    }

    #[test]
    fn checksum_mismatch_drops_version_from_build() {
        let dir = tempfile::tempdir().unwrap();
        let product_rel = Path::new("images/ubuntu/lunar/amd64/cloud");
        let v1 = dir.path().join(product_rel).join("2024_01_01");
        write_file(&v1.join("lxd.tar.xz"), b"meta");
        write_file(&v1.join("rootfs.squashfs"), b"rootfs-bytes");
        write_file(&v1.join("SHA256SUMS"), b"deadbeef  lxd.tar.xz\ndeadbeef  rootfs.squashfs\n");

        let cancel = CancellationToken::new();
        let catalogs = run_build(dir.path(), "v1", &["images".to_string()], 1, &cancel).unwrap();
        assert!(!catalogs["images"].products.contains_key("ubuntu:lunar:amd64:cloud"));
    }
}
