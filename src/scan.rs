//! Filesystem scan (component D): discovers products and versions under a
//! stream, validating completeness and reading optional per-version
//! configuration.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::checksums::{self, CHECKSUMS_FILENAME};
use crate::hash;
use crate::model::{ImageConfig, Item, ItemType, Product, ProductKey, Version};
use crate::path::{self, PathError};

pub const IMAGE_CONFIG_FILENAME: &str = "image.yaml";

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("version is missing required metadata and/or rootfs items")]
    VersionIncomplete,
    #[error("invalid image config: {0}")]
    InvalidImageConfig(#[from] serde_yaml::Error),
    #[error(transparent)]
    InvalidPath(#[from] PathError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn has_allowed_extension(name: &str) -> bool {
    name.ends_with(".tar.xz") || name.ends_with(".squashfs") || name.ends_with(".qcow2") || name.ends_with(".vcdiff")
}

/// Reads a single version directory. With `calc_hashes` set, every item's
/// SHA-256 (and the metadata item's combined hashes) is computed; without
/// it, only structure is inspected — used by [`get_product`], which never
/// needs hashes, only completeness.
pub fn get_version(root_dir: &Path, version_rel_path: &Path, calc_hashes: bool) -> Result<Version, ScanError> {
    let version_dir = root_dir.join(version_rel_path);
    let mut items: BTreeMap<String, Item> = BTreeMap::new();
    let mut checksums_map = None;
    let mut image_config = None;

    for entry in fs::read_dir(&version_dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if !file_type.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();

        if name == CHECKSUMS_FILENAME {
            checksums_map = Some(checksums::read_checksums(&entry.path())?);
            continue;
        }
        if name == IMAGE_CONFIG_FILENAME {
            let contents = fs::read_to_string(entry.path())?;
            let config: ImageConfig = serde_yaml::from_str(&contents)?;
            image_config = Some(config);
            continue;
        }
        if !has_allowed_extension(&name) {
            continue;
        }

        let (ftype, delta_base) = path::classify_item(&name);
        let size = entry.metadata()?.len();
        let item_path = version_rel_path.join(&name);
        let mut item = Item::new(name.clone(), item_path.to_string_lossy().into_owned(), ftype, size);
        item.delta_base = delta_base;
        if calc_hashes {
            item.sha256 = Some(hash::hash_file(&entry.path())?);
        }
        items.insert(name, item);
    }

    let has_metadata = items.values().any(|i| matches!(i.ftype, ItemType::LxdMetadata));

    if calc_hashes && has_metadata {
        let metadata_name = items
            .values()
            .find(|i| matches!(i.ftype, ItemType::LxdMetadata))
            .map(|i| i.name.clone());
        if let Some(metadata_name) = metadata_name {
            let metadata_path = version_dir.join(&metadata_name);
            let sibling_kinds = [ItemType::DiskKvmImg, ItemType::Squashfs, ItemType::RootTarXz];
            for kind in sibling_kinds {
                let sibling_name = items
                    .values()
                    .find(|i| i.ftype == kind)
                    .map(|i| i.name.clone());
                if let Some(sibling_name) = sibling_name {
                    let sibling_path = version_dir.join(&sibling_name);
                    let combined = hash::hash_concat(&[metadata_path.as_path(), sibling_path.as_path()])?;
                    let metadata_item = items.get_mut(&metadata_name).expect("metadata item present");
                    match kind {
                        ItemType::DiskKvmImg => metadata_item.combined_disk_kvm_img_sha256 = Some(combined),
                        ItemType::Squashfs => metadata_item.combined_squashfs_sha256 = Some(combined),
                        ItemType::RootTarXz => metadata_item.combined_rootxz_sha256 = Some(combined),
                        _ => unreachable!(),
                    }
                }
            }
        }
    }

    let version = Version {
        items,
        checksums: checksums_map,
        image_config,
    };

    if !version.is_complete() {
        return Err(ScanError::VersionIncomplete);
    }

    Ok(version)
}

/// Lists immediate, non-hidden subdirectories of `dir`, sorted ascending.
fn list_child_dirs(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_hidden(&name) {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

fn alias_for(distro: &str, token: &str, variant: &str) -> String {
    if variant == "default" {
        format!("{distro}/{token}")
    } else {
        format!("{distro}/{token}/{variant}")
    }
}

/// Reads one product directory: validates the path schema, discovers its
/// complete versions, and assembles aliases/requirements from whichever
/// version's `image.yaml` is alphabetically last.
pub fn get_product(root_dir: &Path, product_rel_path: &Path) -> Result<Product, ScanError> {
    let (_, key) = path::parse_product_path(product_rel_path)?;
    let mut product = Product::new(&key);

    let product_dir = root_dir.join(product_rel_path);
    let version_names = list_child_dirs(&product_dir)?;

    let mut last_config: Option<ImageConfig> = None;

    for version_name in version_names {
        let version_rel_path = product_rel_path.join(&version_name);
        match get_version(root_dir, &version_rel_path, false) {
            Ok(version) => {
                if let Some(config) = &version.image_config {
                    last_config = Some(config.clone());
                }
                product.versions.insert(version_name, version);
            }
            Err(ScanError::VersionIncomplete) => {
                tracing::debug!(version = %version_name, product = %key.id(), "skipping incomplete version");
            }
            Err(ScanError::InvalidImageConfig(err)) => {
                tracing::warn!(version = %version_name, product = %key.id(), error = %err, "skipping version with invalid image.yaml");
            }
            Err(other) => return Err(other),
        }
    }

    let base_alias = alias_for(&key.distro, &key.release, &key.variant);
    let mut aliases = vec![base_alias];

    if let Some(config) = &last_config {
        product.requirements = config.simplestream.requirements.clone();
        if let Some(tokens) = config.simplestream.release_aliases.get(&key.release) {
            for token in tokens.split(',') {
                let token = token.trim();
                if !token.is_empty() {
                    aliases.push(alias_for(&key.distro, token, &key.variant));
                }
            }
        }
    }

    product.aliases = aliases.join(",");
    Ok(product)
}

/// Walks a whole stream subtree and returns every well-formed product that
/// ended up with at least one complete version. Directories that don't
/// parse as a product path, and products with zero surviving versions, are
/// silently dropped.
pub fn get_products(root_dir: &Path, stream_name: &str) -> BTreeMap<String, Product> {
    let stream_dir = root_dir.join(stream_name);
    let mut products = BTreeMap::new();

    let walker = WalkDir::new(&stream_dir)
        .min_depth(4)
        .max_depth(4)
        .into_iter()
        .filter_entry(|e| {
            e.file_name()
                .to_str()
                .map(|s| !is_hidden(s))
                .unwrap_or(true)
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(error = %err, "error walking stream tree");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let rel = match entry.path().strip_prefix(root_dir) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };

        match get_product(root_dir, &rel) {
            Ok(product) if !product.versions.is_empty() => {
                products.insert(product.key().id(), product);
            }
            Ok(_) => {}
            Err(ScanError::InvalidPath(_)) => {}
            Err(err) => {
                tracing::warn!(path = %rel.display(), error = %err, "skipping product");
            }
        }
    }

    products
}

/// Enumerates every directory under `stream_name` whose relative path
/// validates as a product schema, regardless of whether it has any
/// versions at all. Used by the prune engine's dangling sweep, which needs
/// to see product directories that never made it into any catalog.
pub fn discover_product_keys(root_dir: &Path, stream_name: &str) -> Vec<ProductKey> {
    let stream_dir = root_dir.join(stream_name);
    let mut keys = Vec::new();

    let walker = WalkDir::new(&stream_dir)
        .min_depth(4)
        .max_depth(4)
        .into_iter()
        .filter_entry(|e| e.file_name().to_str().map(|s| !is_hidden(s)).unwrap_or(true));

    for entry in walker {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_dir() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root_dir) else { continue };
        if let Ok((_, key)) = path::parse_product_path(rel) {
            keys.push(key);
        }
    }

    keys
}

/// Lists the on-disk version directory names for a product, lenient:
/// hidden directories are still filtered, but no completeness check is
/// applied. Used by the prune engine, where incomplete versions are
/// legitimate removal candidates.
pub fn list_on_disk_versions(root_dir: &Path, stream: &str, key: &ProductKey) -> io::Result<Vec<String>> {
    let product_dir = product_dir(root_dir, stream, key);
    if !product_dir.exists() {
        return Ok(Vec::new());
    }
    list_child_dirs(&product_dir)
}

pub fn product_dir(root_dir: &Path, stream: &str, key: &ProductKey) -> PathBuf {
    root_dir.join(stream).join(key.rel_path())
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
    fn version_incomplete_without_rootfs() {
        let dir = tempfile::tempdir().unwrap();
        let version_dir = dir.path().join("v1");
        write_file(&version_dir.join("lxd.tar.xz"), b"meta");
        let err = get_version(dir.path(), Path::new("v1"), false).unwrap_err();
        assert!(matches!(err, ScanError::VersionIncomplete));
    }

    #[test]
    fn version_complete_with_metadata_and_squashfs() {
        let dir = tempfile::tempdir().unwrap();
        let version_dir = dir.path().join("v1");
        write_file(&version_dir.join("lxd.tar.xz"), b"meta");
        write_file(&version_dir.join("rootfs.squashfs"), b"rootfs-bytes");

        let version = get_version(dir.path(), Path::new("v1"), true).unwrap();
        assert_eq!(version.items.len(), 2);
        let metadata = version.items.get("lxd.tar.xz").unwrap();
        assert!(metadata.combined_squashfs_sha256.is_some());
        assert!(metadata.combined_disk_kvm_img_sha256.is_none());
    }

    #[test]
    fn root_tar_xz_only_does_not_complete_version() {
        let dir = tempfile::tempdir().unwrap();
        let version_dir = dir.path().join("v1");
        write_file(&version_dir.join("lxd.tar.xz"), b"meta");
        write_file(&version_dir.join("root.tar.xz"), b"roottar");

        let err = get_version(dir.path(), Path::new("v1"), true).unwrap_err();
        assert!(matches!(err, ScanError::VersionIncomplete));
    }

    #[test]
    fn get_product_builds_aliases_and_skips_incomplete_versions() {
        let dir = tempfile::tempdir().unwrap();
        let product_rel = Path::new("images/ubuntu/lunar/amd64/default");

        let v1 = dir.path().join(product_rel).join("2024_01_01");
        write_file(&v1.join("lxd.tar.xz"), b"meta");
        write_file(&v1.join("rootfs.squashfs"), b"rootfs-bytes");

        let v2 = dir.path().join(product_rel).join("2024_01_02");
        write_file(&v2.join("lxd.tar.xz"), b"meta-only");

        let product = get_product(dir.path(), product_rel).unwrap();
        assert_eq!(product.versions.len(), 1);
        assert!(product.versions.contains_key("2024_01_01"));
        assert_eq!(product.aliases, "ubuntu/lunar");
    }

    #[test]
    fn get_product_variant_aliasing_includes_variant() {
        let dir = tempfile::tempdir().unwrap();
        let product_rel = Path::new("images/ubuntu/lunar/amd64/cloud");
        let v1 = dir.path().join(product_rel).join("2024_01_01");
        write_file(&v1.join("lxd.tar.xz"), b"meta");
        write_file(&v1.join("disk.qcow2"), b"disk-bytes");

        let product = get_product(dir.path(), product_rel).unwrap();
        assert_eq!(product.aliases, "ubuntu/lunar/cloud");
    }

    #[test]
    fn get_products_drops_products_with_zero_versions() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("images/ubuntu/lunar/amd64/cloud")).unwrap();

        let products = get_products(dir.path(), "images");
        assert!(products.is_empty());
    }

    #[test]
    fn hidden_version_directories_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let product_rel = Path::new("images/ubuntu/lunar/amd64/cloud");
        let hidden = dir.path().join(product_rel).join(".hidden");
        write_file(&hidden.join("lxd.tar.xz"), b"meta");
        write_file(&hidden.join("rootfs.squashfs"), b"rootfs-bytes");

        let product = get_product(dir.path(), product_rel).unwrap();
        assert!(product.versions.is_empty());
    }
}
