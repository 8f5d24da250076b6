//! Path schema & naming (component A): parsing a product's relative path
//! into its 4-tuple identity, and classifying item files by extension.

use std::path::Path;

use thiserror::Error;

use crate::model::{ItemType, ProductKey};

#[derive(Debug, Error)]
pub enum PathError {
    #[error("invalid product path {path:?}: expected 5 components (stream/distro/release/arch/variant), found {found}")]
    WrongComponentCount { path: String, found: usize },
}

/// Parses a path relative to the repository root (`stream/distro/release/
/// arch/variant`) into its stream name and product key. Rejects anything
/// that doesn't split into exactly five non-empty components.
pub fn parse_product_path(stream_rel: &Path) -> Result<(String, ProductKey), PathError> {
    let components: Vec<&str> = stream_rel
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();

    if components.len() != 5 {
        return Err(PathError::WrongComponentCount {
            path: stream_rel.display().to_string(),
            found: components.len(),
        });
    }

    let stream = components[0].to_string();
    let key = ProductKey {
        distro: components[1].to_string(),
        release: components[2].to_string(),
        arch: components[3].to_string(),
        variant: components[4].to_string(),
    };
    Ok((stream, key))
}

/// Classifies a filename into its item type, extracting the delta's source
/// version name when the file is a vcdiff.
pub fn classify_item(filename: &str) -> (ItemType, Option<String>) {
    if filename.ends_with(".qcow2.vcdiff") {
        let base = delta_source_version(filename, 3);
        return (ItemType::DiskKvmImgVcdiff, base);
    }
    if filename.ends_with(".vcdiff") {
        let base = delta_source_version(filename, 2);
        return (ItemType::SquashfsVcdiff, base);
    }
    if filename.ends_with(".squashfs") {
        return (ItemType::Squashfs, None);
    }
    if filename.ends_with(".qcow2") {
        return (ItemType::DiskKvmImg, None);
    }
    if filename.ends_with(".tar.xz") {
        if filename == "root.tar.xz" {
            return (ItemType::RootTarXz, None);
        }
        return (ItemType::LxdMetadata, None);
    }
    (ItemType::Other(filename.to_string()), None)
}

/// `<prefix>.<sourceVersion>.vcdiff` or `<prefix>.<sourceVersion>.qcow2.vcdiff`.
/// `trailing` is the number of dot-separated segments after the source
/// version (2 for `.vcdiff`, 3 for `.qcow2.vcdiff`).
fn delta_source_version(filename: &str, trailing: usize) -> Option<String> {
    let parts: Vec<&str> = filename.split('.').collect();
    if parts.len() <= trailing {
        return None;
    }
    let idx = parts.len() - trailing;
    Some(parts[idx].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_well_formed_product_path() {
        let (stream, key) = parse_product_path(&PathBuf::from("images/ubuntu/lunar/amd64/cloud")).unwrap();
        assert_eq!(stream, "images");
        assert_eq!(key.id(), "ubuntu:lunar:amd64:cloud");
    }

    #[test]
    fn rejects_wrong_component_count() {
        assert!(parse_product_path(&PathBuf::from("images/ubuntu/lunar")).is_err());
        assert!(parse_product_path(&PathBuf::from("images/ubuntu/lunar/amd64/cloud/extra")).is_err());
    }

    #[test]
    fn classifies_extensions() {
        assert_eq!(classify_item("lxd.tar.xz").0, ItemType::LxdMetadata);
        assert_eq!(classify_item("root.tar.xz").0, ItemType::RootTarXz);
        assert_eq!(classify_item("rootfs.squashfs").0, ItemType::Squashfs);
        assert_eq!(classify_item("disk.qcow2").0, ItemType::DiskKvmImg);
        assert_eq!(classify_item("unknown.bin").0, ItemType::Other("unknown.bin".to_string()));
    }

    #[test]
    fn classifies_container_delta_and_extracts_base() {
        let (ty, base) = classify_item("rootfs.2024_01_01.vcdiff");
        assert_eq!(ty, ItemType::SquashfsVcdiff);
        assert_eq!(base.as_deref(), Some("2024_01_01"));
    }

    #[test]
    fn classifies_vm_delta_and_extracts_base() {
        let (ty, base) = classify_item("disk.2024_01_01.qcow2.vcdiff");
        assert_eq!(ty, ItemType::DiskKvmImgVcdiff);
        assert_eq!(base.as_deref(), Some("2024_01_01"));
    }
}
