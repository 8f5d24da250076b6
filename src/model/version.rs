use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::item::Item;

/// An optional per-version `image.yaml` configuration. Only the
/// `simplestream` subtree is kept; everything else in the file is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub simplestream: SimplestreamConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimplestreamConfig {
    #[serde(default)]
    pub release_aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub requirements: BTreeMap<String, String>,
}

/// A single build of a product.
///
/// `checksums` and `image_config` are discovery-time scaffolding consumed by
/// the build pipeline; neither is part of the published catalog wire
/// format, so both are skipped on serialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Version {
    #[serde(default)]
    pub items: BTreeMap<String, Item>,

    #[serde(skip)]
    pub checksums: Option<BTreeMap<String, String>>,

    #[serde(skip)]
    pub image_config: Option<ImageConfig>,
}

impl Version {
    pub fn is_complete(&self) -> bool {
        let has_metadata = self
            .items
            .values()
            .any(|i| matches!(i.ftype, super::item::ItemType::LxdMetadata));
        let has_rootfs = self.items.values().any(|i| i.ftype.is_rootfs());
        has_metadata && has_rootfs
    }
}
