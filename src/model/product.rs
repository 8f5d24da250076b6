use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::version::Version;

/// The 4-tuple identity of a product, plus the stream it lives under.
///
/// Kept separate from [`Product`] because the tuple is needed before a
/// `Product` value exists yet (e.g. to compute a directory path while still
/// walking the filesystem).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProductKey {
    pub distro: String,
    pub release: String,
    pub arch: String,
    pub variant: String,
}

impl ProductKey {
    pub fn id(&self) -> String {
        format!("{}:{}:{}:{}", self.distro, self.release, self.arch, self.variant)
    }

    pub fn rel_path(&self) -> std::path::PathBuf {
        [&self.distro, &self.release, &self.arch, &self.variant]
            .iter()
            .collect()
    }

    /// Parse a product id of the form `distro:release:arch:variant` produced
    /// by [`ProductKey::id`]. Used to recover a product's directory from a
    /// catalog entry during prune, where only the id string is on hand.
    pub fn parse_id(id: &str) -> Option<Self> {
        let mut parts = id.splitn(4, ':');
        let distro = parts.next()?.to_string();
        let release = parts.next()?.to_string();
        let arch = parts.next()?.to_string();
        let variant = parts.next()?.to_string();
        Some(Self { distro, release, arch, variant })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Product {
    pub aliases: String,
    pub arch: String,

    /// Simplestreams' `os` field; set to the distro name.
    pub os: String,

    pub release: String,
    pub release_title: String,
    pub variant: String,

    #[serde(default)]
    pub versions: BTreeMap<String, Version>,

    #[serde(default)]
    pub requirements: BTreeMap<String, String>,
}

impl Product {
    pub fn new(key: &ProductKey) -> Self {
        Self {
            aliases: String::new(),
            arch: key.arch.clone(),
            os: key.distro.clone(),
            release: key.release.clone(),
            release_title: key.release.clone(),
            variant: key.variant.clone(),
            versions: BTreeMap::new(),
            requirements: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> ProductKey {
        ProductKey {
            distro: self.os.clone(),
            release: self.release.clone(),
            arch: self.arch.clone(),
            variant: self.variant.clone(),
        }
    }
}
