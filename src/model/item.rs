use serde::{Deserialize, Serialize};

/// Closed set of recognized item kinds, keyed off filename extension.
///
/// `Other` covers the metadata file itself when no better match applies, and
/// any stray file an operator dropped into a version directory that we still
/// want to surface (rather than silently dropping).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemType {
    LxdMetadata,
    Squashfs,
    DiskKvmImg,
    SquashfsVcdiff,
    DiskKvmImgVcdiff,
    RootTarXz,
    Other(String),
}

impl ItemType {
    pub fn as_str(&self) -> &str {
        match self {
            ItemType::LxdMetadata => "lxd.tar.xz",
            ItemType::Squashfs => "squashfs",
            ItemType::DiskKvmImg => "disk-kvm.img",
            ItemType::SquashfsVcdiff => "squashfs.vcdiff",
            ItemType::DiskKvmImgVcdiff => "disk-kvm.img.vcdiff",
            ItemType::RootTarXz => "root.tar.xz",
            ItemType::Other(s) => s,
        }
    }

    pub fn is_rootfs(&self) -> bool {
        matches!(self, ItemType::Squashfs | ItemType::DiskKvmImg)
    }

    pub fn is_vcdiff(&self) -> bool {
        matches!(self, ItemType::SquashfsVcdiff | ItemType::DiskKvmImgVcdiff)
    }
}

impl Serialize for ItemType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ItemType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "lxd.tar.xz" => ItemType::LxdMetadata,
            "squashfs" => ItemType::Squashfs,
            "disk-kvm.img" => ItemType::DiskKvmImg,
            "squashfs.vcdiff" => ItemType::SquashfsVcdiff,
            "disk-kvm.img.vcdiff" => ItemType::DiskKvmImgVcdiff,
            "root.tar.xz" => ItemType::RootTarXz,
            other => ItemType::Other(other.to_string()),
        })
    }
}

/// A single file inside a version directory.
///
/// Combined-hash fields only ever get populated on the metadata item
/// (`lxd.tar.xz`); `delta_base` only on vcdiff items. They live as plain
/// siblings rather than a subtype because the wire format flattens them onto
/// every item regardless.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    #[serde(skip)]
    pub name: String,

    pub ftype: ItemType,

    /// Path relative to the repository root.
    pub path: String,

    pub size: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    #[serde(
        rename = "combined_disk-kvm-img_sha256",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub combined_disk_kvm_img_sha256: Option<String>,

    #[serde(
        rename = "combined_squashfs_sha256",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub combined_squashfs_sha256: Option<String>,

    #[serde(
        rename = "combined_rootxz_sha256",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub combined_rootxz_sha256: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub delta_base: Option<String>,
}

impl Item {
    pub fn new(name: impl Into<String>, path: impl Into<String>, ftype: ItemType, size: u64) -> Self {
        Self {
            name: name.into(),
            ftype,
            path: path.into(),
            size,
            sha256: None,
            combined_disk_kvm_img_sha256: None,
            combined_squashfs_sha256: None,
            combined_rootxz_sha256: None,
            delta_base: None,
        }
    }
}
