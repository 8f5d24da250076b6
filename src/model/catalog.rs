use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::product::Product;

pub const CONTENT_ID: &str = "images";
pub const CATALOG_FORMAT: &str = "products:1.0";
pub const CATALOG_DATATYPE: &str = "image-downloads";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub content_id: String,
    pub format: String,
    pub datatype: String,

    #[serde(default)]
    pub products: BTreeMap<String, Product>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            content_id: CONTENT_ID.to_string(),
            format: CATALOG_FORMAT.to_string(),
            datatype: CATALOG_DATATYPE.to_string(),
            products: BTreeMap::new(),
        }
    }
}

/// Splits the difference between a previously published catalog and the
/// products currently discovered on disk.
///
/// `removed[id]` holds, for every product, the versions present in `old`
/// but absent from `discovered` (and whole products no longer discovered at
/// all); `added[id]` is the mirror image. Version *contents* are ignored —
/// identity is the pair `(product id, version name)` only, so a version
/// that happens to exist in both sides is never touched even if a producer
/// rewrote its files in place.
pub fn diff(
    old: &Catalog,
    discovered: &BTreeMap<String, Product>,
) -> (BTreeMap<String, Product>, BTreeMap<String, Product>) {
    let mut removed: BTreeMap<String, Product> = BTreeMap::new();
    let mut added: BTreeMap<String, Product> = BTreeMap::new();

    for (id, new_product) in discovered {
        match old.products.get(id) {
            None => {
                added.insert(id.clone(), new_product.clone());
            }
            Some(old_product) => {
                let mut only_new = new_product.clone();
                only_new
                    .versions
                    .retain(|name, _| !old_product.versions.contains_key(name));
                if !only_new.versions.is_empty() {
                    added.insert(id.clone(), only_new);
                }
            }
        }
    }

    for (id, old_product) in &old.products {
        match discovered.get(id) {
            None => {
                removed.insert(id.clone(), old_product.clone());
            }
            Some(new_product) => {
                let mut only_old = old_product.clone();
                only_old
                    .versions
                    .retain(|name, _| !new_product.versions.contains_key(name));
                if !only_old.versions.is_empty() {
                    removed.insert(id.clone(), only_old);
                }
            }
        }
    }

    (removed, added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::product::ProductKey;

    fn product_with_versions(key: &ProductKey, versions: &[&str]) -> Product {
        let mut p = Product::new(key);
        for v in versions {
            p.versions.insert(v.to_string(), Default::default());
        }
        p
    }

    #[test]
    fn diff_is_identity_only_on_version_name() {
        let key = ProductKey {
            distro: "ubuntu".into(),
            release: "lunar".into(),
            arch: "amd64".into(),
            variant: "cloud".into(),
        };
        let id = key.id();

        let mut old = Catalog::default();
        old.products.insert(id.clone(), product_with_versions(&key, &["1", "2"]));

        let mut discovered = BTreeMap::new();
        discovered.insert(id.clone(), product_with_versions(&key, &["2", "3"]));

        let (removed, added) = diff(&old, &discovered);
        assert_eq!(removed[&id].versions.keys().collect::<Vec<_>>(), vec!["1"]);
        assert_eq!(added[&id].versions.keys().collect::<Vec<_>>(), vec!["3"]);
    }

    #[test]
    fn brand_new_product_is_added_whole() {
        let key = ProductKey {
            distro: "debian".into(),
            release: "bookworm".into(),
            arch: "amd64".into(),
            variant: "default".into(),
        };
        let id = key.id();
        let old = Catalog::default();
        let mut discovered = BTreeMap::new();
        discovered.insert(id.clone(), product_with_versions(&key, &["1"]));

        let (removed, added) = diff(&old, &discovered);
        assert!(removed.is_empty());
        assert_eq!(added[&id].versions.len(), 1);
    }
}
