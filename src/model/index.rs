use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::serde::rfc3339;

pub const INDEX_FORMAT: &str = "index:1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStream {
    pub path: String,
    pub format: String,
    pub datatype: String,

    #[serde(with = "rfc3339")]
    pub updated: OffsetDateTime,

    pub products: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    pub format: String,

    #[serde(default)]
    pub index: BTreeMap<String, IndexStream>,
}

impl Default for Index {
    fn default() -> Self {
        Self {
            format: INDEX_FORMAT.to_string(),
            index: BTreeMap::new(),
        }
    }
}
