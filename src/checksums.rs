//! Checksum file I/O (component C): reading and appending `SHA256SUMS` in
//! the conventional `<hex>  <filename>` line format.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

pub const CHECKSUMS_FILENAME: &str = "SHA256SUMS";

/// Parses a `SHA256SUMS`-style file into `filename -> hex`. Lines that do
/// not split into exactly two whitespace-separated fields are ignored
/// rather than treated as an error — producers sometimes leave stray blank
/// lines or comments.
pub fn read_checksums(path: &Path) -> io::Result<BTreeMap<String, String>> {
    let contents = fs::read_to_string(path)?;
    let mut map = BTreeMap::new();
    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let hex = fields.next();
        let filename = fields.next();
        let extra = fields.next();
        if let (Some(hex), Some(filename), None) = (hex, filename, extra) {
            map.insert(filename.to_string(), hex.to_string());
        }
    }
    Ok(map)
}

/// Appends a single `<hex>  <filename>` line, creating the file if it does
/// not exist yet. A single append-mode write keeps the operation atomic
/// with respect to other appenders of the same file.
pub fn append_checksum(path: &Path, filename: &str, hex: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{hex}  {filename}")
}
