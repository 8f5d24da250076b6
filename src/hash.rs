//! Hashing (component B): streamed SHA-256 over a single file, or over the
//! logical concatenation of several, without buffering whole files in
//! memory.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

const CHUNK_SIZE: usize = 64 * 1024;

/// Lowercase hex SHA-256 of a single file's bytes.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    feed_file(path, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Lowercase hex SHA-256 of the concatenation, in order, of several files'
/// bytes — as if they had been `cat`-ed together first, but without ever
/// materializing that concatenation.
pub fn hash_concat(paths: &[&Path]) -> io::Result<String> {
    let mut hasher = Sha256::new();
    for path in paths {
        feed_file(path, &mut hasher)?;
    }
    Ok(hex::encode(hasher.finalize()))
}

fn feed_file(path: &Path, hasher: &mut Sha256) -> io::Result<()> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, file);
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_file_matches_known_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        std::fs::write(&path, b"hello world!").unwrap();
        // sha256("hello world!")
        let expected = "7509e5bda0c762d2bac7f90d758b5b2263fa01ccbc542ab5e3df163be08e6ca9";
        assert_eq!(hash_file(&path).unwrap(), expected);
    }

    #[test]
    fn hash_concat_matches_hashing_the_joined_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"hello ").unwrap();
        std::fs::write(&b, b"world!").unwrap();

        let mut joined = File::open(&a).unwrap();
        let mut contents = Vec::new();
        joined.read_to_end(&mut contents).unwrap();
        let mut f2 = File::open(&b).unwrap();
        f2.read_to_end(&mut contents).unwrap();
        let mut expected_hasher = Sha256::new();
        expected_hasher.update(&contents);
        let expected = hex::encode(expected_hasher.finalize());

        assert_eq!(hash_concat(&[&a, &b]).unwrap(), expected);
    }

    #[test]
    fn hash_file_propagates_io_errors() {
        let missing = Path::new("/nonexistent/path/does-not-exist");
        assert!(hash_file(missing).is_err());
    }
}
