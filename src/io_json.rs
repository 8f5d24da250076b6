//! Thin JSON file I/O adapter — an external collaborator per the purpose
//! statement, kept to the one shape the core actually needs: "read this
//! catalog/index if it's there, otherwise I have none yet."

use std::fs;
use std::io;
use std::path::Path;

use serde::de::DeserializeOwned;

/// Reads and parses a JSON file, returning `Ok(None)` if it doesn't exist
/// rather than treating a missing previous catalog as an error.
pub fn read_optional<T: DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            Ok(Some(value))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert_eq!(read_optional::<Sample>(&path).unwrap(), None);
    }

    #[test]
    fn present_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("present.json");
        fs::write(&path, r#"{"value": 7}"#).unwrap();
        assert_eq!(read_optional::<Sample>(&path).unwrap(), Some(Sample { value: 7 }));
    }
}
