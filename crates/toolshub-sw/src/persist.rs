//! Saving cache storage to disk and loading it back.
//!
//! The on-disk form is one JSON document. Bodies are base64 so binary
//! resources survive the trip.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::cache::CacheEntry;
use crate::ServiceWorkerError;

/// Serializable contents of a cache storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub namespaces: Vec<NamespaceSnapshot>,
}

/// One namespace and its entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSnapshot {
    pub name: String,
    pub entries: Vec<CacheEntry>,
}

/// Write a snapshot to `path`, replacing any previous file.
pub fn save_snapshot(path: &Path, snapshot: &CacheSnapshot) -> Result<(), ServiceWorkerError> {
    let json = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| ServiceWorkerError::StorageError(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ServiceWorkerError::StorageError(format!("{}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, json)
        .map_err(|e| ServiceWorkerError::StorageError(format!("{}: {}", path.display(), e)))?;

    debug!(path = %path.display(), namespaces = snapshot.namespaces.len(), "Cache snapshot saved");
    Ok(())
}

/// Read a snapshot from `path`. A missing file is an empty snapshot.
pub fn load_snapshot(path: &Path) -> Result<CacheSnapshot, ServiceWorkerError> {
    let json = match std::fs::read(path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No cache snapshot, starting empty");
            return Ok(CacheSnapshot::default());
        }
        Err(e) => {
            return Err(ServiceWorkerError::StorageError(format!(
                "{}: {}",
                path.display(),
                e
            )))
        }
    };

    serde_json::from_slice(&json)
        .map_err(|e| ServiceWorkerError::StorageError(format!("{}: {}", path.display(), e)))
}

/// Serde adapter storing bytes as a base64 string.
pub(crate) mod base64_body {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for header values: plain text when the bytes are printable
/// ASCII, `{"b64": ...}` otherwise.
pub(crate) mod header_value {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Binary { b64: String },
    }

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let repr = match std::str::from_utf8(value) {
            Ok(text) if text.bytes().all(|b| b == b'\t' || (0x20..0x7f).contains(&b)) => {
                Repr::Text(text.to_string())
            }
            _ => Repr::Binary {
                b64: STANDARD.encode(value),
            },
        };
        repr.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => Ok(text.into_bytes()),
            Repr::Binary { b64 } => STANDARD
                .decode(b64.as_bytes())
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolshub_net::{Request, Response};
    use url::Url;

    fn snapshot() -> CacheSnapshot {
        let request = Request::get(Url::parse("https://hub.example/icon.png").unwrap());
        let response = Response::synthetic(200, "OK", vec![0u8, 159, 146, 150]);
        CacheSnapshot {
            namespaces: vec![NamespaceSnapshot {
                name: "ai-tools-hub-v1".into(),
                entries: vec![CacheEntry::capture(&request, &response)],
            }],
        }
    }

    #[test]
    fn test_body_is_base64_on_disk() {
        let json = serde_json::to_value(snapshot()).unwrap();
        assert_eq!(json["namespaces"][0]["entries"][0]["body"], "AJ+Slg==");
    }

    #[test]
    fn test_header_values_on_disk() {
        let request = Request::get(Url::parse("https://hub.example/menu.pdf").unwrap());
        let mut response = Response::synthetic(200, "OK", "pdf");
        response
            .headers
            .insert("content-type", http::HeaderValue::from_static("application/pdf"));
        response.headers.insert(
            "content-disposition",
            http::HeaderValue::from_bytes(b"filename=\"caf\xc3\xa9.pdf\"").unwrap(),
        );
        let entry = CacheEntry::capture(&request, &response);

        let json = serde_json::to_value(&entry).unwrap();
        let headers = json["headers"].as_array().unwrap();
        let value_of = |name: &str| {
            headers
                .iter()
                .find(|h| h["name"] == name)
                .map(|h| h["value"].clone())
                .unwrap()
        };
        assert_eq!(value_of("content-type"), "application/pdf");
        assert!(value_of("content-disposition")["b64"].is_string());

        let back: CacheEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let original = snapshot();
        save_snapshot(&path, &original).unwrap();
        assert_eq!(load_snapshot(&path).unwrap(), original);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_snapshot(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.namespaces.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            load_snapshot(&path),
            Err(ServiceWorkerError::StorageError(_))
        ));
    }
}
