//! Schema registry loading from files, directories, strings, and HTTP URLs.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::error::RegistryError;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Collection name to root schema.
pub type SchemaMap = BTreeMap<String, Value>;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a JSON document from a file path.
///
/// # Errors
///
/// Returns `RegistryError::FileNotFound` if the file doesn't exist,
/// or `RegistryError::InvalidJson` if the file isn't valid JSON.
pub fn load_schema(path: &Path) -> Result<Value, RegistryError> {
    if !path.exists() {
        return Err(RegistryError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| RegistryError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| RegistryError::InvalidJson { source })
}

/// Load a JSON document from a string.
///
/// # Errors
///
/// Returns `RegistryError::InvalidJson` if the string isn't valid JSON.
pub fn load_schema_str(content: &str) -> Result<Value, RegistryError> {
    serde_json::from_str(content).map_err(|source| RegistryError::InvalidJson { source })
}

/// Load a JSON document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `RegistryError::NetworkError` if the request fails or the
/// response isn't valid JSON.
#[cfg(feature = "remote")]
pub fn load_schema_url(url: &str) -> Result<Value, RegistryError> {
    let network = |source| RegistryError::NetworkError {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(network)?;

    client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .map_err(network)?
        .json()
        .map_err(network)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a JSON document from a file path or URL.
///
/// URL loading requires the `remote` feature.
pub fn load_schema_auto(source: &str) -> Result<Value, RegistryError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_schema_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(RegistryError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_schema(Path::new(source))
    }
}

/// Load a schema registry.
///
/// `source` is either a directory holding one `<collection>.json` schema per
/// collection, or a file or URL containing a JSON object that maps
/// collection names to schemas.
///
/// # Errors
///
/// Returns `RegistryError::NoSchemas` if no schema was found, plus any
/// loading error.
pub fn load_registry(source: &str) -> Result<SchemaMap, RegistryError> {
    let path = Path::new(source);
    if !is_url(source) && path.is_dir() {
        return load_registry_dir(path);
    }
    registry_from_value(load_schema_auto(source)?)
}

/// Load every `*.json` file in `dir` as the schema of the collection named
/// after the file stem.
pub fn load_registry_dir(dir: &Path) -> Result<SchemaMap, RegistryError> {
    let read_error = |source| RegistryError::ReadError {
        path: dir.to_path_buf(),
        source,
    };

    let mut schemas = SchemaMap::new();
    for entry in std::fs::read_dir(dir).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(collection) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        schemas.insert(collection.to_string(), load_schema(&path)?);
    }

    if schemas.is_empty() {
        return Err(RegistryError::NoSchemas);
    }
    Ok(schemas)
}

/// Split a `{ "collection": schema, ... }` object into a registry.
pub fn registry_from_value(value: Value) -> Result<SchemaMap, RegistryError> {
    let Value::Object(map) = value else {
        return Err(RegistryError::NotAnObject);
    };
    if map.is_empty() {
        return Err(RegistryError::NoSchemas);
    }
    Ok(map.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn load_schema_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"type": "object"}}"#).unwrap();

        let schema = load_schema(file.path()).unwrap();
        assert_eq!(schema["type"], "object");
    }

    #[test]
    fn load_schema_file_not_found() {
        let result = load_schema(Path::new("/nonexistent/path.json"));
        assert!(matches!(result, Err(RegistryError::FileNotFound { .. })));
    }

    #[test]
    fn load_schema_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid json").unwrap();

        let result = load_schema(file.path());
        assert!(matches!(result, Err(RegistryError::InvalidJson { .. })));
    }

    #[test]
    fn load_schema_str_valid() {
        let schema = load_schema_str(r#"{"type": "object"}"#).unwrap();
        assert_eq!(schema["type"], "object");
    }

    #[test]
    fn is_url_detection() {
        assert!(is_url("https://example.com/schemas.json"));
        assert!(is_url("http://example.com/schemas.json"));
        assert!(!is_url("/path/to/schemas.json"));
        assert!(!is_url("schemas.json"));
    }

    #[test]
    fn registry_from_object_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"users": {{"type": "object"}}, "posts": {{"type": "object"}}}}"#
        )
        .unwrap();

        let registry = load_registry(file.path().to_str().unwrap()).unwrap();
        let names: Vec<&str> = registry.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["posts", "users"]);
    }

    #[test]
    fn registry_from_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("users.json"), r#"{"type": "object"}"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = load_registry(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry["users"], json!({ "type": "object" }));
    }

    #[test]
    fn empty_directory_has_no_schemas() {
        let dir = TempDir::new().unwrap();
        let result = load_registry(dir.path().to_str().unwrap());
        assert!(matches!(result, Err(RegistryError::NoSchemas)));
    }

    #[cfg(feature = "remote")]
    #[test]
    fn registry_from_url() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/schemas.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"users": {"type": "object"}}"#)
            .create();

        let registry = load_registry(&format!("{}/schemas.json", server.url())).unwrap();
        mock.assert();
        assert_eq!(registry["users"], json!({ "type": "object" }));
    }

    #[cfg(feature = "remote")]
    #[test]
    fn url_error_status_is_network_error() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/missing.json").with_status(404).create();

        let result = load_registry(&format!("{}/missing.json", server.url()));
        assert!(matches!(result, Err(RegistryError::NetworkError { .. })));
        assert_eq!(result.unwrap_err().exit_code(), 3);
    }

    #[test]
    fn registry_must_be_object() {
        assert!(matches!(
            registry_from_value(json!([1, 2])),
            Err(RegistryError::NotAnObject)
        ));
        assert!(matches!(
            registry_from_value(json!({})),
            Err(RegistryError::NoSchemas)
        ));
    }
}
