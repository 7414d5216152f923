//! Configuration loading from disk.
//!
//! Documents are parsed into a generic JSON value first so structural
//! validation can run against the raw shape before anything is typed.

use std::path::Path;

use serde_json::Value;

use crate::error::ConfigError;

/// On-disk syntax of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Toml,
}

impl DocumentFormat {
    /// Picks the format from the file extension; anything other than
    /// `.toml` is read as YAML (which also accepts JSON).
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => DocumentFormat::Toml,
            _ => DocumentFormat::Yaml,
        }
    }
}

/// Parse document text into a raw JSON value.
pub fn parse_document(text: &str, format: DocumentFormat) -> Result<Value, ConfigError> {
    match format {
        DocumentFormat::Yaml => {
            serde_yaml::from_str::<Value>(text).map_err(|e| ConfigError::Parse(e.to_string()))
        }
        DocumentFormat::Toml => {
            toml::from_str::<Value>(text).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }
}

/// Read and parse a document without validating it.
pub async fn read_document(path: &Path) -> Result<Value, ConfigError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_document(&content, DocumentFormat::from_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            DocumentFormat::from_path(&PathBuf::from("gateway.config.yml")),
            DocumentFormat::Yaml
        );
        assert_eq!(
            DocumentFormat::from_path(&PathBuf::from("gateway.TOML")),
            DocumentFormat::Toml
        );
        assert_eq!(
            DocumentFormat::from_path(&PathBuf::from("gateway")),
            DocumentFormat::Yaml
        );
    }

    #[test]
    fn test_yaml_and_toml_parse_to_same_value() {
        let yaml = "http:\n  port: 8080\npipelines: []\n";
        let toml = "pipelines = []\n[http]\nport = 8080\n";

        let from_yaml = parse_document(yaml, DocumentFormat::Yaml).unwrap();
        let from_toml = parse_document(toml, DocumentFormat::Toml).unwrap();
        assert_eq!(from_yaml, from_toml);
    }

    #[test]
    fn test_malformed_document_is_parse_error() {
        let err = parse_document("http: [unclosed", DocumentFormat::Yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = read_document(Path::new("/nonexistent/gateway.config.yml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
