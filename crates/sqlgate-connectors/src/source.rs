//! Loading import payloads from `http(s)://`, `file://` or a local path.

use std::path::{Path, PathBuf};

use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use url::Url;

use crate::error::ConnectorError;

pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Raw bytes of an import source and the media type they were served as.
#[derive(Debug, Clone)]
pub struct SourceData {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub async fn load_source(location: &str) -> Result<SourceData, ConnectorError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        return load_http(location).await;
    }
    let path = if location.starts_with("file://") {
        Url::parse(location)
            .ok()
            .and_then(|u| u.to_file_path().ok())
            .ok_or_else(|| ConnectorError::InvalidData(format!("invalid file URL: {}", location)))?
    } else if location.contains("://") {
        return Err(ConnectorError::InvalidData(format!(
            "unsupported import URL scheme: {}",
            location
        )));
    } else {
        PathBuf::from(location)
    };
    debug!("loading import source from {}", path.display());
    let bytes = tokio::fs::read(&path).await?;
    Ok(SourceData {
        content_type: content_type_for_path(&path).to_string(),
        bytes,
    })
}

async fn load_http(location: &str) -> Result<SourceData, ConnectorError> {
    debug!("downloading import source {}", location);
    let response = reqwest::get(location).await?.error_for_status()?;
    let header = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(media_type);
    let content_type = match header {
        Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct,
        _ => {
            let path = Url::parse(location)
                .map(|u| PathBuf::from(u.path()))
                .unwrap_or_default();
            content_type_for_path(&path).to_string()
        }
    };
    let bytes = response.bytes().await?.to_vec();
    Ok(SourceData {
        content_type,
        bytes,
    })
}

/// `text/csv; charset=utf-8` -> `text/csv`
fn media_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn content_type_for_path(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => CSV_CONTENT_TYPE,
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_strips_parameters() {
        assert_eq!(media_type("Text/CSV; charset=utf-8"), "text/csv");
    }

    #[tokio::test]
    async fn loads_local_path_and_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        std::fs::write(&path, b"a\n1\n").unwrap();

        let by_path = load_source(path.to_str().unwrap()).await.unwrap();
        assert_eq!(by_path.content_type, CSV_CONTENT_TYPE);
        assert_eq!(by_path.bytes, b"a\n1\n");

        let url = Url::from_file_path(&path).unwrap();
        let by_url = load_source(url.as_str()).await.unwrap();
        assert_eq!(by_url.bytes, b"a\n1\n");
    }

    #[tokio::test]
    async fn non_csv_extension_is_not_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.json");
        std::fs::write(&path, b"{}").unwrap();
        let data = load_source(path.to_str().unwrap()).await.unwrap();
        assert_ne!(data.content_type, CSV_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn missing_file_is_an_import_failure() {
        let err = load_source("/definitely/not/here.csv").await.unwrap_err();
        assert!(matches!(err, ConnectorError::ImportFailed(_)));
    }

    #[tokio::test]
    async fn unknown_scheme_is_rejected() {
        let err = load_source("ftp://host/file.csv").await.unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidData(_)));
    }
}
