use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use tracing::*;

use super::SnapshotProvider;
use crate::stats::raw::{ParseError, RawSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed reading stats file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed parsing stats file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

/// Reads a `getStats()` report dumped as JSON, re-reading the file on every cycle
/// so an external process can keep overwriting it.
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    path: PathBuf,
}

impl JsonFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(level = "trace", skip(self), fields(path = ?self.path))]
    pub async fn read(&self) -> Result<RawSnapshot, Error> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| Error::Io {
                path: self.path.clone(),
                source,
            })?;

        RawSnapshot::from_json_str(&content).map_err(|source| Error::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

#[async_trait]
impl SnapshotProvider for JsonFileProvider {
    async fn snapshot(&self) -> Result<RawSnapshot> {
        Ok(self.read().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temporary_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "webrtc-stats-{}-{name}.json",
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn reads_report_from_file() {
        let path = temporary_file(
            "report",
            r#"[{"id": "T01", "type": "transport", "timestamp": 1}]"#,
        );
        let provider = JsonFileProvider::new(&path);

        let snapshot = provider.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("T01").unwrap().stats_type(), "transport");

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let provider = JsonFileProvider::new("/nonexistent/webrtc-stats.json");

        assert!(matches!(provider.read().await, Err(Error::Io { .. })));
    }

    #[tokio::test]
    async fn malformed_file_is_a_parse_error() {
        let path = temporary_file("malformed", r#"[{"id": "x", "type": "#);
        let provider = JsonFileProvider::new(&path);

        let error = provider.read().await.unwrap_err();
        assert!(matches!(
            error,
            Error::Parse {
                source: ParseError::Json(_),
                ..
            }
        ));

        std::fs::remove_file(path).unwrap();

        let path = temporary_file("scalar", "42");
        let provider = JsonFileProvider::new(&path);

        let error = provider.read().await.unwrap_err();
        assert!(matches!(
            error,
            Error::Parse {
                source: ParseError::InvalidReport(_),
                ..
            }
        ));

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn unusable_record_is_skipped() {
        let path = temporary_file(
            "partial",
            r#"[{"id": "x"}, {"id": "T01", "type": "transport", "timestamp": 1}]"#,
        );
        let provider = JsonFileProvider::new(&path);

        let snapshot = provider.read().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("T01").is_some());

        std::fs::remove_file(path).unwrap();
    }
}
