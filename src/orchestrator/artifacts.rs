//! JSON decision artifacts.
//!
//! One document per optimization result or allocation decision, written to
//! `<root>/<scope>/<kind>_<id>.json` via a tmp file and rename.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::VersionStamp;
use crate::error::{AdaptiveError, Result};

#[derive(Serialize)]
struct Artifact<'a, T: Serialize> {
    generated_by: &'a str,
    code_version: &'a str,
    data_snapshot: &'a str,
    version: &'a VersionStamp,
    written_at: DateTime<Utc>,
    payload: &'a T,
    explainability: &'a serde_json::Value,
}

/// Keep a path segment inside its parent directory.
fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
    generated_by: String,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>, generated_by: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            generated_by: generated_by.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, scope: &str, kind: &str, id: &str) -> PathBuf {
        self.root
            .join(sanitize_segment(scope))
            .join(format!("{}_{}.json", sanitize_segment(kind), sanitize_segment(id)))
    }

    pub async fn write<T: Serialize>(
        &self,
        scope: &str,
        kind: &str,
        id: &str,
        payload: &T,
        version: &VersionStamp,
        explainability: &serde_json::Value,
    ) -> Result<PathBuf> {
        let path = self.artifact_path(scope, kind, id);
        let Some(parent) = path.parent() else {
            return Err(AdaptiveError::Internal("invalid artifact path".to_string()));
        };
        tokio::fs::create_dir_all(parent).await?;

        let artifact = Artifact {
            generated_by: &self.generated_by,
            code_version: &version.code_version,
            data_snapshot: &version.data_snapshot,
            version,
            written_at: Utc::now(),
            payload,
            explainability,
        };
        let body = serde_json::to_string_pretty(&artifact)?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), kind, "Artifact written");
        Ok(path)
    }
}
