//! Provenance stamp attached by value to every produced artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStamp {
    pub code_version: String,
    /// Timestamp or hash of the data the decision was made on
    pub data_snapshot: String,
    pub model_version: Option<String>,
    pub training_epoch: Option<u64>,
    pub git_commit: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl VersionStamp {
    /// Stamp for the given code version; the data snapshot defaults to the creation time.
    pub fn new(code_version: impl Into<String>) -> Self {
        let created_at = Utc::now();
        Self {
            code_version: code_version.into(),
            data_snapshot: created_at.to_rfc3339(),
            model_version: None,
            training_epoch: None,
            git_commit: None,
            created_at,
        }
    }

    pub fn with_data_snapshot(self, data_snapshot: impl Into<String>) -> Self {
        Self {
            data_snapshot: data_snapshot.into(),
            ..self
        }
    }

    pub fn with_model(self, model_version: impl Into<String>, training_epoch: Option<u64>) -> Self {
        Self {
            model_version: Some(model_version.into()),
            training_epoch,
            ..self
        }
    }

    pub fn with_git_commit(self, git_commit: impl Into<String>) -> Self {
        Self {
            git_commit: Some(git_commit.into()),
            ..self
        }
    }
}

impl std::fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.code_version, self.data_snapshot)?;
        if let Some(model) = &self.model_version {
            write!(f, " model={model}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_leave_original_untouched() {
        let base = VersionStamp::new("1.2.0");
        assert_eq!(base.data_snapshot, base.created_at.to_rfc3339());

        let derived = base
            .clone()
            .with_data_snapshot("sha256:abc")
            .with_model("ae-v3", Some(40))
            .with_git_commit("deadbeef");

        assert_eq!(base.model_version, None);
        assert_eq!(derived.code_version, "1.2.0");
        assert_eq!(derived.training_epoch, Some(40));
        assert_eq!(derived.to_string(), "1.2.0@sha256:abc model=ae-v3");
    }
}
