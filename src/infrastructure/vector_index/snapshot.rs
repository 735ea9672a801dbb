use std::path::{Path, PathBuf};
use tracing::instrument;

use super::index::HnswIndex;
use crate::domain::DomainError;

/// Persists built indexes as `{dir}/{name}.json`.
///
/// Writes go to a sibling temp file that is renamed into place, so a reader
/// never observes a half-written snapshot and a failed write leaves the
/// previous one intact.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    pub async fn exists(&self, name: &str) -> bool {
        tokio::fs::try_exists(self.path_for(name))
            .await
            .unwrap_or(false)
    }

    #[instrument(skip(self))]
    pub async fn load(&self, name: &str) -> Result<HnswIndex, DomainError> {
        let path = self.path_for(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DomainError::not_found(format!(
                    "no index snapshot at {}",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(DomainError::internal(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let index: HnswIndex = serde_json::from_slice(&bytes).map_err(|e| {
            DomainError::index_build(format!("corrupt snapshot {}: {e}", path.display()))
        })?;

        if index.name() != name {
            return Err(DomainError::index_build(format!(
                "snapshot {} holds index '{}', expected '{}'",
                path.display(),
                index.name(),
                name
            )));
        }

        index.check_consistency()?;

        tracing::info!(entries = index.len(), path = %path.display(), "snapshot loaded");
        Ok(index)
    }

    /// Replaces any snapshot with the same name.
    #[instrument(skip(self, index), fields(name = %index.name(), entries = index.len()))]
    pub async fn save(&self, index: &HnswIndex) -> Result<PathBuf, DomainError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            DomainError::internal(format!("failed to create {}: {e}", self.dir.display()))
        })?;

        let path = self.path_for(index.name());
        let tmp = self.dir.join(format!(".{}.json.tmp", index.name()));
        let bytes = serde_json::to_vec(index)
            .map_err(|e| DomainError::internal(format!("failed to serialize index: {e}")))?;

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| DomainError::internal(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            DomainError::internal(format!("failed to move snapshot into place: {e}"))
        })?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "snapshot saved");
        Ok(path)
    }
}
