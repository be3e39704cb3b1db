//! Screenshot storage on the local filesystem.
//!
//! Layout: `<root>/<task_id>/<timestamp>-<label>.png`. The returned reference
//! is the file path.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::domain::ports::{ArtifactError, ArtifactStore};

#[derive(Debug, Clone)]
pub struct FilesystemArtifactStore {
    root: PathBuf,
}

impl FilesystemArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Keep labels usable as file names.
fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "artifact".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl ArtifactStore for FilesystemArtifactStore {
    async fn store(&self, task_id: Uuid, label: &str, bytes: &[u8]) -> Result<String, ArtifactError> {
        let dir = self.root.join(task_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let file_name = format!(
            "{}-{}.png",
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
            sanitize_label(label)
        );
        let path = dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;

        debug!(task_id = %task_id, path = %path.display(), size = bytes.len(), "artifact stored");
        Ok(path.display().to_string())
    }
}
