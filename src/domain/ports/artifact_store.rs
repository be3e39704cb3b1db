use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage for diagnostic artifacts such as screenshots.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` and return a reference that can be put in an audit payload.
    async fn store(&self, task_id: Uuid, label: &str, bytes: &[u8])
        -> Result<String, ArtifactError>;
}
