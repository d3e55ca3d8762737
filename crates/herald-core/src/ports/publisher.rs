//! Publisher port - 成果物をホスティング先に公開
//!
//! Three operations, each succeeding or failing as a unit per call:
//! create destination -> push artifacts -> enable public serving.

use async_trait::async_trait;

use crate::domain::{GeneratedArtifactSet, PublisherError};

/// A created hosting destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Publisher-assigned identifier (e.g. `owner/repo`).
    pub id: String,
    /// Short name the destination was created with.
    pub name: String,
    pub repo_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReceipt {
    pub revision: Option<String>,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    async fn create_destination(&self, name: &str) -> Result<Destination, PublisherError>;

    async fn push(
        &self,
        destination: &Destination,
        artifacts: &GeneratedArtifactSet,
    ) -> Result<PushReceipt, PublisherError>;

    /// Turn on public serving and return the public URL.
    async fn enable_serving(&self, destination: &Destination) -> Result<String, PublisherError>;
}
