//! Local-directory publisher: `<root>/<destination>/` served by whatever
//! static file server fronts `root`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Url;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::PublisherConfig;
use crate::domain::artifact::normalise_path;
use crate::domain::{GeneratedArtifactSet, PublisherError};
use crate::ports::{Destination, Publisher, PushReceipt};

pub struct LocalPublisher {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalPublisher {
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    pub fn from_config(config: &PublisherConfig) -> Self {
        Self::new(config.local_root.clone(), config.public_base_url.clone())
    }

    fn destination_dir(&self, name: &str) -> Result<PathBuf, PublisherError> {
        // A destination is exactly one directory below the root.
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(PublisherError::InvalidPath(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> PublisherError {
    PublisherError::Io(format!("{}: {e}", path.display()))
}

#[async_trait]
impl Publisher for LocalPublisher {
    fn name(&self) -> &str {
        "local"
    }

    async fn create_destination(&self, name: &str) -> Result<Destination, PublisherError> {
        let dir = self.destination_dir(name)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;
        debug!(dir = %dir.display(), "destination directory ready");
        Ok(Destination {
            id: name.to_string(),
            name: name.to_string(),
            repo_url: None,
        })
    }

    async fn push(
        &self,
        destination: &Destination,
        artifacts: &GeneratedArtifactSet,
    ) -> Result<PushReceipt, PublisherError> {
        let dir = self.destination_dir(&destination.id)?;

        // Validate every path before the first write.
        let mut planned = Vec::with_capacity(artifacts.len());
        for (path, content) in artifacts.iter() {
            let relative =
                normalise_path(path).map_err(|_| PublisherError::InvalidPath(path.to_string()))?;
            planned.push((relative, content));
        }

        let mut hasher = Sha256::new();
        for (relative, content) in planned {
            let target = dir.join(&relative);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error(parent, e))?;
            }
            tokio::fs::write(&target, content.as_bytes())
                .await
                .map_err(|e| io_error(&target, e))?;
            hasher.update(relative.as_bytes());
            hasher.update([0]);
            hasher.update(content.as_bytes());
        }

        Ok(PushReceipt {
            revision: Some(hex::encode(hasher.finalize())),
        })
    }

    async fn enable_serving(&self, destination: &Destination) -> Result<String, PublisherError> {
        if let Some(base) = &self.public_base_url {
            return Ok(format!("{base}/{}/", destination.id));
        }
        let dir = self.destination_dir(&destination.id)?;
        let absolute = tokio::fs::canonicalize(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;
        Url::from_directory_path(&absolute)
            .map(String::from)
            .map_err(|()| PublisherError::InvalidPath(absolute.display().to_string()))
    }
}
