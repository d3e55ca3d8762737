//! ContentGenerator port - brief から成果物ファイルを生成
//!
//! The core treats the generator as a black box that maps a brief to files.
//! Output is unvalidated; the generation stage owns validation and fallback.

use async_trait::async_trait;

use crate::domain::{ArtifactContent, Attachment, GenerationFailure};

/// What the generator is asked to build.
#[derive(Debug, Clone, Copy)]
pub struct GenerationBrief<'a> {
    pub task: &'a str,
    pub round: u32,
    pub brief: &'a str,
    pub checks: &'a [String],
    pub attachments: &'a [Attachment],
}

/// One candidate file as returned by a generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: String,
    pub content: ArtifactContent,
}

impl GeneratedFile {
    pub fn text(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: ArtifactContent::Text(content.into()),
        }
    }
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Provider identity for logs and the health surface.
    fn name(&self) -> &str;

    async fn generate(
        &self,
        brief: GenerationBrief<'_>,
    ) -> Result<Vec<GeneratedFile>, GenerationFailure>;
}
