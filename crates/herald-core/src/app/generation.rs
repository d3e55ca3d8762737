//! Generation stage: one generator call, validation, deterministic fallback.
//!
//! Failures never leave this stage. Whatever happens, the caller receives a
//! valid artifact set and learns whether it is the generator's or the fallback.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::{
    ArtifactContent, ArtifactOrigin, ArtifactSetError, Assignment, GeneratedArtifactSet,
    GenerationFailure, ENTRY_PAGE,
};
use crate::ports::{ContentGenerator, GeneratedFile, GenerationBrief};

#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub artifacts: GeneratedArtifactSet,
    pub origin: ArtifactOrigin,
    pub failure: Option<GenerationFailure>,
}

pub struct GenerationStage {
    generator: Arc<dyn ContentGenerator>,
    timeout: Duration,
}

impl GenerationStage {
    pub fn new(generator: Arc<dyn ContentGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    pub async fn run(&self, assignment: &Assignment) -> GenerationOutput {
        let brief = GenerationBrief {
            task: &assignment.key.task,
            round: assignment.key.round,
            brief: &assignment.brief,
            checks: &assignment.checks,
            attachments: &assignment.attachments,
        };

        let result = match tokio::time::timeout(self.timeout, self.generator.generate(brief)).await
        {
            Ok(result) => result.and_then(validate_files),
            Err(_) => Err(GenerationFailure::Timeout(self.timeout.as_secs())),
        };

        match result {
            Ok(artifacts) => {
                info!(
                    task = %assignment.key.task,
                    round = assignment.key.round,
                    generator = self.generator.name(),
                    files = artifacts.len(),
                    bytes = artifacts.total_bytes(),
                    "content generated"
                );
                GenerationOutput {
                    artifacts,
                    origin: ArtifactOrigin::Generated,
                    failure: None,
                }
            }
            Err(failure) => {
                warn!(
                    task = %assignment.key.task,
                    round = assignment.key.round,
                    generator = self.generator.name(),
                    error = %failure,
                    "generation failed, using fallback content"
                );
                GenerationOutput {
                    artifacts: fallback_artifacts(assignment),
                    origin: ArtifactOrigin::Fallback,
                    failure: Some(failure),
                }
            }
        }
    }
}

/// Validate raw generator output into an artifact set.
pub fn validate_files(files: Vec<GeneratedFile>) -> Result<GeneratedArtifactSet, GenerationFailure> {
    if files.is_empty() {
        return Err(GenerationFailure::Empty);
    }
    GeneratedArtifactSet::new(files.into_iter().map(|f| (f.path, f.content))).map_err(|e| match e {
        ArtifactSetError::Empty => GenerationFailure::Empty,
        ArtifactSetError::MissingEntryPage => {
            GenerationFailure::MissingEntryPage(ENTRY_PAGE.to_string())
        }
        other => GenerationFailure::Malformed(other.to_string()),
    })
}

/// Minimal static deliverable. A pure function of the assignment.
pub fn fallback_artifacts(assignment: &Assignment) -> GeneratedArtifactSet {
    let key = &assignment.key;
    let mut attachments = String::new();
    if !assignment.attachments.is_empty() {
        attachments.push_str("    <h2>Attachments</h2>\n    <ul>\n");
        for attachment in &assignment.attachments {
            attachments.push_str(&format!(
                "      <li><a href=\"{}\">{}</a></li>\n",
                escape_html(&attachment.url),
                escape_html(&attachment.name)
            ));
        }
        attachments.push_str("    </ul>\n");
    }

    let html = format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head>\n\
         \x20 <meta charset=\"utf-8\">\n\
         \x20 <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         \x20 <title>{task}</title>\n\
         </head>\n\
         <body>\n\
         \x20 <main>\n\
         \x20   <h1>{task}</h1>\n\
         \x20   <p>Round {round}</p>\n\
         \x20   <h2>Brief</h2>\n\
         \x20   <pre>{brief}</pre>\n\
         {attachments}\
         \x20 </main>\n\
         </body>\n\
         </html>\n",
        task = escape_html(&key.task),
        round = key.round,
        brief = escape_html(&assignment.brief),
        attachments = attachments,
    );

    let readme = format!(
        "# {}\n\nRound {}.\n\nPlaceholder deliverable published because content generation \
         did not produce a usable result.\n\n## Brief\n\n{}\n",
        key.task, key.round, assignment.brief
    );

    GeneratedArtifactSet::from_entry_page(html, [("README.md", ArtifactContent::Text(readme))])
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
