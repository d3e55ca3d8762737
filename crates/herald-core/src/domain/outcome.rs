//! Outcome model: publication result, the report sent to the evaluator, and
//! the terminal delivery result recorded on the job.

use serde::{Deserialize, Serialize};

use super::ids::DeliveryId;
use super::request::JobKey;

/// Publisher-assigned destination and its resolved public URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationResult {
    pub destination_id: String,
    pub public_url: String,

    /// Browsable location of the destination itself (e.g. the repository page).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,

    /// Revision created by the push, when the provider reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Ok,
    Error,
}

/// Payload POSTed to the evaluation endpoint.
///
/// The same logical report is re-sent until delivered; only `attempt` changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub delivery_id: DeliveryId,
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub status: ReportStatus,
    pub pages_url: Option<String>,
    pub repo_url: Option<String>,
    pub commit_sha: Option<String>,
    pub error: Option<String>,
    pub attempt: u32,
}

impl OutcomeReport {
    pub fn new(delivery_id: DeliveryId, key: &JobKey) -> Self {
        Self {
            delivery_id,
            email: key.email.clone(),
            task: key.task.clone(),
            round: key.round,
            nonce: key.nonce.clone(),
            status: ReportStatus::Ok,
            pages_url: None,
            repo_url: None,
            commit_sha: None,
            error: None,
            attempt: 1,
        }
    }

    pub fn with_publication(mut self, publication: &PublicationResult) -> Self {
        self.pages_url = Some(publication.public_url.clone());
        self.repo_url = publication.repo_url.clone();
        self.commit_sha = publication.commit_sha.clone();
        self
    }

    /// Mark the report as failed. Details accumulate, separated by `"; "`.
    pub fn with_error(mut self, detail: impl Into<String>) -> Self {
        self.status = ReportStatus::Error;
        let detail = detail.into();
        self.error = Some(match self.error.take() {
            Some(prev) => format!("{prev}; {detail}"),
            None => detail,
        });
        self
    }

    /// A note that does not change the status (e.g. fallback content on an
    /// otherwise successful publication).
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        self.error = Some(match self.error.take() {
            Some(prev) => format!("{prev}; {note}"),
            None => note,
        });
        self
    }

    pub fn for_attempt(&self, attempt: u32) -> Self {
        Self {
            attempt,
            ..self.clone()
        }
    }
}

/// Terminal result of the reporting stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Exhausted { attempts: u32, reason: String, last_error: Option<String> },
}

impl DeliveryOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts } | DeliveryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn key() -> JobKey {
        JobKey {
            email: "a@b.c".to_string(),
            task: "t".to_string(),
            round: 2,
            nonce: "n".to_string(),
        }
    }

    #[test]
    fn report_carries_publication_fields() {
        let publication = PublicationResult {
            destination_id: "me/t-1234abcd".to_string(),
            public_url: "https://me.github.io/t-1234abcd/".to_string(),
            repo_url: Some("https://github.com/me/t-1234abcd".to_string()),
            commit_sha: Some("abc123".to_string()),
        };
        let report = OutcomeReport::new(DeliveryId::from_ulid(Ulid::new()), &key())
            .with_publication(&publication);

        assert_eq!(report.status, ReportStatus::Ok);
        assert_eq!(report.pages_url.as_deref(), Some("https://me.github.io/t-1234abcd/"));
        assert_eq!(report.commit_sha.as_deref(), Some("abc123"));
        assert_eq!(report.round, 2);
    }

    #[test]
    fn errors_accumulate_and_flip_status() {
        let report = OutcomeReport::new(DeliveryId::from_ulid(Ulid::new()), &key())
            .with_note("fallback content used")
            .with_error("publication failed at push_artifacts: boom");

        assert_eq!(report.status, ReportStatus::Error);
        assert_eq!(
            report.error.as_deref(),
            Some("fallback content used; publication failed at push_artifacts: boom")
        );
    }

    #[test]
    fn resend_only_changes_attempt() {
        let first = OutcomeReport::new(DeliveryId::from_ulid(Ulid::new()), &key());
        let third = first.for_attempt(3);
        assert_eq!(third.attempt, 3);
        assert_eq!(third.delivery_id, first.delivery_id);
        assert_eq!(OutcomeReport { attempt: 1, ..third }, first);
    }

    #[test]
    fn report_wire_shape() {
        let report = OutcomeReport::new(DeliveryId::from_ulid(Ulid::new()), &key())
            .with_error("boom");
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["status"], "error");
        assert_eq!(v["pages_url"], serde_json::Value::Null);
        assert_eq!(v["error"], "boom");
        assert_eq!(v["attempt"], 1);
    }
}
