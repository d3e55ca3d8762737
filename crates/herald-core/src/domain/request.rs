//! Fulfillment request and the job key derived from it.

use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::errors::ValidationError;

/// A reference to caller-supplied material (often a `data:` URI).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

/// Immutable input accepted at the intake boundary.
///
/// `secret` is consumed by intake only and is never forwarded to a stage.
#[derive(Clone, Serialize, Deserialize)]
pub struct FulfillmentRequest {
    /// Requester identity.
    pub email: String,
    pub secret: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub brief: String,
    pub evaluation_url: String,
    #[serde(default)]
    pub checks: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl fmt::Debug for FulfillmentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FulfillmentRequest")
            .field("email", &self.email)
            .field("secret", &"<redacted>")
            .field("task", &self.task)
            .field("round", &self.round)
            .field("nonce", &self.nonce)
            .field("brief_len", &self.brief.len())
            .field("evaluation_url", &self.evaluation_url)
            .field("checks", &self.checks.len())
            .field("attachments", &self.attachments.len())
            .finish()
    }
}

impl FulfillmentRequest {
    /// Shape validation. The shared secret is checked separately by intake.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("email", &self.email),
            ("task", &self.task),
            ("nonce", &self.nonce),
            ("brief", &self.brief),
            ("evaluation_url", &self.evaluation_url),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField(field));
            }
        }

        if self.round == 0 {
            return Err(ValidationError::InvalidField {
                field: "round",
                reason: "must be >= 1".to_string(),
            });
        }

        let url = Url::parse(&self.evaluation_url).map_err(|e| ValidationError::InvalidField {
            field: "evaluation_url",
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidField {
                field: "evaluation_url",
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        if let Some(bad) = self.attachments.iter().find(|a| a.name.trim().is_empty()) {
            return Err(ValidationError::InvalidField {
                field: "attachments",
                reason: format!("attachment without a name (url={})", truncate(&bad.url, 32)),
            });
        }

        Ok(())
    }

    /// Compare the supplied secret against `expected` without an early exit
    /// on the first differing byte.
    pub fn verify_secret(&self, expected: &str) -> Result<(), ValidationError> {
        let a = Sha256::digest(self.secret.as_bytes());
        let b = Sha256::digest(expected.as_bytes());
        let diff = a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y));
        if diff == 0 && !expected.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::SecretMismatch)
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey {
            email: self.email.clone(),
            task: self.task.clone(),
            round: self.round,
            nonce: self.nonce.clone(),
        }
    }

    /// Drop the secret and keep what the pipeline needs.
    pub fn into_assignment(self) -> Assignment {
        let key = self.key();
        Assignment {
            key,
            brief: self.brief,
            evaluation_url: self.evaluation_url,
            checks: self.checks,
            attachments: self.attachments,
        }
    }
}

/// Secret-free view of an accepted request, owned by the running job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub key: JobKey,
    pub brief: String,
    pub evaluation_url: String,
    pub checks: Vec<String>,
    pub attachments: Vec<Attachment>,
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// (requester, task, round, nonce): at most one active job per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
}

impl JobKey {
    /// Stable hex digest of the whole key.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        // Length-prefix each part so ("ab","c") and ("a","bc") differ.
        for part in [self.email.as_str(), self.task.as_str(), self.nonce.as_str()] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        hasher.update(self.round.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    /// Hosting destination name: `<sanitised task>-<8 hex chars of the key digest>`.
    pub fn destination_name(&self) -> String {
        let mut slug: String = self
            .task
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '-'
                }
            })
            .take(80)
            .collect();
        slug = slug.trim_matches(|c| c == '-' || c == '.').to_string();
        if slug.is_empty() {
            slug.push_str("task");
        }
        let digest = self.digest();
        format!("{slug}-{}", &digest[..8])
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}@{}", self.email, self.task, self.round, self.nonce)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::request;
    use super::*;
    use rstest::rstest;

    #[test]
    fn valid_request_passes() {
        assert!(request("captcha-solver", "n1").validate().is_ok());
    }

    #[rstest]
    #[case::email("email")]
    #[case::task("task")]
    #[case::nonce("nonce")]
    #[case::brief("brief")]
    #[case::evaluation_url("evaluation_url")]
    fn blank_fields_are_rejected(#[case] field: &'static str) {
        let mut req = request("t", "n");
        match field {
            "email" => req.email = "  ".to_string(),
            "task" => req.task = String::new(),
            "nonce" => req.nonce = String::new(),
            "brief" => req.brief = "\n".to_string(),
            _ => req.evaluation_url = String::new(),
        }
        assert_eq!(req.validate(), Err(ValidationError::MissingField(field)));
    }

    #[rstest]
    #[case::not_a_url("not a url")]
    #[case::ftp("ftp://eval.example.com/x")]
    fn bad_evaluation_urls_are_rejected(#[case] url: &str) {
        let mut req = request("t", "n");
        req.evaluation_url = url.to_string();
        assert!(matches!(
            req.validate(),
            Err(ValidationError::InvalidField { field: "evaluation_url", .. })
        ));
    }

    #[test]
    fn round_zero_is_rejected() {
        let mut req = request("t", "n");
        req.round = 0;
        assert!(matches!(
            req.validate(),
            Err(ValidationError::InvalidField { field: "round", .. })
        ));
    }

    #[test]
    fn unnamed_attachment_is_rejected() {
        let mut req = request("t", "n");
        req.attachments[0].name = " ".to_string();
        assert!(matches!(
            req.validate(),
            Err(ValidationError::InvalidField { field: "attachments", .. })
        ));
    }

    #[test]
    fn key_covers_round_and_nonce() {
        let a = request("t", "n1").key();
        let b = request("t", "n2").key();
        let mut c = request("t", "n1");
        c.round = 2;

        assert_ne!(a, b);
        assert_ne!(a, c.key());
        assert_eq!(a, request("t", "n1").key());
    }

    #[test]
    fn destination_name_is_sanitised_and_suffixed() {
        let key = request("My Task/ÜBER v2", "n1").key();
        let name = key.destination_name();

        let (slug, suffix) = name.rsplit_once('-').unwrap();
        assert_eq!(slug, "my-task--ber-v2");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn destination_names_differ_per_nonce() {
        let a = request("t", "n1").key().destination_name();
        let b = request("t", "n2").key().destination_name();
        assert_ne!(a, b);
    }

    #[test]
    fn assignment_keeps_everything_but_the_secret() {
        let assignment = request("t", "n").into_assignment();
        assert_eq!(assignment.key, request("t", "n").key());
        assert_eq!(assignment.attachments.len(), 1);
        let json = serde_json::to_string(&assignment).unwrap();
        assert!(!json.contains("s3cret"));
    }

    #[rstest]
    #[case::exact("s3cret", true)]
    #[case::prefix("s3cre", false)]
    #[case::longer("s3cret!", false)]
    #[case::case("S3CRET", false)]
    fn secret_must_match_exactly(#[case] expected: &str, #[case] ok: bool) {
        assert_eq!(request("t", "n").verify_secret(expected).is_ok(), ok);
    }

    #[test]
    fn empty_expected_secret_never_matches() {
        let mut req = request("t", "n");
        req.secret = String::new();
        assert_eq!(req.verify_secret(""), Err(ValidationError::SecretMismatch));
    }

    #[test]
    fn debug_output_redacts_the_secret() {
        let rendered = format!("{:?}", request("t", "n"));
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }
}
