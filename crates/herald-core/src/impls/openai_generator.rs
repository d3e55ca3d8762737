//! OpenAI-compatible chat-completion generator.
//!
//! The model is asked for a single JSON object `{"files":[{"path","content"}]}`.
//! Markdown code fences around that object are tolerated.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GeneratorConfig;
use crate::domain::GenerationFailure;
use crate::ports::{ContentGenerator, GeneratedFile, GenerationBrief};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const SYSTEM_PROMPT: &str = "You build small static web applications that are served as-is \
from a static file host. Reply with exactly one JSON object and nothing else, of the form \
{\"files\":[{\"path\":\"index.html\",\"content\":\"...\"}]}. Paths are relative. The set must \
contain index.html as the entry page and a README.md describing the app. Use only client-side \
code; there is no build step and no server.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilesPayload {
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    path: String,
    content: String,
}

pub struct OpenAiGenerator {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self, reqwest::Error> {
        let timeout = config.timeout();
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            model: config.model.clone(),
            api_key: config.api_key.expose().to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn map_send_error(&self, error: reqwest::Error) -> GenerationFailure {
        if error.is_timeout() {
            GenerationFailure::Timeout(self.timeout.as_secs())
        } else {
            GenerationFailure::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        brief: GenerationBrief<'_>,
    ) -> Result<Vec<GeneratedFile>, GenerationFailure> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt(brief),
                },
            ],
            temperature: 0.2,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationFailure::Transport(format!(
                "status {}: {}",
                status.as_u16(),
                truncate(&body, 200)
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationFailure::Malformed(format!("completion body: {e}")))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationFailure::Malformed("no choices in response".to_string()))?;

        debug!(model = %self.model, chars = content.len(), "completion received");
        parse_files(&content)
    }
}

fn user_prompt(brief: GenerationBrief<'_>) -> String {
    let mut prompt = format!(
        "Task: {}\nRound: {}\n\nBrief:\n{}\n",
        brief.task, brief.round, brief.brief
    );
    if !brief.checks.is_empty() {
        prompt.push_str("\nThe result will be checked against:\n");
        for check in brief.checks {
            prompt.push_str(&format!("- {check}\n"));
        }
    }
    if !brief.attachments.is_empty() {
        prompt.push_str("\nAttachments (reference them by URL):\n");
        for attachment in brief.attachments {
            prompt.push_str(&format!("- {}: {}\n", attachment.name, attachment.url));
        }
    }
    prompt
}

/// Extract the files object from a completion, with or without code fences.
pub fn parse_files(content: &str) -> Result<Vec<GeneratedFile>, GenerationFailure> {
    let json = strip_code_fence(content);
    let payload: FilesPayload = serde_json::from_str(json)
        .map_err(|e| GenerationFailure::Malformed(format!("files object: {e}")))?;
    if payload.files.is_empty() {
        return Err(GenerationFailure::Empty);
    }
    Ok(payload
        .files
        .into_iter()
        .map(|f| GeneratedFile::text(f.path, f.content))
        .collect())
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json) up to the first newline.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecretString;
    use crate::domain::Attachment;
    use rstest::rstest;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(server: &MockServer) -> OpenAiGenerator {
        let config = GeneratorConfig {
            api_key: SecretString::new("sk-test"),
            base_url: format!("{}/v1/", server.uri()),
            timeout_secs: 5,
            ..GeneratorConfig::default()
        };
        OpenAiGenerator::new(&config).unwrap()
    }

    fn brief<'a>(checks: &'a [String], attachments: &'a [Attachment]) -> GenerationBrief<'a> {
        GenerationBrief {
            task: "counter",
            round: 1,
            brief: "A click counter",
            checks,
            attachments,
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        })
    }

    #[tokio::test]
    async fn fenced_json_is_parsed() {
        let server = MockServer::start().await;
        let content = "```json\n{\"files\":[{\"path\":\"index.html\",\"content\":\"<h1>0</h1>\"},\
                       {\"path\":\"README.md\",\"content\":\"# counter\"}]}\n```";
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(content)))
            .expect(1)
            .mount(&server)
            .await;

        let files = generator(&server).generate(brief(&[], &[])).await.unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0], GeneratedFile::text("index.html", "<h1>0</h1>"));
    }

    #[tokio::test]
    async fn server_error_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .expect(1)
            .mount(&server)
            .await;

        let err = generator(&server).generate(brief(&[], &[])).await.unwrap_err();
        assert_eq!(
            err,
            GenerationFailure::Transport("status 500: upstream exploded".to_string())
        );
    }

    #[tokio::test]
    async fn prose_reply_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("Sure! Here is your app: <html>...</html>")),
            )
            .mount(&server)
            .await;

        let err = generator(&server).generate(brief(&[], &[])).await.unwrap_err();
        assert!(matches!(err, GenerationFailure::Malformed(_)));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("{}"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = GeneratorConfig {
            api_key: SecretString::new("sk-test"),
            base_url: format!("{}/v1", server.uri()),
            timeout_secs: 1,
            ..GeneratorConfig::default()
        };
        let err = OpenAiGenerator::new(&config)
            .unwrap()
            .generate(brief(&[], &[]))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationFailure::Timeout(1));
    }

    #[test]
    fn prompt_lists_checks_and_attachments() {
        let checks = vec!["has a button".to_string()];
        let attachments = vec![Attachment {
            name: "logo.png".to_string(),
            url: "https://cdn.example.com/logo.png".to_string(),
        }];
        let prompt = user_prompt(brief(&checks, &attachments));
        assert!(prompt.contains("Task: counter"));
        assert!(prompt.contains("- has a button"));
        assert!(prompt.contains("- logo.png: https://cdn.example.com/logo.png"));
    }

    #[rstest]
    #[case::bare(r#"{"files":[{"path":"index.html","content":"x"}]}"#)]
    #[case::fenced("```json\n{\"files\":[{\"path\":\"index.html\",\"content\":\"x\"}]}\n```")]
    #[case::fenced_no_lang("```\n{\"files\":[{\"path\":\"index.html\",\"content\":\"x\"}]}```")]
    #[case::padded("\n\n  {\"files\":[{\"path\":\"index.html\",\"content\":\"x\"}]}  \n")]
    fn accepted_completion_shapes(#[case] content: &str) {
        let files = parse_files(content).unwrap();
        assert_eq!(files, vec![GeneratedFile::text("index.html", "x")]);
    }

    #[test]
    fn empty_file_list_is_empty_failure() {
        assert_eq!(parse_files(r#"{"files":[]}"#), Err(GenerationFailure::Empty));
    }
}
