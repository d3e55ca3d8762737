//! GitHub publisher: repository via REST, content via `git push`, Pages via REST.

use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::PublisherConfig;
use crate::domain::artifact::normalise_path;
use crate::domain::{GeneratedArtifactSet, PublisherError};
use crate::ports::{Destination, Publisher, PushReceipt};

const USER_AGENT: &str = concat!("herald/", env!("CARGO_PKG_VERSION"));
const GIT_AUTHOR: &str = "herald";
const GIT_EMAIL: &str = "herald@users.noreply.github.com";
const TOKEN_ENV: &str = "HERALD_GIT_TOKEN";
const CREDENTIAL_HELPER: &str =
    "!f() { echo username=x-access-token; echo \"password=$HERALD_GIT_TOKEN\"; }; f";

#[derive(Debug, Deserialize)]
struct RepoResponse {
    full_name: String,
    html_url: String,
}

pub struct GithubPublisher {
    client: Client,
    api_base: String,
    git_base: String,
    token: String,
    owner: String,
    branch: String,
}

impl GithubPublisher {
    pub fn new(config: &PublisherConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            git_base: "https://github.com".to_string(),
            token: config.token.expose().to_string(),
            owner: config.owner.clone(),
            branch: config.branch.clone(),
        })
    }

    /// Push to a different git host (GitHub Enterprise, or a local path in tests).
    pub fn with_git_base(mut self, git_base: impl Into<String>) -> Self {
        self.git_base = git_base.into().trim_end_matches('/').to_string();
        self
    }

    fn remote_url(&self, full_name: &str) -> String {
        format!("{}/{full_name}.git", self.git_base)
    }

    fn pages_url(&self, repo: &str) -> String {
        format!("https://{}.github.io/{repo}/", self.owner.to_lowercase())
    }

    fn scrub(&self, text: &str) -> String {
        if self.token.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.token, "***")
        }
    }

    /// `git` against a repository whose metadata lives in `git_dir`, outside
    /// the work tree that holds generated files. The token reaches git only
    /// through the environment, read by an inline credential helper.
    fn git_command(&self, repo: &GitRepo, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-c")
            .arg(format!("user.name={GIT_AUTHOR}"))
            .arg("-c")
            .arg(format!("user.email={GIT_EMAIL}"))
            .arg("-c")
            .arg("core.hooksPath=/dev/null")
            .args(args)
            .current_dir(&repo.work_tree)
            .env("GIT_DIR", &repo.git_dir)
            .env("GIT_WORK_TREE", &repo.work_tree)
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_CONFIG_COUNT", "1")
            .env("GIT_CONFIG_KEY_0", "credential.helper")
            .env("GIT_CONFIG_VALUE_0", CREDENTIAL_HELPER)
            .env(TOKEN_ENV, &self.token)
            .kill_on_drop(true);
        cmd
    }

    async fn git(&self, repo: &GitRepo, args: &[&str]) -> Result<Output, PublisherError> {
        let output = self
            .git_command(repo, args)
            .output()
            .await
            .map_err(|e| PublisherError::Io(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PublisherError::Request(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or(""),
                self.scrub(stderr.trim())
            )));
        }
        Ok(output)
    }
}

/// Scratch repository for one push: `work_tree` holds only artifacts.
struct GitRepo {
    _scratch: tempfile::TempDir,
    git_dir: PathBuf,
    work_tree: PathBuf,
}

impl GitRepo {
    async fn create() -> Result<Self, PublisherError> {
        let scratch = tempfile::tempdir().map_err(|e| PublisherError::Io(e.to_string()))?;
        let git_dir = scratch.path().join("repo.git");
        let work_tree = scratch.path().join("site");
        tokio::fs::create_dir_all(&work_tree)
            .await
            .map_err(|e| PublisherError::Io(e.to_string()))?;
        Ok(Self {
            _scratch: scratch,
            git_dir,
            work_tree,
        })
    }
}

async fn rejected(response: Response) -> PublisherError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    PublisherError::Rejected { status, body }
}

fn request_error(error: reqwest::Error) -> PublisherError {
    PublisherError::Request(error.without_url().to_string())
}

#[async_trait]
impl Publisher for GithubPublisher {
    fn name(&self) -> &str {
        "github"
    }

    async fn create_destination(&self, name: &str) -> Result<Destination, PublisherError> {
        let response = self
            .client
            .post(format!("{}/user/repos", self.api_base))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&json!({ "name": name, "private": false, "auto_init": false }))
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let repo: RepoResponse = response
            .json()
            .await
            .map_err(|e| PublisherError::Request(format!("unexpected repository body: {e}")))?;
        info!(repo = %repo.full_name, "repository created");

        Ok(Destination {
            id: repo.full_name,
            name: name.to_string(),
            repo_url: Some(repo.html_url),
        })
    }

    async fn push(
        &self,
        destination: &Destination,
        artifacts: &GeneratedArtifactSet,
    ) -> Result<PushReceipt, PublisherError> {
        let repo = GitRepo::create().await?;

        for (path, content) in artifacts.iter() {
            let relative =
                normalise_path(path).map_err(|_| PublisherError::InvalidPath(path.to_string()))?;
            let target = repo.work_tree.join(&relative);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| PublisherError::Io(e.to_string()))?;
            }
            tokio::fs::write(&target, content.as_bytes())
                .await
                .map_err(|e| PublisherError::Io(format!("{relative}: {e}")))?;
        }

        let refspec = format!("HEAD:refs/heads/{}", self.branch);
        let remote = self.remote_url(&destination.id);
        self.git(&repo, &["init", "-q"]).await?;
        self.git(&repo, &["add", "-A"]).await?;
        self.git(&repo, &["commit", "-q", "-m", "Initial commit"]).await?;
        self.git(&repo, &["push", "-q", remote.as_str(), refspec.as_str()])
            .await?;
        let head = self.git(&repo, &["rev-parse", "HEAD"]).await?;

        let revision = String::from_utf8_lossy(&head.stdout).trim().to_string();
        debug!(repo = %destination.id, %revision, files = artifacts.len(), "artifacts pushed");
        Ok(PushReceipt {
            revision: (!revision.is_empty()).then_some(revision),
        })
    }

    async fn enable_serving(&self, destination: &Destination) -> Result<String, PublisherError> {
        let response = self
            .client
            .post(format!("{}/repos/{}/pages", self.api_base, destination.id))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&json!({ "source": { "branch": self.branch, "path": "/" } }))
            .send()
            .await
            .map_err(request_error)?;

        match response.status() {
            s if s.is_success() => {}
            // Pages already enabled for this repository.
            StatusCode::CONFLICT => debug!(repo = %destination.id, "pages already enabled"),
            _ => return Err(rejected(response).await),
        }

        let repo = destination
            .id
            .rsplit_once('/')
            .map_or(destination.name.as_str(), |(_, repo)| repo);
        Ok(self.pages_url(repo))
    }
}
