//! Publication stage: create destination -> push artifacts -> enable serving.
//!
//! Steps run strictly in order. A failing step stops the stage and the
//! failure names that step. Nothing is rolled back.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::{
    GeneratedArtifactSet, JobKey, PublicationFailure, PublicationResult, PublicationStep,
    PublisherError,
};
use crate::ports::Publisher;

pub struct PublicationStage {
    publisher: Arc<dyn Publisher>,
    step_timeout: Duration,
}

impl PublicationStage {
    pub fn new(publisher: Arc<dyn Publisher>, step_timeout: Duration) -> Self {
        Self {
            publisher,
            step_timeout,
        }
    }

    pub fn publisher_name(&self) -> &str {
        self.publisher.name()
    }

    pub async fn run(
        &self,
        key: &JobKey,
        artifacts: &GeneratedArtifactSet,
    ) -> Result<PublicationResult, PublicationFailure> {
        let name = key.destination_name();

        let destination = self
            .step(self.publisher.create_destination(&name))
            .await
            .map_err(|e| self.fail(key, PublicationStep::CreateDestination, e, None))?;

        let receipt = self
            .step(self.publisher.push(&destination, artifacts))
            .await
            .map_err(|e| {
                self.fail(key, PublicationStep::PushArtifacts, e, Some(destination.id.as_str()))
            })?;

        let public_url = self
            .step(self.publisher.enable_serving(&destination))
            .await
            .map_err(|e| {
                self.fail(key, PublicationStep::EnableServing, e, Some(destination.id.as_str()))
            })?;

        info!(
            job_key = %key,
            publisher = self.publisher.name(),
            destination = %destination.id,
            url = %public_url,
            revision = receipt.revision.as_deref().unwrap_or("-"),
            "artifacts published"
        );

        Ok(PublicationResult {
            destination_id: destination.id,
            public_url,
            repo_url: destination.repo_url,
            commit_sha: receipt.revision,
        })
    }

    async fn step<T>(
        &self,
        fut: impl Future<Output = Result<T, PublisherError>>,
    ) -> Result<T, PublisherError> {
        match tokio::time::timeout(self.step_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PublisherError::Timeout(self.step_timeout.as_secs())),
        }
    }

    fn fail(
        &self,
        key: &JobKey,
        step: PublicationStep,
        error: PublisherError,
        destination_id: Option<&str>,
    ) -> PublicationFailure {
        match destination_id {
            Some(id) => warn!(
                job_key = %key,
                publisher = self.publisher.name(),
                %step,
                destination = id,
                error = %error,
                "publication failed, destination left in place"
            ),
            None => warn!(
                job_key = %key,
                publisher = self.publisher.name(),
                %step,
                error = %error,
                "publication failed"
            ),
        }
        PublicationFailure {
            step,
            message: error.to_string(),
            destination_id: destination_id.map(str::to_string),
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::ports::{Destination, PushReceipt};

    /// Publisher that records calls and fails at a chosen step.
    #[derive(Default)]
    pub struct ScriptedPublisher {
        pub fail_at: Option<PublicationStep>,
        pub calls: Mutex<Vec<String>>,
        pub pushed: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedPublisher {
        pub fn failing_at(step: PublicationStep) -> Self {
            Self {
                fail_at: Some(step),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str, step: PublicationStep) -> Result<(), PublisherError> {
            self.calls.lock().unwrap().push(call.to_string());
            if self.fail_at == Some(step) {
                return Err(PublisherError::Rejected {
                    status: 422,
                    body: format!("{call} refused"),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Publisher for ScriptedPublisher {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn create_destination(&self, name: &str) -> Result<Destination, PublisherError> {
            self.record("create", PublicationStep::CreateDestination)?;
            Ok(Destination {
                id: format!("me/{name}"),
                name: name.to_string(),
                repo_url: Some(format!("https://git.example.com/me/{name}")),
            })
        }

        async fn push(
            &self,
            _destination: &Destination,
            artifacts: &GeneratedArtifactSet,
        ) -> Result<PushReceipt, PublisherError> {
            self.record("push", PublicationStep::PushArtifacts)?;
            self.pushed
                .lock()
                .unwrap()
                .push(artifacts.paths().into_iter().map(str::to_string).collect());
            Ok(PushReceipt {
                revision: Some("0123abcd".to_string()),
            })
        }

        async fn enable_serving(&self, destination: &Destination) -> Result<String, PublisherError> {
            self.record("serve", PublicationStep::EnableServing)?;
            Ok(format!("https://me.pages.example.com/{}/", destination.name))
        }
    }
}
