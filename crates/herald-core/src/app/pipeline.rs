//! Pipeline - 1 ジョブを PENDING から DONE まで進める
//!
//! # フロー
//! 1. GENERATING: generator 呼び出し、失敗時は fallback
//! 2. PUBLISHING: create -> push -> enable serving
//! 3. REPORTING: OutcomeReport を retry 付きで配送
//! 4. DONE
//!
//! どの stage の失敗も job を止めない。必ず DONE に到達する。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, instrument};

use super::generation::GenerationStage;
use super::publication::PublicationStage;
use super::reporting::ReportingStage;
use crate::domain::{Assignment, FulfillmentJob, JobId, JobStage};
use crate::ports::{Clock, IdGenerator};

pub struct Pipeline {
    generation: GenerationStage,
    publication: PublicationStage,
    reporting: ReportingStage,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl Pipeline {
    pub fn new(
        generation: GenerationStage,
        publication: PublicationStage,
        reporting: ReportingStage,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            generation,
            publication,
            reporting,
            clock,
            ids,
        }
    }

    pub fn generator_name(&self) -> &str {
        self.generation.generator_name()
    }

    pub fn publisher_name(&self) -> &str {
        self.publication.publisher_name()
    }

    /// Run one job to completion. Stage changes are published on `stage_tx`.
    #[instrument(
        name = "job",
        skip_all,
        fields(
            job_id = %job_id,
            task = %assignment.key.task,
            round = assignment.key.round,
            nonce = %assignment.key.nonce
        )
    )]
    pub async fn run(
        &self,
        job_id: JobId,
        assignment: Assignment,
        stage_tx: &watch::Sender<JobStage>,
    ) -> FulfillmentJob {
        let mut job = FulfillmentJob::new(job_id, assignment.key.clone(), self.clock.now());

        self.enter(&mut job, JobStage::Generating, stage_tx);
        let generated = self.generation.run(&assignment).await;
        job.record_generation(generated.artifacts, generated.origin, generated.failure);

        self.enter(&mut job, JobStage::Publishing, stage_tx);
        if let Some(artifacts) = &job.artifacts {
            let result = self.publication.run(&job.key, artifacts).await;
            job.record_publication(result);
        }

        self.enter(&mut job, JobStage::Reporting, stage_tx);
        let report = job.build_report(self.ids.generate_delivery_id());
        job.attach_report(report.clone());
        let outcome = self
            .reporting
            .run(&assignment.evaluation_url, &report, &mut job)
            .await;
        let attempts = outcome.attempts();
        job.record_delivery(outcome);

        self.enter(&mut job, JobStage::Done, stage_tx);
        info!(
            status = ?report.status,
            delivered = job.delivery.as_ref().is_some_and(|d| d.is_delivered()),
            attempts,
            "job finished"
        );
        job
    }

    fn enter(&self, job: &mut FulfillmentJob, to: JobStage, stage_tx: &watch::Sender<JobStage>) {
        if let Err(e) = job.advance(to, self.clock.now()) {
            // Only reachable through a bug in the stage order above.
            error!(error = %e, "stage transition rejected");
            return;
        }
        stage_tx.send_replace(to);
        info!(stage = %to, "stage entered");
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::app::publication::fakes::ScriptedPublisher;
    use crate::app::reporting::fakes::FlakySink;
    use crate::app::retry::RetryPolicy;
    use crate::domain::GenerationFailure;
    use crate::ports::{
        ContentGenerator, GeneratedFile, GenerationBrief, ManualClock, UlidGenerator,
    };

    /// Generator that echoes the task into index.html, or fails when asked.
    pub struct EchoGenerator {
        pub fail: bool,
    }

    #[async_trait]
    impl ContentGenerator for EchoGenerator {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(
            &self,
            brief: GenerationBrief<'_>,
        ) -> Result<Vec<GeneratedFile>, GenerationFailure> {
            if self.fail {
                return Err(GenerationFailure::Transport("connection refused".to_string()));
            }
            Ok(vec![GeneratedFile::text(
                "index.html",
                format!("<h1>{}</h1>", brief.task),
            )])
        }
    }

    pub struct Parts {
        pub pipeline: Pipeline,
        pub publisher: Arc<ScriptedPublisher>,
        pub sink: Arc<FlakySink>,
        pub clock: ManualClock,
    }

    pub fn pipeline(generator: EchoGenerator, publisher: ScriptedPublisher, sink: FlakySink) -> Parts {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let publisher = Arc::new(publisher);
        let sink = Arc::new(sink);
        let pipeline = Pipeline::new(
            GenerationStage::new(Arc::new(generator), Duration::from_secs(30)),
            PublicationStage::new(publisher.clone(), Duration::from_secs(30)),
            ReportingStage::new(
                sink.clone(),
                RetryPolicy::default(),
                Arc::new(clock.clone()),
                Arc::new(clock.clone()),
            ),
            Arc::new(clock.clone()),
            Arc::new(UlidGenerator::new(clock.clone())),
        );
        Parts {
            pipeline,
            publisher,
            sink,
            clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use ulid::Ulid;

    use super::fixtures::{pipeline, EchoGenerator};
    use super::*;
    use crate::app::publication::fakes::ScriptedPublisher;
    use crate::app::reporting::fakes::FlakySink;
    use crate::domain::request::fixtures::request;
    use crate::domain::{ArtifactOrigin, DeliveryOutcome, PublicationStep, ReportStatus};

    fn job_id() -> JobId {
        JobId::from_ulid(Ulid::new())
    }

    #[tokio::test]
    async fn happy_path_reports_ok_once() {
        let parts = pipeline(
            EchoGenerator { fail: false },
            ScriptedPublisher::default(),
            FlakySink::new(0),
        );
        let (tx, rx) = watch::channel(JobStage::Pending);

        let job = parts
            .pipeline
            .run(job_id(), request("demo", "n1").into_assignment(), &tx)
            .await;

        assert!(job.is_done());
        assert_eq!(*rx.borrow(), JobStage::Done);
        let stages: Vec<_> = job.stage_history().iter().map(|(s, _)| *s).collect();
        assert_eq!(stages, JobStage::ALL.to_vec());

        let received = parts.sink.received();
        assert_eq!(received.len(), 1);
        let (url, report) = &received[0];
        assert_eq!(url, "https://eval.example.com/notify");
        assert_eq!(report.status, ReportStatus::Ok);
        assert!(report.pages_url.as_deref().unwrap().starts_with("https://me.pages.example.com/demo-"));
        assert_eq!(report.error, None);
        assert_eq!(job.delivery, Some(DeliveryOutcome::Delivered { attempts: 1 }));
    }

    #[tokio::test]
    async fn generator_failure_still_publishes_fallback() {
        let parts = pipeline(
            EchoGenerator { fail: true },
            ScriptedPublisher::default(),
            FlakySink::new(0),
        );
        let (tx, _rx) = watch::channel(JobStage::Pending);

        let job = parts
            .pipeline
            .run(job_id(), request("demo", "n1").into_assignment(), &tx)
            .await;

        assert_eq!(job.artifact_origin, Some(ArtifactOrigin::Fallback));
        assert_eq!(parts.publisher.calls(), vec!["create", "push", "serve"]);
        let pushed = parts.publisher.pushed.lock().unwrap().clone();
        assert_eq!(pushed, vec![vec!["README.md".to_string(), "index.html".to_string()]]);

        let (_, report) = &parts.sink.received()[0];
        assert_eq!(report.status, ReportStatus::Ok);
        assert!(report.error.as_deref().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn publication_failure_is_reported_as_error() {
        let parts = pipeline(
            EchoGenerator { fail: false },
            ScriptedPublisher::failing_at(PublicationStep::PushArtifacts),
            FlakySink::new(0),
        );
        let (tx, _rx) = watch::channel(JobStage::Pending);

        let job = parts
            .pipeline
            .run(job_id(), request("demo", "n1").into_assignment(), &tx)
            .await;

        assert!(job.is_done());
        let (_, report) = &parts.sink.received()[0];
        assert_eq!(report.status, ReportStatus::Error);
        assert_eq!(report.pages_url, None);
        assert!(report.error.as_deref().unwrap().contains("push_artifacts"));
    }

    #[tokio::test]
    async fn unreachable_evaluator_still_reaches_done() {
        let parts = pipeline(
            EchoGenerator { fail: false },
            ScriptedPublisher::default(),
            FlakySink::always_failing(),
        );
        let (tx, _rx) = watch::channel(JobStage::Pending);

        let job = parts
            .pipeline
            .run(job_id(), request("demo", "n1").into_assignment(), &tx)
            .await;

        assert!(job.is_done());
        assert_eq!(parts.sink.received().len(), 5);
        assert_eq!(parts.clock.sleeps().len(), 5);
        assert!(matches!(job.delivery, Some(DeliveryOutcome::Exhausted { attempts: 5, .. })));
        assert_eq!(job.delivery.as_ref().map(DeliveryOutcome::attempts), Some(job.delivery_attempts));
    }
}
