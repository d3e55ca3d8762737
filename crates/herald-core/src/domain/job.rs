//! Fulfillment job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::artifact::{ArtifactOrigin, GeneratedArtifactSet};
use super::errors::{DeliveryFailure, GenerationFailure, PublicationFailure, TransitionError};
use super::ids::{DeliveryId, JobId};
use super::outcome::{DeliveryOutcome, OutcomeReport, PublicationResult, ReportStatus};
use super::request::JobKey;
use super::state::JobStage;

/// Mutable record owned by the pipeline for the lifetime of one job.
///
/// - Single source of truth for the job
/// - Stage transitions go through `advance` (not direct field access)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentJob {
    pub job_id: JobId,
    pub key: JobKey,
    stage: JobStage,

    /// When each stage was entered, in order.
    stage_entered_at: Vec<(JobStage, DateTime<Utc>)>,

    pub artifacts: Option<GeneratedArtifactSet>,
    pub artifact_origin: Option<ArtifactOrigin>,
    pub generation_failure: Option<GenerationFailure>,

    pub publication: Option<PublicationResult>,
    pub publication_failure: Option<PublicationFailure>,

    pub report: Option<OutcomeReport>,
    pub delivery_attempts: u32,
    pub last_delivery_error: Option<DeliveryFailure>,
    pub delivery: Option<DeliveryOutcome>,
}

impl FulfillmentJob {
    pub fn new(job_id: JobId, key: JobKey, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            key,
            stage: JobStage::Pending,
            stage_entered_at: vec![(JobStage::Pending, now)],
            artifacts: None,
            artifact_origin: None,
            generation_failure: None,
            publication: None,
            publication_failure: None,
            report: None,
            delivery_attempts: 0,
            last_delivery_error: None,
            delivery: None,
        }
    }

    pub fn stage(&self) -> JobStage {
        self.stage
    }

    pub fn stage_history(&self) -> &[(JobStage, DateTime<Utc>)] {
        &self.stage_entered_at
    }

    pub fn entered_at(&self, stage: JobStage) -> Option<DateTime<Utc>> {
        self.stage_entered_at
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, at)| *at)
    }

    /// Move to the next stage. Only the single forward step is allowed.
    pub fn advance(&mut self, to: JobStage, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.stage.can_transition_to(to) {
            return Err(TransitionError {
                from: self.stage,
                to,
            });
        }
        self.stage = to;
        self.stage_entered_at.push((to, now));
        Ok(())
    }

    pub fn record_generation(
        &mut self,
        artifacts: GeneratedArtifactSet,
        origin: ArtifactOrigin,
        failure: Option<GenerationFailure>,
    ) {
        self.artifacts = Some(artifacts);
        self.artifact_origin = Some(origin);
        self.generation_failure = failure;
    }

    pub fn record_publication(&mut self, result: Result<PublicationResult, PublicationFailure>) {
        match result {
            Ok(publication) => self.publication = Some(publication),
            Err(failure) => self.publication_failure = Some(failure),
        }
    }

    /// Package whatever generation and publication produced.
    pub fn build_report(&self, delivery_id: DeliveryId) -> OutcomeReport {
        let mut report = OutcomeReport::new(delivery_id, &self.key);

        if let Some(publication) = &self.publication {
            report = report.with_publication(publication);
        }

        if self.artifact_origin == Some(ArtifactOrigin::Fallback) {
            let cause = self
                .generation_failure
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown generator failure".to_string());
            report = report.with_note(format!("fallback content published: {cause}"));
        }

        if let Some(failure) = &self.publication_failure {
            report = report.with_error(failure.to_string());
        } else if self.publication.is_none() {
            report = report.with_error("publication did not run");
        }

        report
    }

    pub fn attach_report(&mut self, report: OutcomeReport) {
        self.report = Some(report);
    }

    pub fn record_delivery_attempt(&mut self, failure: Option<DeliveryFailure>) {
        self.delivery_attempts += 1;
        if failure.is_some() {
            self.last_delivery_error = failure;
        }
    }

    pub fn record_delivery(&mut self, outcome: DeliveryOutcome) {
        self.delivery = Some(outcome);
    }

    /// Status of the report that was (or would have been) sent.
    pub fn report_status(&self) -> Option<ReportStatus> {
        self.report.as_ref().map(|r| r.status)
    }

    pub fn is_done(&self) -> bool {
        self.stage.is_terminal()
    }
}
