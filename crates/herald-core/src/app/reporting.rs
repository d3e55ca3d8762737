//! Reporting stage: deliver the outcome report with bounded retries.
//!
//! The loop is `schedule.next -> sleep -> deliver` until a 2xx, the attempt
//! limit, or the backoff ceiling. Every attempt is recorded on the job.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::retry::{Decision, RetryPolicy, RetrySchedule};
use crate::domain::{DeliveryOutcome, FulfillmentJob, OutcomeReport};
use crate::ports::{Clock, EvaluationSink, Sleeper};

pub struct ReportingStage {
    sink: Arc<dyn EvaluationSink>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl ReportingStage {
    pub fn new(
        sink: Arc<dyn EvaluationSink>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            sink,
            policy,
            clock,
            sleeper,
        }
    }

    /// Deliver `report` to `evaluation_url`, recording attempts on `job`.
    pub async fn run(
        &self,
        evaluation_url: &str,
        report: &OutcomeReport,
        job: &mut FulfillmentJob,
    ) -> DeliveryOutcome {
        let mut schedule = RetrySchedule::new(self.policy.clone(), self.clock.now());

        loop {
            // ThreadRng is not Send; keep it out of the awaits below.
            let decision = schedule.next(self.clock.now(), &mut rand::thread_rng());

            let (number, delay) = match decision {
                Decision::Attempt { number, delay } => (number, delay),
                Decision::GiveUp { reason } => {
                    let last_error = job.last_delivery_error.as_ref().map(ToString::to_string);
                    error!(
                        job_id = %job.job_id,
                        delivery_id = %report.delivery_id,
                        attempts = schedule.attempts_made(),
                        last_error = last_error.as_deref().unwrap_or("-"),
                        %reason,
                        "giving up on outcome delivery"
                    );
                    return DeliveryOutcome::Exhausted {
                        attempts: schedule.attempts_made(),
                        reason,
                        last_error,
                    };
                }
            };

            debug!(
                job_id = %job.job_id,
                attempt = number,
                delay_ms = delay.as_millis() as u64,
                "waiting before delivery attempt"
            );
            self.sleeper.sleep(delay).await;

            match self.sink.deliver(evaluation_url, &report.for_attempt(number)).await {
                Ok(()) => {
                    job.record_delivery_attempt(None);
                    info!(
                        job_id = %job.job_id,
                        delivery_id = %report.delivery_id,
                        status = ?report.status,
                        attempt = number,
                        "outcome delivered"
                    );
                    return DeliveryOutcome::Delivered { attempts: number };
                }
                Err(failure) => {
                    warn!(
                        job_id = %job.job_id,
                        delivery_id = %report.delivery_id,
                        attempt = number,
                        max_attempts = self.policy.max_attempts,
                        error = %failure,
                        "delivery attempt failed"
                    );
                    job.record_delivery_attempt(Some(failure));
                }
            }
        }
    }
}
