//! HTTP evaluation sink: one JSON POST per delivery attempt.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::domain::{DeliveryFailure, OutcomeReport};
use crate::ports::EvaluationSink;

pub const DELIVERY_ID_HEADER: &str = "x-herald-delivery";
pub const ATTEMPT_HEADER: &str = "x-herald-attempt";

pub struct HttpEvaluationSink {
    client: Client,
}

impl HttpEvaluationSink {
    pub fn new(request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(request_timeout.min(Duration::from_secs(10)))
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EvaluationSink for HttpEvaluationSink {
    async fn deliver(&self, url: &str, report: &OutcomeReport) -> Result<(), DeliveryFailure> {
        let response = self
            .client
            .post(url)
            .header(DELIVERY_ID_HEADER, report.delivery_id.to_string())
            .header(ATTEMPT_HEADER, report.attempt.to_string())
            .json(report)
            .send()
            .await
            .map_err(|e| DeliveryFailure::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryFailure::Status(status.as_u16()))
        }
    }
}
