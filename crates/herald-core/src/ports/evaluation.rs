//! EvaluationSink port - OutcomeReport の配送先
//!
//! One call is one delivery attempt. Any 2xx is success; everything else,
//! including transport errors, is a `DeliveryFailure`.

use async_trait::async_trait;

use crate::domain::{DeliveryFailure, OutcomeReport};

#[async_trait]
pub trait EvaluationSink: Send + Sync {
    async fn deliver(&self, url: &str, report: &OutcomeReport) -> Result<(), DeliveryFailure>;
}
