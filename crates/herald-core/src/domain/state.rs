//! Job stage state machine.

use serde::{Deserialize, Serialize};

/// Stage of a fulfillment job.
///
/// State transitions (forward only, no skipping):
/// - Pending -> Generating -> Publishing -> Reporting -> Done
///
/// Stage failures are recorded on the job as data; the machine itself always
/// reaches `Done` so the evaluator receives a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStage {
    Pending,
    Generating,
    Publishing,
    Reporting,
    Done,
}

impl JobStage {
    pub const ALL: [JobStage; 5] = [
        JobStage::Pending,
        JobStage::Generating,
        JobStage::Publishing,
        JobStage::Reporting,
        JobStage::Done,
    ];

    /// The only stage this one may move to.
    pub fn successor(self) -> Option<JobStage> {
        match self {
            JobStage::Pending => Some(JobStage::Generating),
            JobStage::Generating => Some(JobStage::Publishing),
            JobStage::Publishing => Some(JobStage::Reporting),
            JobStage::Reporting => Some(JobStage::Done),
            JobStage::Done => None,
        }
    }

    pub fn can_transition_to(self, next: JobStage) -> bool {
        self.successor() == Some(next)
    }

    pub fn is_terminal(self) -> bool {
        self == JobStage::Done
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStage::Pending => "PENDING",
            JobStage::Generating => "GENERATING",
            JobStage::Publishing => "PUBLISHING",
            JobStage::Reporting => "REPORTING",
            JobStage::Done => "DONE",
        }
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
