//! Status - ジョブ数の集計ビュー
//!
//! `active` は現在の stage ごとの件数、それ以外は起動からの累計。

use serde::{Deserialize, Serialize};

use crate::domain::JobStage;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub pending: usize,
    pub generating: usize,
    pub publishing: usize,
    pub reporting: usize,
}

impl StageCounts {
    pub fn add(&mut self, stage: JobStage) {
        match stage {
            JobStage::Pending => self.pending += 1,
            JobStage::Generating => self.generating += 1,
            JobStage::Publishing => self.publishing += 1,
            JobStage::Reporting => self.reporting += 1,
            // A DONE job has already released its key.
            JobStage::Done => {}
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.generating + self.publishing + self.reporting
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub active: StageCounts,
    pub accepted: u64,
    pub rejected_duplicate: u64,
    pub completed: u64,
    pub fallback_used: u64,
    pub publication_failed: u64,
    pub delivered: u64,
    pub delivery_exhausted: u64,
}
