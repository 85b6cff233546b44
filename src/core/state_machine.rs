//! State machine for the publish stages
//!
//! A publish run walks CHECK → PUBLISH → TAG exactly once, in order. Each
//! stage ends completed, skipped or failed; the tracker keeps the records
//! for the final report and refuses to go backwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Publish stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishStage {
    Check,
    Publish,
    Tag,
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Check => write!(f, "CHECK"),
            Self::Publish => write!(f, "PUBLISH"),
            Self::Tag => write!(f, "TAG"),
        }
    }
}

/// How a stage ended
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", content = "detail", rename_all = "lowercase")]
pub enum StageOutcome {
    Completed(String),
    Skipped(String),
    Failed(String),
}

/// One finished stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageRecord {
    pub stage: PublishStage,
    #[serde(flatten)]
    pub outcome: StageOutcome,
    pub timestamp: DateTime<Utc>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StateError {
    #[error("stage {to} cannot follow {from}")]
    OutOfOrder {
        from: PublishStage,
        to: PublishStage,
    },
}

/// Tracks the ordered publish stages of one run
#[derive(Debug, Default)]
pub struct PublishStateMachine {
    records: Vec<StageRecord>,
}

impl PublishStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of `stage`
    pub fn record(&mut self, stage: PublishStage, outcome: StageOutcome) -> Result<(), StateError> {
        if let Some(last) = self.records.last()
            && last.stage >= stage
        {
            return Err(StateError::OutOfOrder {
                from: last.stage,
                to: stage,
            });
        }

        match &outcome {
            StageOutcome::Completed(detail) => log::info!("[{}] {}", stage, detail),
            StageOutcome::Skipped(reason) => log::info!("[{}] skipped: {}", stage, reason),
            StageOutcome::Failed(message) => log::error!("[{}] failed: {}", stage, message),
        }

        self.records.push(StageRecord {
            stage,
            outcome,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub fn complete(&mut self, stage: PublishStage, detail: impl Into<String>) -> Result<(), StateError> {
        self.record(stage, StageOutcome::Completed(detail.into()))
    }

    pub fn skip(&mut self, stage: PublishStage, reason: impl Into<String>) -> Result<(), StateError> {
        self.record(stage, StageOutcome::Skipped(reason.into()))
    }

    pub fn fail(&mut self, stage: PublishStage, message: impl Into<String>) -> Result<(), StateError> {
        self.record(stage, StageOutcome::Failed(message.into()))
    }

    /// Last stage reached
    pub fn current(&self) -> Option<PublishStage> {
        self.records.last().map(|r| r.stage)
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<StageRecord> {
        self.records
    }
}
