//! Generation job envelope.
//!
//! A `GenerationJob` records what was asked for and how the run ended. The
//! status moves `PENDING → RUNNING → COMPLETED | FAILED | CANCELLED`; any
//! other transition is ignored with a warning.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::generate::orchestrator::{GenerationOrchestrator, GenerationOutput, RunControl};
use crate::schema::types::SourceDomain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    fn can_move_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: Uuid,
    pub target_subjects: i64,
    pub domains: Vec<String>,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub quality_score: Option<f64>,
    pub error_message: Option<String>,
}

impl GenerationJob {
    pub fn new(target_subjects: i64, domains: &[SourceDomain]) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_subjects,
            domains: domains.iter().map(|d| d.name.clone()).collect(),
            status: JobStatus::Pending,
            started_at: None,
            finished_at: None,
            quality_score: None,
            error_message: None,
        }
    }

    /// Move to `next` if the transition is legal. Returns whether it moved.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_move_to(next) {
            tracing::warn!(
                "Job {}: ignoring transition {} -> {}",
                self.id,
                self.status,
                next
            );
            return false;
        }
        let now = Utc::now();
        if next == JobStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = next;
        true
    }

    /// Run this job on `orchestrator`, recording the outcome.
    ///
    /// The orchestrator's error is returned unchanged after the job has
    /// been marked FAILED.
    pub fn run(
        &mut self,
        orchestrator: &mut GenerationOrchestrator,
        domains: &[SourceDomain],
        control: RunControl<'_>,
    ) -> Result<GenerationOutput> {
        self.transition(JobStatus::Running);
        match orchestrator.generate(domains, self.target_subjects, control) {
            Ok(output) => {
                self.quality_score = Some(output.report.overall_score);
                if output.report.cancelled {
                    self.transition(JobStatus::Cancelled);
                } else {
                    self.transition(JobStatus::Completed);
                }
                Ok(output)
            }
            Err(e) => {
                self.error_message = Some(e.to_string());
                self.transition(JobStatus::Failed);
                Err(e)
            }
        }
    }
}
