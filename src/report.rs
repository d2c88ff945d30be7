//! Result aggregation and report rendering.
//!
//! [`ResultAggregator`] keys outcomes by [`TaskId`], so duplicate hosts never
//! collide. [`RunReport`] renders as the per-device text layout
//! (`=====` banner, `>>>> device:` header, body, `-----` footer) followed by the
//! summary and a `Time taken: MM:SS minutes` line, and serializes to JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::device::{Payload, TaskId};
use crate::error::DispatchError;
use crate::executor::OutcomeStream;
use crate::task::{DeviceOutcome, OutcomeDetail, OutcomeStatus};

const BANNER_WIDTH: usize = 50;

/// Collects outcomes for one run.
#[derive(Debug)]
pub struct ResultAggregator {
    started: Instant,
    last_recorded: Option<Instant>,
    expected: usize,
    outcomes: BTreeMap<TaskId, DeviceOutcome>,
}

impl ResultAggregator {
    /// Starts the run clock now.
    pub fn new(expected: usize) -> Self {
        Self::started_at(Instant::now(), expected)
    }

    pub fn started_at(started: Instant, expected: usize) -> Self {
        Self {
            started,
            last_recorded: None,
            expected,
            outcomes: BTreeMap::new(),
        }
    }

    /// Records one outcome. Returns the previous outcome for the same task, if any.
    pub fn record(&mut self, outcome: DeviceOutcome) -> Option<DeviceOutcome> {
        self.last_recorded = Some(Instant::now());
        self.outcomes.insert(outcome.task_id, outcome)
    }

    /// Drains a stream until every submitted task has reported.
    pub async fn collect(&mut self, stream: &mut OutcomeStream) {
        while let Some(outcome) = stream.next().await {
            self.record(outcome);
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn get(&self, task_id: TaskId) -> Option<&DeviceOutcome> {
        self.outcomes.get(&task_id)
    }

    /// Outcomes in device-input order.
    pub fn outcomes(&self) -> impl Iterator<Item = &DeviceOutcome> {
        self.outcomes.values()
    }

    /// Counts per status and elapsed time from start to the last recorded outcome.
    /// Calling it again without new outcomes returns the same summary.
    pub fn summarize(&self) -> RunSummary {
        let mut counts = BTreeMap::new();
        for outcome in self.outcomes.values() {
            *counts.entry(outcome.status).or_insert(0) += 1;
        }
        let elapsed = self
            .last_recorded
            .map(|at| at.duration_since(self.started))
            .unwrap_or_default();

        RunSummary {
            total: self.outcomes.len(),
            expected: self.expected,
            missing: self.expected.saturating_sub(self.outcomes.len()),
            counts,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn into_report(self, payload: Payload) -> RunReport {
        let summary = self.summarize();
        RunReport {
            payload,
            outcomes: self.outcomes.into_values().collect(),
            summary,
        }
    }
}

/// Derived statistics for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunSummary {
    /// Outcomes recorded.
    pub total: usize,
    /// Tasks submitted.
    pub expected: usize,
    /// Submitted tasks with no recorded outcome. Zero for a completed run.
    pub missing: usize,
    pub counts: BTreeMap<OutcomeStatus, usize>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// Elapsed wall clock as `MM:SS`, both parts floored.
    pub fn time_taken(&self) -> String {
        let secs = self.elapsed().as_secs();
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }

    pub fn all_succeeded(&self) -> bool {
        self.missing == 0 && self.count(OutcomeStatus::Success) == self.total
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} devices", self.total)?;
        for (status, count) in &self.counts {
            write!(f, ", {status}: {count}")?;
        }
        if self.missing > 0 {
            write!(f, ", missing: {}", self.missing)?;
        }
        writeln!(f)?;
        write!(f, "Time taken: {} minutes", self.time_taken())
    }
}

/// Everything a collaborator needs to present a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunReport {
    pub payload: Payload,
    /// In device-input order.
    pub outcomes: Vec<DeviceOutcome>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String, DispatchError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Outcomes for a host. Duplicate host entries yield one outcome each.
    pub fn for_host<'a>(&'a self, host: &'a str) -> impl Iterator<Item = &'a DeviceOutcome> + 'a {
        self.outcomes.iter().filter(move |outcome| outcome.host == host)
    }

    fn write_outcome(&self, f: &mut fmt::Formatter<'_>, outcome: &DeviceOutcome) -> fmt::Result {
        let banner = "=".repeat(BANNER_WIDTH);
        writeln!(f, "{banner}")?;
        match &self.payload {
            Payload::Command { command } => {
                writeln!(f, ">>>> device: {} - {}", outcome.label(), command)?
            }
            Payload::Config { .. } => writeln!(f, ">>>> device: {}", outcome.label())?,
        }
        writeln!(f, "{banner}")?;

        if !outcome.status.is_success() {
            writeln!(f, "status: {}", outcome.status)?;
        }
        match &outcome.detail {
            OutcomeDetail::Output(output) => writeln!(f, "{output}")?,
            OutcomeDetail::Steps(steps) => {
                for step in steps {
                    writeln!(f, "{}", step.input)?;
                    if step.failed {
                        writeln!(f, "{}", step.output)?;
                    }
                }
            }
            OutcomeDetail::Error(error) => writeln!(f, "{error}")?,
            OutcomeDetail::NotRun { reason } => writeln!(f, "not started: {reason}")?,
        }
        if let Some(persist) = &outcome.persist {
            writeln!(f, "Saving configuration ...")?;
            if persist.failed {
                writeln!(f, "save failed: {}", persist.output)?;
            } else if !persist.output.is_empty() {
                writeln!(f, "{}", persist.output)?;
            }
        }

        writeln!(f, "{}", "-".repeat(BANNER_WIDTH))
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            self.write_outcome(f, outcome)?;
        }
        write!(f, "{}", self.summary)
    }
}
