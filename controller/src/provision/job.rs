//! Provisioning job state: one per job class, single-flight

use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::errors::FleetError;
use crate::provision::request::{JobClass, ProvisionForm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum JobState {
    #[default]
    Idle,
    Running,
    Done,
    Error,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Idle => "Idle",
            JobState::Running => "Running",
            JobState::Done => "Done",
            JobState::Error => "Error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
struct LogLine {
    at: DateTime<Local>,
    text: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.text)
    }
}

/// Point-in-time copy of a job
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub state: JobState,

    /// Rendered log, oldest line first
    pub log: String,

    #[serde(skip)]
    pub lines: Vec<String>,
}

#[derive(Default)]
struct JobInner {
    state: JobState,
    log: Vec<LogLine>,
    last_form: Option<ProvisionForm>,
}

/// State and append-only log of one job class
pub struct ProvisioningJob {
    class: JobClass,
    inner: Mutex<JobInner>,
}

impl ProvisioningJob {
    pub fn new(class: JobClass) -> Self {
        Self {
            class,
            inner: Mutex::new(JobInner::default()),
        }
    }

    pub fn class(&self) -> JobClass {
        self.class
    }

    /// Claim the job for a new run, resetting its log to `seed`.
    ///
    /// Fails with `Conflict` while a run is in progress; the running job's
    /// log is left untouched.
    pub async fn try_start(&self, seed: String) -> Result<(), FleetError> {
        let mut inner = self.inner.lock().await;
        if inner.state == JobState::Running {
            return Err(FleetError::Conflict("Provisioning already running".to_string()));
        }
        inner.state = JobState::Running;
        inner.log = vec![LogLine {
            at: Local::now(),
            text: seed,
        }];
        Ok(())
    }

    pub async fn append(&self, text: impl Into<String>) {
        self.inner.lock().await.log.push(LogLine {
            at: Local::now(),
            text: text.into(),
        });
    }

    pub async fn append_all(&self, lines: Vec<String>) {
        if lines.is_empty() {
            return;
        }
        let now = Local::now();
        let mut inner = self.inner.lock().await;
        inner
            .log
            .extend(lines.into_iter().map(|text| LogLine { at: now, text }));
    }

    pub async fn finish(&self, state: JobState) {
        self.inner.lock().await.state = state;
    }

    pub async fn state(&self) -> JobState {
        self.inner.lock().await.state
    }

    pub async fn snapshot(&self) -> JobSnapshot {
        let inner = self.inner.lock().await;
        let lines: Vec<String> = inner.log.iter().map(ToString::to_string).collect();
        JobSnapshot {
            state: inner.state,
            log: lines.join("\n"),
            lines,
        }
    }

    pub async fn last_form(&self) -> Option<ProvisionForm> {
        self.inner.lock().await.last_form.clone()
    }

    pub async fn set_last_form(&self, form: ProvisionForm) {
        self.inner.lock().await.last_form = Some(form);
    }
}
