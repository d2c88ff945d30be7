//! Device task: one device's full interaction reduced to one outcome.
//!
//! A [`DeviceTask`] walks `Idle -> Connecting -> Authenticating -> Executing ->
//! Verifying -> Persisting -> Closed`, skipping the states a payload does not
//! need. Every [`ConnectError`] raised on the way is converted into a
//! [`DeviceOutcome`]; nothing escapes [`DeviceTask::run`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::device::{DeviceDescriptor, EMPTY_RESPONSE, Payload, TaskId};
use crate::error::ConnectError;
use crate::executor::CancelSignal;
use crate::session::{DeviceSession, SessionConnector, StepResult};
use crate::templates::{CommandMode, DeviceFamily, Dialect};

/// Terminal status of one device task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    /// At least one statement was rejected, or the command output carried a device error.
    PartialFailure,
    /// Unreachable, refused, or no answer within the connect timeout.
    ConnectFailure,
    AuthFailure,
    /// A command or statement did not complete within the command timeout.
    Timeout,
    /// The run was cancelled before this task started.
    Cancelled,
    /// Anything else the session raised, including a panic inside the task.
    UnexpectedError,
}

impl OutcomeStatus {
    pub const ALL: [OutcomeStatus; 7] = [
        OutcomeStatus::Success,
        OutcomeStatus::PartialFailure,
        OutcomeStatus::ConnectFailure,
        OutcomeStatus::AuthFailure,
        OutcomeStatus::Timeout,
        OutcomeStatus::Cancelled,
        OutcomeStatus::UnexpectedError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::PartialFailure => "partial failure",
            OutcomeStatus::ConnectFailure => "connect failure",
            OutcomeStatus::AuthFailure => "auth failure",
            OutcomeStatus::Timeout => "timeout",
            OutcomeStatus::Cancelled => "cancelled",
            OutcomeStatus::UnexpectedError => "unexpected error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeStatus::Success)
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a task produced besides its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OutcomeDetail {
    /// Command output. Never empty: a silent device yields [`EMPTY_RESPONSE`].
    Output(String),
    /// Configuration steps in payload order, up to and including the first failure.
    Steps(Vec<StepResult>),
    Error(String),
    NotRun { reason: String },
}

/// The single result of one dispatched task. Carries no credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceOutcome {
    pub task_id: TaskId,
    pub host: String,
    pub family: DeviceFamily,
    /// Prompt seen after login, when the session got that far.
    pub prompt: Option<String>,
    pub status: OutcomeStatus,
    pub detail: OutcomeDetail,
    /// Save/commit step. Informational only, it never changes `status`.
    pub persist: Option<StepResult>,
    pub elapsed_ms: u64,
}

impl DeviceOutcome {
    /// Name used in report headers: the device prompt, or the host.
    pub fn label(&self) -> &str {
        self.prompt.as_deref().unwrap_or(&self.host)
    }

    pub fn output(&self) -> Option<&str> {
        match &self.detail {
            OutcomeDetail::Output(output) => Some(output),
            _ => None,
        }
    }

    pub fn steps(&self) -> &[StepResult] {
        match &self.detail {
            OutcomeDetail::Steps(steps) => steps,
            _ => &[],
        }
    }
}

/// Device task state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Connecting,
    /// Session established; the device accepted the credentials.
    Authenticating,
    Executing,
    Verifying,
    Persisting,
    Closed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Idle => "idle",
            TaskState::Connecting => "connecting",
            TaskState::Authenticating => "authenticating",
            TaskState::Executing => "executing",
            TaskState::Verifying => "verifying",
            TaskState::Persisting => "persisting",
            TaskState::Closed => "closed",
        };
        f.write_str(name)
    }
}

struct Execution {
    status: OutcomeStatus,
    detail: OutcomeDetail,
    persist: Option<StepResult>,
}

impl Execution {
    fn new(status: OutcomeStatus, detail: OutcomeDetail) -> Self {
        Self {
            status,
            detail,
            persist: None,
        }
    }
}

/// One device's unit of work.
#[derive(Debug, Clone)]
pub struct DeviceTask {
    pub id: TaskId,
    pub device: Arc<DeviceDescriptor>,
    pub dialect: Arc<Dialect>,
    pub payload: Arc<Payload>,
    /// Issue the dialect's save/commit after a verified configuration run.
    pub persist: bool,
    state: TaskState,
}

impl DeviceTask {
    pub fn new(
        id: TaskId,
        device: Arc<DeviceDescriptor>,
        dialect: Arc<Dialect>,
        payload: Arc<Payload>,
    ) -> Self {
        Self {
            id,
            device,
            dialect,
            payload,
            persist: true,
            state: TaskState::Idle,
        }
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    fn advance(&mut self, next: TaskState) {
        debug!(
            "{} {} {} -> {}",
            self.id,
            self.device.addr(),
            self.state,
            next
        );
        self.state = next;
    }

    fn outcome(&self, started: Instant, prompt: Option<String>, execution: Execution) -> DeviceOutcome {
        DeviceOutcome {
            task_id: self.id,
            host: self.device.host.clone(),
            family: self.device.family,
            prompt,
            status: execution.status,
            detail: execution.detail,
            persist: execution.persist,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Outcome for a task that never opened a session.
    pub fn not_run(&self, reason: impl Into<String>) -> DeviceOutcome {
        self.outcome(
            Instant::now(),
            None,
            Execution::new(
                OutcomeStatus::Cancelled,
                OutcomeDetail::NotRun {
                    reason: reason.into(),
                },
            ),
        )
    }

    /// Outcome for a task whose body panicked or was aborted.
    pub fn crashed(&self, reason: impl Into<String>) -> DeviceOutcome {
        self.outcome(
            Instant::now(),
            None,
            Execution::new(OutcomeStatus::UnexpectedError, OutcomeDetail::Error(reason.into())),
        )
    }

    /// Runs the full device protocol. Always returns exactly one outcome.
    pub async fn run<C: SessionConnector>(
        mut self,
        connector: Arc<C>,
        cancel: CancelSignal,
    ) -> DeviceOutcome {
        let started = Instant::now();

        if cancel.is_cancelled() {
            debug!("{} {} skipped, run cancelled", self.id, self.device.addr());
            return self.not_run("run cancelled before this device started");
        }

        self.advance(TaskState::Connecting);
        let connect_timeout = self.device.transport.connect_timeout;
        let connected = tokio::time::timeout(
            connect_timeout,
            connector.connect(&self.device, &self.dialect),
        )
        .await;

        let mut session = match connected {
            Ok(Ok(session)) => session,
            Ok(Err(err)) => {
                let status = connect_status(&err);
                warn!("{} {} {}: {}", self.id, self.device.addr(), status, err);
                self.advance(TaskState::Closed);
                return self.outcome(
                    started,
                    None,
                    Execution::new(status, OutcomeDetail::Error(err.to_string())),
                );
            }
            Err(_) => {
                warn!(
                    "{} {} no session within {}s",
                    self.id,
                    self.device.addr(),
                    connect_timeout.as_secs()
                );
                self.advance(TaskState::Closed);
                return self.outcome(
                    started,
                    None,
                    Execution::new(
                        OutcomeStatus::ConnectFailure,
                        OutcomeDetail::Error(format!(
                            "connect timed out after {}s",
                            connect_timeout.as_secs()
                        )),
                    ),
                );
            }
        };

        self.advance(TaskState::Authenticating);
        let prompt = session.prompt().map(str::to_string);

        self.advance(TaskState::Executing);
        let payload = Arc::clone(&self.payload);
        let execution = match payload.as_ref() {
            Payload::Command { command } => self.run_command(&mut session, command).await,
            Payload::Config { statements } => self.run_config(&mut session, statements).await,
        };

        if let Err(err) = session.close().await {
            debug!("{} {} close failed: {}", self.id, self.device.addr(), err);
        }
        self.advance(TaskState::Closed);

        if !execution.status.is_success() {
            warn!("{} {} {}", self.id, self.device.addr(), execution.status);
        }
        self.outcome(started, prompt, execution)
    }

    async fn run_command<S: DeviceSession>(&mut self, session: &mut S, command: &str) -> Execution {
        let command_timeout = self.device.transport.command_timeout;
        let reply = match tokio::time::timeout(command_timeout, session.send_command(command)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => return Execution::new(exec_status(&err), OutcomeDetail::Error(err.to_string())),
            Err(_) => {
                return Execution::new(
                    OutcomeStatus::Timeout,
                    OutcomeDetail::Error(no_response(command, command_timeout)),
                );
            }
        };

        self.advance(TaskState::Verifying);
        if reply.failed {
            return Execution::new(OutcomeStatus::PartialFailure, OutcomeDetail::Steps(vec![reply]));
        }
        let output = if reply.output.trim().is_empty() {
            EMPTY_RESPONSE.to_string()
        } else {
            reply.output
        };
        Execution::new(OutcomeStatus::Success, OutcomeDetail::Output(output))
    }

    /// Sends statements in order and stops at the first rejection.
    ///
    /// A session error or a statement that gets no reply within the command
    /// timeout counts as a rejection of that statement, so the outcome is a
    /// `PartialFailure` whose last step carries the error text. Command payloads
    /// report the same errors as `Timeout` or `UnexpectedError` instead.
    async fn run_config<S: DeviceSession>(
        &mut self,
        session: &mut S,
        statements: &[String],
    ) -> Execution {
        let command_timeout = self.device.transport.command_timeout;
        let mut steps: Vec<StepResult> = Vec::with_capacity(statements.len());

        for statement in statements {
            let step = match tokio::time::timeout(command_timeout, session.send_config(statement)).await
            {
                Ok(Ok(step)) => step,
                Ok(Err(err)) => StepResult::failed(statement.as_str(), err.to_string()),
                Err(_) => StepResult::failed(statement.as_str(), no_response(statement, command_timeout)),
            };
            let failed = step.failed;
            steps.push(step);
            if failed {
                warn!(
                    "{} {} rejected '{}', {} statements not sent",
                    self.id,
                    self.device.addr(),
                    statement,
                    statements.len() - steps.len()
                );
                break;
            }
        }

        self.advance(TaskState::Verifying);
        let verified = steps.len() == statements.len() && steps.iter().all(|step| !step.failed);
        if !verified {
            return Execution::new(OutcomeStatus::PartialFailure, OutcomeDetail::Steps(steps));
        }

        let mut execution = Execution::new(OutcomeStatus::Success, OutcomeDetail::Steps(steps));
        if self.persist {
            self.advance(TaskState::Persisting);
            execution.persist = Some(self.save(session, command_timeout).await);
        }
        execution
    }

    async fn save<S: DeviceSession>(&self, session: &mut S, command_timeout: Duration) -> StepResult {
        let save = &self.dialect.persist;
        info!("{} {} Saving configuration ...", self.id, self.device.addr());

        let sent = match save.mode {
            CommandMode::Exec => {
                tokio::time::timeout(command_timeout, session.send_command(&save.command)).await
            }
            CommandMode::Config => {
                tokio::time::timeout(command_timeout, session.send_config(&save.command)).await
            }
        };
        let step = match sent {
            Ok(Ok(step)) => step,
            Ok(Err(err)) => StepResult::failed(save.command.as_str(), err.to_string()),
            Err(_) => StepResult::failed(save.command.as_str(), no_response(&save.command, command_timeout)),
        };
        if step.failed {
            warn!(
                "{} {} '{}' failed, running configuration is applied but not saved",
                self.id,
                self.device.addr(),
                save.command
            );
        }
        step
    }
}

fn no_response(input: &str, timeout: Duration) -> String {
    format!("no response to '{}' within {}s", input, timeout.as_secs())
}

fn connect_status(err: &ConnectError) -> OutcomeStatus {
    if err.is_auth_failure() {
        return OutcomeStatus::AuthFailure;
    }
    match err {
        ConnectError::InvalidDialect(_) => OutcomeStatus::UnexpectedError,
        _ => OutcomeStatus::ConnectFailure,
    }
}

fn exec_status(err: &ConnectError) -> OutcomeStatus {
    match err {
        ConnectError::ExecTimeout(_) => OutcomeStatus::Timeout,
        _ => OutcomeStatus::UnexpectedError,
    }
}
