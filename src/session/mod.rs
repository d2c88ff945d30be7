//! Device session clients.
//!
//! The device task only ever talks to a device through [`SessionConnector`] and
//! [`DeviceSession`]. Two implementations ship with the crate:
//!
//! - [`SshConnector`] - interactive PTY shell over SSH, driven by the family
//!   [`Dialect`] prompt and error patterns
//! - [`ScriptedConnector`] - replays per-host scripts in memory, for dry runs and tests
//!
//! # Main Components
//!
//! - [`StepResult`] - one statement or command with its output and failure flag
//! - [`PromptMatcher`] - compiled dialect patterns
//! - [`ShellReader`] - splits shell output into lines and spots prompts, pagination and confirmations
//! - [`ConnectionSecurityOptions`] - SSH algorithm policy and host key checking

use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_ssh2_tokio::client::{AuthMethod, Client};
use async_ssh2_tokio::{Config, ServerCheckMethod};
use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use russh::{ChannelMsg, Preferred};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;

use crate::config;
use crate::device::{DeviceDescriptor, Secret};
use crate::error::{ConnectError, DispatchError};
use crate::templates::Dialect;

pub use prompt::PromptMatcher;
pub use reader::{ReadAction, ShellReader, step_result};
pub use replay::{ConnectBehavior, HostScript, ScriptedConnector, ScriptedSession, SentLine};
pub use security::{ConnectionSecurityOptions, SecurityLevel};
pub use ssh::{SshConnector, SshSession};

/// Outcome of one executed statement or command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StepResult {
    /// Exact text that was sent.
    pub input: String,
    /// Device output with the echo and trailing prompt removed.
    pub output: String,
    /// True when the device rejected the input.
    pub failed: bool,
}

impl StepResult {
    pub fn ok(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            failed: false,
        }
    }

    pub fn failed(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            failed: true,
        }
    }
}

/// Opens sessions. One connector is shared by every task of a run.
pub trait SessionConnector: Send + Sync + 'static {
    type Session: DeviceSession;

    /// Connects and authenticates. The device task bounds this with the
    /// device's connect timeout.
    fn connect(
        &self,
        device: &DeviceDescriptor,
        dialect: &Dialect,
    ) -> impl Future<Output = Result<Self::Session, ConnectError>> + Send;
}

/// An open, authenticated session to one device.
pub trait DeviceSession: Send + 'static {
    /// Prompt seen after login, e.g. `router1#`.
    fn prompt(&self) -> Option<&str>;

    /// Runs a command from exec context.
    fn send_command(
        &mut self,
        command: &str,
    ) -> impl Future<Output = Result<StepResult, ConnectError>> + Send;

    /// Sends one configuration statement, entering config context first if needed.
    fn send_config(
        &mut self,
        statement: &str,
    ) -> impl Future<Output = Result<StepResult, ConnectError>> + Send;

    /// Releases the session.
    fn close(self) -> impl Future<Output = Result<(), ConnectError>> + Send;
}

mod prompt;
mod reader;
mod replay;
mod security;
mod ssh;
