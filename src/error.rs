//! Error types for device sessions and fleet dispatch.
//!
//! [`ConnectError`] covers everything a single device session can report. It never
//! crosses a device task boundary: the task converts it into a
//! [`DeviceOutcome`](crate::task::DeviceOutcome). [`DispatchError`] is the fatal,
//! pre-run class returned to the caller before any device is contacted.

use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::mpsc::error::SendError;

/// Errors that can occur while talking to one device.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The connect/authenticate phase did not finish within the per-task bound.
    #[error("connect timed out after {0}s")]
    ConnectTimeout(u64),

    /// The device could not be reached (refused, unreachable, DNS failure...).
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// The device rejected the supplied credentials.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The SSH channel was disconnected while waiting for a prompt.
    ///
    /// This typically happens when the remote device closes the connection
    /// unexpectedly during initialization or command execution.
    #[error("channel disconnect on wait prompt")]
    ChannelDisconnectError,

    /// The session has already been closed.
    #[error("connect closed")]
    ConnectClosedError,

    /// Command execution timed out.
    ///
    /// The error contains the partial output received before the timeout.
    #[error("exec command timeout: {0}")]
    ExecTimeout(String),

    /// A dialect pattern failed to compile.
    #[error("invalid dialect: {0}")]
    InvalidDialect(String),

    /// An error occurred in the async-ssh2-tokio library.
    #[error("async ssh2 error: {0}")]
    Ssh2Error(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),

    /// Failed to send data through the channel.
    #[error("Failed to send data: {0}")]
    SendDataError(#[from] SendError<String>),
}

impl ConnectError {
    /// Returns true when the device rejected the credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ConnectError::AuthFailed(_)
                | ConnectError::Ssh2Error(async_ssh2_tokio::Error::PasswordWrong)
                | ConnectError::Ssh2Error(async_ssh2_tokio::Error::KeyAuthFailed)
        )
    }
}

/// Fatal precondition failures. When one of these is returned no device was contacted.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("no device inputs passed")]
    NoDevices,

    #[error("payload is empty: {0}")]
    EmptyPayload(String),

    #[error("configuration file not found: {}", .0.display())]
    ConfigFileNotFound(PathBuf),

    #[error("unknown device family '{0}', choose from ios, nxos, junos, iosxr, eos")]
    UnknownDeviceFamily(String),

    /// The registry in use has no dialect for a family some device needs.
    #[error("no dialect registered for device family '{0}'")]
    DialectMissing(String),

    #[error("invalid dispatch config: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
