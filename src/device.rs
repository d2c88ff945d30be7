//! Device descriptors and run payloads.
//!
//! A [`DeviceDescriptor`] is built once from collaborator input and never mutated;
//! the executor shares it behind an `Arc`. Credentials never appear in `Debug`
//! output. When logs need to tell credential sets apart they use
//! [`Credentials::fingerprint`], a truncated SHA-256 of the secret.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::session::ConnectionSecurityOptions;
use crate::templates::{DeviceFamily, Dialect};

/// Identity of one dispatched task: the device's position in the input set.
///
/// Duplicate host entries are legal and each gets its own id, so outcomes are
/// keyed by this rather than by host string.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Authentication secret.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Secret {
    Password(String),
    KeyFile {
        path: PathBuf,
        #[serde(default)]
        passphrase: Option<String>,
    },
}

/// Username plus secret for one device.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub secret: Secret,
}

impl Credentials {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: Secret::Password(password.into()),
        }
    }

    pub fn key_file(
        username: impl Into<String>,
        path: impl Into<PathBuf>,
        passphrase: Option<String>,
    ) -> Self {
        Self {
            username: username.into(),
            secret: Secret::KeyFile {
                path: path.into(),
                passphrase,
            },
        }
    }

    /// Short hex digest of username and secret, safe to log.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.username.as_bytes());
        hasher.update([0u8]);
        match &self.secret {
            Secret::Password(password) => hasher.update(password.as_bytes()),
            Secret::KeyFile { path, passphrase } => {
                hasher.update(path.to_string_lossy().as_bytes());
                if let Some(passphrase) = passphrase {
                    hasher.update(passphrase.as_bytes());
                }
            }
        }
        let digest: [u8; 32] = hasher.finalize().into();
        digest[..6].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.secret {
            Secret::Password(_) => "password",
            Secret::KeyFile { .. } => "key_file",
        };
        f.debug_struct("Credentials")
            .field("fingerprint", &self.fingerprint())
            .field("secret", &format_args!("<{kind} redacted>"))
            .finish()
    }
}

/// Per-device transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    pub port: u16,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub security: ConnectionSecurityOptions,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

impl TransportOptions {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            port: config.port,
            connect_timeout: config.connect_timeout(),
            command_timeout: config.command_timeout(),
            security: config.security_options(),
        }
    }
}

/// One target device.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub host: String,
    pub credentials: Credentials,
    pub family: DeviceFamily,
    pub transport: TransportOptions,
}

impl DeviceDescriptor {
    pub fn new(
        host: impl Into<String>,
        credentials: Credentials,
        family: DeviceFamily,
        transport: TransportOptions,
    ) -> Self {
        Self {
            host: host.into(),
            credentials,
            family,
            transport,
        }
    }

    /// Builds one descriptor per host, all sharing the same credentials and family.
    pub fn fleet<I, S>(
        hosts: I,
        credentials: &Credentials,
        family: DeviceFamily,
        transport: &TransportOptions,
    ) -> Vec<DeviceDescriptor>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        hosts
            .into_iter()
            .map(|host| DeviceDescriptor::new(host, credentials.clone(), family, transport.clone()))
            .collect()
    }

    /// `host:port`, as used in log lines. Carries no part of the credentials.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.transport.port)
    }
}

/// Marker used in place of empty command output.
pub const EMPTY_RESPONSE: &str = "empty response";

/// What to run on every device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Single read-only command.
    Command { command: String },
    /// Ordered configuration statements.
    Config { statements: Vec<String> },
}

impl Payload {
    pub fn command(command: impl Into<String>) -> Result<Self, DispatchError> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(DispatchError::EmptyPayload("command is blank".to_string()));
        }
        Ok(Payload::Command { command })
    }

    pub fn config<I, S>(statements: I) -> Result<Self, DispatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let statements: Vec<String> = statements.into_iter().map(Into::into).collect();
        if statements.is_empty() {
            return Err(DispatchError::EmptyPayload(
                "no configuration statements".to_string(),
            ));
        }
        Ok(Payload::Config { statements })
    }

    /// Re-checks a payload that did not come through the constructors (e.g. deserialized).
    pub fn validate(&self) -> Result<(), DispatchError> {
        match self {
            Payload::Command { command } if command.trim().is_empty() => {
                Err(DispatchError::EmptyPayload("command is blank".to_string()))
            }
            Payload::Config { statements } if statements.is_empty() => Err(
                DispatchError::EmptyPayload("no configuration statements".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Parses configuration text: one statement per line, blank lines skipped.
    pub fn config_from_str(text: &str) -> Result<Self, DispatchError> {
        Self::config(
            text.lines()
                .map(|line| line.trim_end())
                .filter(|line| !line.trim().is_empty()),
        )
    }

    /// Reads a configuration file. A missing file is a fatal precondition error.
    pub fn config_from_file(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DispatchError::ConfigFileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::config_from_str(&text)
    }

    /// Appends the dialect's no-op statement unless it is already the last one.
    pub fn with_noop_terminator(self, dialect: &Dialect) -> Self {
        match (self, dialect.noop_statement.as_deref()) {
            (Payload::Config { mut statements }, Some(noop)) => {
                if statements.last().map(|s| s.trim()) != Some(noop) {
                    statements.push(noop.to_string());
                }
                Payload::Config { statements }
            }
            (payload, _) => payload,
        }
    }

    /// Short label used in report headers.
    pub fn label(&self) -> String {
        match self {
            Payload::Command { command } => command.clone(),
            Payload::Config { statements } => format!("{} config statements", statements.len()),
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Payload::Config { .. })
    }
}

/// Parses a host list: one host per line, blank lines and `#` comments skipped.
pub fn parse_host_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Reads a host list file.
pub fn load_host_list(path: impl AsRef<Path>) -> Result<Vec<String>, DispatchError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(DispatchError::ConfigFileNotFound(path.to_path_buf()));
    }
    Ok(parse_host_list(&std::fs::read_to_string(path)?))
}
