//! Device-family dialects.
//!
//! Each supported network operating system maps to a [`Dialect`]: the prompt and
//! error patterns a session needs to drive the CLI, the commands that move in and
//! out of configuration mode, and the family's save/commit command. Dialects live
//! in a [`DialectRegistry`] so callers can override or extend the built-in table
//! without touching the task or executor code.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Built-in family names accepted by [`DeviceFamily::from_str`].
pub const BUILTIN_FAMILIES: &[&str] = &["ios", "nxos", "junos", "iosxr", "eos"];

/// Network operating system dialect selector.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFamily {
    Ios,
    Nxos,
    Junos,
    Iosxr,
    Eos,
}

impl DeviceFamily {
    pub const ALL: [DeviceFamily; 5] = [
        DeviceFamily::Ios,
        DeviceFamily::Nxos,
        DeviceFamily::Junos,
        DeviceFamily::Iosxr,
        DeviceFamily::Eos,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceFamily::Ios => "ios",
            DeviceFamily::Nxos => "nxos",
            DeviceFamily::Junos => "junos",
            DeviceFamily::Iosxr => "iosxr",
            DeviceFamily::Eos => "eos",
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceFamily {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ios" => Ok(DeviceFamily::Ios),
            "nxos" => Ok(DeviceFamily::Nxos),
            "junos" => Ok(DeviceFamily::Junos),
            "iosxr" => Ok(DeviceFamily::Iosxr),
            "eos" => Ok(DeviceFamily::Eos),
            _ => Err(DispatchError::UnknownDeviceFamily(s.to_string())),
        }
    }
}

/// CLI context a command is issued from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommandMode {
    Exec,
    Config,
}

/// Save/commit step issued after a verified configuration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PersistCommand {
    pub command: String,
    pub mode: CommandMode,
}

/// An interactive question the device may ask, and the answer to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Confirmation {
    pub pattern: String,
    pub answer: String,
}

/// Command syntax adapter for one device family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Dialect {
    pub family: DeviceFamily,
    pub vendor: String,
    pub platform: String,
    /// Prompt regexes for exec and configuration contexts.
    pub prompt_patterns: Vec<String>,
    /// Output lines matching any of these mark the command as rejected.
    pub error_patterns: Vec<String>,
    /// Pagination markers answered with a space.
    pub more_patterns: Vec<String>,
    pub confirmations: Vec<Confirmation>,
    /// Sent once right after login.
    pub disable_paging: Option<String>,
    pub config_enter: String,
    pub config_exit: String,
    /// Statement the device accepts and ignores, used as a payload terminator.
    pub noop_statement: Option<String>,
    pub persist: PersistCommand,
}

fn strings(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

fn confirm(pattern: &str, answer: &str) -> Confirmation {
    Confirmation {
        pattern: pattern.to_string(),
        answer: answer.to_string(),
    }
}

/// Returns the dialect for Cisco IOS / IOS-XE.
pub fn ios() -> Dialect {
    Dialect {
        family: DeviceFamily::Ios,
        vendor: "Cisco".to_string(),
        platform: "IOS/IOS-XE".to_string(),
        prompt_patterns: strings(&[
            r"^[\w.\-@/:]{1,63}\(conf[\w.\-@/:+]{0,63}\)#\s*$",
            r"^[\w.\-@/:]{1,63}[>#]\s*$",
        ]),
        error_patterns: strings(&[
            r"^% Invalid input",
            r"^% Incomplete command",
            r"^% Ambiguous command",
            r"^% Unknown command",
            r"^%\s*Error",
            r"^Command authorization failed.*",
            r"^Command rejected:.*",
        ]),
        more_patterns: strings(&[r"\s*--More--\s*"]),
        confirmations: vec![confirm(r"Destination filename \[\S+\]\?\s*$", "\n")],
        disable_paging: Some("terminal length 0".to_string()),
        config_enter: "configure terminal".to_string(),
        config_exit: "end".to_string(),
        noop_statement: Some("!".to_string()),
        persist: PersistCommand {
            command: "copy running-config startup-config".to_string(),
            mode: CommandMode::Exec,
        },
    }
}

/// Returns the dialect for Cisco NX-OS.
pub fn nxos() -> Dialect {
    Dialect {
        family: DeviceFamily::Nxos,
        vendor: "Cisco".to_string(),
        platform: "NX-OS".to_string(),
        prompt_patterns: strings(&[
            r"^[\w.\-]{1,63}\(config[\w.\-@/:+]{0,32}\)#\s?$",
            r"^[\w.\-]{1,63}#\s?$",
        ]),
        error_patterns: strings(&[
            r"^% Invalid",
            r"^% Incomplete",
            r"^% Ambiguous",
            r"^Syntax error while parsing",
            r"^% Permission denied",
        ]),
        more_patterns: strings(&[r"\s*--More--\s*"]),
        confirmations: vec![],
        disable_paging: Some("terminal length 0".to_string()),
        config_enter: "configure terminal".to_string(),
        config_exit: "end".to_string(),
        noop_statement: Some("!".to_string()),
        persist: PersistCommand {
            command: "copy running-config startup-config".to_string(),
            mode: CommandMode::Exec,
        },
    }
}

/// Returns the dialect for Juniper JunOS.
pub fn junos() -> Dialect {
    Dialect {
        family: DeviceFamily::Junos,
        vendor: "Juniper".to_string(),
        platform: "JunOS".to_string(),
        prompt_patterns: strings(&[r"^\S+@\S+#\s*$", r"^\S+@\S+>\s*$"]),
        error_patterns: strings(&[
            r".*unknown command.*",
            r"^syntax error.*",
            r"^error:.+",
            r"^invalid value .+",
            r"^invalid ip address .+",
            r".*invalid prefix length .+",
        ]),
        more_patterns: strings(&[r"---\(more.*\)---"]),
        confirmations: vec![confirm(
            r"Exit with uncommitted changes\? \[yes,no\] \(yes\) ",
            "yes\n",
        )],
        disable_paging: Some("set cli screen-length 0".to_string()),
        config_enter: "configure".to_string(),
        config_exit: "exit configuration-mode".to_string(),
        noop_statement: None,
        persist: PersistCommand {
            command: "commit".to_string(),
            mode: CommandMode::Config,
        },
    }
}

/// Returns the dialect for Cisco IOS-XR.
pub fn iosxr() -> Dialect {
    Dialect {
        family: DeviceFamily::Iosxr,
        vendor: "Cisco".to_string(),
        platform: "IOS-XR".to_string(),
        prompt_patterns: strings(&[
            r"^(RP/\d+/\w+/CPU\d+:)?[\w.\-]{1,63}\(config[\w.\-@/:+]{0,32}\)#\s?$",
            r"^(RP/\d+/\w+/CPU\d+:)?[\w.\-]{1,63}[>#]\s?$",
        ]),
        error_patterns: strings(&[
            r"^% Invalid input",
            r"^% Incomplete command",
            r"^% Ambiguous command",
            r"^% Failed to commit",
            r"^% This command is not authorized",
        ]),
        more_patterns: strings(&[r"\s*--More--\s*"]),
        confirmations: vec![confirm(
            r"Uncommitted changes found, commit them before exiting\(yes/no/cancel\)\?\s*\[cancel\]:\s*$",
            "no\n",
        )],
        disable_paging: Some("terminal length 0".to_string()),
        config_enter: "configure terminal".to_string(),
        config_exit: "end".to_string(),
        noop_statement: Some("!".to_string()),
        persist: PersistCommand {
            command: "commit".to_string(),
            mode: CommandMode::Config,
        },
    }
}

/// Returns the dialect for Arista EOS.
pub fn eos() -> Dialect {
    Dialect {
        family: DeviceFamily::Eos,
        vendor: "Arista".to_string(),
        platform: "EOS".to_string(),
        prompt_patterns: strings(&[
            r"^[\w.\-@()/: ]{1,63}\(config[\w.\-@/:+]{0,63}\)#\s?$",
            r"^[\w.\-@()/: ]{1,63}[>#]\s?$",
        ]),
        error_patterns: strings(&[
            r"^% Invalid input",
            r"^% Incomplete command",
            r"^% Ambiguous command",
            r"^% Unrecognized command",
            r"^% Error",
        ]),
        more_patterns: strings(&[r"\s*--More--\s*"]),
        confirmations: vec![],
        disable_paging: Some("terminal length 0".to_string()),
        config_enter: "configure terminal".to_string(),
        config_exit: "end".to_string(),
        noop_statement: Some("!".to_string()),
        persist: PersistCommand {
            command: "copy running-config startup-config".to_string(),
            mode: CommandMode::Exec,
        },
    }
}

/// Creates a built-in dialect by family.
pub fn by_family(family: DeviceFamily) -> Dialect {
    match family {
        DeviceFamily::Ios => ios(),
        DeviceFamily::Nxos => nxos(),
        DeviceFamily::Junos => junos(),
        DeviceFamily::Iosxr => iosxr(),
        DeviceFamily::Eos => eos(),
    }
}

/// Creates a built-in dialect by name (case-insensitive).
pub fn by_name(name: &str) -> Result<Dialect, DispatchError> {
    Ok(by_family(name.parse()?))
}

static BUILTIN_DIALECTS: Lazy<HashMap<DeviceFamily, Dialect>> = Lazy::new(|| {
    DeviceFamily::ALL
        .iter()
        .map(|family| (*family, by_family(*family)))
        .collect()
});

/// Family-to-dialect lookup table used by a run.
#[derive(Debug, Clone)]
pub struct DialectRegistry {
    dialects: HashMap<DeviceFamily, Dialect>,
}

impl DialectRegistry {
    /// Registry holding the built-in dialect of every family.
    pub fn builtin() -> Self {
        Self {
            dialects: BUILTIN_DIALECTS.clone(),
        }
    }

    /// Registry with no dialects; callers register what they need.
    pub fn empty() -> Self {
        Self {
            dialects: HashMap::new(),
        }
    }

    /// Registers (or replaces) the dialect for its family.
    pub fn register(&mut self, dialect: Dialect) -> Option<Dialect> {
        self.dialects.insert(dialect.family, dialect)
    }

    pub fn get(&self, family: DeviceFamily) -> Option<&Dialect> {
        self.dialects.get(&family)
    }

    /// Like [`get`](Self::get) but reports a missing entry as a dispatch error.
    pub fn require(&self, family: DeviceFamily) -> Result<&Dialect, DispatchError> {
        self.get(family)
            .ok_or_else(|| DispatchError::DialectMissing(family.to_string()))
    }
}

impl Default for DialectRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Metadata for a built-in dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateMetadata {
    pub family: DeviceFamily,
    pub vendor: String,
    pub platform: String,
    pub save_command: String,
    pub save_mode: CommandMode,
}

impl From<&Dialect> for TemplateMetadata {
    fn from(dialect: &Dialect) -> Self {
        Self {
            family: dialect.family,
            vendor: dialect.vendor.clone(),
            platform: dialect.platform.clone(),
            save_command: dialect.persist.command.clone(),
            save_mode: dialect.persist.mode,
        }
    }
}

/// Returns metadata for all built-in dialects, in [`BUILTIN_FAMILIES`] order.
pub fn catalog() -> Vec<TemplateMetadata> {
    DeviceFamily::ALL
        .iter()
        .filter_map(|family| BUILTIN_DIALECTS.get(family))
        .map(TemplateMetadata::from)
        .collect()
}

/// Exports the catalog as pretty JSON.
pub fn catalog_json() -> Result<String, DispatchError> {
    Ok(serde_json::to_string_pretty(&catalog())?)
}
