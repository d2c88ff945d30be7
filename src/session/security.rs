use super::*;

/// Security level used for SSH algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// Strict modern algorithms (default).
    Secure,
    /// Adds CBC ciphers, SHA-1 MACs and group-exchange kex common on switch firmware.
    Balanced,
    /// Everything russh can negotiate; host keys are not checked.
    LegacyCompatible,
}

impl SecurityLevel {
    fn profile(self) -> config::AlgorithmProfile {
        match self {
            SecurityLevel::Secure => config::SECURE_PROFILE,
            SecurityLevel::Balanced => config::BALANCED_PROFILE,
            SecurityLevel::LegacyCompatible => config::LEGACY_PROFILE,
        }
    }

    /// russh algorithm preferences for this level.
    pub(super) fn preferred(self) -> Preferred {
        let profile = self.profile();
        Preferred {
            kex: Cow::Borrowed(profile.kex),
            key: Cow::Borrowed(profile.key),
            cipher: Cow::Borrowed(profile.cipher),
            mac: Cow::Borrowed(profile.mac),
            compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
        }
    }
}

/// Algorithm policy plus host key verification for device connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSecurityOptions {
    pub level: SecurityLevel,
    pub server_check: ServerCheckMethod,
}

impl Default for ConnectionSecurityOptions {
    fn default() -> Self {
        Self::for_level(SecurityLevel::Secure)
    }
}

impl ConnectionSecurityOptions {
    /// Legacy devices are rarely in anyone's known_hosts, so that level skips the check.
    pub fn for_level(level: SecurityLevel) -> Self {
        let server_check = match level {
            SecurityLevel::LegacyCompatible => ServerCheckMethod::NoCheck,
            SecurityLevel::Secure | SecurityLevel::Balanced => {
                ServerCheckMethod::DefaultKnownHostsFile
            }
        };
        Self {
            level,
            server_check,
        }
    }

    /// Verifies host keys against a specific known_hosts file.
    pub fn with_known_hosts_file(mut self, path: impl Into<String>) -> Self {
        self.server_check = ServerCheckMethod::KnownHostsFile(path.into());
        self
    }

    /// Accepts any host key while keeping the algorithm policy.
    pub fn without_host_key_check(mut self) -> Self {
        self.server_check = ServerCheckMethod::NoCheck;
        self
    }

    pub(super) fn ssh_config(&self, inactivity_timeout: Duration) -> Config {
        Config {
            preferred: self.level.preferred(),
            inactivity_timeout: Some(inactivity_timeout),
            ..Default::default()
        }
    }
}
