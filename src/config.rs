//! Run-wide configuration and SSH algorithm profiles.
//!
//! [`DispatchConfig`] holds the knobs a fleet run needs (concurrency ceiling,
//! timeouts, persistence). The algorithm tables below back the three
//! [`SecurityLevel`] profiles: the secure list carries modern algorithms only,
//! the legacy list keeps every algorithm russh can speak so that old network
//! gear still negotiates.

use std::path::Path;
use std::time::Duration;

use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{cipher, compression, kex, mac};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::session::{ConnectionSecurityOptions, SecurityLevel};

/// Concurrency ceiling used when the caller does not supply one.
pub const DEFAULT_CONCURRENCY: usize = 40;

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Bound on connect + authenticate + first prompt, per device.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Bound on a single command or statement round-trip.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;

/// Settings for one fleet run.
///
/// The default `security` level is `Secure`, which checks every host key
/// against `~/.ssh/known_hosts`. Devices missing from that file fail with
/// `ConnectFailure`. Lab fleets that have never been connected to need
/// `SecurityLevel::LegacyCompatible`, which skips the host key check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum number of device sessions active at any instant.
    pub concurrency: usize,
    /// SSH port used for every device without an explicit override.
    pub port: u16,
    /// Connect/authenticate bound in seconds.
    pub connect_timeout_secs: u64,
    /// Per command/statement bound in seconds.
    pub command_timeout_secs: u64,
    /// SSH algorithm policy. Also decides host key checking, see the type docs.
    pub security: SecurityLevel,
    /// Issue the family save/commit command after a verified configuration run.
    pub persist: bool,
    /// Append the family no-op statement to configuration payloads.
    pub append_noop_terminator: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            port: DEFAULT_PORT,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            security: SecurityLevel::Secure,
            persist: true,
            append_noop_terminator: false,
        }
    }
}

impl DispatchConfig {
    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, DispatchError> {
        let config: DispatchConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DispatchError::ConfigFileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.concurrency == 0 {
            return Err(DispatchError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 || self.command_timeout_secs == 0 {
            return Err(DispatchError::InvalidConfig(
                "timeouts must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Security options matching the configured level.
    pub fn security_options(&self) -> ConnectionSecurityOptions {
        ConnectionSecurityOptions::for_level(self.security)
    }
}

/// Algorithm lists negotiated for one [`SecurityLevel`].
#[derive(Debug, Clone, Copy)]
pub struct AlgorithmProfile {
    pub kex: &'static [kex::Name],
    pub key: &'static [Algorithm],
    pub cipher: &'static [cipher::Name],
    pub mac: &'static [mac::Name],
}

pub const SECURE_PROFILE: AlgorithmProfile = AlgorithmProfile {
    kex: SECURE_KEX_ORDER,
    key: SECURE_KEY_TYPES,
    cipher: SECURE_CIPHERS,
    mac: SECURE_MAC_ALGORITHMS,
};

pub const BALANCED_PROFILE: AlgorithmProfile = AlgorithmProfile {
    kex: BALANCED_KEX_ORDER,
    key: BALANCED_KEY_TYPES,
    cipher: BALANCED_CIPHERS,
    mac: BALANCED_MAC_ALGORITHMS,
};

pub const LEGACY_PROFILE: AlgorithmProfile = AlgorithmProfile {
    kex: LEGACY_KEX_ORDER,
    key: LEGACY_KEY_TYPES,
    cipher: LEGACY_CIPHERS,
    mac: LEGACY_MAC_ALGORITHMS,
};

/// Modern key exchange algorithms only.
pub const SECURE_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA256,
];

/// Secure set plus SHA-1 group exchange still common on switch firmware.
pub const BALANCED_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA256,
    kex::DH_GEX_SHA256,
    kex::DH_G14_SHA1,
];

/// Every key exchange algorithm, including the ones without forward secrecy.
pub const LEGACY_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_GEX_SHA1,
    kex::DH_GEX_SHA256,
    kex::DH_G1_SHA1,
    kex::DH_G14_SHA1,
    kex::DH_G14_SHA256,
    kex::DH_G15_SHA512,
    kex::DH_G16_SHA512,
    kex::DH_G17_SHA512,
    kex::DH_G18_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::NONE,
];

pub const SECURE_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
];

pub const BALANCED_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
    cipher::AES_256_CBC,
    cipher::AES_192_CBC,
    cipher::AES_128_CBC,
];

pub const LEGACY_CIPHERS: &[cipher::Name] = &[
    cipher::CLEAR,
    cipher::NONE,
    cipher::AES_128_CTR,
    cipher::AES_192_CTR,
    cipher::AES_256_CTR,
    cipher::AES_256_GCM,
    cipher::AES_128_CBC,
    cipher::AES_192_CBC,
    cipher::AES_256_CBC,
    cipher::CHACHA20_POLY1305,
];

pub const SECURE_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
];

pub const BALANCED_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA1,
];

pub const LEGACY_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::NONE,
    mac::HMAC_SHA1,
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
];

pub const DEFAULT_COMPRESSION_ALGORITHMS: &[compression::Name] = &[
    compression::NONE,
    compression::ZLIB,
    compression::ZLIB_LEGACY,
];

pub const SECURE_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
];

pub const BALANCED_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa { hash: None },
];

/// Includes DSA and SHA-1 RSA for compatibility with older devices.
pub const LEGACY_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Dsa,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Ed25519,
    Algorithm::Rsa { hash: None },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
];
