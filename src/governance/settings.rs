//! Process-wide governance flags.
//!
//! `GOVERNANCE_BYPASS` and `GOVERNANCE_VERSION` are read through a
//! [`ConfigProvider`] on every call, never cached, so an operator can toggle
//! bypass on a live process. Tests inject a [`StaticConfigProvider`] instead of
//! mutating the environment.

use std::sync::{Arc, RwLock};

use super::error::{GovernanceError, GovernanceResult};

pub const BYPASS_ENV: &str = "GOVERNANCE_BYPASS";
pub const VERSION_ENV: &str = "GOVERNANCE_VERSION";
pub const WRITE_ENABLED_ENV: &str = "HAKGAL_WRITE_ENABLED";
pub const WRITE_TOKEN_ENV: &str = "HAKGAL_WRITE_TOKEN";

/// The only rule-engine variant implemented.
pub const SUPPORTED_VERSION: &str = "v3";

/// `true`, `1`, `yes`, `on` (any case).
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Snapshot of the process-wide flags for one governed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernanceConfig {
    /// Emergency bypass for every fact of the call.
    pub bypass: bool,
    /// Effective rule-engine version (always [`SUPPORTED_VERSION`]).
    pub version: String,
    /// What the environment asked for, when it differs from the effective one.
    pub requested_version: Option<String>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            bypass: false,
            version: SUPPORTED_VERSION.into(),
            requested_version: None,
        }
    }
}

impl GovernanceConfig {
    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    /// Build from a variable lookup (the environment, or a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let bypass = lookup(BYPASS_ENV).is_some_and(|v| is_truthy(&v));
        let requested_version = lookup(VERSION_ENV)
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty() && v != SUPPORTED_VERSION);
        if let Some(requested) = &requested_version {
            tracing::warn!(
                requested = %requested,
                using = SUPPORTED_VERSION,
                "unsupported GOVERNANCE_VERSION, falling back"
            );
        }
        Self {
            bypass,
            version: SUPPORTED_VERSION.into(),
            requested_version,
        }
    }
}

/// Supplies the current [`GovernanceConfig`]; called once per governed batch.
pub trait ConfigProvider: Send + Sync {
    fn current(&self) -> GovernanceConfig;
}

/// Reads the process environment on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigProvider;

impl ConfigProvider for EnvConfigProvider {
    fn current(&self) -> GovernanceConfig {
        GovernanceConfig::from_lookup(|key| std::env::var(key).ok())
    }
}

/// A settable in-memory config. Clones share state, so a test can keep one
/// handle and flip bypass while the engine holds the other.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    inner: Arc<RwLock<GovernanceConfig>>,
}

impl StaticConfigProvider {
    pub fn new(config: GovernanceConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn set(&self, config: GovernanceConfig) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = config;
    }

    pub fn set_bypass(&self, bypass: bool) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.bypass = bypass;
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn current(&self) -> GovernanceConfig {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

// ---------------------------------------------------------------------------
// Write access
// ---------------------------------------------------------------------------

/// Transport-level guard for write-capable commands.
///
/// Sits in front of the engine; the governance core never consults it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAccess {
    pub enabled: bool,
    pub token: Option<String>,
}

impl WriteAccess {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Writes are enabled unless `HAKGAL_WRITE_ENABLED` is set to a non-truthy
    /// value. An empty token counts as no token.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            enabled: lookup(WRITE_ENABLED_ENV).is_none_or(|v| is_truthy(&v)),
            token: lookup(WRITE_TOKEN_ENV).filter(|t| !t.is_empty()),
        }
    }

    pub fn check(&self, presented: Option<&str>) -> GovernanceResult<()> {
        if !self.enabled {
            return Err(GovernanceError::WriteDisabled);
        }
        match &self.token {
            Some(expected) if presented != Some(expected.as_str()) => {
                Err(GovernanceError::WriteTokenMismatch)
            }
            _ => Ok(()),
        }
    }
}
