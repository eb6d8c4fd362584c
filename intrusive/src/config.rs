use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use serde::{Deserialize, Serialize};

use crate::error::{Disposition, Error, Result};

pub const ABORT_ON_NULL_ACCESS_VAR: &str = "INTRUSIVE_ABORT_ON_NULL_ACCESS";
pub const ABORT_ON_INVARIANT_VIOLATION_VAR: &str = "INTRUSIVE_ABORT_ON_INVARIANT_VIOLATION";

static ABORT_ON_NULL_ACCESS: AtomicBool = AtomicBool::new(false);
static ABORT_ON_INVARIANT_VIOLATION: AtomicBool = AtomicBool::new(false);
// Consumed by whichever comes first: the environment or an explicit install.
static CONFIGURED: Once = Once::new();

/// How errors that cannot be returned are signaled.
///
/// Both flags default to `false`, so errors are raised as catchable panics.
/// Turning a flag on makes the corresponding errors abort the process at the
/// faulting site instead, which is what you want when hunting a crash with a
/// debugger or core dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub abort_on_null_access: bool,
    pub abort_on_invariant_violation: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from variables resolved by `lookup`; unset variables
    /// keep their defaults.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let mut config = Self::default();
        if let Some(value) = lookup(ABORT_ON_NULL_ACCESS_VAR) {
            config.abort_on_null_access = parse_flag(ABORT_ON_NULL_ACCESS_VAR, &value)?;
        }
        if let Some(value) = lookup(ABORT_ON_INVARIANT_VIOLATION_VAR) {
            config.abort_on_invariant_violation =
                parse_flag(ABORT_ON_INVARIANT_VIOLATION_VAR, &value)?;
        }
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn disposition(&self, error: &Error) -> Disposition {
        let abort = match error {
            Error::NullAccess { .. } => self.abort_on_null_access,
            Error::RefCountUnderflow { .. } | Error::RefCountOverflow { .. } => {
                self.abort_on_invariant_violation
            }
            Error::Config(_) => false,
        };
        if abort {
            Disposition::Abort
        } else {
            Disposition::Raise
        }
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config(format!("{}: invalid flag value {:?}", name, other))),
    }
}

/// Replaces the process-wide configuration.
///
/// Meant to be called once during startup; handles in use on other threads
/// see the new flags on their next raised error. Installing before the first
/// raised error also keeps the environment from being consulted.
pub fn install(config: Config) {
    CONFIGURED.call_once(|| {});
    store(config);
}

/// The process-wide configuration. The first call loads it from the
/// environment unless [`install`] got there first.
pub fn current() -> Config {
    CONFIGURED.call_once(|| match Config::from_env() {
        Ok(config) => store(config),
        Err(err) => log::warn!("ignoring environment configuration: {}", err),
    });
    Config {
        abort_on_null_access: ABORT_ON_NULL_ACCESS.load(Ordering::Relaxed),
        abort_on_invariant_violation: ABORT_ON_INVARIANT_VIOLATION.load(Ordering::Relaxed),
    }
}

fn store(config: Config) {
    log::debug!("installing {:?}", config);
    ABORT_ON_NULL_ACCESS.store(config.abort_on_null_access, Ordering::Relaxed);
    ABORT_ON_INVARIANT_VIOLATION.store(config.abort_on_invariant_violation, Ordering::Relaxed);
}
