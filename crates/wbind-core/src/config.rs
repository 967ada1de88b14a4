//! Notification and re-entrancy policies for observable nodes.
//!
//! A [`WatchConfig`] is copied into every node at construction time, so a
//! graph built with [`watchize_with`](crate::watch::watchize_with) carries the
//! same policies everywhere. There is no ambient global configuration: callers
//! construct a config (or read one from the environment with
//! [`WatchConfig::from_env`]) and pass it explicitly.

use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};

/// Environment variable selecting the [`NotifyPolicy`].
pub const ENV_NOTIFY: &str = "WBIND_NOTIFY";
/// Environment variable selecting the [`ReentrancyPolicy`].
pub const ENV_REENTRANCY: &str = "WBIND_REENTRANCY";
/// Environment variable bounding the re-entrant drain loop.
pub const ENV_MAX_DRAIN: &str = "WBIND_MAX_DRAIN";

/// When a `set` notifies observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotifyPolicy {
    /// Setting a value equal to the current one is a no-op.
    #[default]
    OnChange,
    /// Every `set` runs a notification cycle.
    Always,
}

/// What happens when a node is mutated from inside one of its own observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReentrancyPolicy {
    /// Apply the value immediately and deliver the notification after the
    /// current cycle finishes.
    #[default]
    Queue,
    /// Fail with [`WatchError::ReentrantMutation`] and leave the node as is.
    Reject,
}

impl NotifyPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnChange => "on-change",
            Self::Always => "always",
        }
    }
}

impl ReentrancyPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for NotifyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ReentrancyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotifyPolicy {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on-change" | "onchange" | "changed" => Ok(Self::OnChange),
            "always" => Ok(Self::Always),
            other => Err(WatchError::InvalidConfig {
                key: ENV_NOTIFY.into(),
                value: other.into(),
            }),
        }
    }
}

impl FromStr for ReentrancyPolicy {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "reject" => Ok(Self::Reject),
            other => Err(WatchError::InvalidConfig {
                key: ENV_REENTRANCY.into(),
                value: other.into(),
            }),
        }
    }
}

/// Policies shared by every node created from this config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub notify: NotifyPolicy,
    pub reentrancy: ReentrancyPolicy,
    /// Maximum number of queued re-entrant notifications delivered by one
    /// outer `set` before the drain gives up.
    pub max_drain: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            notify: NotifyPolicy::OnChange,
            reentrancy: ReentrancyPolicy::Queue,
            max_drain: 64,
        }
    }
}

impl WatchConfig {
    #[must_use]
    pub fn with_notify(mut self, notify: NotifyPolicy) -> Self {
        self.notify = notify;
        self
    }

    #[must_use]
    pub fn with_reentrancy(mut self, reentrancy: ReentrancyPolicy) -> Self {
        self.reentrancy = reentrancy;
        self
    }

    #[must_use]
    pub fn with_max_drain(mut self, max_drain: usize) -> Self {
        self.max_drain = max_drain;
        self
    }

    /// Defaults overridden by `WBIND_NOTIFY`, `WBIND_REENTRANCY` and
    /// `WBIND_MAX_DRAIN`.
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(val) = lookup(ENV_NOTIFY) {
            self.notify = val.parse()?;
        }
        if let Some(val) = lookup(ENV_REENTRANCY) {
            self.reentrancy = val.parse()?;
        }
        if let Some(val) = lookup(ENV_MAX_DRAIN) {
            self.max_drain = val
                .trim()
                .parse()
                .map_err(|_| WatchError::InvalidConfig {
                    key: ENV_MAX_DRAIN.into(),
                    value: val.clone(),
                })?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = WatchConfig::default();
        assert_eq!(config.notify, NotifyPolicy::OnChange);
        assert_eq!(config.reentrancy, ReentrancyPolicy::Queue);
        assert_eq!(config.max_drain, 64);
    }

    #[test]
    fn env_overrides() {
        let config = WatchConfig::default()
            .apply_env(lookup(&[
                (ENV_NOTIFY, "always"),
                (ENV_REENTRANCY, "Reject"),
                (ENV_MAX_DRAIN, " 8 "),
            ]))
            .unwrap();
        assert_eq!(config.notify, NotifyPolicy::Always);
        assert_eq!(config.reentrancy, ReentrancyPolicy::Reject);
        assert_eq!(config.max_drain, 8);
    }

    #[test]
    fn missing_vars_keep_defaults() {
        let config = WatchConfig::default().apply_env(lookup(&[])).unwrap();
        assert_eq!(config, WatchConfig::default());
    }

    #[test]
    fn bad_values_are_reported() {
        let err = WatchConfig::default()
            .apply_env(lookup(&[(ENV_MAX_DRAIN, "lots")]))
            .unwrap_err();
        assert_eq!(
            err,
            WatchError::InvalidConfig {
                key: ENV_MAX_DRAIN.into(),
                value: "lots".into()
            }
        );

        let err = WatchConfig::default()
            .apply_env(lookup(&[(ENV_NOTIFY, "sometimes")]))
            .unwrap_err();
        assert!(err.to_string().contains("sometimes"));
    }

    #[test]
    fn builders_chain() {
        let config = WatchConfig::default()
            .with_notify(NotifyPolicy::Always)
            .with_reentrancy(ReentrancyPolicy::Reject)
            .with_max_drain(3);
        assert_eq!(config.notify.to_string(), "always");
        assert_eq!(config.reentrancy.to_string(), "reject");
        assert_eq!(config.max_drain, 3);
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_value(WatchConfig::default()).unwrap();
        assert_eq!(json["notify"], "on-change");
        assert_eq!(json["reentrancy"], "queue");

        let parsed: WatchConfig = serde_json::from_str(r#"{"notify":"always"}"#).unwrap();
        assert_eq!(parsed.notify, NotifyPolicy::Always);
        assert_eq!(parsed.max_drain, 64);
    }
}
