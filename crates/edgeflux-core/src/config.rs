// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the edge agent and the cloud center.

use std::time::Duration;

/// Default bounded wait for a correlated reply on the apply path.
pub const DEFAULT_APPLY_TIMEOUT: Duration = Duration::from_secs(10);
/// Default sweep interval for both sides' garbage collectors.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(300);
/// Default idle grace window before a completed application is reclaimed.
pub const DEFAULT_IDLE_GRACE: Duration = Duration::from_secs(300);
/// Default destination the agent sends application messages to.
pub const DEFAULT_CENTER_DESTINATION: &str = "hub";

/// Edge agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Name of the edge node this agent serves; part of every fingerprint.
    pub node_name: String,
    /// Transport destination application messages are sent to.
    pub center_destination: String,
    /// Bounded wait for the correlated reply.
    pub apply_timeout: Duration,
    /// Interval between GC sweeps.
    pub gc_interval: Duration,
    /// Idle time after the last close before an application is reclaimed.
    pub idle_grace: Duration,
}

impl AgentConfig {
    /// Configuration with defaults for the given node.
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            center_destination: DEFAULT_CENTER_DESTINATION.to_string(),
            apply_timeout: DEFAULT_APPLY_TIMEOUT,
            gc_interval: DEFAULT_GC_INTERVAL,
            idle_grace: DEFAULT_IDLE_GRACE,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `EDGEFLUX_NODE_NAME`: name of this edge node
    ///
    /// Optional (with defaults):
    /// - `EDGEFLUX_CENTER_DESTINATION`: transport destination (default: hub)
    /// - `EDGEFLUX_APPLY_TIMEOUT_MS`: reply wait in milliseconds (default: 10000)
    /// - `EDGEFLUX_GC_INTERVAL_SECS`: sweep interval in seconds (default: 300)
    /// - `EDGEFLUX_IDLE_GRACE_SECS`: idle grace in seconds (default: 300)
    pub fn from_env() -> Result<Self, ConfigError> {
        let node_name = std::env::var("EDGEFLUX_NODE_NAME")
            .map_err(|_| ConfigError::Missing("EDGEFLUX_NODE_NAME"))?;

        let mut config = Self::new(node_name);
        if let Ok(destination) = std::env::var("EDGEFLUX_CENTER_DESTINATION") {
            config.center_destination = destination;
        }
        config.apply_timeout = duration_var(
            "EDGEFLUX_APPLY_TIMEOUT_MS",
            Duration::from_millis,
            DEFAULT_APPLY_TIMEOUT,
        )?;
        config.gc_interval = duration_var(
            "EDGEFLUX_GC_INTERVAL_SECS",
            Duration::from_secs,
            DEFAULT_GC_INTERVAL,
        )?;
        config.idle_grace = duration_var(
            "EDGEFLUX_IDLE_GRACE_SECS",
            Duration::from_secs,
            DEFAULT_IDLE_GRACE,
        )?;
        Ok(config)
    }
}

/// Cloud center configuration
#[derive(Debug, Clone)]
pub struct CenterConfig {
    /// When enabled, non-watch verbs execute through a client bound to the
    /// caller's own token instead of the shared default client.
    pub require_authorization: bool,
    /// How long a processed-application record is kept before eviction.
    pub entry_ttl: Duration,
    /// Interval between GC sweeps.
    pub gc_interval: Duration,
}

impl Default for CenterConfig {
    fn default() -> Self {
        Self {
            require_authorization: false,
            entry_ttl: DEFAULT_IDLE_GRACE,
            gc_interval: DEFAULT_GC_INTERVAL,
        }
    }
}

impl CenterConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `EDGEFLUX_REQUIRE_AUTHORIZATION`: `true`/`1` to scope clients to the
    ///   caller's token (default: false)
    /// - `EDGEFLUX_ENTRY_TTL_SECS`: processed-record TTL in seconds (default: 300)
    /// - `EDGEFLUX_GC_INTERVAL_SECS`: sweep interval in seconds (default: 300)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("EDGEFLUX_REQUIRE_AUTHORIZATION") {
            config.require_authorization = match raw.as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(ConfigError::Invalid(
                        "EDGEFLUX_REQUIRE_AUTHORIZATION",
                        "must be true/false or 1/0",
                    ))
                }
            };
        }
        config.entry_ttl = duration_var(
            "EDGEFLUX_ENTRY_TTL_SECS",
            Duration::from_secs,
            DEFAULT_IDLE_GRACE,
        )?;
        config.gc_interval = duration_var(
            "EDGEFLUX_GC_INTERVAL_SECS",
            Duration::from_secs,
            DEFAULT_GC_INTERVAL,
        )?;
        Ok(config)
    }
}

fn duration_var(
    name: &'static str,
    unit: fn(u64) -> Duration,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(unit)
            .map_err(|_| ConfigError::Invalid(name, "must be a non-negative integer")),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_agent_config_new_defaults() {
        let config = AgentConfig::new("edge-0");
        assert_eq!(config.node_name, "edge-0");
        assert_eq!(config.center_destination, "hub");
        assert_eq!(config.apply_timeout, Duration::from_secs(10));
        assert_eq!(config.gc_interval, Duration::from_secs(300));
        assert_eq!(config.idle_grace, Duration::from_secs(300));
    }

    #[test]
    fn test_agent_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("EDGEFLUX_NODE_NAME", "edge-1");
        guard.remove("EDGEFLUX_CENTER_DESTINATION");
        guard.remove("EDGEFLUX_APPLY_TIMEOUT_MS");
        guard.remove("EDGEFLUX_GC_INTERVAL_SECS");
        guard.remove("EDGEFLUX_IDLE_GRACE_SECS");

        let config = AgentConfig::from_env().unwrap();
        assert_eq!(config.node_name, "edge-1");
        assert_eq!(config.center_destination, "hub");
        assert_eq!(config.apply_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_agent_config_from_env_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("EDGEFLUX_NODE_NAME", "edge-2");
        guard.set("EDGEFLUX_CENTER_DESTINATION", "cloudhub");
        guard.set("EDGEFLUX_APPLY_TIMEOUT_MS", "2500");
        guard.set("EDGEFLUX_GC_INTERVAL_SECS", "60");
        guard.set("EDGEFLUX_IDLE_GRACE_SECS", "120");

        let config = AgentConfig::from_env().unwrap();
        assert_eq!(config.center_destination, "cloudhub");
        assert_eq!(config.apply_timeout, Duration::from_millis(2500));
        assert_eq!(config.gc_interval, Duration::from_secs(60));
        assert_eq!(config.idle_grace, Duration::from_secs(120));
    }

    #[test]
    fn test_agent_config_missing_node_name() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("EDGEFLUX_NODE_NAME");

        let result = AgentConfig::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::Missing("EDGEFLUX_NODE_NAME"))
        ));
    }

    #[test]
    fn test_agent_config_invalid_timeout() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("EDGEFLUX_NODE_NAME", "edge-0");
        guard.set("EDGEFLUX_APPLY_TIMEOUT_MS", "soon");

        let result = AgentConfig::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::Invalid("EDGEFLUX_APPLY_TIMEOUT_MS", _))
        ));
    }

    #[test]
    fn test_center_config_defaults() {
        let config = CenterConfig::default();
        assert!(!config.require_authorization);
        assert_eq!(config.entry_ttl, Duration::from_secs(300));
        assert_eq!(config.gc_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_center_config_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("EDGEFLUX_REQUIRE_AUTHORIZATION", "true");
        guard.set("EDGEFLUX_ENTRY_TTL_SECS", "30");
        guard.remove("EDGEFLUX_GC_INTERVAL_SECS");

        let config = CenterConfig::from_env().unwrap();
        assert!(config.require_authorization);
        assert_eq!(config.entry_ttl, Duration::from_secs(30));
        assert_eq!(config.gc_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_center_config_invalid_flag() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("EDGEFLUX_REQUIRE_AUTHORIZATION", "maybe");

        let result = CenterConfig::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::Invalid("EDGEFLUX_REQUIRE_AUTHORIZATION", _))
        ));
    }

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            ConfigError::Missing("X").to_string(),
            "missing required environment variable: X"
        );
        assert_eq!(
            ConfigError::Invalid("X", "must be a number").to_string(),
            "invalid value for X: must be a number"
        );
    }
}
