//! One-time machine and runtime inventory

use std::collections::HashSet;

use serde_json::{json, Map, Value};
use sysinfo::System;

use crate::integration::Integration;
use crate::record::Record;

/// Environment variables never included in the session snapshot.
pub const DEFAULT_EXCLUDED_ENV_VARS: &[&str] = &["PS1", "PROMPT_COMMAND"];

/// Gathers machine identity, runtime build info and the process
/// environment once per session. Nothing is gathered per event.
pub struct PlatformIntegration {
    excluded_env_vars: HashSet<String>,
}

impl PlatformIntegration {
    pub fn new() -> Self {
        Self::with_excluded_env_vars(DEFAULT_EXCLUDED_ENV_VARS.iter().map(|name| name.to_string()))
    }

    /// Override the set of environment variables kept out of the
    /// snapshot.
    pub fn with_excluded_env_vars(excluded: impl IntoIterator<Item = String>) -> Self {
        Self {
            excluded_env_vars: excluded.into_iter().collect(),
        }
    }

    fn environment(&self) -> Map<String, Value> {
        let mut env = Map::new();
        for (name, value) in std::env::vars() {
            if !self.excluded_env_vars.contains(&name) {
                env.insert(name, Value::String(value));
            }
        }
        env
    }
}

impl Default for PlatformIntegration {
    fn default() -> Self {
        Self::new()
    }
}

impl Integration for PlatformIntegration {
    fn name(&self) -> &'static str {
        "platform"
    }

    fn gather(&self, _record: &dyn Record) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }

    fn session_data(&self) -> anyhow::Result<Option<Value>> {
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());

        let data = json!({
            "username": username,
            "hostname": System::host_name().unwrap_or_else(|| "unknown".to_string()),
            "os": {
                "name": System::name().unwrap_or_else(|| "unknown".to_string()),
                "version": System::os_version().unwrap_or_else(|| "unknown".to_string()),
                "kernel": System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
                "uptime_seconds": System::uptime(),
            },
            "runtime": {
                "package": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "target_os": std::env::consts::OS,
                "target_arch": std::env::consts::ARCH,
                "debug_assertions": cfg!(debug_assertions),
            },
            "env": Value::Object(self.environment()),
        });

        Ok(Some(data))
    }
}
