//! Helpers for loading service configuration from environment variables.

use std::str::FromStr;

use anyhow::{Context as _, anyhow};

/// Read a required env var.
pub fn require_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("missing required env var {name}"))
}

/// Read an optional env var and parse it, falling back to `default` when unset.
///
/// A value that is set but unparsable is an error rather than a silent default.
pub fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid value for {name}: {e}")),
        Err(_) => Ok(default),
    }
}

/// Read a boolean env var (`true/false`, `1/0`, `yes/no`, `on/off`).
pub fn env_flag(name: &str, default: bool) -> anyhow::Result<bool> {
    match std::env::var(name) {
        Ok(raw) => parse_flag(&raw).ok_or_else(|| anyhow!("invalid boolean for {name}: {raw}")),
        Err(_) => Ok(default),
    }
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
