// Copyright 2025 Instanced Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Configuration loading: a YAML file overridable by `INSD_<NAME>` env vars.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

/// Default config file name, searched for in `/etc/instanced/` then `.`
pub const DEFAULT_CONFIG_FILE: &str = "instanced";

/// Namespace that rendered challenge objects are created in. Fixed by the
/// wire protocol, not user-configurable.
pub const CHALLENGE_NAMESPACE: &str = "challenges";

/// Instancer configuration, loaded from a YAML file and environment
/// variables prefixed `INSD_` (with `_` replacing `-`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Duration string (e.g. `"10m"`) for how long a fresh instance lives
    #[serde(default = "default_instance_expiry")]
    pub instance_expiry: String,
    /// HTTP listen address, `host:port`
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// `tracing` env-filter directive, e.g. `"info"`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Whether to log each HTTP request
    #[serde(default = "default_log_request")]
    pub log_request: bool,
    /// Path to the sqlite database file
    #[serde(default = "default_db_file")]
    pub db_file: String,
    /// API bearer token. Accepted but never validated (see design notes).
    #[serde(default = "default_api_token")]
    pub api_token: String,
    /// Namespace the CRD loader lists `instancedchallenge` resources in
    #[serde(default = "default_challenge_namespace")]
    pub challenge_namespace: String,
    /// Inline challenge name -> manifest text map, the config-file-based
    /// catalog origin alongside CRD-sourced entries
    #[serde(default)]
    pub challenges: HashMap<String, String>,
}

fn default_instance_expiry() -> String {
    "10m".to_string()
}

fn default_listen_addr() -> String {
    ":8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_request() -> bool {
    true
}

fn default_db_file() -> String {
    "/data/instancer.db".to_string()
}

fn default_api_token() -> String {
    "token".to_string()
}

fn default_challenge_namespace() -> String {
    CHALLENGE_NAMESPACE.to_string()
}

/// Every field is kebab-case (`listen-addr`), but env var names can't carry
/// a hyphen, so `INSD_<NAME>` overrides arrive underscore-separated
/// (`INSD_LISTEN_ADDR`). `config::Environment`'s separator is for splitting
/// an env var into a nested struct path, not for translating into a flat
/// kebab key, so overrides are collected by hand and applied as direct key
/// overrides instead.
fn env_overrides() -> Vec<(String, String)> {
    std::env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix("INSD_")
                .map(|suffix| (suffix.to_lowercase().replace('_', "-"), value))
        })
        .collect()
}

impl Config {
    /// Loads configuration from `/etc/instanced/instanced.yaml` or
    /// `./instanced.yaml` (whichever is found first), then applies
    /// `INSD_<NAME>` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment overrides or file contents don't
    /// deserialize into `Config`. A missing config file is not an error; the
    /// built-in defaults (plus any env overrides) apply.
    pub fn load() -> anyhow::Result<Self> {
        let mut builder = ::config::Config::builder()
            .add_source(
                ::config::File::with_name(&format!("/etc/instanced/{DEFAULT_CONFIG_FILE}"))
                    .required(false),
            )
            .add_source(::config::File::with_name(DEFAULT_CONFIG_FILE).required(false));

        for (key, value) in env_overrides() {
            builder = builder.set_override(key, value)?;
        }

        let raw = builder.build()?;
        let conf: Config = raw.try_deserialize()?;

        if conf.api_token == default_api_token() {
            warn!("using the default api-token; set api-token in config for production use");
        }

        Ok(conf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied_with_no_sources() {
        let conf: Config = ::config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(conf.instance_expiry, "10m");
        assert_eq!(conf.listen_addr, ":8080");
        assert_eq!(conf.challenge_namespace, "challenges");
        assert!(conf.challenges.is_empty());
    }

    #[test]
    fn env_override_replaces_file_default() {
        temp_env::with_var("INSD_LISTEN_ADDR", Some(":9090"), || {
            let mut builder = ::config::Config::builder();
            for (key, value) in env_overrides() {
                builder = builder.set_override(key, value).unwrap();
            }
            let conf: Config = builder.build().unwrap().try_deserialize().unwrap();
            assert_eq!(conf.listen_addr, ":9090");
        });
    }

    #[test]
    fn env_overrides_translates_underscores_to_kebab_keys() {
        temp_env::with_var("INSD_CHALLENGE_NAMESPACE", Some("ctf"), || {
            let overrides = env_overrides();
            assert!(overrides.contains(&("challenge-namespace".to_string(), "ctf".to_string())));
        });
    }
}
