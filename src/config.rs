// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Configuration management for minic.
//!
//! Settings come from `minic.toml` in the current directory, else from the
//! user config directory, else from defaults. Command line flags win over
//! both.

use anyhow::{Context, Result};
use minic_core::DEFAULT_POOL_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::Cli;

/// Name of the project-local config file.
pub const PROJECT_CONFIG: &str = "minic.toml";

/// Configuration for minic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Memory pool size in words
    pub pool_size: usize,

    /// Trace executed instructions
    pub trace: bool,

    /// Instruction budget per run
    pub max_cycles: Option<u64>,

    /// Log filter used when `RUST_LOG` is unset or empty
    pub log_level: String,

    /// REPL history location
    pub history_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            trace: false,
            max_cycles: None,
            log_level: "warn".to_string(),
            history_file: None,
        }
    }
}

impl Config {
    /// Loads `explicit` if given, otherwise the first config file found in
    /// the default locations.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let project = PathBuf::from(PROJECT_CONFIG);
        if project.exists() {
            return Self::from_file(&project);
        }

        if let Some(user) = user_config_path().filter(|path| path.exists()) {
            return Self::from_file(&user);
        }

        Ok(Self::default())
    }

    /// Parses a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Applies command line overrides.
    pub fn apply(&mut self, cli: &Cli) {
        if let Some(pool_size) = cli.pool_size {
            self.pool_size = pool_size;
        }
        if let Some(max_cycles) = cli.max_cycles {
            self.max_cycles = Some(max_cycles);
        }
        if cli.trace {
            self.trace = true;
        }
        match cli.verbose {
            0 => {}
            1 => self.log_level = "info".to_string(),
            2 => self.log_level = "debug".to_string(),
            _ => self.log_level = "trace".to_string(),
        }
    }

    /// Log filter directives. `env` (the `RUST_LOG` value) replaces the
    /// configured level, and the instruction trace is switched on either way
    /// when tracing is enabled.
    pub fn log_filter(&self, env: Option<&str>) -> String {
        let base = env
            .map(str::trim)
            .filter(|directives| !directives.is_empty())
            .unwrap_or(self.log_level.as_str());
        if self.trace {
            format!("{base},{}=info", minic_core::vm::TRACE_TARGET)
        } else {
            base.to_string()
        }
    }

    /// Where the REPL keeps its history.
    pub fn history_path(&self) -> PathBuf {
        self.history_file.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("minic")
                .join("history")
        })
    }
}

/// Get the user config file path.
fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("minic").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
        assert!(!config.trace);
        assert_eq!(config.max_cycles, None);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_load_file() {
        let file = write_config(
            "pool_size = 8192\ntrace = true\nmax_cycles = 500\nlog_level = \"debug\"\n",
        );
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.pool_size, 8192);
        assert!(config.trace);
        assert_eq!(config.max_cycles, Some(500));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config("max_cycles = 10\nunknown_key = 1\n");
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.max_cycles, Some(10));
    }

    #[test]
    fn test_invalid_file() {
        let file = write_config("pool_size = \"large\"\n");
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().starts_with("invalid config file"));
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();
        let cli = Cli::parse_from(["minic", "--pool-size", "1024", "-t", "-v"]);
        config.apply(&cli);
        assert_eq!(config.pool_size, 1024);
        assert!(config.trace);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_filter(None), "info,minic::trace=info");
    }

    #[test]
    fn test_env_filter_keeps_trace_directive() {
        let mut config = Config::default();
        assert_eq!(config.log_filter(Some("minic_core=debug")), "minic_core=debug");
        assert_eq!(config.log_filter(Some("  ")), "warn");

        config.trace = true;
        assert_eq!(
            config.log_filter(Some("minic_core=debug")),
            "minic_core=debug,minic::trace=info"
        );
    }

    #[test]
    fn test_history_override() {
        let config = Config {
            history_file: Some(PathBuf::from("/tmp/minic-history")),
            ..Config::default()
        };
        assert_eq!(config.history_path(), PathBuf::from("/tmp/minic-history"));
    }
}
