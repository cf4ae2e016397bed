// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::app::types::FarmLayout;

const APP_DIR_NAME: &str = "farmlink";
const CONFIG_FILE_NAME: &str = "farmlink.toml";
const CONFIG_ENV_VAR: &str = "FARMLINK_CONFIG_PATH";
const PAYLOAD_DIR_NAME: &str = "payload";
const DEFAULT_PORT: u16 = 22;
const DEFAULT_MAX_CONNECTION_ATTEMPTS: u32 = 3;

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    server_address: Option<String>,
    port: Option<u16>,
    root: Option<String>,
    render_root: Option<String>,
    farm_dir: Option<String>,
    output_dir: Option<String>,
    project_dir: Option<String>,
    package_dir: Option<String>,
    payload_dir: Option<String>,
    max_connection_attempts: Option<u32>,
    verbose: Option<bool>,
}

#[derive(Debug)]
pub struct Config {
    pub server_address: Option<String>,
    pub port: u16,
    pub layout: FarmLayout,
    pub payload_dir: PathBuf,
    pub max_connection_attempts: u32,
    pub verbose: bool,
    pub config_path: Option<PathBuf>,
}

impl Config {
    pub fn layout(&self) -> FarmLayout {
        self.layout.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Override,
    Env,
    ConfigFile,
    Default,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Override => "override",
            ConfigSource::Env => "env",
            ConfigSource::ConfigFile => "config",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

/// Where each effective value came from, for the startup log.
#[derive(Debug)]
pub struct ConfigReport {
    pub config_path: Option<PathBuf>,
    pub config_path_source: Option<ConfigSource>,
    pub config_file_present: bool,
    pub server_address: ConfigValue<Option<String>>,
    pub port: ConfigValue<u16>,
    pub payload_dir: ConfigValue<PathBuf>,
    pub max_connection_attempts: ConfigValue<u32>,
    pub verbose: ConfigValue<bool>,
}

#[derive(Debug)]
pub struct LoadResult {
    pub config: Config,
    pub report: ConfigReport,
}

#[derive(Debug, Default)]
pub struct Overrides {
    pub server_address: Option<String>,
    pub port: Option<u16>,
    pub payload_dir: Option<PathBuf>,
    pub max_connection_attempts: Option<u32>,
    pub verbose: Option<bool>,
}

fn pick<T>(over: Option<T>, file: Option<T>, default: T) -> (T, ConfigSource) {
    match over {
        Some(value) => (value, ConfigSource::Override),
        None => match file {
            Some(value) => (value, ConfigSource::ConfigFile),
            None => (default, ConfigSource::Default),
        },
    }
}

pub fn load(config_path_override: Option<PathBuf>, overrides: Overrides) -> Result<Config> {
    Ok(load_with_report(config_path_override, overrides)?.config)
}

pub fn load_with_report(
    config_path_override: Option<PathBuf>,
    overrides: Overrides,
) -> Result<LoadResult> {
    let (config_path, config_path_source, required) = match config_path_override {
        Some(path) => (Some(expand_path(path)), Some(ConfigSource::Override), true),
        None => match config_path_from_env()? {
            Some(path) => (Some(expand_path(path)), Some(ConfigSource::Env), true),
            None => match default_config_path().ok() {
                Some(path) => (Some(path), Some(ConfigSource::Default), false),
                None => (None, None, false),
            },
        },
    };
    let config_file_present = config_path
        .as_deref()
        .map(|path| path.exists())
        .unwrap_or(false);

    let file_config = match config_path.as_deref() {
        Some(path) => read_config_file(path, required)?,
        None => FileConfig::default(),
    };

    let (server_address, server_address_source) = match overrides.server_address {
        Some(address) => (Some(address), ConfigSource::Override),
        None => match file_config.server_address {
            Some(address) => (Some(address), ConfigSource::ConfigFile),
            None => (None, ConfigSource::Default),
        },
    };

    let (port, port_source) = pick(overrides.port, file_config.port, DEFAULT_PORT);
    if port == 0 {
        anyhow::bail!("port must be between 1 and 65535");
    }

    let (payload_dir, payload_dir_source) = match overrides.payload_dir {
        Some(path) => (expand_path(path), ConfigSource::Override),
        None => match file_config.payload_dir {
            Some(raw) => (
                resolve_path(&raw, config_path.as_deref().and_then(|path| path.parent())),
                ConfigSource::ConfigFile,
            ),
            None => (
                default_payload_dir().context(
                    "failed to resolve default payload directory; set payload_dir in the config file",
                )?,
                ConfigSource::Default,
            ),
        },
    };

    let (max_connection_attempts, max_attempts_source) = pick(
        overrides.max_connection_attempts,
        file_config.max_connection_attempts,
        DEFAULT_MAX_CONNECTION_ATTEMPTS,
    );
    if max_connection_attempts == 0 {
        anyhow::bail!("max_connection_attempts must be at least 1");
    }

    let (verbose, verbose_source) = pick(overrides.verbose, file_config.verbose, false);

    let defaults = FarmLayout::default();
    let layout = FarmLayout {
        root: file_config.root.unwrap_or(defaults.root),
        render_root: file_config.render_root.unwrap_or(defaults.render_root),
        farm_dir: file_config.farm_dir.unwrap_or(defaults.farm_dir),
        output_dir: file_config.output_dir.unwrap_or(defaults.output_dir),
        project_dir: file_config.project_dir.unwrap_or(defaults.project_dir),
        package_dir: file_config.package_dir.unwrap_or(defaults.package_dir),
    };

    let config = Config {
        server_address,
        port,
        layout,
        payload_dir,
        max_connection_attempts,
        verbose,
        config_path: config_path.clone(),
    };

    let report = ConfigReport {
        config_path,
        config_path_source,
        config_file_present,
        server_address: ConfigValue {
            value: config.server_address.clone(),
            source: server_address_source,
        },
        port: ConfigValue {
            value: config.port,
            source: port_source,
        },
        payload_dir: ConfigValue {
            value: config.payload_dir.clone(),
            source: payload_dir_source,
        },
        max_connection_attempts: ConfigValue {
            value: config.max_connection_attempts,
            source: max_attempts_source,
        },
        verbose: ConfigValue {
            value: config.verbose,
            source: verbose_source,
        },
    };

    Ok(LoadResult { config, report })
}

fn read_config_file(path: &Path, required: bool) -> Result<FileConfig> {
    if !path.exists() {
        if required {
            anyhow::bail!("config file not found at {}", path.display());
        }
        return Ok(FileConfig::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn resolve_path(raw: &str, base_dir: Option<&Path>) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        return path;
    }
    match base_dir {
        Some(dir) => dir.join(path),
        None => path,
    }
}

fn expand_path(path: PathBuf) -> PathBuf {
    let path_string = path.to_string_lossy().to_string();
    let expanded = shellexpand::tilde(&path_string);
    PathBuf::from(expanded.as_ref())
}

fn config_path_from_env() -> Result<Option<PathBuf>> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(value) => {
            if value.is_empty() {
                anyhow::bail!("{CONFIG_ENV_VAR} is set but empty");
            }
            Ok(Some(PathBuf::from(value)))
        }
        None => Ok(None),
    }
}

fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("failed to resolve config directory")?;
    Ok(base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn default_payload_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("failed to resolve data directory")?;
    Ok(base.join(APP_DIR_NAME).join(PAYLOAD_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        prev: Option<OsString>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var_os(key);
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                std::env::set_var(key, value);
            }
            Self { key, prev }
        }

        fn clear(key: &'static str) -> Self {
            let prev = std::env::var_os(key);
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                std::env::remove_var(key);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match &self.prev {
                Some(value) => {
                    // SAFETY: tests serialize env mutations with ENV_LOCK.
                    unsafe {
                        std::env::set_var(self.key, value);
                    }
                }
                None => {
                    // SAFETY: tests serialize env mutations with ENV_LOCK.
                    unsafe {
                        std::env::remove_var(self.key);
                    }
                }
            }
        }
    }

    #[test]
    fn missing_optional_config_file_is_ok() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("missing.toml");
        let cfg = read_config_file(&config_path, false).unwrap();
        assert!(cfg.server_address.is_none());
        assert!(cfg.port.is_none());
    }

    #[test]
    fn missing_required_config_file_errors() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("missing.toml");
        let err = read_config_file(&config_path, true).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn file_values_shape_the_layout() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::clear(CONFIG_ENV_VAR);
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("farmlink.toml");
        fs::write(
            &config_path,
            concat!(
                "server_address = \"farm.example.com\"\n",
                "render_root = \"/mnt/render\"\n",
                "payload_dir = \"payload\"\n",
                "max_connection_attempts = 5\n",
            ),
        )
        .unwrap();

        let config = load(Some(config_path.clone()), Overrides::default()).unwrap();
        assert_eq!(config.server_address.as_deref(), Some("farm.example.com"));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.layout.render_root, "/mnt/render");
        assert_eq!(config.layout.root, "/home");
        assert_eq!(config.payload_dir, dir.path().join("payload"));
        assert_eq!(config.max_connection_attempts, 5);
        assert_eq!(config.config_path, Some(config_path));
    }

    #[test]
    fn overrides_take_precedence_over_file_config() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::clear(CONFIG_ENV_VAR);
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("farmlink.toml");
        fs::write(&config_path, "port = 2222\nverbose = false\n").unwrap();

        let result = load_with_report(
            Some(config_path),
            Overrides {
                port: Some(22022),
                verbose: Some(true),
                ..Overrides::default()
            },
        )
        .unwrap();

        assert_eq!(result.config.port, 22022);
        assert!(result.config.verbose);
        assert_eq!(result.report.port.source, ConfigSource::Override);
        assert_eq!(result.report.verbose.source, ConfigSource::Override);
        assert_eq!(
            result.report.server_address.source,
            ConfigSource::Default
        );
    }

    #[test]
    fn env_var_selects_the_config_file() {
        let _lock = ENV_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("from_env.toml");
        fs::write(&config_path, "port = 2200\n").unwrap();
        let _env = EnvVarGuard::set(CONFIG_ENV_VAR, config_path.to_str().unwrap());

        let result = load_with_report(None, Overrides::default()).unwrap();
        assert_eq!(result.config.port, 2200);
        assert_eq!(result.report.config_path_source, Some(ConfigSource::Env));
    }

    #[test]
    fn zero_values_are_rejected() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::clear(CONFIG_ENV_VAR);
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("farmlink.toml");
        fs::write(&config_path, "port = 0\n").unwrap();
        assert!(load(Some(config_path), Overrides::default()).is_err());

        let config_path = dir.path().join("farmlink2.toml");
        fs::write(&config_path, "max_connection_attempts = 0\n").unwrap();
        assert!(load(Some(config_path), Overrides::default()).is_err());
    }
}
