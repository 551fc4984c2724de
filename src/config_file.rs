//! Configuration file handling for trackingshell

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use log::{LevelFilter, debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::builtin::{self, Builtin, Wrapping};
use crate::context::AttrValue;
use crate::plugin::SharedPlugin;
use crate::shell::ExtraArgument;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),
    #[error("Unable to read config file {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("Unable to parse YAML config file {path}: {source}")]
    Yaml {
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("Unable to parse JSON config file {path}: {source}")]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("Invalid config: {0}")]
    Validation(String),
}

/// Extra command line argument declared in the config file
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ConfigArgument {
    pub name: String,
    pub short: Option<char>,
    pub help: Option<String>,
    pub default: Option<String>,
    /// Boolean switch instead of a value
    pub flag: Option<bool>,
    /// May be given several times, collected into a list
    pub multiple: Option<bool>,
}

impl From<&ConfigArgument> for ExtraArgument {
    fn from(config: &ConfigArgument) -> Self {
        let mut argument = if config.flag.unwrap_or(false) {
            ExtraArgument::flag(&config.name)
        } else if config.multiple.unwrap_or(false) {
            ExtraArgument::list(&config.name)
        } else {
            ExtraArgument::value(&config.name)
        };
        if let Some(short) = config.short {
            argument = argument.short(short);
        }
        if let Some(help) = &config.help {
            argument = argument.help(help);
        }
        if let Some(default) = &config.default {
            argument = argument.default_value(default);
        }
        argument
    }
}

/// Built-in plugin enabled in the config file
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConfigPlugin {
    pub name: Builtin,
    pub only_with_target: Option<bool>,
    pub only_in_make_level: Option<bool>,
    pub trace: Option<bool>,
}

impl ConfigPlugin {
    #[must_use]
    pub fn build(&self) -> SharedPlugin {
        builtin::build(
            self.name,
            Wrapping {
                only_with_target: self.only_with_target.unwrap_or(false),
                only_in_make_level: self.only_in_make_level.unwrap_or(false),
                trace: self.trace.unwrap_or(false),
            },
        )
    }
}

/// Root configuration structure for trackingshell
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub shell: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
    #[serde(default)]
    pub arguments: Vec<ConfigArgument>,
    #[serde(default)]
    pub plugins: Vec<ConfigPlugin>,
}

/// List of supported configuration file names
const FILENAMES: [&str; 3] = [
    ".trackingshell.yaml",
    ".trackingshell.yml",
    ".trackingshell.json",
];

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "TRACKINGSHELL_CONFIG";

/// Names the shell reserves for its own arguments and attributes.
const RESERVED_NAMES: [&str; 5] = ["target", "command", "help", "version", "make_level"];

/// Short options taken by `--target`, `--command`, `--help` and `--version`.
const RESERVED_SHORTS: [char; 4] = ['t', 'c', 'h', 'V'];

impl Config {
    /// Loads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, or
    /// `ConfigError::Yaml`/`ConfigError::Json` if parsing fails.
    pub fn from_file(file: &Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(file).map_err(|e| ConfigError::Io {
            source: e,
            path: file.to_path_buf(),
        })?;
        let config: Config = if file.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents).map_err(|e| ConfigError::Json {
                source: e,
                path: file.to_path_buf(),
            })?
        } else {
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Yaml {
                source: e,
                path: file.to_path_buf(),
            })?
        };
        Ok(config)
    }

    /// Searches for a configuration file in `start` and its parents.
    #[must_use]
    pub fn find_config(start: &Path) -> Option<PathBuf> {
        let mut path = start.to_path_buf();
        debug!("Searching for config file in {}", start.display());
        loop {
            for file in &FILENAMES {
                let config_path = path.join(file);
                if config_path.exists() {
                    info!("Found config file: {}", config_path.display());
                    return Some(config_path);
                }
            }
            if !path.pop() {
                return None;
            }
        }
    }

    /// Check the config for values the shell cannot use.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` for blank, duplicate or reserved argument names or
    /// short options, flags with a non-boolean default, reserved attribute names, and
    /// unknown log levels.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        let mut shorts = HashSet::new();
        for argument in &self.arguments {
            let name = argument.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Validation(
                    "Argument with an empty name".to_string(),
                ));
            }
            if RESERVED_NAMES.contains(&name) {
                return Err(ConfigError::Validation(format!(
                    "Argument name '{name}' is reserved"
                )));
            }
            if !seen.insert(name) {
                return Err(ConfigError::Validation(format!(
                    "Argument '{name}' is declared twice"
                )));
            }
            let is_flag = argument.flag.unwrap_or(false);
            if is_flag && argument.multiple.unwrap_or(false) {
                return Err(ConfigError::Validation(format!(
                    "Argument '{name}' cannot be both a flag and multiple"
                )));
            }
            if let Some(short) = argument.short {
                if RESERVED_SHORTS.contains(&short) {
                    return Err(ConfigError::Validation(format!(
                        "Short option '-{short}' of argument '{name}' is reserved"
                    )));
                }
                if !shorts.insert(short) {
                    return Err(ConfigError::Validation(format!(
                        "Short option '-{short}' of argument '{name}' is already in use"
                    )));
                }
            }
            if let Some(default) = argument
                .default
                .as_deref()
                .filter(|default| is_flag && default.parse::<bool>().is_err())
            {
                return Err(ConfigError::Validation(format!(
                    "Default '{default}' of flag '{name}' must be true or false"
                )));
            }
        }
        if let Some(name) = self
            .attributes
            .keys()
            .find(|k| RESERVED_NAMES.contains(&k.as_str()))
        {
            return Err(ConfigError::Validation(format!(
                "Attribute name '{name}' is reserved"
            )));
        }
        self.level_filter()?;
        Ok(())
    }

    /// Log level configured for the file sink.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if `log_level` is not a known level.
    pub fn level_filter(&self) -> Result<Option<LevelFilter>, ConfigError> {
        let Some(level) = self.log_level.as_deref() else {
            return Ok(None);
        };
        level
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Validation(format!("Unknown log level '{level}'")))
    }

    #[must_use]
    pub fn extra_arguments(&self) -> Vec<ExtraArgument> {
        self.arguments.iter().map(ExtraArgument::from).collect()
    }

    #[must_use]
    pub fn plugins(&self) -> Vec<SharedPlugin> {
        self.plugins.iter().map(ConfigPlugin::build).collect()
    }
}
