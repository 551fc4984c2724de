//! Core implementation of trackingshell
//!
//! trackingshell is a shell for makefile recipes. Make runs every recipe line through it
//! (`SHELL = trackingshell`, `.SHELLFLAGS = -t $@ -c`), so each command is executed together
//! with the name of the target it belongs to. Cross-cutting behavior such as timing,
//! logging or notifications is attached as plugins wrapped around the command, without
//! touching how the command itself is run.

use std::path::{Path, PathBuf};

use log::debug;

use crate::config_file::{CONFIG_ENV_VAR, Config, ConfigError};

pub mod builtin;
pub mod chain;
pub mod config_file;
pub mod context;
pub mod decorators;
pub mod executor;
pub mod log_buffer;
pub mod logger;
pub mod plugin;
pub mod shell;

pub use chain::{ChainError, PluginChain};
pub use context::{AttrValue, ExecutionContext};
pub use plugin::{Next, Plugin, PluginExt, SharedPlugin, plugin_fn};
pub use shell::{ExtraArgument, Shell, ShellError};

/// Load and validate the configuration, returning it with the path it was read from.
///
/// `explicit` (usually the value of `TRACKINGSHELL_CONFIG`) must name an existing file;
/// otherwise the config is searched from `cwd` upwards. No config file yields the defaults.
///
/// # Errors
///
/// Returns `ConfigError` if an explicit config file does not exist, or if the config file
/// cannot be read, parsed or validated.
pub fn load_config(
    explicit: Option<PathBuf>,
    cwd: &Path,
) -> Result<(Config, Option<PathBuf>), ConfigError> {
    let config_path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::ConfigNotFound(path));
            }
            Some(path)
        }
        None => Config::find_config(cwd),
    };
    let Some(config_path) = config_path else {
        debug!("No config file found, using defaults");
        return Ok((Config::default(), None));
    };

    debug!("Loading config file: {}", config_path.display());
    let config = Config::from_file(&config_path)?;
    config.validate()?;
    Ok((config, Some(config_path)))
}

/// Load the configuration named by `TRACKINGSHELL_CONFIG`, or found from the working
/// directory.
///
/// # Errors
///
/// See [`load_config`]; also fails with `ConfigError::Io` if the working directory cannot
/// be determined.
pub fn load_config_from_env() -> Result<(Config, Option<PathBuf>), ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Io {
        source: e,
        path: PathBuf::from("."),
    })?;
    load_config(std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from), &cwd)
}
