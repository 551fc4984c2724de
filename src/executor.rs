use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command as ProcessCommand, ExitStatus};

use log::{debug, error};

use crate::context::ExecutionContext;
use crate::plugin::{Next, Plugin};

/// Interpreter used when none is configured.
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Status reported when the interpreter itself cannot be found.
pub const EXIT_NOT_FOUND: i32 = 127;

/// Status reported when the interpreter exists but cannot be started.
pub const EXIT_CANNOT_EXECUTE: i32 = 126;

/// The terminal executor: runs the command of the context in a shell.
///
/// Always the last plugin of a chain. The command runs with `-e -o pipefail`, so the first
/// failing statement or pipeline stage fails the whole command, and its exit status is
/// returned as is.
#[derive(Debug, Clone)]
pub struct ExecuteCommand {
    shell: PathBuf,
}

impl ExecuteCommand {
    #[must_use]
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    #[must_use]
    pub fn shell(&self) -> &Path {
        &self.shell
    }
}

impl Default for ExecuteCommand {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

impl Plugin for ExecuteCommand {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn invoke(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> i32 {
        assert!(
            next.is_absent(),
            "plugin chain contract violated: {} plugins follow the terminal executor",
            next.remaining()
        );
        execute_command(&self.shell, ctx.command())
    }
}

/// Run `command` with `shell`, inheriting stdio, and return its exit status.
#[must_use]
pub fn execute_command(shell: &Path, command: &str) -> i32 {
    debug!("Running `{command}` with {}", shell.display());
    let status = ProcessCommand::new(shell)
        .args(["-e", "-o", "pipefail", "-c"])
        .arg(command)
        .status();

    match status {
        Ok(status) => exit_code(status),
        Err(e) => {
            error!("Unable to start {}: {e}", shell.display());
            if e.kind() == io::ErrorKind::NotFound {
                EXIT_NOT_FOUND
            } else {
                EXIT_CANNOT_EXECUTE
            }
        }
    }
}

/// Exit code of a finished process; a signal `n` maps to `128 + n` like shells do.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
