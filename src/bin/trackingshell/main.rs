use std::fs::OpenOptions;
use std::process::ExitCode;

use trackingshell::logger::{self, Sink};
use trackingshell::{Shell, ShellError, load_config_from_env};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Process exit status for a command status, clamped into `0..=255`.
///
/// Statuses outside that range, negative ones included, become 255.
fn clamp_status(status: i32) -> u8 {
    u8::try_from(status).unwrap_or(u8::MAX)
}

fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let (config, _config_path) = load_config_from_env()?;

    let mut shell = Shell::from_env();
    if let Some(path) = &config.log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        logger::init(file, logger::level_filter(config.level_filter()?));
        shell.set_sink(Sink::global());
    }
    shell.apply_config(&config);

    match shell.delegate() {
        Ok(status) => Ok(ExitCode::from(clamp_status(status))),
        Err(ShellError::Usage(e)) => e.exit(),
        Err(e) => Err(e.into()),
    }
}
