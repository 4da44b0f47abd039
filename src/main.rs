//! `hyperadmin <command> [arguments...]`
//!
//! Loads the settings, sets up logging and hands the command line to
//! [`hyperadmin::cli::run`].
use std::env;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use hyperadmin::admin::command_table;
use hyperadmin::cli::run;
use hyperadmin::settings::Settings;

fn main() -> ExitCode {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let fallback = if settings.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with_writer(std::io::stderr)
        .init();

    let line: Vec<String> = env::args().skip(1).collect();
    if line.is_empty() {
        let commands = command_table();
        let names: Vec<&str> = commands.names().collect();
        eprintln!("usage: hyperadmin <command> [arguments...]");
        eprintln!("commands: {}", names.join(", "));
        return ExitCode::FAILURE;
    }
    match run(settings, &line) {
        Ok(output) => {
            for line in output {
                println!("{line}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
