//! todo - offline-first task list CLI
//!
//! Merges a read-only remote todo list with local additions, edits and
//! deletions persisted on this device.

use clap::Parser;
use todo_sync::cli::Cli;
use todo_sync::output::{emit_error, infer_command_name_from_args};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging() {
    // Silent unless RUST_LOG parses; stdout is reserved for command output.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn main() {
    init_logging();

    let command = infer_command_name_from_args();
    let cli = Cli::parse();
    let json = cli.json;
    let Err(err) = cli.run() else {
        return;
    };
    let _ = emit_error(&command, &err, json);
    std::process::exit(err.exit_code());
}
