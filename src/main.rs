//! # datalens command-line entry point
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Install the tracing subscriber (stderr, optional log files)
//!   └─> Run the subcommand on a multi-threaded Tokio runtime
//!         ├─ tools        list the tool descriptions
//!         ├─ run FILE     execute a batch of tool calls
//!         ├─ serve        newline-delimited JSON over stdin/stdout
//!         └─ init-config  write the default configuration
//! ```

#![expect(clippy::print_stdout)] // Allow println! in main binary

mod cli;

use anyhow::Result;
use clap::Parser as _;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    // Guards flush the file writers on drop; hold them until exit.
    let _log_guards = datalens::logging::init(&cli.log_options())?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(cli::run_command(cli))
}
