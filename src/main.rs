//! parafetch CLI binary
//!
//! Parses arguments, initializes logging, runs the download, and maps the
//! outcome to the process exit status: 0 on success, 1 on any failure,
//! including invalid arguments.

use std::process;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::info;

use parafetch::cli::{self, Cli};
use parafetch::logging::{self, LogOptions};

#[tokio::main]
async fn main() {
    // clap's own exit code for bad arguments is 2; this tool promises 1
    // for every failure, with help and version exiting 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let code = match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = error.print();
            process::exit(code);
        }
    };

    logging::init(LogOptions {
        level: cli.log_level(),
        dir: None,
    });
    info!("parafetch v{} starting", parafetch::VERSION);

    if let Err(error) = cli::run(cli).await {
        eprintln!("Error: {error}");
        process::exit(1);
    }
}
