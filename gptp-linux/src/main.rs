use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use gptp_linux::{
    config::Config,
    daemon,
    logging::{tracing_init, LogLevel},
};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file to use
    #[clap(long, short = 'c', default_value = "/etc/gptp/gptp.toml")]
    config: PathBuf,

    /// Overrides the log level of the configuration file
    #[clap(long, short = 'l', value_enum)]
    log_level: Option<LogLevel>,

    /// Validate the configuration file and exit
    #[clap(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Could not load {}: {}", args.config.display(), error);
            return ExitCode::FAILURE;
        }
    };

    if args.check {
        return match config.engine_config() {
            Ok(_) => {
                println!("{} is valid", args.config.display());
                ExitCode::SUCCESS
            }
            Err(error) => {
                eprintln!("{}: {}", args.config.display(), error);
                ExitCode::FAILURE
            }
        };
    }

    if let Err(error) = tracing_init(args.log_level.unwrap_or(config.log_level)) {
        eprintln!("Could not set up logging: {}", error);
        return ExitCode::FAILURE;
    }
    config.warn_when_unreasonable();

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    match daemon::run(config, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{}", error);
            ExitCode::FAILURE
        }
    }
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let (mut interrupt, mut terminate) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(interrupt), Ok(terminate)) => (interrupt, terminate),
        (Err(error), _) | (_, Err(error)) => {
            tracing::error!("Could not install signal handlers: {}", error);
            return;
        }
    };

    tokio::select! {
        _ = interrupt.recv() => tracing::info!("Received SIGINT"),
        _ = terminate.recv() => tracing::info!("Received SIGTERM"),
    }
    cancel.cancel();
}
