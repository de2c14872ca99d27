//! Gateway launcher: loads the YAML configuration and either
//! validates it (`check-config`) or starts every configured protocol
//! handler (`run`), handing off into `dmxgw_gateway::run_gateway` on a
//! fresh `tokio::runtime::Runtime`.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dmxgw_core::Config;
use tokio::sync::Notify;

#[derive(Parser)]
#[command(name = "dmxgw")]
#[command(about = "DMX512 gateway: protocol handlers over a real-time DMX engine")]
struct Cli {
    /// Path to the gateway's YAML configuration file.
    #[arg(long, default_value = "/etc/dmxgw/config.yaml")]
    config: String,

    /// Minimum log level: error, warn, info, debug, trace.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway and run until killed.
    Run,
    /// Parse and validate the configuration file, then exit.
    CheckConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level)).init();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("dmxgw: {} is invalid: {e}", cli.config);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::CheckConfig => {
            println!("{} is valid", cli.config);
            ExitCode::SUCCESS
        }
        Commands::Run => {
            log::info!("starting gateway with configuration {}", cli.config);
            let shutdown = Arc::new(Notify::new());
            let signal = shutdown.clone();
            ctrlc::set_handler(move || signal.notify_waiters()).expect("error setting Ctrl+C handler");

            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(dmxgw_gateway::run_gateway(config, shutdown));
            ExitCode::SUCCESS
        }
    }
}
