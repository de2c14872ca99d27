//! Client CLI: one request/response exchange per invocation
//! against the real-time peer's tty endpoint, via `dmxgw_client::Client`.
//! Small enough to stay in one file.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dmxgw_client::{Client, ClientError};
use serde_json::json;

#[derive(Parser)]
#[command(name = "dmxctl")]
#[command(about = "control a DMX512 real-time engine over its tty endpoint")]
struct Cli {
    /// tty endpoint of the real-time peer.
    #[arg(short, long, default_value = "/dev/ttyRPMSG0")]
    device: String,

    /// Emit machine-readable JSON on stdout instead of plain text.
    #[arg(long)]
    json: bool,

    /// Suppress non-error output.
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start DMX transmission.
    Enable,
    /// Stop DMX transmission.
    Disable,
    /// Set every channel to 0.
    Blackout,
    /// Set one or more consecutive channels starting at `slot`.
    Set {
        /// First channel slot, 1-512.
        slot: u16,
        /// Comma-separated channel values, e.g. "255,128,0".
        values: String,
    },
    /// Report engine status: enabled, frame count, frames per second.
    Status,
    /// Read or set refresh rate and BREAK/MAB timing.
    Timing {
        /// Refresh rate in Hz. Omit to read current timing.
        hz: Option<u16>,
        /// BREAK duration in microseconds.
        #[arg(requires = "hz")]
        r#break: Option<u16>,
        /// MAB duration in microseconds.
        #[arg(requires = "break")]
        mab: Option<u16>,
    },
}

/// Everything that can go wrong running one invocation: either the
/// client call itself failed, or an argument couldn't be parsed.
#[derive(Debug)]
enum CliError {
    Client(ClientError),
    BadValues(String),
    SlotRange(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client(e) => write!(f, "{e}"),
            Self::BadValues(raw) => write!(f, "not a comma-separated list of byte values: {raw:?}"),
            Self::SlotRange(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<ClientError> for CliError {
    fn from(e: ClientError) -> Self {
        Self::Client(e)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                println!("{}", json!({"status": "error", "error": e.to_string()}));
            } else {
                eprintln!("dmxctl: {e}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let mut client = Client::open(&cli.device)?.with_timeout(Duration::from_secs(1));

    match &cli.command {
        Commands::Enable => {
            client.enable()?;
            ok(cli, json!({"status": "ok"}), "enabled");
        }
        Commands::Disable => {
            client.disable()?;
            ok(cli, json!({"status": "ok"}), "disabled");
        }
        Commands::Blackout => {
            client.blackout()?;
            ok(cli, json!({"status": "ok"}), "blackout");
        }
        Commands::Set { slot, values } => {
            let parsed = parse_values(values)?;
            if *slot == 0 || *slot as usize + parsed.len() - 1 > 512 {
                return Err(CliError::SlotRange(format!("slot {slot} out of DMX range 1..=512")));
            }
            client.set_channels(slot - 1, &parsed)?;
            ok(cli, json!({"status": "ok"}), &format!("set {} value(s) starting at slot {slot}", parsed.len()));
        }
        Commands::Status => {
            let status = client.status()?;
            let fps = status.fps_x100 as f64 / 100.0;
            ok(
                cli,
                json!({
                    "status": "ok",
                    "enabled": status.enabled,
                    "frame_count": status.frame_count,
                    "fps": fps,
                }),
                &format!("enabled={} frame_count={} fps={fps:.2}", status.enabled, status.frame_count),
            );
        }
        Commands::Timing { hz, r#break, mab } => {
            if let Some(hz) = hz {
                client.set_timing(*hz, r#break.unwrap_or(0), mab.unwrap_or(0))?;
                ok(cli, json!({"status": "ok"}), "timing updated");
            } else {
                let timing = client.get_timing()?;
                ok(
                    cli,
                    json!({
                        "status": "ok",
                        "refresh_hz": timing.refresh_hz,
                        "break_us": timing.break_us,
                        "mab_us": timing.mab_us,
                    }),
                    &format!("refresh_hz={} break_us={} mab_us={}", timing.refresh_hz, timing.break_us, timing.mab_us),
                );
            }
        }
    }
    Ok(())
}

fn parse_values(raw: &str) -> Result<Vec<u8>, CliError> {
    raw.split(',')
        .map(|v| v.trim().parse::<u8>().map_err(|_| CliError::BadValues(raw.to_string())))
        .collect()
}

fn ok(cli: &Cli, payload: serde_json::Value, text: &str) {
    if cli.json {
        println!("{payload}");
    } else if !cli.quiet {
        println!("{text}");
    }
}
