mod client;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::DaemonClient;
use shared::ipc::{Command, Response};
use shared::DetectionMode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "visaid")]
#[command(about = "CLI tool for the visaid assistive perception daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the classifiers and start announcing detections
    Start,
    Stop,
    Toggle,
    Status,
    /// Print the latest raw predictions
    Predictions,
    /// Keep printing predictions until interrupted
    Watch {
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
    /// Set the detection mode used by the next start (combined, object)
    Mode { mode: DetectionMode },
}

fn print_response(response: Response) {
    match response {
        Response::Ok => {
            println!("Success");
        }
        Response::Status(info) => {
            println!("{}", render::status(&info));
        }
        Response::Predictions(snapshot) => {
            println!("{}", render::predictions(&snapshot));
        }
        Response::Error(msg) => {
            eprintln!("Error: {}", msg);
            std::process::exit(1);
        }
    }
}

async fn watch(client: &DaemonClient, interval: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = ticker.tick() => {
                match client.send_command(Command::Predictions).await? {
                    Response::Predictions(snapshot) => {
                        // Clear screen, cursor home
                        print!("\x1b[2J\x1b[H");
                        println!("{}", render::predictions(&snapshot));
                    }
                    other => print_response(other),
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = DaemonClient::new();

    let command = match cli.command {
        Commands::Start => Command::Start,
        Commands::Stop => Command::Stop,
        Commands::Toggle => Command::Toggle,
        Commands::Status => Command::Status,
        Commands::Predictions => Command::Predictions,
        Commands::Mode { mode } => Command::SetMode(mode),
        Commands::Watch { interval_ms } => {
            if let Err(e) = watch(&client, Duration::from_millis(interval_ms.max(1))).await {
                eprintln!("Failed to reach visaidd at {}: {}", client.socket_path().display(), e);
                std::process::exit(1);
            }
            return Ok(());
        }
    };

    match client.send_command(command).await {
        Ok(response) => print_response(response),
        Err(e) => {
            eprintln!("Failed to connect to visaidd: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
