//! Headless streamer.
//!
//! Usage: `streamer <profile.json>`. Starts the profile's stream, prints
//! coordinator events, and reads line commands from stdin until `quit`,
//! end of input or Ctrl-C.

mod commands;
mod config;

use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamer_engine::StreamCoordinator;
use streamer_ipc::StreamEvent;

use crate::commands::{describe, parse_line, Input, HELP};
use crate::config::StreamProfile;

fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "streamer=info,streamer_engine=debug,streamer_transport=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Print events until the coordinator closes the bus.
fn spawn_event_printer(events: Receiver<StreamEvent>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for event in events.iter() {
            println!("{}", describe(&event));
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: streamer <profile.json>")?;
    let profile = StreamProfile::load(&path)?;
    let settings = profile.resolved_settings();

    let coordinator = StreamCoordinator::new();
    let printer = spawn_event_printer(coordinator.subscribe());

    info!(transport = %profile.transport.kind(), profile = %path.display(), "Streamer starting");
    if let Err(e) = coordinator
        .start(profile.transport.clone(), settings.clone())
        .await
    {
        error!(error = %e, "Failed to start stream");
        coordinator.destroy().await;
        if printer.join().is_err() {
            warn!("Event printer panicked");
        }
        return Err(e.into());
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else {
            break;
        };

        let result = match parse_line(&line) {
            Ok(None) => continue,
            Ok(Some(Input::Quit)) => break,
            Ok(Some(Input::Start)) => {
                coordinator
                    .start(profile.transport.clone(), settings.clone())
                    .await
            }
            Ok(Some(Input::Command(command))) => coordinator.handle_command(command).await,
            Err(e) => {
                eprintln!("{e}; {HELP}");
                continue;
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "Command failed");
        }
    }

    coordinator.destroy().await;
    if printer.join().is_err() {
        warn!("Event printer panicked");
    }
    info!("Streamer exited");
    Ok(())
}
