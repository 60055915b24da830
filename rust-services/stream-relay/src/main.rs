//! Stream Relay
//!
//! Reads control commands from stdin and relays media to live ingest
//! endpoints, one encoder per destination.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use anyhow::Result;
use relay_config::RelayConfig;
use relay_logging::init_from_config;
use relay_types::Requester;
use std::sync::Arc;
use stream_relay::{Command, Console, LogNotifier, MemoryStatsStore, StreamRunner};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = RelayConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    init_from_config("stream-relay", &config);

    info!(
        ingest_base_url = %config.ingest.base_url,
        ffmpeg = %config.encoder.ffmpeg_path,
        preconfigured_keys = config.ingest.initial_keys.len(),
        stop_grace_secs = config.encoder.stop_grace.as_secs(),
        "Configuration loaded"
    );

    let stats = Arc::new(MemoryStatsStore::new());
    let runner = StreamRunner::new(&config, Arc::new(LogNotifier::new()), stats.clone());
    let console = Console::new(
        runner.clone(),
        stats,
        Requester::new(config.owner.user_id, config.owner.username.clone()),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!("Stream Relay running. Type help for commands, Ctrl+C to stop.");
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let quit = matches!(line.parse::<Command>(), Ok(Command::Quit));
                    println!("{}", console.handle_line(&line).await);
                    if quit {
                        break;
                    }
                }
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read command");
                    break;
                }
            },
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Shutdown signal received, initiating graceful shutdown"),
                    Err(err) => warn!(error = %err, "Unable to listen for shutdown signal"),
                }
                break;
            }
        }
    }

    // Stop every encoder so no process outlives the relay
    runner.shutdown().await;
    info!("Stream Relay stopped");

    Ok(())
}
