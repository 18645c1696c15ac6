//! Development client for the contact sentry server.
//!
//! Sends arm/enable commands over WebSocket and prints what the server
//! broadcasts back, so the server can be exercised without a phone app.
//!
//! Usage:
//!   cargo run --bin sentry-client -- arm
//!   cargo run --bin sentry-client -- disable
//!   cargo run --bin sentry-client -- send '{"DEVICE_ARMED": true}'
//!   cargo run --bin sentry-client -- watch

use clap::{Parser, Subcommand};
use contact_sentry::protocol::{InboundMessage, OutboundMessage, encode_inbound};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Default server URL
const DEFAULT_SERVER_URL: &str = "ws://localhost:8888/";

#[derive(Parser)]
#[command(name = "sentry-client")]
#[command(about = "Development client for the contact sentry server")]
struct Cli {
    /// Server WebSocket URL
    #[arg(long, env = "SENTRY_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server: String,

    /// Seconds to wait for the REPLY after sending a command
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Arm monitoring
    Arm,
    /// Disarm monitoring
    Disarm,
    /// Allow the device to report changes
    Enable,
    /// Stop the device from reporting changes
    Disable,
    /// Send a raw JSON payload
    Send {
        /// Payload, e.g. '{"DEVICE_ARMED": true, "DEVICE_ENABLED": true}'
        payload: String,
    },
    /// Print every message the server broadcasts until interrupted
    Watch,
}

impl Commands {
    fn payload(&self) -> Option<String> {
        let message = match self {
            Commands::Arm => InboundMessage {
                armed: Some(true),
                ..Default::default()
            },
            Commands::Disarm => InboundMessage {
                armed: Some(false),
                ..Default::default()
            },
            Commands::Enable => InboundMessage {
                enabled: Some(true),
                ..Default::default()
            },
            Commands::Disable => InboundMessage {
                enabled: Some(false),
                ..Default::default()
            },
            Commands::Send { payload } => return Some(payload.clone()),
            Commands::Watch => return None,
        };
        Some(encode_inbound(&message))
    }
}

fn describe(text: &str) -> String {
    match serde_json::from_str::<OutboundMessage>(text) {
        Ok(OutboundMessage::Notify { open }) => format!("NOTIFY open={:?}", open),
        Ok(OutboundMessage::Reply { armed, enabled }) => {
            format!("REPLY armed={:?} enabled={:?}", armed, enabled)
        }
        Err(_) => format!("unrecognised: {}", text),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    println!("Connecting to {}...", cli.server);

    let (ws_stream, _) = connect_async(&cli.server).await.map_err(|e| {
        eprintln!("Failed to connect to {}", cli.server);
        eprintln!("Make sure the contact sentry server is running and accessible.");
        eprintln!("Error: {}", e);
        e
    })?;

    println!("Connected!");

    let (mut write, mut read) = ws_stream.split();

    let Some(payload) = cli.command.payload() else {
        println!("Watching for updates, press Ctrl+C to exit");
        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let text_str: &str = &text;
                        println!("{}", describe(text_str));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        println!("Server closed connection");
                        break;
                    }
                    Some(Err(e)) => {
                        eprintln!("WebSocket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        let _ = write.close().await;
        return Ok(());
    };

    println!("Sending: {}", payload);
    write.send(Message::Text(payload.into())).await?;

    // Wait for the REPLY; NOTIFYs may arrive first
    let result = tokio::time::timeout(Duration::from_secs(cli.timeout), async {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let text_str: &str = &text;
                    if let Ok(reply @ OutboundMessage::Reply { .. }) =
                        serde_json::from_str::<OutboundMessage>(text_str)
                    {
                        return Some(reply);
                    }
                    println!("Received: {}", describe(text_str));
                }
                Ok(Message::Close(_)) => {
                    println!("Server closed connection");
                    return None;
                }
                Err(e) => {
                    eprintln!("WebSocket error: {}", e);
                    return None;
                }
                _ => {}
            }
        }
        None
    })
    .await;

    match result {
        Ok(Some(OutboundMessage::Reply { armed, enabled })) => {
            println!("Armed: {:?}, enabled: {:?}", armed, enabled);
        }
        Ok(_) => eprintln!("Connection closed before receiving a reply"),
        Err(_) => {
            eprintln!("Timeout waiting for reply");
            eprintln!("The server rejects payloads that are not JSON objects of booleans.");
        }
    }

    let _ = write.close().await;
    Ok(())
}
