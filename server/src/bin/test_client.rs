use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use shared::{ClientMessage, Position, Role, ServerMessage};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Minimal client that walks through a session for manual smoke testing
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:10000")]
    server: String,

    /// Display name to join with
    #[arg(short, long, default_value = "tester")]
    name: String,

    /// Seconds to keep printing server events after the script finishes
    #[arg(short, long, default_value = "3")]
    linger: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let url = format!("ws://{}", args.server);
    println!("Connecting to {}", url);
    let (ws_stream, _) = connect_async(&url).await?;
    let (mut sink, mut source) = ws_stream.split();

    let script = vec![
        ClientMessage::Join {
            name: args.name.clone(),
            role: Role::Warrior,
        },
        ClientMessage::Move(Position {
            x: 4.0,
            y: 0.0,
            z: -3.5,
        }),
        ClientMessage::Rotate(90.0),
        ClientMessage::Chat {
            message: format!("hello from {}", args.name),
        },
    ];

    for request in script {
        let text = serde_json::to_string(&request)?;
        println!("-> {}", text);
        sink.send(Message::Text(text.into())).await?;
        sleep(Duration::from_millis(200)).await;
    }

    let deadline = Duration::from_secs(args.linger);
    loop {
        match timeout(deadline, source.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                let parsed = serde_json::from_str::<ServerMessage>(text.as_str());
                match parsed {
                    Ok(message) => println!("<- {}: {:?}", message.name(), message),
                    Err(e) => println!("<- unparsable frame ({}): {}", e, text.as_str()),
                }
            }
            Ok(Some(Ok(Message::Close(frame)))) => {
                println!("Server closed the connection: {:?}", frame);
                break;
            }
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(e))) => {
                println!("Connection error: {}", e);
                break;
            }
            Ok(None) => break,
            Err(_) => {
                println!("No events for {}s, disconnecting", args.linger);
                break;
            }
        }
    }

    sink.close().await?;
    Ok(())
}
