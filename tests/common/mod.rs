#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Each test crate uses a different subset of the helpers"
)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use xstream::ws::{ProtocolAdapter, WsError};

/// Instruction pushed to every connected client.
#[derive(Clone, Debug)]
enum ServerCommand {
    Text(String),
    Close,
}

/// Mock WebSocket server.
pub struct MockWsServer {
    pub addr: SocketAddr,
    /// Broadcast commands to ALL connected clients
    command_tx: broadcast::Sender<ServerCommand>,
    /// Every text frame received from any client, heartbeats included
    received_rx: mpsc::UnboundedReceiver<String>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (command_tx, _) = broadcast::channel::<ServerCommand>(100);
        let (received_tx, received_rx) = mpsc::unbounded_channel::<String>();

        let broadcast_tx = command_tx.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };

                let (mut write, mut read) = ws_stream.split();
                let received_tx = received_tx.clone();
                let mut command_rx = broadcast_tx.subscribe();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        drop(received_tx.send(text.to_string()));
                                    }
                                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                    Some(Ok(_)) => {}
                                }
                            }
                            command = command_rx.recv() => {
                                match command {
                                    Ok(ServerCommand::Text(text)) => {
                                        if write.send(Message::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Ok(ServerCommand::Close) => {
                                        let frame = CloseFrame {
                                            code: CloseCode::Away,
                                            reason: "server going away".into(),
                                        };
                                        drop(write.send(Message::Close(Some(frame))).await);
                                        break;
                                    }
                                    Err(_) => break,
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            command_tx,
            received_rx,
        }
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Send a text frame to all connected clients.
    pub fn send(&self, message: &str) {
        drop(self.command_tx.send(ServerCommand::Text(message.to_owned())));
    }

    /// Close every connection with status 1001.
    pub fn close_all(&self) {
        drop(self.command_tx.send(ServerCommand::Close));
    }

    /// Receive the next text frame sent by a client.
    pub async fn recv(&mut self) -> Option<String> {
        timeout(Duration::from_secs(2), self.received_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Receive the next text frame that is not `skip`.
    pub async fn recv_except(&mut self, skip: &str) -> Option<String> {
        loop {
            let text = self.recv().await?;
            if text != skip {
                return Some(text);
            }
        }
    }

    /// Everything received so far, without waiting.
    pub fn drain(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.received_rx.try_recv().ok()).collect()
    }
}

/// Message decoded by [`LineAdapter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    pub channel: String,
    pub payload: String,
}

/// Line protocol for tests.
///
/// - inbound frames hold one `channel:payload` message per line
/// - a payload starting with `error ` is a channel error
/// - subscribe is `SUB <channel> [params..]`, unsubscribe is `UNSUB <channel>`
pub struct LineAdapter;

impl ProtocolAdapter for LineAdapter {
    type Message = Line;

    fn decode_inbound(&self, frame: &str) -> xstream::Result<Vec<Line>> {
        Ok(frame
            .lines()
            .map(|line| match line.split_once(':') {
                Some((channel, payload)) => Line {
                    channel: channel.to_owned(),
                    payload: payload.to_owned(),
                },
                None => Line {
                    channel: String::new(),
                    payload: line.to_owned(),
                },
            })
            .collect())
    }

    fn channel_key(&self, message: &Line) -> xstream::Result<String> {
        if message.channel.is_empty() {
            return Err(WsError::ChannelDecode(message.payload.clone()).into());
        }
        Ok(message.channel.clone())
    }

    fn subscribe_command(&self, channel: &str, params: &[String]) -> xstream::Result<String> {
        let mut command = format!("SUB {channel}");
        for param in params {
            command.push(' ');
            command.push_str(param);
        }
        Ok(command)
    }

    fn unsubscribe_command(&self, channel: &str) -> xstream::Result<String> {
        Ok(format!("UNSUB {channel}"))
    }

    fn channel_error(&self, message: &Line) -> Option<WsError> {
        message
            .payload
            .strip_prefix("error ")
            .map(|reason| WsError::ChannelError {
                channel: message.channel.clone(),
                reason: reason.to_owned(),
            })
    }
}
