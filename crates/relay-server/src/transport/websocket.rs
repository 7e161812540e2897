//! WebSocket listener using tokio-tungstenite.
//!
//! Accepted connections are handed to the server over a channel. Each
//! connection is split: the server's connection task reads frames with
//! [`next_frame`], and [`write_loop`] drains the connection's outbound queue
//! into the socket.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use relay_core::{RelayError, RelayResult};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

pub type WsStream = WebSocketStream<TcpStream>;

/// A handle to an accepted WebSocket connection.
pub struct WebSocketConnection {
    pub ws_stream: WsStream,
    pub remote_addr: SocketAddr,
}

/// Start the WebSocket listener.
///
/// Returns the bound address (useful when binding port 0) and a receiver
/// that yields accepted connections.
pub async fn start_listener(
    bind_addr: SocketAddr,
) -> RelayResult<(SocketAddr, mpsc::Receiver<WebSocketConnection>)> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| RelayError::Transport(format!("WS bind failed: {e}")))?;
    let local_addr = tcp_listener.local_addr()?;

    info!(addr = %local_addr, "WebSocket listener started");

    let (tx, rx) = mpsc::channel::<WebSocketConnection>(64);

    tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        match tokio_tungstenite::accept_async(stream).await {
                            Ok(ws_stream) => {
                                debug!(remote = %addr, "WebSocket connection accepted");
                                let conn = WebSocketConnection {
                                    ws_stream,
                                    remote_addr: addr,
                                };
                                if tx.send(conn).await.is_err() {
                                    warn!("WebSocket connection channel closed");
                                }
                            }
                            Err(e) => {
                                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
            if tx.is_closed() {
                debug!("server stopped accepting, listener exiting");
                break;
            }
        }
    });

    Ok((local_addr, rx))
}

/// One inbound unit of interest to the relay.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
    /// A data frame over the size limit; its length in bytes.
    Oversized(usize),
}

/// Receive the next frame the relay cares about.
///
/// Returns `None` once the peer closes. Control frames are skipped;
/// tungstenite answers pings itself.
pub async fn next_frame(
    stream: &mut SplitStream<WsStream>,
    max_frame_bytes: usize,
) -> RelayResult<Option<Inbound>> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if text.len() > max_frame_bytes {
                    return Ok(Some(Inbound::Oversized(text.len())));
                }
                return Ok(Some(Inbound::Text(text)));
            }
            Some(Ok(Message::Binary(data))) => {
                if data.len() > max_frame_bytes {
                    return Ok(Some(Inbound::Oversized(data.len())));
                }
                return Ok(Some(Inbound::Binary(data)));
            }
            Some(Ok(Message::Close(_))) => return Ok(None),
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                return Err(RelayError::Transport(format!("WS recv failed: {e}")));
            }
            None => return Ok(None),
        }
    }
}

/// Drain `rx` into the socket until the queue closes or a write fails.
///
/// Frames are written in queue order.
pub async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::Receiver<Message>,
    conn_id: u64,
) {
    while let Some(message) = rx.recv().await {
        if let Err(e) = sink.send(message).await {
            debug!(conn = conn_id, error = %e, "WS send failed, writer exiting");
            break;
        }
    }
    let _ = sink.close().await;
}
