//! Core server: accepts connections and runs one task per connection.
//!
//! Owns the shared relay state, the router for the configured mode, and the
//! lifecycle manager. Each connection task reads frames in order and hands
//! them to the router; a writer task per connection flushes its outbound
//! queue. When the read side ends for any reason the connection is cleaned
//! up immediately; the writer then gets a short window to flush what is
//! queued and finish the close handshake.

use crate::config::{RouterMode, ServerConfig};
use crate::relay::{Connection, DispatchTable, Lifecycle, RelayState, Router};
use crate::transport::websocket::{self, Inbound, WebSocketConnection};
use futures_util::StreamExt;
use relay_core::RelayResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long a closing connection's writer may take to flush before it is
/// aborted.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// The relay server instance.
pub struct RelayServer {
    config: ServerConfig,
    state: Arc<RelayState>,
    router: Router,
    lifecycle: Lifecycle,
    /// Monotonic connection ID counter.
    next_conn_id: AtomicU64,
}

impl RelayServer {
    /// Create a new server instance.
    pub fn new(config: ServerConfig) -> Self {
        let state = Arc::new(RelayState::new());
        let table = match config.mode {
            RouterMode::App => DispatchTable::app(),
            RouterMode::Signaling => DispatchTable::signaling(),
        };
        Self {
            router: Router::new(table, state.clone()),
            lifecycle: Lifecycle::new(state.clone()),
            state,
            config,
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Bind the configured address and serve until the listener stops.
    pub async fn run(self) -> RelayResult<()> {
        let (local_addr, ws_rx) = websocket::start_listener(self.config.bind_addr).await?;
        info!(
            addr = %local_addr,
            mode = self.router.table().name(),
            "relay ready"
        );
        Arc::new(self).serve(ws_rx).await;
        Ok(())
    }

    /// Serve connections from an already-started listener.
    pub async fn serve(self: Arc<Self>, mut ws_rx: mpsc::Receiver<WebSocketConnection>) {
        if self.config.stats_interval > 0 {
            let state = self.state.clone();
            let period = Duration::from_secs(self.config.stats_interval);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                // The first tick fires immediately.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let snap = state.stats.snapshot();
                    let identities = state.registry.count().await;
                    let file_rooms = state.file_rooms.room_count().await;
                    let group_rooms = state.group_rooms.room_count().await;
                    info!(
                        active = snap.connections_active(),
                        identities,
                        file_rooms,
                        group_rooms,
                        envelopes = snap.envelopes,
                        delivered = snap.delivered,
                        dropped_no_recipient = snap.dropped_no_recipient,
                        dropped_no_room = snap.dropped_no_room,
                        dropped_unclassified = snap.dropped_unclassified,
                        dropped_send_failed = snap.dropped_send_failed,
                        malformed = snap.malformed,
                        "relay stats"
                    );
                }
            });
        }

        while let Some(ws_conn) = ws_rx.recv().await {
            let srv = self.clone();
            tokio::spawn(async move {
                srv.handle_websocket(ws_conn).await;
            });
        }
        info!("listener closed, shutting down");
    }

    /// Run one connection from accept to cleanup.
    async fn handle_websocket(&self, conn: WebSocketConnection) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (sink, mut stream) = conn.ws_stream.split();
        let (handle, out_rx) =
            Connection::channel(conn_id, Some(conn.remote_addr), self.config.outbound_queue);
        let writer = tokio::spawn(websocket::write_loop(sink, out_rx, conn_id));

        let mut ctx = self.lifecycle.open(handle);

        loop {
            match websocket::next_frame(&mut stream, self.config.max_frame_bytes).await {
                Ok(Some(Inbound::Text(text))) => {
                    self.router.handle_text(&mut ctx, &text).await;
                }
                Ok(Some(Inbound::Binary(data))) => {
                    self.router.handle_binary(&mut ctx, &data).await;
                }
                Ok(Some(Inbound::Oversized(len))) => {
                    self.router.malformed(
                        &ctx,
                        &format!(
                            "frame too large: {len} bytes (max {})",
                            self.config.max_frame_bytes
                        ),
                    );
                }
                Ok(None) => {
                    debug!(conn = conn_id, "peer closed");
                    break;
                }
                Err(e) => {
                    warn!(conn = conn_id, error = %e, "WebSocket error");
                    break;
                }
            }
        }

        self.lifecycle.close(&ctx).await;

        // The context holds the last sender for the outbound queue. Dropping
        // it lets the writer drain, send the close reply, and exit.
        drop(ctx);
        let abort = writer.abort_handle();
        if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, writer).await.is_err() {
            debug!(conn = conn_id, "writer did not finish flushing, aborting");
            abort.abort();
        }
    }
}
