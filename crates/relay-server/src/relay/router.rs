//! Type-driven envelope router.
//!
//! Each inbound envelope is classified by its `type` tag through a
//! [`DispatchTable`]. A tag maps to an ordered list of routes; the first
//! route whose correlating field is present handles the envelope. Anything
//! left over is dropped with a log line and never answered.
//!
//! Two tables ship: [`DispatchTable::app`] for the full application protocol
//! and [`DispatchTable::signaling`] for bare peer signaling.

use super::connection::{BoundIdentity, ConnectionContext, Delivery};
use super::registry::RegisterOutcome;
use super::rooms::{BroadcastReport, RoomKind};
use super::RelayState;
use relay_core::{
    decode_binary, decode_header, frame_encode, normalize, pong_frame, short_identity,
    EnvelopeHeader, MsgType, RelayForward,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which header field carries a declared identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    Username,
    PeerId,
}

impl IdentityField {
    fn read(self, header: &EnvelopeHeader) -> Option<&str> {
        match self {
            IdentityField::Username => header.username.as_deref(),
            IdentityField::PeerId => header.peer_id.as_deref(),
        }
    }
}

/// One way of handling an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Bind the connection's identity.
    Bind(IdentityField),
    /// Answer with a pong on the same connection.
    Ping,
    Join(RoomKind),
    Leave(RoomKind),
    /// Forward unchanged to every other member of the room.
    Broadcast(RoomKind),
    /// Forward unchanged to the connection registered as `to`.
    Unicast,
    /// Forward to `targetPeerId` with the sender's id injected.
    Relay,
}

fn room_key(kind: RoomKind, header: &EnvelopeHeader) -> Option<&str> {
    match kind {
        RoomKind::File => header.file_id.as_deref(),
        RoomKind::Group => header.group_id.as_deref(),
    }
}

/// Mapping from type tag to candidate routes.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    name: &'static str,
    routes: HashMap<MsgType, Vec<Route>>,
}

impl DispatchTable {
    fn empty(name: &'static str) -> Self {
        Self {
            name,
            routes: HashMap::new(),
        }
    }

    fn with(mut self, tags: &[MsgType], routes: &[Route]) -> Self {
        for tag in tags {
            self.routes.insert(*tag, routes.to_vec());
        }
        self
    }

    /// Full application protocol: presence, rooms, chat, file transfer and
    /// friend workflows.
    pub fn app() -> Self {
        use MsgType::*;
        Self::empty("app")
            .with(&[Auth], &[Route::Bind(IdentityField::Username)])
            .with(&[Ping], &[Route::Ping])
            .with(&[JoinFileRoom], &[Route::Join(RoomKind::File)])
            .with(&[LeaveFileRoom], &[Route::Leave(RoomKind::File)])
            .with(&[JoinGroupRoom], &[Route::Join(RoomKind::Group)])
            .with(&[LeaveGroupRoom], &[Route::Leave(RoomKind::Group)])
            .with(&[AnnounceChunk], &[Route::Broadcast(RoomKind::File)])
            .with(
                &[GroupMessage, FileComment, FileTag],
                &[Route::Broadcast(RoomKind::Group)],
            )
            .with(
                &[FileMetadata, FileChunk],
                &[Route::Broadcast(RoomKind::Group), Route::Unicast],
            )
            .with(
                &[
                    Message,
                    Typing,
                    DownloadRequest,
                    GroupInvite,
                    FriendRequest,
                    FriendAccept,
                    FriendReject,
                ],
                &[Route::Unicast],
            )
    }

    /// Bare signaling: `register` and `relay` only, no rooms.
    pub fn signaling() -> Self {
        Self::empty("signaling")
            .with(&[MsgType::Register], &[Route::Bind(IdentityField::PeerId)])
            .with(&[MsgType::Relay], &[Route::Relay])
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Candidate routes for `tag`, in priority order.
    pub fn routes(&self, tag: MsgType) -> &[Route] {
        self.routes.get(&tag).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Why an envelope produced no delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Not a JSON object with a string `type`, or too large.
    Malformed,
    /// Unknown type, or none of its routes had a correlating field.
    Unclassified,
    /// Unicast target not registered or not open.
    NoRecipient,
    /// Broadcast room does not exist.
    NoRoom,
}

/// What the router did with one envelope. For observability and tests only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Bound(RegisterOutcome),
    Pong(Delivery),
    Joined { kind: RoomKind, added: bool },
    Left { kind: RoomKind, removed: bool },
    Broadcast { kind: RoomKind, report: BroadcastReport },
    Unicast(Delivery),
    Dropped(DropReason),
}

/// Routes envelopes for every connection.
#[derive(Debug)]
pub struct Router {
    table: DispatchTable,
    state: Arc<RelayState>,
}

impl Router {
    pub fn new(table: DispatchTable, state: Arc<RelayState>) -> Self {
        Self { table, state }
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// Route one text frame received on `ctx`.
    pub async fn handle_text(&self, ctx: &mut ConnectionContext, frame: &str) -> RouteOutcome {
        self.state.stats.envelope();
        match decode_header(frame) {
            Ok(header) => self.dispatch(ctx, &header, frame).await,
            Err(e) => self.malformed(ctx, &e.to_string()),
        }
    }

    /// Route one binary frame; it must hold a UTF-8 JSON envelope.
    pub async fn handle_binary(&self, ctx: &mut ConnectionContext, frame: &[u8]) -> RouteOutcome {
        self.state.stats.envelope();
        match decode_binary(frame) {
            Ok((text, header)) => self.dispatch(ctx, &header, text).await,
            Err(e) => self.malformed(ctx, &e.to_string()),
        }
    }

    /// Count and log a frame that could not be decoded.
    pub fn malformed(&self, ctx: &ConnectionContext, error: &str) -> RouteOutcome {
        self.state.stats.malformed();
        warn!(conn = ctx.id(), error = %error, "dropping malformed envelope");
        RouteOutcome::Dropped(DropReason::Malformed)
    }

    async fn dispatch(
        &self,
        ctx: &mut ConnectionContext,
        header: &EnvelopeHeader,
        frame: &str,
    ) -> RouteOutcome {
        let Some(msg_type) = header.msg_type() else {
            return self.unclassified(ctx, header);
        };

        for route in self.table.routes(msg_type) {
            match *route {
                Route::Bind(field) => {
                    if let Some(identity) = field.read(header) {
                        return self.bind(ctx, identity).await;
                    }
                }
                Route::Ping => return self.ping(ctx),
                Route::Join(kind) => {
                    if let Some(room) = room_key(kind, header) {
                        return self.join(ctx, kind, room).await;
                    }
                }
                Route::Leave(kind) => {
                    if let Some(room) = room_key(kind, header) {
                        return self.leave(ctx, kind, room).await;
                    }
                }
                Route::Broadcast(kind) => {
                    if let Some(room) = room_key(kind, header) {
                        return self.broadcast(ctx, msg_type, kind, room, frame).await;
                    }
                }
                Route::Unicast => {
                    if let Some(to) = header.to.as_deref() {
                        return self.deliver(ctx, msg_type, to, frame).await;
                    }
                }
                Route::Relay => {
                    if let Some(target) = header.target_peer_id.as_deref() {
                        return self.relay(ctx, target, header).await;
                    }
                }
            }
        }

        self.unclassified(ctx, header)
    }

    async fn bind(&self, ctx: &mut ConnectionContext, declared: &str) -> RouteOutcome {
        let Some(key) = normalize(declared) else {
            debug!(conn = ctx.id(), "blank identity declared");
            self.state.stats.unclassified();
            return RouteOutcome::Dropped(DropReason::Unclassified);
        };

        // A connection re-binding under a new name releases its old one.
        if let Some(prev) = ctx.identity.take() {
            if prev.key != key {
                self.state.registry.unregister(&prev.key, ctx.id()).await;
            }
        }

        let outcome = self
            .state
            .registry
            .register(&key, &ctx.conn)
            .await
            .unwrap_or(RegisterOutcome::New);
        ctx.identity = Some(BoundIdentity {
            declared: declared.to_string(),
            key,
        });
        self.state.stats.control();
        info!(
            conn = ctx.id(),
            identity = %short_identity(declared),
            table = self.table.name(),
            "identity bound"
        );
        RouteOutcome::Bound(outcome)
    }

    fn ping(&self, ctx: &ConnectionContext) -> RouteOutcome {
        self.state.stats.control();
        let delivery = ctx.conn.send_text(&pong_frame());
        debug!(conn = ctx.id(), ?delivery, "ping answered");
        RouteOutcome::Pong(delivery)
    }

    async fn join(&self, ctx: &ConnectionContext, kind: RoomKind, room: &str) -> RouteOutcome {
        self.state.stats.membership();
        let added = self.state.rooms(kind).join(room, &ctx.conn).await;
        RouteOutcome::Joined { kind, added }
    }

    async fn leave(&self, ctx: &ConnectionContext, kind: RoomKind, room: &str) -> RouteOutcome {
        self.state.stats.membership();
        let removed = self.state.rooms(kind).leave(room, ctx.id()).await;
        RouteOutcome::Left { kind, removed }
    }

    async fn broadcast(
        &self,
        ctx: &ConnectionContext,
        msg_type: MsgType,
        kind: RoomKind,
        room: &str,
        frame: &str,
    ) -> RouteOutcome {
        match self.state.rooms(kind).broadcast(room, ctx.id(), frame).await {
            Some(report) => {
                self.state.stats.broadcast(report.delivered, report.skipped);
                debug!(
                    conn = ctx.id(),
                    %msg_type,
                    kind = %kind,
                    room = %room,
                    delivered = report.delivered,
                    skipped = report.skipped,
                    "broadcast"
                );
                RouteOutcome::Broadcast { kind, report }
            }
            None => {
                self.state.stats.no_room();
                debug!(conn = ctx.id(), %msg_type, kind = %kind, room = %room, "broadcast to unknown room dropped");
                RouteOutcome::Dropped(DropReason::NoRoom)
            }
        }
    }

    /// Send `frame` to the open connection registered as `to`.
    async fn deliver(
        &self,
        ctx: &ConnectionContext,
        msg_type: MsgType,
        to: &str,
        frame: &str,
    ) -> RouteOutcome {
        let Some(target) = self.state.registry.lookup(to).await else {
            self.state.stats.no_recipient();
            info!(
                conn = ctx.id(),
                %msg_type,
                to = %short_identity(to),
                "recipient offline or unknown, dropping"
            );
            return RouteOutcome::Dropped(DropReason::NoRecipient);
        };

        let delivery = target.send_text(frame);
        match delivery {
            Delivery::Delivered => {
                self.state.stats.delivered();
                debug!(conn = ctx.id(), %msg_type, to = %short_identity(to), target = target.id(), "delivered");
            }
            Delivery::Dropped(reason) => {
                self.state.stats.send_failed();
                debug!(conn = ctx.id(), %msg_type, to = %short_identity(to), ?reason, "send to recipient failed");
            }
        }
        RouteOutcome::Unicast(delivery)
    }

    async fn relay(
        &self,
        ctx: &ConnectionContext,
        target: &str,
        header: &EnvelopeHeader,
    ) -> RouteOutcome {
        let forward = RelayForward {
            kind: MsgType::Relay,
            sender_peer_id: ctx.identity.as_ref().map(|i| i.declared.as_str()),
            payload: header.payload.as_deref(),
        };
        match frame_encode(&forward) {
            Ok(frame) => self.deliver(ctx, MsgType::Relay, target, &frame).await,
            Err(e) => self.malformed(ctx, &e.to_string()),
        }
    }

    fn unclassified(&self, ctx: &ConnectionContext, header: &EnvelopeHeader) -> RouteOutcome {
        self.state.stats.unclassified();
        info!(
            conn = ctx.id(),
            kind = %header.kind,
            table = self.table.name(),
            "unclassified envelope dropped"
        );
        RouteOutcome::Dropped(DropReason::Unclassified)
    }
}
