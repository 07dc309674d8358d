use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connctx::{ConnCtx, ConnId};
use super::hub::RoomHub;
use crate::models::{document_id_of, room_name, ClientEvent, Identity, ServerEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Unauthenticated,
    Active,
    Closed,
}

/// Per-connection dispatcher from inbound events to the hub.
pub struct EventRouter {
    hub: Arc<RoomHub>,
    state: RouterState,
    conn: Option<ConnCtx>,
}

impl EventRouter {
    pub fn new(hub: Arc<RoomHub>) -> Self {
        Self {
            hub,
            state: RouterState::Unauthenticated,
            conn: None,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> RouterState {
        self.state
    }

    pub fn conn_id(&self) -> Option<ConnId> {
        self.conn.as_ref().map(|c| c.conn_id)
    }

    /// Bind an authenticated identity. Only valid from `Unauthenticated`.
    pub fn activate(&mut self, identity: Identity, tx: mpsc::UnboundedSender<ServerEvent>) -> Option<ConnId> {
        if self.state != RouterState::Unauthenticated {
            warn!("Ignoring activation of a router in state {:?}", self.state);
            return None;
        }
        let conn = ConnCtx::new(identity, tx);
        self.hub.register(&conn);
        let conn_id = conn.conn_id;
        self.conn = Some(conn);
        self.state = RouterState::Active;
        Some(conn_id)
    }

    /// Decode a text frame and dispatch it. Undecodable frames are answered
    /// with a local `error` event; the connection stays up.
    pub async fn handle_text(&mut self, text: &str) {
        match ClientEvent::decode(text) {
            Ok(event) => self.dispatch(event).await,
            Err(e) => {
                warn!("Malformed event on connection {:?}: {}", self.conn_id(), e);
                self.reply(ServerEvent::Error { message: e.to_string() });
            }
        }
    }

    pub async fn dispatch(&mut self, event: ClientEvent) {
        let conn = match (&self.state, &self.conn) {
            (RouterState::Active, Some(conn)) => conn.clone(),
            _ => {
                debug!("Dropping event received in state {:?}", self.state);
                return;
            }
        };
        let identity = conn.identity.id.clone();

        match event {
            ClientEvent::JoinRoom(msg) => {
                let Some(document_id) = document_id_of(&msg.document_id) else {
                    conn.send(ServerEvent::Error { message: "documentId is required".to_string() });
                    return;
                };
                let outcome = self.hub.join(&conn, &room_name(&document_id)).await;
                if outcome.newly_joined {
                    info!("{} joined document {} with {:?}", identity, document_id, outcome.members);
                }
            }
            ClientEvent::LeaveRoom(msg) => {
                // Unlike join, a leave without a target is silently dropped.
                let Some(document_id) = document_id_of(&msg.document_id) else {
                    return;
                };
                self.hub.leave(conn.conn_id, &room_name(&document_id)).await;
            }
            ClientEvent::CursorUpdate(msg) => {
                let Some(document_id) = document_id_of(&msg.document_id) else {
                    return;
                };
                self.hub
                    .broadcast_to_others(
                        conn.conn_id,
                        &room_name(&document_id),
                        ServerEvent::CursorUpdate { identity, x: msg.x, y: msg.y },
                    )
                    .await;
            }
            ClientEvent::DocumentUpdated(msg) => {
                let Some(document_id) = document_id_of(&msg.document_id) else {
                    return;
                };
                let room = room_name(&document_id);
                self.hub
                    .broadcast_to_all(
                        &room,
                        ServerEvent::DocumentUpdated {
                            document_id,
                            delta: msg.delta,
                            updated_by: identity,
                            version: None,
                        },
                    )
                    .await;
            }
            ClientEvent::Ping => {
                conn.send(ServerEvent::Pong { date: Utc::now().to_rfc3339() });
            }
        }
    }

    /// Transition to `Closed`, leaving every room. Idempotent.
    pub async fn close(&mut self) {
        if self.state == RouterState::Closed {
            return;
        }
        self.state = RouterState::Closed;
        if let Some(conn) = self.conn.take() {
            let rooms = self.hub.disconnect(conn.conn_id).await;
            info!("Router for {} closed after leaving {:?}", conn.identity.id, rooms);
        }
    }

    fn reply(&self, event: ServerEvent) {
        if let Some(conn) = &self.conn {
            conn.send(event);
        }
    }
}
