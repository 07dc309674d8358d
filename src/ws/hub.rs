use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::connctx::{ConnCtx, ConnId};
use super::presence::PresenceRegistry;
use crate::models::{Identity, ServerEvent};

const ROOM_PREFIX: &str = "document:";

/// Document id carried in presence events for a room name.
pub fn document_id_of_room(room: &str) -> String {
    room.strip_prefix(ROOM_PREFIX).unwrap_or(room).to_string()
}

#[derive(Default)]
struct Room {
    members: HashMap<ConnId, ConnCtx>,
    /// Set once the room has been removed from the hub; late joiners retry.
    closed: bool,
}

impl Room {
    fn member_identities(&self) -> Vec<String> {
        self.members
            .values()
            .map(|m| m.identity.id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn fan_out(&self, except: Option<ConnId>, event: &ServerEvent) -> usize {
        let mut delivered = 0;
        for (conn_id, member) in self.members.iter() {
            if Some(*conn_id) == except {
                continue;
            }
            if member.send(event.clone()) {
                delivered += 1;
            } else {
                debug!("Skipping closed outbound queue of connection {}", conn_id);
            }
        }
        delivered
    }
}

/// Result of a join call.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub newly_joined: bool,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HubStats {
    pub connections: usize,
    pub rooms: usize,
    pub present_connections: usize,
}

/// Room membership and fan-out for every live connection of this process.
///
/// Each room sits behind its own mutex; fan-out happens while that lock is
/// held and only pushes into unbounded per-connection queues, so all members
/// of a room observe its events in the same order without any socket write
/// happening under the lock.
#[derive(Default)]
pub struct RoomHub {
    rooms: DashMap<String, Arc<Mutex<Room>>>,
    presence: PresenceRegistry,
    connections: DashMap<ConnId, Identity>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly authenticated connection.
    pub fn register(&self, conn: &ConnCtx) {
        self.connections.insert(conn.conn_id, conn.identity.clone());
        info!("Connection {} registered for {}", conn.conn_id, conn.identity.id);
    }

    /// Add `conn` to `room`.
    ///
    /// Membership is idempotent, but every call answers the joiner with a
    /// fresh `presence-update` and announces `member-joined` to the others.
    pub async fn join(&self, conn: &ConnCtx, room_name: &str) -> JoinOutcome {
        let document_id = document_id_of_room(room_name);
        loop {
            let room = self
                .rooms
                .entry(room_name.to_string())
                .or_default()
                .value()
                .clone();

            let mut room = room.lock().await;
            if room.closed {
                continue;
            }

            let newly_joined = room.members.insert(conn.conn_id, conn.clone()).is_none();
            self.presence.add(conn.conn_id, room_name);

            let members = room.member_identities();
            conn.send(ServerEvent::PresenceUpdate {
                document_id: document_id.clone(),
                member_identities: members.clone(),
            });

            room.fan_out(
                Some(conn.conn_id),
                &ServerEvent::MemberJoined {
                    identity: conn.identity.id.clone(),
                    document_id: document_id.clone(),
                },
            );
            debug!("{} joined {} ({} members)", conn.identity.id, room_name, room.members.len());

            return JoinOutcome { newly_joined, members };
        }
    }

    /// Remove `conn_id` from `room_name`. Leaving a room the connection is not
    /// in has no effect and notifies nobody. `member-left` goes out only when
    /// no other connection of the same identity remains in the room.
    pub async fn leave(&self, conn_id: ConnId, room_name: &str) -> bool {
        let room_arc = match self.rooms.get(room_name) {
            Some(room) => room.value().clone(),
            None => return false,
        };

        let mut room = room_arc.lock().await;
        let member = match room.members.remove(&conn_id) {
            Some(member) => member,
            None => return false,
        };
        self.presence.remove(conn_id, room_name);

        let still_present = room.members.values().any(|m| m.identity.id == member.identity.id);
        if still_present {
            debug!("{} left {} from one connection, still present", member.identity.id, room_name);
        } else {
            room.fan_out(
                Some(conn_id),
                &ServerEvent::MemberLeft {
                    identity: member.identity.id.clone(),
                    document_id: document_id_of_room(room_name),
                },
            );
            debug!("{} left {}", member.identity.id, room_name);
        }

        if room.members.is_empty() {
            room.closed = true;
            self.rooms.remove_if(room_name, |_, r| Arc::ptr_eq(r, &room_arc));
            debug!("Room {} is empty and was released", room_name);
        }
        true
    }

    /// Deliver to every member of the room except `sender`.
    pub async fn broadcast_to_others(&self, sender: ConnId, room_name: &str, event: ServerEvent) -> usize {
        self.broadcast(Some(sender), room_name, event).await
    }

    /// Deliver to every member of the room, origin included.
    pub async fn broadcast_to_all(&self, room_name: &str, event: ServerEvent) -> usize {
        self.broadcast(None, room_name, event).await
    }

    async fn broadcast(&self, except: Option<ConnId>, room_name: &str, event: ServerEvent) -> usize {
        let room = match self.rooms.get(room_name) {
            Some(room) => room.value().clone(),
            None => return 0,
        };
        let room = room.lock().await;
        room.fan_out(except, &event)
    }

    /// Distinct identities currently in the room, sorted.
    pub async fn current_members(&self, room_name: &str) -> Vec<String> {
        let room = match self.rooms.get(room_name) {
            Some(room) => room.value().clone(),
            None => return Vec::new(),
        };
        let room = room.lock().await;
        room.member_identities()
    }

    /// Rooms the registry records for a connection.
    pub fn rooms_of(&self, conn_id: ConnId) -> Vec<String> {
        self.presence.rooms_of(conn_id)
    }

    #[cfg(test)]
    pub fn is_present(&self, conn_id: ConnId, room_name: &str) -> bool {
        self.presence.contains(conn_id, room_name)
    }

    /// Tear down everything a connection left behind. Remaining members of
    /// each of its rooms receive `member-left`. Safe to call more than once.
    pub async fn disconnect(&self, conn_id: ConnId) -> Vec<String> {
        let rooms = self.rooms_of(conn_id);
        for room in rooms.iter() {
            self.leave(conn_id, room).await;
        }
        self.presence.clear(conn_id);

        if let Some((_, identity)) = self.connections.remove(&conn_id) {
            info!("Connection {} of {} closed, left {} room(s)", conn_id, identity.id, rooms.len());
        }
        rooms
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            rooms: self.rooms.len(),
            present_connections: self.presence.len(),
        }
    }
}
