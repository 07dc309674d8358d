use dashmap::DashMap;
use std::collections::HashSet;

use super::connctx::ConnId;

/// Which rooms each live connection occupies.
///
/// Keyed by connection rather than identity so two tabs of the same user keep
/// independent bookkeeping. An entry only exists while its set is non-empty.
#[derive(Default)]
pub struct PresenceRegistry {
    entries: DashMap<ConnId, HashSet<String>>,
}

impl PresenceRegistry {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `room` for `conn_id`. Returns true if it was not recorded yet.
    pub fn add(&self, conn_id: ConnId, room: &str) -> bool {
        self.entries
            .entry(conn_id)
            .or_default()
            .insert(room.to_string())
    }

    /// Forget `room` for `conn_id`, dropping the entry when it becomes empty.
    pub fn remove(&self, conn_id: ConnId, room: &str) -> bool {
        let removed = match self.entries.get_mut(&conn_id) {
            Some(mut rooms) => rooms.remove(room),
            None => return false,
        };
        self.entries.remove_if(&conn_id, |_, rooms| rooms.is_empty());
        removed
    }

    #[cfg(test)]
    pub fn contains(&self, conn_id: ConnId, room: &str) -> bool {
        self.entries
            .get(&conn_id)
            .map(|rooms| rooms.contains(room))
            .unwrap_or(false)
    }

    /// Rooms recorded for a connection, sorted for stable iteration.
    pub fn rooms_of(&self, conn_id: ConnId) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .entries
            .get(&conn_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    #[cfg(test)]
    pub fn has_entry(&self, conn_id: ConnId) -> bool {
        self.entries.contains_key(&conn_id)
    }

    /// Delete the entry for a connection entirely.
    pub fn clear(&self, conn_id: ConnId) -> Option<HashSet<String>> {
        self.entries.remove(&conn_id).map(|(_, rooms)| rooms)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn entry_lives_only_while_rooms_remain() {
        let registry = PresenceRegistry::new();
        let conn = Uuid::new_v4();

        assert!(registry.add(conn, "document:1"));
        assert!(!registry.add(conn, "document:1"));
        assert!(registry.add(conn, "document:2"));
        assert_eq!(registry.rooms_of(conn), vec!["document:1", "document:2"]);

        assert!(registry.remove(conn, "document:1"));
        assert!(!registry.remove(conn, "document:1"));
        assert!(registry.has_entry(conn));

        assert!(registry.remove(conn, "document:2"));
        assert!(!registry.has_entry(conn));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn connections_are_tracked_independently() {
        let registry = PresenceRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        registry.add(first, "document:1");
        registry.add(second, "document:1");
        registry.clear(first);

        assert!(!registry.contains(first, "document:1"));
        assert!(registry.contains(second, "document:1"));
    }
}
