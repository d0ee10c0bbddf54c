//! Ephemeral presence state exchanged between peers alongside the
//! CRDT document: identity and cursor only. Rendering the cursor is the
//! external editor host's job; this module only carries the data.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A text cursor/selection expressed as CRDT-relative positions, owned
/// by whichever editor host renders it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub anchor: u32,
    pub head: u32,
}

/// One participant's presence, as seen by every other participant in
/// the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwarenessState {
    pub user_id: String,
    pub name: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// The set of awareness states currently known for a room, keyed by
/// participant id. Updated wholesale on every awareness broadcast;
/// there is no coalescing rule here since presence has no history to
/// preserve, unlike the mutation queue in `gnote_core`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwarenessMap {
    states: HashMap<String, AwarenessState>,
}

impl AwarenessMap {
    pub fn new() -> Self {
        AwarenessMap::default()
    }

    /// Insert or replace a participant's state.
    pub fn set(&mut self, state: AwarenessState) {
        self.states.insert(state.user_id.clone(), state);
    }

    /// Drop a participant, e.g. on disconnect.
    pub fn remove(&mut self, user_id: &str) {
        self.states.remove(user_id);
    }

    pub fn get(&self, user_id: &str) -> Option<&AwarenessState> {
        self.states.get(user_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AwarenessState> {
        self.states.values()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_by_user_id() {
        let mut map = AwarenessMap::new();
        map.set(AwarenessState {
            user_id: "u1".into(),
            name: "Alice".into(),
            color: "#ff0000".into(),
            avatar: None,
            cursor: Some(Cursor { anchor: 0, head: 0 }),
        });
        map.set(AwarenessState {
            user_id: "u1".into(),
            name: "Alice".into(),
            color: "#ff0000".into(),
            avatar: None,
            cursor: Some(Cursor { anchor: 3, head: 5 }),
        });
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("u1").unwrap().cursor, Some(Cursor { anchor: 3, head: 5 }));
    }

    #[test]
    fn remove_drops_the_participant() {
        let mut map = AwarenessMap::new();
        map.set(AwarenessState {
            user_id: "u1".into(),
            name: "Alice".into(),
            color: "#ff0000".into(),
            avatar: None,
            cursor: None,
        });
        map.remove("u1");
        assert!(map.is_empty());
    }
}
