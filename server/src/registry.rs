//! Per-game-type room registry.
//!
//! Owns every live room, keyed by game type and room id. Room ids are
//! timestamp-derived tokens with a monotonic sequence suffix; the suffix is
//! what actually guarantees uniqueness, the timestamp just keeps ids readable
//! and roughly ordered.

use crate::room::{Room, RoomId};
use log::info;
use shared::GameType;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

pub struct RoomRegistry {
    rooms: HashMap<GameType, HashMap<RoomId, Room>>,
    next_room_seq: u64,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        let mut rooms = HashMap::new();
        for game_type in GameType::ALL {
            rooms.insert(game_type, HashMap::new());
        }
        Self {
            rooms,
            next_room_seq: 0,
        }
    }

    /// Returns a room with a free seat, creating a fresh one when every room
    /// of this game type is full. Which joinable room is returned when there
    /// are several is unspecified.
    pub fn find_or_create(&mut self, game_type: GameType) -> &mut Room {
        let RoomRegistry {
            rooms,
            next_room_seq,
        } = self;
        let table = rooms.entry(game_type).or_default();

        let id = match table.iter().find(|(_, room)| !room.is_full()) {
            Some((id, _)) => id.clone(),
            None => {
                *next_room_seq += 1;
                let id = format!("{}-{}", timestamp_ms(), next_room_seq);
                info!("Created {} room {}", game_type.as_str(), id);
                id
            }
        };

        table
            .entry(id)
            .or_insert_with_key(|id| Room::new(id.clone(), game_type))
    }

    pub fn room(&self, game_type: GameType, room_id: &str) -> Option<&Room> {
        self.rooms.get(&game_type)?.get(room_id)
    }

    pub fn room_mut(&mut self, game_type: GameType, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(&game_type)?.get_mut(room_id)
    }

    pub fn remove_room(&mut self, game_type: GameType, room_id: &str) -> Option<Room> {
        let removed = self.rooms.get_mut(&game_type)?.remove(room_id);
        if removed.is_some() {
            info!("Removed {} room {}", game_type.as_str(), room_id);
        }
        removed
    }

    pub fn room_count(&self, game_type: GameType) -> usize {
        self.rooms.get(&game_type).map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_two_joins_share_a_room() {
        let mut registry = RoomRegistry::new();

        let first = registry.find_or_create(GameType::PingPong);
        first.seat_player(1);
        let first_id = first.id.clone();

        let second = registry.find_or_create(GameType::PingPong);
        assert_eq!(second.id, first_id);
        second.seat_player(2);

        // Third join gets a new, distinct room
        let third = registry.find_or_create(GameType::PingPong);
        assert_ne!(third.id, first_id);
        assert_eq!(registry.room_count(GameType::PingPong), 2);
    }

    #[test]
    fn test_registries_are_per_game_type() {
        let mut registry = RoomRegistry::new();

        let pong = registry.find_or_create(GameType::PingPong);
        pong.seat_player(1);
        let pong_id = pong.id.clone();

        let tetris = registry.find_or_create(GameType::Tetris);
        assert_ne!(tetris.id, pong_id);

        assert_eq!(registry.room_count(GameType::PingPong), 1);
        assert_eq!(registry.room_count(GameType::Tetris), 1);
        assert_eq!(registry.room_count(GameType::Racing), 0);
    }

    #[test]
    fn test_room_ids_unique_within_game_type() {
        let mut registry = RoomRegistry::new();
        let mut ids = Vec::new();

        for connection in 0..10u32 {
            let room = registry.find_or_create(GameType::Racing);
            room.seat_player(connection * 2);
            room.seat_player(connection * 2 + 1);
            ids.push(room.id.clone());
        }

        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[test]
    fn test_remove_room() {
        let mut registry = RoomRegistry::new();
        let id = registry.find_or_create(GameType::Tetris).id.clone();

        assert!(registry.remove_room(GameType::Tetris, &id).is_some());
        assert!(registry.room(GameType::Tetris, &id).is_none());
        assert!(registry.remove_room(GameType::Tetris, &id).is_none());
    }

    #[test]
    fn test_lookup_missing_room() {
        let registry = RoomRegistry::new();
        assert!(registry.room(GameType::PingPong, "nope").is_none());
    }
}
