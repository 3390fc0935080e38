//! Session orchestration: matchmaking, input relay, tick gating, disconnects.
//!
//! The `Matchmaker` owns the room registry plus a connection-to-seat index
//! and is the single place where session state is mutated. Every operation
//! runs to completion and returns delivery instructions instead of doing any
//! I/O, so the whole session core can be driven synchronously from tests.

use crate::registry::RoomRegistry;
use crate::room::{Outbound, RoomId};
use log::{debug, info};
use rand::Rng;
use shared::{Board, ConnectionId, GameType, Packet, RacerState, Scores};
use std::collections::HashMap;

/// Where a connection is currently seated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatAssignment {
    pub game_type: GameType,
    pub room_id: RoomId,
    pub seat: usize,
}

/// Result of a join: where the player landed and what to send.
#[derive(Debug)]
pub struct JoinOutcome {
    pub room_id: RoomId,
    pub seat: usize,
    /// True when this join filled the room and a simulation tick chain must
    /// be started for it.
    pub start_simulation: bool,
    pub outbound: Vec<Outbound>,
}

/// Result of one simulation tick iteration.
#[derive(Debug)]
pub struct TickOutcome {
    pub outbound: Option<Outbound>,
    /// False once the room is gone or no longer has two players; the tick
    /// chain must stop permanently.
    pub keep_running: bool,
}

pub struct Matchmaker {
    registry: RoomRegistry,
    seats: HashMap<ConnectionId, SeatAssignment>,
}

impl Default for Matchmaker {
    fn default() -> Self {
        Self::new()
    }
}

impl Matchmaker {
    pub fn new() -> Self {
        Self {
            registry: RoomRegistry::new(),
            seats: HashMap::new(),
        }
    }

    /// Seats `connection` into a joinable room, creating one if needed.
    /// Always succeeds: the worst case is a fresh room with one player.
    pub fn join(&mut self, game_type: GameType, connection: ConnectionId) -> JoinOutcome {
        let room = self.registry.find_or_create(game_type);
        let seat = match room.seat_player(connection) {
            Some(seat) => seat,
            None => unreachable!("registry only hands out rooms with a free seat"),
        };
        let room_id = room.id.clone();

        info!(
            "Connection {} joined {} room {} as seat {}",
            connection,
            game_type.as_str(),
            room_id,
            seat
        );

        let mut outbound = vec![Outbound::Single {
            to: connection,
            packet: Packet::GameId {
                game_id: room_id.clone(),
                game_type,
            },
        }];

        let mut start_simulation = false;
        if room.is_full() {
            outbound.push(Outbound::Group {
                to: room.occupants(),
                packet: Packet::StartGame,
            });
            if game_type.has_simulation() && !room.sim_running {
                room.sim_running = true;
                start_simulation = true;
            }
        }

        self.seats.insert(
            connection,
            SeatAssignment {
                game_type,
                room_id: room_id.clone(),
                seat,
            },
        );

        JoinOutcome {
            room_id,
            seat,
            start_simulation,
            outbound,
        }
    }

    /// Paddle relay. A stale `game_id` is a silent no-op.
    pub fn move_paddle(&mut self, game_id: &str, x: f32) -> Vec<Outbound> {
        match self.registry.room_mut(GameType::PingPong, game_id) {
            Some(room) => match room.paddle_update(x) {
                Some(packet) => vec![Outbound::Group {
                    to: room.occupants(),
                    packet,
                }],
                None => Vec::new(),
            },
            None => {
                debug!("Dropped paddle input for unknown room {}", game_id);
                Vec::new()
            }
        }
    }

    /// Client-reported score overwrite for the ball game, relayed unchecked.
    pub fn score_update(&mut self, game_id: &str, scores: Scores) -> Vec<Outbound> {
        match self.registry.room_mut(GameType::PingPong, game_id) {
            Some(room) => match room.overwrite_scores(scores) {
                Some(packet) => vec![Outbound::Group {
                    to: room.occupants(),
                    packet,
                }],
                None => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    /// Tetris board relay. Unknown room or unseated reporter: no-op.
    pub fn tetris_board(
        &mut self,
        game_id: &str,
        connection: ConnectionId,
        board: Board,
        score: u32,
        game_over: bool,
    ) -> Vec<Outbound> {
        let Some(room) = self.registry.room_mut(GameType::Tetris, game_id) else {
            debug!("Dropped board update for unknown room {}", game_id);
            return Vec::new();
        };
        let Some(seat) = room.seat_of(connection) else {
            return Vec::new();
        };
        room.store_board(seat, board, score, game_over)
    }

    /// Racing position relay. Unknown room or unseated reporter: no-op.
    pub fn racing_position(
        &mut self,
        game_id: &str,
        connection: ConnectionId,
        position: RacerState,
        score: u32,
        game_over: bool,
    ) -> Vec<Outbound> {
        let Some(room) = self.registry.room_mut(GameType::Racing, game_id) else {
            debug!("Dropped racing update for unknown room {}", game_id);
            return Vec::new();
        };
        let Some(seat) = room.seat_of(connection) else {
            return Vec::new();
        };
        room.store_racer(seat, position, score, game_over)
    }

    /// One iteration of a room's simulation tick chain. The chain calls this
    /// at its fixed rate; the gate check happens here so the chain itself
    /// stays trivial. Once this returns `keep_running: false` the chain must
    /// never call again for this room.
    pub fn tick(
        &mut self,
        game_type: GameType,
        room_id: &str,
        rng: &mut impl Rng,
    ) -> TickOutcome {
        let Some(room) = self.registry.room_mut(game_type, room_id) else {
            return TickOutcome {
                outbound: None,
                keep_running: false,
            };
        };

        if !room.is_full() {
            room.sim_running = false;
            return TickOutcome {
                outbound: None,
                keep_running: false,
            };
        }

        let outbound = room.tick(rng).map(|packet| Outbound::Group {
            to: room.occupants(),
            packet,
        });

        TickOutcome {
            outbound,
            keep_running: true,
        }
    }

    /// Disconnect cleanup. Vacates the connection's seat; deletes the room
    /// the moment it becomes empty (the tick chain halts on its next
    /// self-check), otherwise notifies the remaining player. The room itself
    /// stays joinable for a future player.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Vec<Outbound> {
        let Some(assignment) = self.seats.remove(&connection) else {
            return Vec::new();
        };

        let Some(room) = self
            .registry
            .room_mut(assignment.game_type, &assignment.room_id)
        else {
            return Vec::new();
        };

        if !room.remove_player(connection) {
            return Vec::new();
        }
        info!(
            "Connection {} left {} room {}",
            connection,
            assignment.game_type.as_str(),
            assignment.room_id
        );

        if room.is_empty() {
            self.registry
                .remove_room(assignment.game_type, &assignment.room_id);
            Vec::new()
        } else {
            vec![Outbound::Group {
                to: room.occupants(),
                packet: Packet::PlayerDisconnected,
            }]
        }
    }

    pub fn room_count(&self, game_type: GameType) -> usize {
        self.registry.room_count(game_type)
    }

    pub fn seat_assignment(&self, connection: ConnectionId) -> Option<&SeatAssignment> {
        self.seats.get(&connection)
    }

    #[cfg(test)]
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }
}
