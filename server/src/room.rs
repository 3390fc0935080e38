//! Room state: one two-player match instance.
//!
//! A room owns everything about its match: the two seats, the score pair and
//! the game-specific sub-state. Relay and tick operations mutate the room and
//! return the messages to deliver; actually sending them is the network
//! layer's job, which keeps this module free of I/O.

use rand::Rng;
use shared::{
    advance_obstacles, Ball, Board, ConnectionId, GameType, Obstacle, Packet, RacerState, Scores,
    OBSTACLE_SPAWN_CHANCE, TRACK_WIDTH,
};

pub type RoomId = String;

/// A delivery instruction produced by a room or matchmaker operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Deliver to a single connection.
    Single {
        to: ConnectionId,
        packet: Packet,
    },
    /// Deliver the same packet to every listed connection.
    Group {
        to: Vec<ConnectionId>,
        packet: Packet,
    },
}

/// Game-specific sub-state, owned exclusively by the room.
#[derive(Debug, Clone)]
enum MatchState {
    PingPong {
        ball: Ball,
    },
    Tetris {
        boards: [Board; 2],
    },
    Racing {
        racers: [RacerState; 2],
        game_over: [bool; 2],
        obstacles: Vec<Obstacle>,
    },
}

impl MatchState {
    fn starting(game_type: GameType) -> Self {
        match game_type {
            GameType::PingPong => MatchState::PingPong { ball: Ball::serve() },
            GameType::Tetris => MatchState::Tetris {
                boards: [Board::new(), Board::new()],
            },
            GameType::Racing => MatchState::Racing {
                racers: [RacerState::starting_line(); 2],
                game_over: [false; 2],
                obstacles: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub game_type: GameType,
    /// Seat slots. A seat keeps its index for as long as it is occupied; a
    /// vacated slot may be handed to a new joiner but never shifts.
    seats: [Option<ConnectionId>; 2],
    pub scores: Scores,
    /// True while a simulation tick chain is running for this room. Prevents
    /// a second chain from being spawned when the room refills before the
    /// running chain has observed the empty seat.
    pub sim_running: bool,
    state: MatchState,
}

impl Room {
    pub fn new(id: RoomId, game_type: GameType) -> Self {
        Self {
            id,
            game_type,
            seats: [None, None],
            scores: Scores::default(),
            sim_running: false,
            state: MatchState::starting(game_type),
        }
    }

    pub fn player_count(&self) -> usize {
        self.seats.iter().filter(|seat| seat.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.player_count() == 2
    }

    pub fn is_empty(&self) -> bool {
        self.player_count() == 0
    }

    /// Connections currently seated, in seat order.
    pub fn occupants(&self) -> Vec<ConnectionId> {
        self.seats.iter().flatten().copied().collect()
    }

    pub fn seat_of(&self, connection: ConnectionId) -> Option<usize> {
        self.seats
            .iter()
            .position(|seat| *seat == Some(connection))
    }

    /// Seats a connection in the lowest free slot. Returns the seat index,
    /// or `None` if the room is already full.
    pub fn seat_player(&mut self, connection: ConnectionId) -> Option<usize> {
        let free = self.seats.iter().position(|seat| seat.is_none())?;
        self.seats[free] = Some(connection);
        Some(free)
    }

    /// Vacates the connection's seat. Returns false if it was not seated.
    pub fn remove_player(&mut self, connection: ConnectionId) -> bool {
        match self.seat_of(connection) {
            Some(seat) => {
                self.seats[seat] = None;
                true
            }
            None => false,
        }
    }

    /// Paddle relay: the reported x goes to the whole room together with the
    /// authoritative ball and the current scores.
    pub fn paddle_update(&self, x: f32) -> Option<Packet> {
        match &self.state {
            MatchState::PingPong { ball } => Some(Packet::UpdateGame {
                opponent_paddle_x: Some(x),
                ball: *ball,
                scores: self.scores,
            }),
            _ => None,
        }
    }

    /// Client-reported score overwrite, relayed unchecked. Scoring in the
    /// ball game is client-authoritative; the server only re-broadcasts.
    pub fn overwrite_scores(&mut self, scores: Scores) -> Option<Packet> {
        match &self.state {
            MatchState::PingPong { ball } => {
                self.scores = scores;
                Some(Packet::UpdateGame {
                    opponent_paddle_x: None,
                    ball: *ball,
                    scores,
                })
            }
            _ => None,
        }
    }

    /// Stores a reported tetris board into `seat`'s slot and builds one
    /// update per occupied seat, each carrying the *other* seat's stored
    /// board. A player never receives their own board back.
    pub fn store_board(
        &mut self,
        seat: usize,
        board: Board,
        score: u32,
        game_over: bool,
    ) -> Vec<Outbound> {
        let MatchState::Tetris { boards } = &mut self.state else {
            return Vec::new();
        };
        boards[seat] = board;
        self.scores.set_seat(seat, score);

        let mut updates = Vec::new();
        for (index, occupant) in self.seats.iter().enumerate() {
            if let Some(connection) = occupant {
                updates.push(Outbound::Single {
                    to: *connection,
                    packet: Packet::UpdateTetris {
                        opponent_board: boards[1 - index].clone(),
                        scores: self.scores,
                        game_over,
                    },
                });
            }
        }
        updates
    }

    /// Stores a reported racing position into `seat`'s slot and builds one
    /// update per occupied seat with the opposing position plus the
    /// server-owned obstacle list.
    pub fn store_racer(
        &mut self,
        seat: usize,
        position: RacerState,
        score: u32,
        game_over: bool,
    ) -> Vec<Outbound> {
        let MatchState::Racing {
            racers,
            game_over: finished,
            obstacles,
        } = &mut self.state
        else {
            return Vec::new();
        };
        racers[seat] = position;
        finished[seat] = game_over;
        self.scores.set_seat(seat, score);

        let mut updates = Vec::new();
        for (index, occupant) in self.seats.iter().enumerate() {
            if let Some(connection) = occupant {
                updates.push(Outbound::Single {
                    to: *connection,
                    packet: Packet::UpdateRacing {
                        opponent_position: Some(racers[1 - index]),
                        obstacles: obstacles.clone(),
                        scores: self.scores,
                        game_over,
                    },
                });
            }
        }
        updates
    }

    /// One simulation step. Returns the broadcast for the whole room, or
    /// `None` for game types without server-owned state. The two-player gate
    /// is the scheduler's responsibility, not this method's.
    pub fn tick(&mut self, rng: &mut impl Rng) -> Option<Packet> {
        match &mut self.state {
            MatchState::PingPong { ball } => {
                ball.advance();
                Some(Packet::UpdateGame {
                    opponent_paddle_x: None,
                    ball: *ball,
                    scores: self.scores,
                })
            }
            MatchState::Racing { obstacles, .. } => {
                if rng.gen_bool(OBSTACLE_SPAWN_CHANCE) {
                    obstacles.push(Obstacle {
                        x: rng.gen_range(0.0..TRACK_WIDTH),
                        y: 0.0,
                    });
                }
                advance_obstacles(obstacles);
                Some(Packet::UpdateRacing {
                    opponent_position: None,
                    obstacles: obstacles.clone(),
                    scores: self.scores,
                    game_over: false,
                })
            }
            MatchState::Tetris { .. } => None,
        }
    }

    #[cfg(test)]
    pub fn ball(&self) -> Option<Ball> {
        match &self.state {
            MatchState::PingPong { ball } => Some(*ball),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn obstacles(&self) -> Option<&[Obstacle]> {
        match &self.state {
            MatchState::Racing { obstacles, .. } => Some(obstacles),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::{BALL_SERVE_X, COURT_HEIGHT, OBSTACLE_FALL_STEP, RACER_START_X, TRACK_LENGTH};

    fn room(game_type: GameType) -> Room {
        Room::new("test-room".to_string(), game_type)
    }

    #[test]
    fn test_new_room_defaults() {
        let pong = room(GameType::PingPong);
        assert_eq!(pong.player_count(), 0);
        assert_eq!(pong.scores, Scores::default());
        assert_eq!(pong.ball().unwrap().x, BALL_SERVE_X);

        let racing = room(GameType::Racing);
        assert!(racing.obstacles().unwrap().is_empty());
    }

    #[test]
    fn test_seating_order() {
        let mut room = room(GameType::PingPong);

        assert_eq!(room.seat_player(10), Some(0));
        assert_eq!(room.seat_player(20), Some(1));
        assert_eq!(room.seat_player(30), None);

        assert!(room.is_full());
        assert_eq!(room.occupants(), vec![10, 20]);
        assert_eq!(room.seat_of(10), Some(0));
        assert_eq!(room.seat_of(20), Some(1));
    }

    #[test]
    fn test_seat_index_stable_after_departure() {
        let mut room = room(GameType::Tetris);
        room.seat_player(10);
        room.seat_player(20);

        assert!(room.remove_player(10));

        // The remaining player keeps seat 1
        assert_eq!(room.seat_of(20), Some(1));
        assert_eq!(room.player_count(), 1);

        // A new joiner takes the vacated seat 0
        assert_eq!(room.seat_player(30), Some(0));
        assert_eq!(room.seat_of(20), Some(1));
    }

    #[test]
    fn test_remove_unseated_player() {
        let mut room = room(GameType::Racing);
        room.seat_player(10);
        assert!(!room.remove_player(99));
        assert_eq!(room.player_count(), 1);
    }

    #[test]
    fn test_paddle_update_carries_ball_and_scores() {
        let mut room = room(GameType::PingPong);
        room.scores = Scores {
            player1: 2,
            player2: 1,
        };

        match room.paddle_update(120.0) {
            Some(Packet::UpdateGame {
                opponent_paddle_x,
                ball,
                scores,
            }) => {
                assert_eq!(opponent_paddle_x, Some(120.0));
                assert_eq!(ball, Ball::serve());
                assert_eq!(scores.player1, 2);
            }
            other => panic!("Unexpected update: {:?}", other),
        }
    }

    #[test]
    fn test_score_overwrite_is_verbatim() {
        let mut room = room(GameType::PingPong);
        let reported = Scores {
            player1: 99,
            player2: 3,
        };

        let packet = room.overwrite_scores(reported).unwrap();

        assert_eq!(room.scores, reported);
        match packet {
            Packet::UpdateGame {
                opponent_paddle_x,
                scores,
                ..
            } => {
                assert_eq!(opponent_paddle_x, None);
                assert_eq!(scores, reported);
            }
            other => panic!("Unexpected update: {:?}", other),
        }
    }

    #[test]
    fn test_board_echoes_opponent_only() {
        let mut room = room(GameType::Tetris);
        room.seat_player(10);
        room.seat_player(20);

        let board: Board = vec![vec![1, 0], vec![1, 1]];
        let updates = room.store_board(0, board.clone(), 300, false);

        assert_eq!(updates.len(), 2);
        for update in updates {
            match update {
                Outbound::Single {
                    to,
                    packet:
                        Packet::UpdateTetris {
                            opponent_board, ..
                        },
                } => {
                    if to == 20 {
                        // Seat 1 sees seat 0's just-submitted board
                        assert_eq!(opponent_board, board);
                    } else {
                        // Seat 0 sees seat 1's (still empty) board, not its own
                        assert_eq!(to, 10);
                        assert!(opponent_board.is_empty());
                    }
                }
                other => panic!("Unexpected update: {:?}", other),
            }
        }
        assert_eq!(room.scores.player1, 300);
    }

    #[test]
    fn test_racer_echoes_opponent_and_obstacles() {
        let mut room = room(GameType::Racing);
        room.seat_player(10);
        room.seat_player(20);

        let reported = RacerState {
            x: 240.0,
            distance: 55.0,
        };
        let updates = room.store_racer(1, reported, 12, false);

        assert_eq!(updates.len(), 2);
        for update in updates {
            match update {
                Outbound::Single {
                    to,
                    packet:
                        Packet::UpdateRacing {
                            opponent_position,
                            obstacles,
                            scores,
                            ..
                        },
                } => {
                    assert!(obstacles.is_empty());
                    assert_eq!(scores.player2, 12);
                    if to == 10 {
                        assert_eq!(opponent_position, Some(reported));
                    } else {
                        assert_eq!(opponent_position.unwrap().x, RACER_START_X);
                    }
                }
                other => panic!("Unexpected update: {:?}", other),
            }
        }
    }

    #[test]
    fn test_pingpong_tick_moves_ball() {
        let mut room = room(GameType::PingPong);
        let mut rng = StdRng::seed_from_u64(7);
        let before = room.ball().unwrap();

        let packet = room.tick(&mut rng).unwrap();

        match packet {
            Packet::UpdateGame { ball, .. } => {
                assert_eq!(ball.x, before.x + before.dx);
                assert_eq!(ball.y, before.y + before.dy);
            }
            other => panic!("Unexpected update: {:?}", other),
        }
    }

    #[test]
    fn test_pingpong_tick_reflects_at_walls() {
        let mut room = room(GameType::PingPong);
        let mut rng = StdRng::seed_from_u64(7);

        // Run long enough to cross both a vertical and a horizontal boundary
        for _ in 0..200 {
            room.tick(&mut rng);
            let ball = room.ball().unwrap();
            assert!(ball.x >= -ball.dx.abs() && ball.x <= 600.0 + ball.dx.abs());
            assert!(ball.y >= -ball.dy.abs() && ball.y <= COURT_HEIGHT + ball.dy.abs());
        }
    }

    #[test]
    fn test_racing_tick_obstacle_retention() {
        let mut room = room(GameType::Racing);
        let mut rng = StdRng::seed_from_u64(42);
        let mut max_in_flight = 0usize;

        for _ in 0..500 {
            let packet = room.tick(&mut rng).unwrap();
            match packet {
                Packet::UpdateRacing { obstacles, .. } => {
                    for obstacle in &obstacles {
                        assert!(obstacle.y < TRACK_LENGTH);
                        assert!(obstacle.x >= 0.0 && obstacle.x < TRACK_WIDTH);
                    }
                    max_in_flight = max_in_flight.max(obstacles.len());
                }
                other => panic!("Unexpected update: {:?}", other),
            }
        }

        // With spawn chance 0.05 over 500 ticks, obstacles must have spawned
        // at some point, and the in-flight window keeps the list bounded.
        assert!(max_in_flight > 0);
        assert!(max_in_flight <= (TRACK_LENGTH / OBSTACLE_FALL_STEP) as usize);
    }

    #[test]
    fn test_tetris_has_no_tick() {
        let mut room = room(GameType::Tetris);
        let mut rng = StdRng::seed_from_u64(7);
        assert!(room.tick(&mut rng).is_none());
    }
}
