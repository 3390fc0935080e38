use serde::{Deserialize, Serialize};

pub const COURT_WIDTH: f32 = 600.0;
pub const COURT_HEIGHT: f32 = 400.0;
pub const BALL_SERVE_X: f32 = 300.0;
pub const BALL_SERVE_Y: f32 = 200.0;
pub const BALL_SERVE_DX: f32 = 5.0;
pub const BALL_SERVE_DY: f32 = -5.0;

pub const TRACK_WIDTH: f32 = 360.0;
pub const TRACK_LENGTH: f32 = 400.0;
pub const RACER_START_X: f32 = 180.0;
pub const OBSTACLE_FALL_STEP: f32 = 5.0;
pub const OBSTACLE_SPAWN_CHANCE: f64 = 0.05;

pub const DEFAULT_TICK_RATE: u32 = 60;

/// Identifier the transport assigns to a connected client.
pub type ConnectionId = u32;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameType {
    PingPong,
    Tetris,
    Racing,
}

impl GameType {
    pub const ALL: [GameType; 3] = [GameType::PingPong, GameType::Tetris, GameType::Racing];

    /// Whether the server runs an authoritative simulation tick for this game.
    /// Tetris state lives entirely on the clients and is only relayed.
    pub fn has_simulation(self) -> bool {
        matches!(self, GameType::PingPong | GameType::Racing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameType::PingPong => "pingPong",
            GameType::Tetris => "tetris",
            GameType::Racing => "racing",
        }
    }
}

/// Per-seat score pair. Seat 0 is player1, seat 1 is player2.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scores {
    pub player1: u32,
    pub player2: u32,
}

impl Scores {
    pub fn seat(&self, seat: usize) -> u32 {
        if seat == 0 {
            self.player1
        } else {
            self.player2
        }
    }

    pub fn set_seat(&mut self, seat: usize, score: u32) {
        if seat == 0 {
            self.player1 = score;
        } else {
            self.player2 = score;
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
}

impl Ball {
    pub fn serve() -> Self {
        Self {
            x: BALL_SERVE_X,
            y: BALL_SERVE_Y,
            dx: BALL_SERVE_DX,
            dy: BALL_SERVE_DY,
        }
    }

    /// One simulation step: integrate by the velocity vector, then invert a
    /// velocity component for each court boundary crossed. At most one
    /// inversion per axis per step; the position itself is not clamped.
    pub fn advance(&mut self) {
        self.x += self.dx;
        self.y += self.dy;

        if self.x < 0.0 || self.x > COURT_WIDTH {
            self.dx = -self.dx;
        }
        if self.y < 0.0 || self.y > COURT_HEIGHT {
            self.dy = -self.dy;
        }
    }
}

/// One player's self-reported lane position in the racing game.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct RacerState {
    pub x: f32,
    pub distance: f32,
}

impl RacerState {
    pub fn starting_line() -> Self {
        Self {
            x: RACER_START_X,
            distance: 0.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub x: f32,
    pub y: f32,
}

/// Advances every obstacle down the track and drops the ones that have
/// scrolled past the end. Spawning is the server's job; it needs randomness.
pub fn advance_obstacles(obstacles: &mut Vec<Obstacle>) {
    for obstacle in obstacles.iter_mut() {
        obstacle.y += OBSTACLE_FALL_STEP;
    }
    obstacles.retain(|obstacle| obstacle.y < TRACK_LENGTH);
}

/// A tetris board as the client reports it: rows of cell codes. The server
/// never inspects the contents, it only stores and relays them.
pub type Board = Vec<Vec<u8>>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Transport-level handshake
    Connect,
    Connected {
        connection_id: ConnectionId,
    },
    Refused {
        reason: String,
    },
    Disconnect,

    // Matchmaking
    JoinPingPong,
    JoinTetris,
    JoinRacing,
    GameId {
        game_id: String,
        game_type: GameType,
    },
    StartGame,

    // Ping-pong: paddle relay plus client-authoritative scoring
    MovePaddle {
        game_id: String,
        x: f32,
    },
    ScoreUpdate {
        game_id: String,
        scores: Scores,
    },
    UpdateGame {
        opponent_paddle_x: Option<f32>,
        ball: Ball,
        scores: Scores,
    },

    // Tetris: fully client-authoritative board relay
    UpdateTetrisBoard {
        game_id: String,
        board: Board,
        score: u32,
        game_over: bool,
    },
    UpdateTetris {
        opponent_board: Board,
        scores: Scores,
        game_over: bool,
    },

    // Racing: client-authoritative positions, server-owned obstacles
    UpdateRacingPosition {
        game_id: String,
        x: f32,
        distance: f32,
        score: u32,
        game_over: bool,
    },
    UpdateRacing {
        opponent_position: Option<RacerState>,
        obstacles: Vec<Obstacle>,
        scores: Scores,
        game_over: bool,
    },

    PlayerDisconnected,
}
