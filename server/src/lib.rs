//! # Arcade Session Server Library
//!
//! This library implements a real-time session server for two-player casual
//! games. Anonymous clients connect, ask to be matched into one of three game
//! types (ping-pong, tetris, racing), and from then on the server relays
//! their inputs to the opposing player. For the games with server-owned
//! physics it additionally runs an authoritative fixed-rate simulation tick
//! per room and broadcasts the updated world state to both participants.
//!
//! ## Core Responsibilities
//!
//! ### Matchmaking and Room Lifecycle
//! Joins always succeed: a joining connection is seated into any room of the
//! requested game type with a free seat, or into a freshly created room.
//! A room is deleted the instant its last player leaves and never before.
//!
//! ### Input Relay
//! Ping-pong relays paddle positions alongside the authoritative ball;
//! tetris and racing relay each player's complete self-reported state to the
//! opposing seat. Client-reported scores, boards and positions are trusted
//! verbatim and relayed without validation.
//!
//! ### Authoritative Simulation
//! Ping-pong ball physics and racing obstacles are server-owned. Each full
//! room runs a self-terminating tick chain at the configured rate (60 Hz by
//! default) that stops permanently once the room drops below two players.
//!
//! ## Architecture Design
//!
//! All session state lives behind a single lock and every operation (join,
//! relay, tick iteration, disconnect) runs to completion while holding it.
//! There is no interleaving within a handler, only between handlers, so no
//! finer-grained locking is needed. The transport is UDP with a minimal
//! handshake; liveness is tracked per connection and silence beyond the
//! timeout is treated as a disconnect.
//!
//! ## Module Organization
//!
//! - [`connections`]: transport-side connection table: id assignment,
//!   address lookup, liveness and capacity.
//! - [`registry`]: per-game-type room registry and room-id generation.
//! - [`room`]: one match instance: seats, scores, game sub-state, relay
//!   and tick operations.
//! - [`matchmaker`]: session orchestration over the registry plus the
//!   connection-to-seat index; the only place session state is mutated.
//! - [`network`]: UDP transport, the main event loop, and the per-room
//!   simulation tick tasks.

pub mod connections;
pub mod matchmaker;
pub mod network;
pub mod registry;
pub mod room;
