//! Server network layer: UDP transport, event loop, and per-room tick tasks.
//!
//! The transport owns a single UDP socket. A receiver task turns datagrams
//! into [`TransportEvent`]s, the main loop consumes them one at a time
//! (run-to-completion, FIFO per sender), and a sender task drains the
//! outbound queue, resolving connection ids to addresses. Broadcasts are
//! fire-and-forget. Each full physics room gets its own tick task that locks
//! the session state once per iteration and stops itself when the room is no
//! longer eligible.

use crate::connections::ConnectionManager;
use crate::matchmaker::Matchmaker;
use crate::room::{Outbound, RoomId};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{ConnectionId, GameType, Packet, RacerState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Events delivered to the main server loop.
#[derive(Debug)]
pub enum TransportEvent {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ConnectionTimeout {
        connection_id: ConnectionId,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Work for the sender task.
#[derive(Debug)]
pub enum Delivery {
    /// Raw send to an address that may not have a connection id yet
    /// (handshake replies, refusals).
    Addressed { addr: SocketAddr, packet: Packet },
    /// Send resolved against the connection table.
    Routed(Outbound),
}

/// The session server: transport plus authoritative session state.
pub struct Server {
    socket: Arc<UdpSocket>,
    connections: Arc<RwLock<ConnectionManager>>,
    sessions: Arc<Mutex<Matchmaker>>,
    tick_interval: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<TransportEvent>,
    server_rx: mpsc::UnboundedReceiver<TransportEvent>,
    out_tx: mpsc::UnboundedSender<Delivery>,
    out_rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_rate: u32,
        max_connections: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            connections: Arc::new(RwLock::new(ConnectionManager::new(max_connections))),
            sessions: Arc::new(Mutex::new(Matchmaker::new())),
            tick_interval: Duration::from_secs_f64(1.0 / f64::from(tick_rate)),
            server_tx,
            server_rx,
            out_tx,
            out_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns the task that turns incoming datagrams into events.
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 4096];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(TransportEvent::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize datagram from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that drains the outbound queue.
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let connections = Arc::clone(&self.connections);
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(delivery) = out_rx.recv().await {
                match delivery {
                    Delivery::Addressed { addr, packet } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    Delivery::Routed(Outbound::Single { to, packet }) => {
                        let addr = {
                            let connections_guard = connections.read().await;
                            connections_guard.addr_of(to)
                        };
                        if let Some(addr) = addr {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to connection {}: {}", to, e);
                            }
                        }
                    }
                    Delivery::Routed(Outbound::Group { to, packet }) => {
                        let addrs: Vec<(ConnectionId, Option<SocketAddr>)> = {
                            let connections_guard = connections.read().await;
                            to.iter()
                                .map(|id| (*id, connections_guard.addr_of(*id)))
                                .collect()
                        };

                        for (connection_id, addr) in addrs {
                            // A member may have dropped between queueing and
                            // sending; skip silently.
                            let Some(addr) = addr else { continue };
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to connection {}: {}", connection_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns the task that sweeps for silent connections.
    async fn spawn_timeout_checker(&self) {
        let connections = Arc::clone(&self.connections);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut sweep = tokio::time::interval(Duration::from_secs(1));

            loop {
                sweep.tick().await;

                let timed_out = {
                    let mut connections_guard = connections.write().await;
                    connections_guard.check_timeouts()
                };

                for connection_id in timed_out {
                    if let Err(e) =
                        server_tx.send(TransportEvent::ConnectionTimeout { connection_id })
                    {
                        error!("Failed to send timeout event: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn queue_delivery(&self, delivery: Delivery) {
        if let Err(e) = self.out_tx.send(delivery) {
            error!("Failed to queue delivery: {}", e);
        }
    }

    fn queue_outbound(&self, outbound: Vec<Outbound>) {
        for out in outbound {
            self.queue_delivery(Delivery::Routed(out));
        }
    }

    /// Starts the self-terminating simulation tick chain for one room.
    ///
    /// Each iteration re-checks eligibility (room exists, two players) under
    /// the session lock and stops permanently the first time the check
    /// fails; nothing ever cancels the task from outside.
    fn spawn_room_ticker(&self, game_type: GameType, room_id: RoomId) {
        let sessions = Arc::clone(&self.sessions);
        let out_tx = self.out_tx.clone();
        let tick_interval = self.tick_interval;

        tokio::spawn(async move {
            debug!(
                "Simulation started for {} room {}",
                game_type.as_str(),
                room_id
            );
            let mut timer = interval(tick_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut rng = StdRng::from_entropy();

            loop {
                timer.tick().await;

                let outcome = {
                    let mut sessions_guard = sessions.lock().await;
                    sessions_guard.tick(game_type, &room_id, &mut rng)
                };

                if let Some(outbound) = outcome.outbound {
                    if out_tx.send(Delivery::Routed(outbound)).is_err() {
                        break;
                    }
                }
                if !outcome.keep_running {
                    break;
                }
            }

            debug!(
                "Simulation stopped for {} room {}",
                game_type.as_str(),
                room_id
            );
        });
    }

    /// Looks up the sender's connection and refreshes its liveness deadline.
    async fn known_sender(&self, addr: SocketAddr) -> Option<ConnectionId> {
        let mut connections = self.connections.write().await;
        let connection_id = connections.find_by_addr(addr)?;
        connections.touch(connection_id);
        Some(connection_id)
    }

    /// Tears down one connection: transport registration and session seat.
    async fn disconnect_connection(&self, connection_id: ConnectionId) {
        {
            let mut connections = self.connections.write().await;
            connections.remove(connection_id);
        }
        let outbound = {
            let mut sessions = self.sessions.lock().await;
            sessions.disconnect(connection_id)
        };
        self.queue_outbound(outbound);
    }

    async fn handle_join(&mut self, game_type: GameType, addr: SocketAddr) {
        let Some(connection_id) = self.known_sender(addr).await else {
            warn!("Join from unknown address {}", addr);
            return;
        };

        let outcome = {
            let mut sessions = self.sessions.lock().await;
            sessions.join(game_type, connection_id)
        };

        self.queue_outbound(outcome.outbound);
        if outcome.start_simulation {
            self.spawn_room_ticker(game_type, outcome.room_id);
        }
    }

    /// Processes one incoming packet. Unknown rooms and unknown senders are
    /// dropped without a reply; the only negative response in the protocol
    /// is the capacity refusal during the handshake.
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect => {
                let existing = {
                    let connections = self.connections.read().await;
                    connections.find_by_addr(addr)
                };

                if let Some(existing_id) = existing {
                    info!("Re-registering {} (was connection {})", addr, existing_id);
                    self.disconnect_connection(existing_id).await;
                }

                let registered = {
                    let mut connections = self.connections.write().await;
                    connections.register(addr)
                };

                match registered {
                    Some(connection_id) => {
                        self.queue_delivery(Delivery::Addressed {
                            addr,
                            packet: Packet::Connected { connection_id },
                        });
                    }
                    None => {
                        self.queue_delivery(Delivery::Addressed {
                            addr,
                            packet: Packet::Refused {
                                reason: "Server full".to_string(),
                            },
                        });
                    }
                }
            }

            Packet::Disconnect => {
                if let Some(connection_id) = self.known_sender(addr).await {
                    self.disconnect_connection(connection_id).await;
                }
            }

            Packet::JoinPingPong => self.handle_join(GameType::PingPong, addr).await,
            Packet::JoinTetris => self.handle_join(GameType::Tetris, addr).await,
            Packet::JoinRacing => self.handle_join(GameType::Racing, addr).await,

            Packet::MovePaddle { game_id, x } => {
                if self.known_sender(addr).await.is_none() {
                    return;
                }
                let outbound = {
                    let mut sessions = self.sessions.lock().await;
                    sessions.move_paddle(&game_id, x)
                };
                self.queue_outbound(outbound);
            }

            Packet::ScoreUpdate { game_id, scores } => {
                if self.known_sender(addr).await.is_none() {
                    return;
                }
                let outbound = {
                    let mut sessions = self.sessions.lock().await;
                    sessions.score_update(&game_id, scores)
                };
                self.queue_outbound(outbound);
            }

            Packet::UpdateTetrisBoard {
                game_id,
                board,
                score,
                game_over,
            } => {
                let Some(connection_id) = self.known_sender(addr).await else {
                    return;
                };
                let outbound = {
                    let mut sessions = self.sessions.lock().await;
                    sessions.tetris_board(&game_id, connection_id, board, score, game_over)
                };
                self.queue_outbound(outbound);
            }

            Packet::UpdateRacingPosition {
                game_id,
                x,
                distance,
                score,
                game_over,
            } => {
                let Some(connection_id) = self.known_sender(addr).await else {
                    return;
                };
                let outbound = {
                    let mut sessions = self.sessions.lock().await;
                    sessions.racing_position(
                        &game_id,
                        connection_id,
                        RacerState { x, distance },
                        score,
                        game_over,
                    )
                };
                self.queue_outbound(outbound);
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Main server loop. Events are handled strictly one at a time, which
    /// preserves per-connection FIFO ordering end to end.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        info!("Server started successfully");

        while let Some(event) = self.server_rx.recv().await {
            match event {
                TransportEvent::PacketReceived { packet, addr } => {
                    self.handle_packet(packet, addr).await;
                }
                TransportEvent::ConnectionTimeout { connection_id } => {
                    info!("Connection {} timed out", connection_id);
                    // The sweeper already dropped the transport entry; only
                    // the session seat is left to clean up.
                    let outbound = {
                        let mut sessions = self.sessions.lock().await;
                        sessions.disconnect(connection_id)
                    };
                    self.queue_outbound(outbound);
                }
                TransportEvent::Shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
