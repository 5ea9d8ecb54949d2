//! Demo host network layer: UDP transport, the tick loop, and the hook calls
//! into the phase coordinator.

use crate::client_manager::ClientManager;
use crate::config::CoordinatorConfig;
use crate::coordinator::{PhaseCoordinator, TerminationDecision};
use crate::game::{GameState, MoveOutcome};
use crate::host::{ConfigPhaseHost, PlayerHost};
use crate::tick::{self, TickReceiver};
use crate::world::FlatLevel;
use log::{debug, error, info, warn};
use shared::{Packet, Resend, SessionId};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    MalformedPacket { addr: SocketAddr, error: String },
    ClientTimeout { session_id: SessionId },
    /// Bridge classification finished for a freshly connected session
    SessionClassified {
        session_id: SessionId,
        display_name: String,
        bridged: bool,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
}

/// Demo host: owns the world, the coordinator, and the socket
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game: GameState,
    coordinator: PhaseCoordinator,
    tick_rx: TickReceiver,
    tick_duration: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        config: CoordinatorConfig,
        level: FlatLevel,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let (tick_tx, tick_rx) = tick::tick_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            game: GameState::new(level),
            // The demo has no bridge installed; detection falls back to names.
            coordinator: PhaseCoordinator::new(config, None, tick_tx),
            tick_rx,
            tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let message = match Packet::decode(&buffer[..len]) {
                            Ok(packet) => ServerMessage::PacketReceived { packet, addr },
                            Err(e) => ServerMessage::MalformedPacket {
                                addr,
                                error: e.to_string(),
                            },
                        };
                        if let Err(e) = server_tx.send(message) {
                            error!("Failed to send packet to main loop: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(GameMessage::SendPacket { packet, addr }) = game_rx.recv().await {
                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                    error!("Failed to send packet to {}: {}", addr, e);
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = clients.read().await.check_timeouts();
                for session_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { session_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
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
        let data = packet.encode()?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Sends everything the host queued since the last flush.
    async fn flush_outbox(&mut self) {
        let outbox = self.game.drain_outbox();
        if outbox.is_empty() {
            return;
        }
        let clients = self.clients.read().await;
        for (id, packet) in outbox {
            match clients.addr_of(id) {
                Some(addr) => self.send_packet(packet, addr),
                None => debug!("Dropping packet for departed session {}", id),
            }
        }
    }

    async fn session_for(&self, addr: SocketAddr) -> Option<SessionId> {
        let mut clients = self.clients.write().await;
        let id = clients.find_client_by_addr(addr)?;
        clients.touch(id);
        Some(id)
    }

    /// Processes incoming packets and drives the coordinator hooks
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { display_name } => {
                info!("Client connecting from {} as {}", addr, display_name);

                let existing = self.clients.read().await.find_client_by_addr(addr);
                if let Some(existing_id) = existing {
                    info!("Replacing existing session {} from {}", existing_id, addr);
                    if !self.request_termination(existing_id, "Connection replaced").await {
                        debug!("Keeping session {}; ignoring duplicate connect", existing_id);
                        return;
                    }
                }

                let added = self.clients.write().await.add_client(addr, &display_name);
                let id = match added {
                    Some(id) => id,
                    None => {
                        self.send_packet(
                            Packet::Disconnected {
                                reason: "Server full".to_string(),
                            },
                            addr,
                        );
                        return;
                    }
                };

                self.game.add_session(id, &display_name);
                self.send_packet(Packet::Connected { session_id: id }, addr);
                self.spawn_classification(id, display_name);
            }

            Packet::TaskDone { task_id } => {
                if let Some(id) = self.session_for(addr).await {
                    if self.game.complete_task(id, task_id) {
                        self.coordinator.drive(&mut self.game, id);
                    }
                }
            }

            Packet::FinishConfiguration => {
                if let Some(id) = self.session_for(addr).await {
                    if self.game.client_finished(id) {
                        self.coordinator.on_play_entered(&mut self.game, id);
                    }
                }
            }

            Packet::Move { position, vel_y } => {
                if let Some(id) = self.session_for(addr).await {
                    match self.game.apply_move(id, position, vel_y) {
                        MoveOutcome::Moved => {}
                        MoveOutcome::Rejected { reason } => {
                            self.request_termination(id, &reason).await;
                        }
                        MoveOutcome::Died { cause } => self.handle_death(id, &cause),
                    }
                }
            }

            Packet::Heartbeat => {
                self.session_for(addr).await;
            }

            Packet::Disconnect => {
                let id = self.clients.read().await.find_client_by_addr(addr);
                if let Some(id) = id {
                    self.request_termination(id, "Client quit").await;
                }
            }

            other => {
                let id = self.clients.read().await.find_client_by_addr(addr);
                let message = format!("Payload {:?} may not be sent to the server", other);
                match id {
                    Some(id) if self.coordinator.intercept_packet_error(id, Some(&message)) => {}
                    _ => warn!("Unexpected packet type from client at {}", addr),
                }
            }
        }
    }

    /// Runs the bridge lookup on its own task so a slow registry never holds
    /// up the tick loop. Configuration starts once the answer is posted back.
    fn spawn_classification(&self, id: SessionId, display_name: String) {
        let detector = self.coordinator.detector();
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let bridged = detector.is_bridged(id, &display_name).await;
            let message = ServerMessage::SessionClassified {
                session_id: id,
                display_name,
                bridged,
            };
            if let Err(e) = server_tx.send(message) {
                error!("Failed to post classification of {}: {}", id, e);
            }
        });
    }

    fn handle_classified(&mut self, id: SessionId, display_name: &str, bridged: bool) {
        if !self.game.is_connected(id) {
            // Left while being classified; drop the cached answer too.
            debug!("Session {} left before classification finished", id);
            self.coordinator.on_disconnect(id);
            return;
        }

        self.coordinator.admit_session(id, display_name, bridged);
        self.coordinator.on_configuration_started(&mut self.game, id);
        self.game.announce_tasks(id);
    }

    /// Dispatches one message from the network tasks. Returns false on shutdown.
    async fn handle_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::PacketReceived { packet, addr } => {
                self.handle_packet(packet, addr).await;
            }
            ServerMessage::MalformedPacket { addr, error } => {
                self.handle_malformed(addr, error).await;
            }
            ServerMessage::ClientTimeout { session_id } => {
                self.request_termination(session_id, "Timed out").await;
            }
            ServerMessage::SessionClassified {
                session_id,
                display_name,
                bridged,
            } => {
                self.handle_classified(session_id, &display_name, bridged);
            }
            ServerMessage::Shutdown => return false,
        }
        true
    }

    /// A malformed datagram. Native sessions are dropped; bridged sessions
    /// keep going if the classifier calls it noise.
    async fn handle_malformed(&mut self, addr: SocketAddr, error: String) {
        let id = self.clients.read().await.find_client_by_addr(addr);
        match id {
            Some(id) => {
                if !self.coordinator.intercept_packet_error(id, None) {
                    warn!("Malformed packet from session {}: {}", id, error);
                    self.request_termination(id, "Protocol error: malformed packet")
                        .await;
                }
            }
            None => warn!("Failed to deserialize packet from {}", addr),
        }
    }

    fn handle_death(&mut self, id: SessionId, cause: &str) {
        if self.coordinator.on_death(id, cause) {
            return;
        }
        match self.game.respawn(id) {
            Ok(()) => {
                self.coordinator.on_respawned(&mut self.game, id);
            }
            Err(e) => debug!("Respawn of {} failed: {}", id, e),
        }
    }

    /// Single entry point for ending a session, whoever asked for it.
    ///
    /// The coordinator sees every request first and may cancel it for a
    /// bridged session. Returns true when the session was terminated.
    async fn request_termination(&mut self, id: SessionId, reason: &str) -> bool {
        match self.coordinator.intercept_termination(id, reason) {
            TerminationDecision::Suppress => {
                // Snap the client back to where the host thinks it is.
                if let Err(e) = self.game.resend(id, Resend::Position) {
                    debug!("Position resend to {} failed: {}", id, e);
                }
                false
            }
            TerminationDecision::Proceed => {
                info!("Terminating session {}: {}", id, reason);
                self.disconnect(id, reason).await;
                true
            }
        }
    }

    async fn disconnect(&mut self, id: SessionId, reason: &str) {
        let removed = self.clients.write().await.remove_client(id);
        if let Some(client) = &removed {
            self.send_packet(
                Packet::Disconnected {
                    reason: reason.to_string(),
                },
                client.addr,
            );
        }
        self.game.remove_session(id);
        self.coordinator.on_disconnect(id);
    }

    /// Runs queued timer jobs and advances the world by one tick.
    fn run_tick(&mut self) {
        for job in tick::drain(&mut self.tick_rx) {
            self.coordinator.handle_tick_job(&mut self.game, job);
        }
        self.game.advance_tick();

        if self.game.tick % 600 == 0 && self.game.session_count() > 0 {
            debug!(
                "Tick {}: {} sessions ({} bridged)",
                self.game.tick,
                self.game.session_count(),
                self.coordinator.bridged_count()
            );
        }
    }

    /// Main server loop
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    let keep_running = match message {
                        Some(message) => self.handle_message(message).await,
                        None => false,
                    };
                    if !keep_running {
                        info!("Server shutting down");
                        break;
                    }
                },

                _ = tick_interval.tick() => {
                    self.run_tick();
                },
            }

            self.flush_outbox().await;
        }

        Ok(())
    }
}
