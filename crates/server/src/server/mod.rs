//! Game server implementation.

use crate::config::Config;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use protocol::packets::{build_completion, build_match_started, build_snapshot};
use protocol::{BinaryWriter, ClientPacket, ServerPacket, Welcome};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};

pub mod client;
pub mod directory;
pub mod room;

pub use directory::RoomDirectory;
pub use room::{run_room_loop, MatchSetup, PendingBroadcasts, Room, RoomError, RoomEvent};

use client::{clean_name, Client, Membership};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Room used when a client joins with an empty room name.
const DEFAULT_ROOM: &str = "meadow";

/// Connection tracking state (shared across connection handlers).
struct ConnectionState {
    /// Total number of connections.
    total_connections: usize,
}

impl ConnectionState {
    fn new() -> Self {
        Self { total_connections: 0 }
    }

    /// Try to add a connection, returns true if allowed.
    fn try_add_connection(&mut self, max_total: usize) -> bool {
        if self.total_connections >= max_total {
            return false;
        }
        self.total_connections += 1;
        true
    }

    /// Remove a connection.
    fn remove_connection(&mut self) {
        self.total_connections = self.total_connections.saturating_sub(1);
    }
}

/// Run the game server.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{}", addr);
    serve(listener, config).await
}

/// Accept connections on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let conn_state = Arc::new(RwLock::new(ConnectionState::new()));
    let directory = Arc::new(Mutex::new(RoomDirectory::new(Arc::clone(&config))));
    let next_id = AtomicU32::new(1);

    loop {
        let (stream, addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        };

        if !conn_state.write().await.try_add_connection(config.server.max_connections) {
            warn!("Connection rejected (limit reached): {}", addr);
            continue;
        }

        let id = next_id.fetch_add(1, Ordering::Relaxed);
        let config = Arc::clone(&config);
        let conn_state = Arc::clone(&conn_state);
        let directory = Arc::clone(&directory);

        tokio::spawn(async move {
            let result = handle_connection(stream, addr, id, config, directory).await;

            // Always remove from connection tracking when done
            conn_state.write().await.remove_connection();

            if let Err(e) = result {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }

    directory.lock().await.shutdown().await;
    Ok(())
}

fn frame(packet: BinaryWriter) -> Message {
    Message::Binary(packet.finish().to_vec().into())
}

/// Wait for the next room broadcast, or forever when not in a room.
async fn next_event(events: &mut Option<broadcast::Receiver<RoomEvent>>) -> Result<RoomEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    id: u32,
    config: Arc<Config>,
    directory: Arc<Mutex<RoomDirectory>>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New connection from {} (player {})", addr, id);

    let (mut write, mut read) = ws_stream.split();
    let mut client = Client::new(id, addr);
    let mut events: Option<broadcast::Receiver<RoomEvent>> = None;
    let idle_timeout = Duration::from_secs(config.server.idle_timeout.max(1));

    loop {
        let idle_deadline = tokio::time::Instant::from_std(client.idle_deadline(idle_timeout));
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        client.touch();
                        let packet = match ClientPacket::parse(&data) {
                            Ok(packet) => packet,
                            Err(e) => {
                                warn!("Packet error from {}: {}", addr, e);
                                continue;
                            }
                        };
                        let reply = handle_packet(&mut client, packet, &config, &directory, &mut events).await;
                        if let Some(reply) = reply {
                            if let Err(e) = write.send(frame(reply.build())).await {
                                warn!("Failed to send reply to {}: {}", addr, e);
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} disconnected", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                    _ => client.touch(),
                }
            }
            event = next_event(&mut events) => {
                match event {
                    Ok(event) => {
                        if let Err(e) = forward_event(&mut write, event).await {
                            warn!("Failed to send room update to {}: {}", addr, e);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Client {} lagged, skipped {} room updates", addr, skipped);
                    }
                    Err(RecvError::Closed) => events = None,
                }
            }
            _ = tokio::time::sleep_until(idle_deadline) => {
                info!("Client {} idle for {:?}, closing", addr, idle_timeout);
                break;
            }
        }
    }

    if let Some(membership) = client.membership.take() {
        directory.lock().await.leave(&membership.name, id).await;
    }
    Ok(())
}

async fn forward_event(write: &mut WsSink, event: RoomEvent) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let packet = match event {
        RoomEvent::Snapshot(snapshot) => build_snapshot(&snapshot),
        RoomEvent::Completion(completion) => build_completion(&completion),
        RoomEvent::MatchStarted(started) => build_match_started(&started),
    };
    write.send(frame(packet)).await
}

/// Act on one client packet. Returns a direct reply, if any.
async fn handle_packet(
    client: &mut Client,
    packet: ClientPacket,
    config: &Config,
    directory: &Mutex<RoomDirectory>,
    events: &mut Option<broadcast::Receiver<RoomEvent>>,
) -> Option<ServerPacket> {
    if !matches!(packet, ClientPacket::Input(_)) {
        debug!("Client {} sent {:?}", client.id, packet);
    }

    match packet {
        ClientPacket::Join { room, name, skin } => {
            if client.membership.is_some() {
                debug!("Client {} is already in a room", client.id);
                return None;
            }
            let room_name = match room.trim() {
                "" => DEFAULT_ROOM.to_string(),
                trimmed => clean_name(trimmed, client.id),
            };
            client.name = clean_name(&name, client.id);
            client.skin = skin;

            let joined = directory
                .lock()
                .await
                .join(&room_name, client.id, &client.name, skin)
                .await;
            match joined {
                Ok(joined) => {
                    *events = Some(joined.events);
                    client.membership = Some(Membership {
                        name: room_name,
                        room: joined.room,
                    });
                    Some(ServerPacket::Welcome(Welcome {
                        player_id: client.id,
                        tick_rate_hz: config.server.tick_rate().min(u16::MAX as u32) as u16,
                        snapshot_rate_hz: config.server.snapshot_rate().min(u16::MAX as u32) as u16,
                        layout: config.field.clone(),
                        dog: config.dog.clone(),
                    }))
                }
                Err(e) => {
                    info!("Client {} could not join {}: {}", client.id, room_name, e);
                    Some(ServerPacket::JoinRejected { reason: e.to_string() })
                }
            }
        }
        ClientPacket::Input(input) => {
            if let Some(room) = client.room() {
                room.write().await.enqueue_input(client.id, input);
            }
            None
        }
        ClientPacket::StartMatch => {
            if let Some(room) = client.room() {
                let mut room = room.write().await;
                if room.world.state.game_active {
                    debug!("Client {} asked to start a running match", client.id);
                } else {
                    room.restart();
                }
            }
            None
        }
        ClientPacket::Restart => {
            if let Some(room) = client.room() {
                room.write().await.restart();
            }
            None
        }
    }
}
