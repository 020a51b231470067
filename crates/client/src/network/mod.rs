// WebSocket connection and binary protocol handling
use futures_util::{SinkExt, StreamExt};
use protocol::{ClientPacket, ServerPacket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

/// A live connection. Decoded server packets are staged in a queue that
/// the update loop drains without blocking.
pub struct Connection {
    url: String,
    outgoing: mpsc::UnboundedSender<ClientPacket>,
    incoming: mpsc::UnboundedReceiver<ServerPacket>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    pub async fn connect(url: &str) -> Result<Self, WsError> {
        // Construct WebSocket URL with proper protocol
        let ws_url = if url.starts_with("ws://") || url.starts_with("wss://") {
            url.to_string()
        } else {
            format!("ws://{}", url)
        };

        info!("Connecting to: {}", ws_url);
        let (ws, _) = connect_async(ws_url.as_str()).await?;
        let (mut write, mut read) = ws.split();

        let (in_tx, incoming) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Binary(data)) => match ServerPacket::parse(&data) {
                        Ok(packet) => {
                            if in_tx.send(packet).is_err() {
                                break;
                            }
                        }
                        Err(e) => debug!("Dropped server packet: {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                }
            }
            debug!("Reader stopped");
        });

        let (outgoing, mut out_rx) = mpsc::unbounded_channel::<ClientPacket>();
        let writer = tokio::spawn(async move {
            while let Some(packet) = out_rx.recv().await {
                let frame = Message::Binary(packet.build().finish().to_vec().into());
                if let Err(e) = write.send(frame).await {
                    warn!("Failed to send packet: {}", e);
                    break;
                }
            }
            let _ = write.close().await;
            debug!("Writer stopped");
        });

        Ok(Self {
            url: ws_url,
            outgoing,
            incoming,
            reader,
            writer,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Queue a packet for sending. Returns `false` once the socket is gone.
    pub fn send(&self, packet: ClientPacket) -> bool {
        self.outgoing.send(packet).is_ok()
    }

    /// Take everything staged since the last call.
    pub fn drain(&mut self) -> Vec<ServerPacket> {
        let mut packets = Vec::new();
        while let Ok(packet) = self.incoming.try_recv() {
            packets.push(packet);
        }
        packets
    }

    /// Wait for the next packet. `None` once the connection closed.
    pub async fn recv(&mut self) -> Option<ServerPacket> {
        self.incoming.recv().await
    }

    pub fn is_open(&self) -> bool {
        !self.reader.is_finished() && !self.writer.is_finished()
    }

    /// Flush queued packets and close the socket.
    pub async fn close(self) {
        let Self {
            outgoing,
            reader,
            writer,
            ..
        } = self;
        drop(outgoing);
        let _ = writer.await;
        reader.abort();
    }
}
