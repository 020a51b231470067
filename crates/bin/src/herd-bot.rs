//! herd-bot - Headless client that joins a room and herds on its own

use anyhow::bail;
use client::{ClientGame, Connection, ReconcileTuning};
use glam::Vec2;
use protocol::{ClientPacket, ServerPacket};
use sim::{DogInput, SheepState};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const FRAME_HZ: u64 = 60;
const STATS_EVERY_FRAMES: u64 = FRAME_HZ * 5;
/// How far behind the flock the dog tries to stay.
const DRIVE_DISTANCE: f32 = 6.0;
const SPRINT_DISTANCE: f32 = 15.0;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Drive the flock centre toward the gate from behind.
fn herd_intent(game: &ClientGame) -> DogInput {
    let (Some(welcome), Some(predictor), Some(snapshot)) =
        (game.welcome(), game.predictor(), game.latest_snapshot())
    else {
        return DogInput::default();
    };
    let active: Vec<Vec2> = snapshot
        .sheep
        .iter()
        .filter(|s| s.state == SheepState::Active)
        .map(|s| s.position)
        .collect();
    if active.is_empty() {
        return DogInput::default();
    }

    let centroid = active.iter().copied().sum::<Vec2>() / active.len() as f32;
    let gate = welcome.layout.gate().center;
    let behind = centroid - (gate - centroid).normalize_or_zero() * DRIVE_DISTANCE;
    let dog = predictor.position();

    let to_spot = behind - dog;
    let direction = if to_spot.length() > 2.0 {
        to_spot.normalize_or_zero()
    } else {
        (gate - dog).normalize_or_zero()
    };
    DogInput {
        direction,
        sprint: to_spot.length() > SPRINT_DISTANCE,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("herd-bot v{}", env!("CARGO_PKG_VERSION"));

    let url = env_or("HERD_SERVER", "127.0.0.1:3000");
    let room = env_or("HERD_ROOM", "meadow");
    let name = env_or("HERD_NAME", "bot");
    let skin = env_or("HERD_SKIN", "0").parse::<u8>().unwrap_or(0);

    let mut connection = Connection::connect(&url).await?;
    connection.send(ClientPacket::Join { room, name, skin });

    let mut game = ClientGame::new(ReconcileTuning::default());
    loop {
        match connection.recv().await {
            Some(ServerPacket::Welcome(welcome)) => {
                game.handle_packet(ServerPacket::Welcome(welcome), client::utils::now_ms());
                break;
            }
            Some(ServerPacket::JoinRejected { reason }) => bail!("join rejected: {reason}"),
            Some(_) => {}
            None => bail!("connection closed before welcome"),
        }
    }
    connection.send(ClientPacket::StartMatch);

    let mut ticker = interval(Duration::from_micros(1_000_000 / FRAME_HZ));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = client::utils::now_ms();
    let mut frame = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
        if !connection.is_open() {
            warn!("Connection to {} lost", connection.url());
            break;
        }

        let now = client::utils::now_ms();
        let dt = ((now - last) / 1000.0) as f32;
        last = now;

        let staged = connection.drain();
        let intent = herd_intent(&game);
        for packet in game.update(staged, intent, now, dt) {
            connection.send(packet);
        }

        frame += 1;
        if frame % STATS_EVERY_FRAMES == 0 {
            let stats = game.stats;
            let pending = game.predictor().map(|p| p.pending().count()).unwrap_or(0);
            let retired = game
                .latest_snapshot()
                .map(|s| (s.sheep_retired, s.total_sheep))
                .unwrap_or_default();
            info!(
                blends = stats.blends,
                snaps = stats.snaps,
                suspended = stats.suspended,
                pending,
                "Sheep {}/{}",
                retired.0,
                retired.1
            );
        }

        if let Some(done) = game.completion() {
            info!(
                "Round complete: {}/{} sheep in {:.1}s",
                done.sheep_retired,
                done.total_sheep,
                done.completion_time_ms as f64 / 1000.0
            );
            break;
        }
    }

    connection.close().await;
    Ok(())
}
