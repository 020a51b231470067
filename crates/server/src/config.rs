//! Server configuration.

use serde::{Deserialize, Serialize};
use sim::{DogTuning, FieldLayout, SheepTuning};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub field: FieldLayout,
    #[serde(default)]
    pub sheep: SheepTuning,
    #[serde(default)]
    pub dog: DogTuning,
    #[serde(default)]
    pub round: RoundConfig,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    /// Load from `path`, writing the defaults there if it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            info!("No {} found, creating default config", path.display());
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }
}

/// Server networking and loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Simulation ticks per second.
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: u32,
    /// Snapshots per second, at most the tick rate.
    #[serde(default = "default_snapshot_rate")]
    pub snapshot_rate_hz: u32,
    #[serde(default = "default_max_players_per_room")]
    pub max_players_per_room: usize,
    /// Queued inputs kept per player; the oldest are dropped beyond this.
    #[serde(default = "default_input_queue_limit")]
    pub input_queue_limit: usize,
    /// Seconds a connection may stay silent before it is dropped.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_connections: default_max_connections(),
            tick_rate_hz: default_tick_rate(),
            snapshot_rate_hz: default_snapshot_rate(),
            max_players_per_room: default_max_players_per_room(),
            input_queue_limit: default_input_queue_limit(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

impl ServerConfig {
    /// Effective tick rate, never zero.
    pub fn tick_rate(&self) -> u32 {
        self.tick_rate_hz.max(1)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate() as f64)
    }

    /// Fixed Δt in seconds.
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate() as f32
    }

    /// Effective snapshot rate, clamped to `[1, tick_rate]`.
    pub fn snapshot_rate(&self) -> u32 {
        self.snapshot_rate_hz.clamp(1, self.tick_rate())
    }

    /// A snapshot goes out every this many ticks.
    pub fn snapshot_every(&self) -> u64 {
        (self.tick_rate() / self.snapshot_rate()).max(1) as u64
    }
}

fn default_port() -> u16 {
    3000
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_max_connections() -> usize {
    256
}
fn default_tick_rate() -> u32 {
    60
}
fn default_snapshot_rate() -> u32 {
    20
}
fn default_max_players_per_room() -> usize {
    4
}
fn default_input_queue_limit() -> usize {
    32
}
fn default_idle_timeout() -> u64 {
    60
}

/// Round setup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoundConfig {
    #[serde(default = "default_sheep_count")]
    pub sheep_count: usize,
    /// Seed for spawn positions and retirement targets. Zero picks a random
    /// seed per room.
    #[serde(default)]
    pub seed: u64,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            sheep_count: default_sheep_count(),
            seed: 0,
        }
    }
}

fn default_sheep_count() -> usize {
    30
}
