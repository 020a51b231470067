//! Server -> Client packet building and parsing.

use glam::Vec2;
use sim::{DogTuning, FieldLayout, PlayerId, SheepState};

use super::{need, ServerOpcode};
use crate::{BinaryReader, BinaryWriter, CompletionEvent, DogSnapshot, ProtocolError, SheepSnapshot, Snapshot};

const SNAP_ACTIVE: u8 = 0x01;
const SNAP_COMPLETED: u8 = 0x02;

const SHEEP_PASSED: u8 = 0x01;
const SHEEP_RETIRING: u8 = 0x02;
const SHEEP_HAS_TARGET: u8 = 0x04;

const DOG_SPRINTING: u8 = 0x01;
const DOG_INTERPOLATING: u8 = 0x02;

/// Everything a client needs to start predicting.
#[derive(Debug, Clone, PartialEq)]
pub struct Welcome {
    pub player_id: PlayerId,
    pub tick_rate_hz: u16,
    pub snapshot_rate_hz: u16,
    pub layout: FieldLayout,
    pub dog: DogTuning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchStarted {
    pub total_sheep: u32,
    /// Player ids with their skins, in spawn order.
    pub players: Vec<(PlayerId, u8)>,
}

/// Parsed server packet.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPacket {
    Welcome(Welcome),
    MatchStarted(MatchStarted),
    JoinRejected { reason: String },
    Snapshot(Snapshot),
    Completion(CompletionEvent),
}

impl ServerPacket {
    pub fn build(&self) -> BinaryWriter {
        match self {
            ServerPacket::Welcome(welcome) => build_welcome(welcome),
            ServerPacket::MatchStarted(started) => build_match_started(started),
            ServerPacket::JoinRejected { reason } => build_join_rejected(reason),
            ServerPacket::Snapshot(snapshot) => build_snapshot(snapshot),
            ServerPacket::Completion(event) => build_completion(event),
        }
    }

    /// Parse a server packet from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = BinaryReader::new(data.to_vec());
        let opcode = need(r.try_get_u8())?;

        match opcode {
            0x01 => parse_welcome(&mut r).map(ServerPacket::Welcome),
            0x02 => {
                let total_sheep = need(r.try_get_u32())?;
                let count = need(r.try_get_u8())?;
                let mut players = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let id = need(r.try_get_u32())?;
                    let skin = need(r.try_get_u8())?;
                    players.push((id, skin));
                }
                Ok(ServerPacket::MatchStarted(MatchStarted { total_sheep, players }))
            }
            0x03 => {
                let reason = need(r.try_get_string_utf8())?;
                Ok(ServerPacket::JoinRejected { reason })
            }
            0x10 => parse_snapshot(&mut r).map(ServerPacket::Snapshot),
            0x20 => {
                let total_sheep = need(r.try_get_u32())?;
                let sheep_retired = need(r.try_get_u32())?;
                let game_completed = need(r.try_get_u8())? != 0;
                let completion_time_ms = need(r.try_get_u64())?;
                Ok(ServerPacket::Completion(CompletionEvent {
                    total_sheep,
                    sheep_retired,
                    game_completed,
                    completion_time_ms,
                }))
            }
            _ => Err(ProtocolError::InvalidOpcode(opcode)),
        }
    }
}

/// Build a Welcome packet (0x01).
pub fn build_welcome(welcome: &Welcome) -> BinaryWriter {
    let layout = &welcome.layout;
    let dog = &welcome.dog;

    let mut w = BinaryWriter::with_capacity(96);
    w.put_u8(ServerOpcode::Welcome as u8);
    w.put_u32(welcome.player_id);
    w.put_u16(welcome.tick_rate_hz);
    w.put_u16(welcome.snapshot_rate_hz);
    for v in [
        layout.width,
        layout.depth,
        layout.gate_width,
        layout.gate_depth,
        layout.pasture_width,
        layout.pasture_depth,
        layout.edge_margin,
        layout.hard_margin,
    ] {
        w.put_f32(v);
    }
    for v in [
        dog.max_speed,
        dog.sprint_speed,
        dog.acceleration,
        dog.damping,
        dog.smoothing,
        dog.min_movement,
        dog.max_stamina,
        dog.stamina_drain,
        dog.stamina_regen,
        dog.min_stamina_to_sprint,
        dog.rotation_smoothing,
        dog.max_client_correction,
    ] {
        w.put_f32(v);
    }
    w.put_u32(dog.client_converge_ticks);
    w
}

fn parse_welcome(r: &mut BinaryReader) -> Result<Welcome, ProtocolError> {
    let player_id = need(r.try_get_u32())?;
    let tick_rate_hz = need(r.try_get_u16())?;
    let snapshot_rate_hz = need(r.try_get_u16())?;

    let mut f = || need(r.try_get_f32());
    let layout = FieldLayout {
        width: f()?,
        depth: f()?,
        gate_width: f()?,
        gate_depth: f()?,
        pasture_width: f()?,
        pasture_depth: f()?,
        edge_margin: f()?,
        hard_margin: f()?,
    };
    let mut dog = DogTuning {
        max_speed: f()?,
        sprint_speed: f()?,
        acceleration: f()?,
        damping: f()?,
        smoothing: f()?,
        min_movement: f()?,
        max_stamina: f()?,
        stamina_drain: f()?,
        stamina_regen: f()?,
        min_stamina_to_sprint: f()?,
        rotation_smoothing: f()?,
        max_client_correction: f()?,
        client_converge_ticks: 0,
    };
    dog.client_converge_ticks = need(r.try_get_u32())?;

    Ok(Welcome {
        player_id,
        tick_rate_hz,
        snapshot_rate_hz,
        layout,
        dog,
    })
}

/// Build a MatchStarted packet (0x02).
pub fn build_match_started(started: &MatchStarted) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(6 + started.players.len() * 5);
    w.put_u8(ServerOpcode::MatchStarted as u8);
    w.put_u32(started.total_sheep);
    w.put_u8(started.players.len().min(u8::MAX as usize) as u8);
    for &(id, skin) in started.players.iter().take(u8::MAX as usize) {
        w.put_u32(id);
        w.put_u8(skin);
    }
    w
}

/// Build a JoinRejected packet (0x03).
pub fn build_join_rejected(reason: &str) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(reason.len() + 2);
    w.put_u8(ServerOpcode::JoinRejected as u8);
    w.put_string_utf8(reason);
    w
}

/// Build a Snapshot packet (0x10).
///
/// Positions, velocities and angles are written as centi values, so a
/// snapshot built from [`Snapshot::capture`] decodes to identical floats.
pub fn build_snapshot(snapshot: &Snapshot) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(32 + snapshot.sheep.len() * 32 + snapshot.dogs.len() * 36);
    w.put_u8(ServerOpcode::Snapshot as u8);
    w.put_u64(snapshot.tick);
    w.put_u64(snapshot.timestamp_ms);

    let mut flags = 0u8;
    if snapshot.game_active {
        flags |= SNAP_ACTIVE;
    }
    if snapshot.game_completed {
        flags |= SNAP_COMPLETED;
    }
    w.put_u8(flags);
    w.put_u32(snapshot.sheep_retired);
    w.put_u32(snapshot.total_sheep);

    w.put_u32(snapshot.sheep.len() as u32);
    for sheep in &snapshot.sheep {
        w.put_u32(sheep.id);
        put_vec(&mut w, sheep.position);
        put_vec(&mut w, sheep.velocity);
        w.put_u8(sheep.state as u8);
        w.put_centi(sheep.facing);

        let mut flags = 0u8;
        if sheep.has_passed_gate {
            flags |= SHEEP_PASSED;
        }
        if sheep.is_retiring {
            flags |= SHEEP_RETIRING;
        }
        if sheep.retirement_target.is_some() {
            flags |= SHEEP_HAS_TARGET;
        }
        w.put_u8(flags);
        if let Some(target) = sheep.retirement_target {
            put_vec(&mut w, target);
        }
    }

    w.put_u8(snapshot.dogs.len().min(u8::MAX as usize) as u8);
    for dog in snapshot.dogs.iter().take(u8::MAX as usize) {
        w.put_u32(dog.player_id);
        put_vec(&mut w, dog.position);
        put_vec(&mut w, dog.velocity);
        w.put_centi(dog.rotation);
        w.put_centi(dog.stamina);

        let mut flags = 0u8;
        if dog.is_sprinting {
            flags |= DOG_SPRINTING;
        }
        if dog.interpolating_to_client {
            flags |= DOG_INTERPOLATING;
        }
        w.put_u8(flags);
        w.put_u32(dog.last_input_sequence);
        w.put_u8(dog.skin);
    }
    w
}

fn parse_snapshot(r: &mut BinaryReader) -> Result<Snapshot, ProtocolError> {
    let tick = need(r.try_get_u64())?;
    let timestamp_ms = need(r.try_get_u64())?;
    let flags = need(r.try_get_u8())?;
    let sheep_retired = need(r.try_get_u32())?;
    let total_sheep = need(r.try_get_u32())?;

    let sheep_count = need(r.try_get_u32())? as usize;
    // Cap the allocation by what the buffer could possibly hold.
    let mut sheep = Vec::with_capacity(sheep_count.min(r.remaining() / 24));
    for _ in 0..sheep_count {
        let id = need(r.try_get_u32())?;
        let position = get_vec(r)?;
        let velocity = get_vec(r)?;
        let raw_state = need(r.try_get_u8())?;
        let state = SheepState::from_u8(raw_state)
            .ok_or(ProtocolError::InvalidValue("sheep state", raw_state as u32))?;
        let facing = need(r.try_get_centi())?;
        let sheep_flags = need(r.try_get_u8())?;
        let retirement_target = if sheep_flags & SHEEP_HAS_TARGET != 0 {
            Some(get_vec(r)?)
        } else {
            None
        };
        sheep.push(SheepSnapshot {
            id,
            position,
            velocity,
            state,
            facing,
            has_passed_gate: sheep_flags & SHEEP_PASSED != 0,
            is_retiring: sheep_flags & SHEEP_RETIRING != 0,
            retirement_target,
        });
    }

    let dog_count = need(r.try_get_u8())?;
    let mut dogs = Vec::with_capacity(dog_count as usize);
    for _ in 0..dog_count {
        let player_id = need(r.try_get_u32())?;
        let position = get_vec(r)?;
        let velocity = get_vec(r)?;
        let rotation = need(r.try_get_centi())?;
        let stamina = need(r.try_get_centi())?;
        let dog_flags = need(r.try_get_u8())?;
        let last_input_sequence = need(r.try_get_u32())?;
        let skin = need(r.try_get_u8())?;
        dogs.push(DogSnapshot {
            player_id,
            position,
            velocity,
            rotation,
            stamina,
            is_sprinting: dog_flags & DOG_SPRINTING != 0,
            last_input_sequence,
            interpolating_to_client: dog_flags & DOG_INTERPOLATING != 0,
            skin,
        });
    }

    Ok(Snapshot {
        tick,
        timestamp_ms,
        game_active: flags & SNAP_ACTIVE != 0,
        game_completed: flags & SNAP_COMPLETED != 0,
        sheep_retired,
        total_sheep,
        sheep,
        dogs,
    })
}

/// Build a Completion packet (0x20).
pub fn build_completion(event: &CompletionEvent) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(18);
    w.put_u8(ServerOpcode::Completion as u8);
    w.put_u32(event.total_sheep);
    w.put_u32(event.sheep_retired);
    w.put_u8(event.game_completed as u8);
    w.put_u64(event.completion_time_ms);
    w
}

#[inline]
fn put_vec(w: &mut BinaryWriter, v: Vec2) {
    w.put_centi(v.x);
    w.put_centi(v.y);
}

#[inline]
fn get_vec(r: &mut BinaryReader) -> Result<Vec2, ProtocolError> {
    let x = need(r.try_get_centi())?;
    let y = need(r.try_get_centi())?;
    Ok(Vec2::new(x, y))
}
