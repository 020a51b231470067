//! Client -> Server packets.

use glam::Vec2;

use super::{need, ClientOpcode};
use crate::{BinaryReader, BinaryWriter, InputPacket, ProtocolError};

const INPUT_SPRINT: u8 = 0x01;
const INPUT_HAS_POSITION: u8 = 0x02;

/// Parsed client packet.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientPacket {
    /// Join (0x00) a named room.
    Join { room: String, name: String, skin: u8 },
    /// Input sample (0x10).
    Input(InputPacket),
    /// Start match (0x20).
    StartMatch,
    /// Restart (0x21).
    Restart,
}

impl ClientPacket {
    /// Parse a client packet from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = BinaryReader::new(data.to_vec());
        let opcode = need(reader.try_get_u8())?;

        match opcode {
            0x00 => {
                let room = need(reader.try_get_string_utf8())?;
                let name = need(reader.try_get_string_utf8())?;
                let skin = need(reader.try_get_u8())?;
                Ok(ClientPacket::Join { room, name, skin })
            }
            0x10 => {
                let sequence = need(reader.try_get_u32())?;
                let timestamp_ms = need(reader.try_get_u64())?;
                let x = need(reader.try_get_f32())?;
                let z = need(reader.try_get_f32())?;
                let flags = need(reader.try_get_u8())?;
                let client_position = if flags & INPUT_HAS_POSITION != 0 {
                    let px = need(reader.try_get_centi())?;
                    let pz = need(reader.try_get_centi())?;
                    Some(Vec2::new(px, pz))
                } else {
                    None
                };
                Ok(ClientPacket::Input(InputPacket {
                    direction: Vec2::new(x, z),
                    sprint: flags & INPUT_SPRINT != 0,
                    sequence,
                    timestamp_ms,
                    client_position,
                }))
            }
            0x20 => Ok(ClientPacket::StartMatch),
            0x21 => Ok(ClientPacket::Restart),
            _ => Err(ProtocolError::InvalidOpcode(opcode)),
        }
    }

    /// Encode for sending.
    pub fn build(&self) -> BinaryWriter {
        match self {
            ClientPacket::Join { room, name, skin } => {
                let mut w = BinaryWriter::with_capacity(room.len() + name.len() + 4);
                w.put_u8(ClientOpcode::Join as u8);
                w.put_string_utf8(room);
                w.put_string_utf8(name);
                w.put_u8(*skin);
                w
            }
            ClientPacket::Input(input) => {
                let mut w = BinaryWriter::with_capacity(30);
                w.put_u8(ClientOpcode::Input as u8);
                w.put_u32(input.sequence);
                w.put_u64(input.timestamp_ms);
                w.put_f32(input.direction.x);
                w.put_f32(input.direction.y);
                let mut flags = 0u8;
                if input.sprint {
                    flags |= INPUT_SPRINT;
                }
                if input.client_position.is_some() {
                    flags |= INPUT_HAS_POSITION;
                }
                w.put_u8(flags);
                if let Some(p) = input.client_position {
                    w.put_centi(p.x);
                    w.put_centi(p.y);
                }
                w
            }
            ClientPacket::StartMatch => {
                let mut w = BinaryWriter::with_capacity(1);
                w.put_u8(ClientOpcode::StartMatch as u8);
                w
            }
            ClientPacket::Restart => {
                let mut w = BinaryWriter::with_capacity(1);
                w.put_u8(ClientOpcode::Restart as u8);
                w
            }
        }
    }
}
