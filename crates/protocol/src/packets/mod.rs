//! Packet definitions for the herding protocol.
//!
//! This module contains both client->server and server->client packet types.

mod client;
mod server;

pub use client::*;
pub use server::*;

use crate::ProtocolError;

/// Opcodes for client -> server packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOpcode {
    /// Join a room with a nickname and dog skin.
    Join = 0x00,
    /// Movement input sample.
    Input = 0x10,
    /// Start the match in the current room.
    StartMatch = 0x20,
    /// Restart after completion.
    Restart = 0x21,
}

/// Opcodes for server -> client packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerOpcode {
    /// Player id, rates and shared tuning.
    Welcome = 0x01,
    /// A new round began.
    MatchStarted = 0x02,
    /// Join refused.
    JoinRejected = 0x03,
    /// Full quantized world state.
    Snapshot = 0x10,
    /// One-shot round completion.
    Completion = 0x20,
}

#[inline]
pub(crate) fn need<T>(value: Option<T>) -> Result<T, ProtocolError> {
    value.ok_or(ProtocolError::UnexpectedEof)
}
