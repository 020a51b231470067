//! Shared protocol crate for the herding game.
//!
//! This crate contains:
//! - Binary reading/writing utilities
//! - Packet definitions and builders
//! - Quantized snapshot types shared by server and client

mod binary;
mod error;
pub mod packets;
mod snapshot;

pub use binary::{BinaryReader, BinaryWriter};
pub use error::ProtocolError;
pub use packets::{ClientPacket, MatchStarted, ServerPacket, Welcome};
pub use snapshot::{CompletionEvent, DogSnapshot, InputPacket, SheepSnapshot, Snapshot};
