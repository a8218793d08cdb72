//! The sync packet exchanged between the two nodes
//!
//! The packet is a fixed 8-byte record without versioning, addressing or
//! integrity protection beyond what the radio link layer provides (address
//! filtering and a 16-bit CRC).

use core::mem::size_of;

use serde::{Deserialize, Serialize};
use ssmarshal;


/// The length of an encoded [`SyncPacket`]
pub const PACKET_LEN: usize = size_of::<SyncPacket>();


/// Sync packet, as sent over the air
///
/// Both fields are signed 32-bit integers, encoded little-endian in field
/// order.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct SyncPacket {
    /// The sender's sync timer, captured by hardware when the transmission
    /// was triggered
    ///
    /// The receiver adds the calibrated TX chain delay to this value to get
    /// the sender's timer at the moment the receiver detected the packet's
    /// address.
    pub timer_val: i32,

    /// The sender's reference clock counter at the same moment
    ///
    /// Only carried for correlation on the receiving side. It plays no part
    /// in the offset computation.
    pub rtc_val: i32,
}

impl SyncPacket {
    /// Serializes the packet into its wire representation
    pub fn encode(&self) -> Result<[u8; PACKET_LEN], ssmarshal::Error> {
        let mut buf = [0; PACKET_LEN];
        ssmarshal::serialize(&mut buf, self)?;

        Ok(buf)
    }

    /// Deserializes a packet from its wire representation
    pub fn decode(buf: &[u8; PACKET_LEN]) -> Result<Self, ssmarshal::Error> {
        let (packet, _) = ssmarshal::deserialize::<Self>(buf)?;

        Ok(packet)
    }
}
