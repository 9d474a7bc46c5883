//! In-memory representation of a CAN message, shared between the target-side
//! link and the host-side SocketCAN interface, plus the CAN FD length tables.
//!
//! Identifiers use a single `u32` for both formats: 11-bit standard values as
//! is, 29-bit extended values with [`CAN_MSG_EXT_ID_MASK`] set in bit 31.
//! Hardware representations of the extended flag differ per driver, so the
//! marker bit is translated explicitly at every boundary instead of letting
//! the raw word leak through.
use embedded_can::{ExtendedId, Id, StandardId};

/// Maximum payload of a single CAN message (CAN FD frame size).
pub const CAN_MSG_MAX_LEN: usize = 64;
/// Bit 31 marks an identifier as 29-bit extended format.
pub const CAN_MSG_EXT_ID_MASK: u32 = 0x8000_0000;

/// Payload lengths a CAN FD frame can actually carry on the wire.
const FD_WIRE_LENGTHS: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Raw CAN message in the library's identifier form.
pub struct CanMsg {
    /// Identifier with the extended marker in bit 31.
    pub id: u32,
    /// Payload buffer. Unused tail bytes are zero.
    pub data: [u8; CAN_MSG_MAX_LEN],
    /// Number of valid payload bytes (0 to 64).
    pub len: u8,
}

impl CanMsg {
    /// Build a message from a marker-form identifier and a payload of at
    /// most [`CAN_MSG_MAX_LEN`] bytes.
    pub fn new(id: u32, payload: &[u8]) -> Option<Self> {
        if payload.len() > CAN_MSG_MAX_LEN {
            return None;
        }
        let mut data = [0u8; CAN_MSG_MAX_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Some(Self {
            id,
            data,
            len: payload.len() as u8,
        })
    }

    /// Valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// `true` when the identifier is 29-bit extended format.
    pub fn is_extended(&self) -> bool {
        self.id & CAN_MSG_EXT_ID_MASK != 0
    }
}

impl embedded_can::Frame for CanMsg {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        CanMsg::new(encode_id(id.into()), data)
    }

    /// Remote frames carry no payload and are ignored by every link, so they
    /// cannot be represented.
    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        self.id & CAN_MSG_EXT_ID_MASK != 0
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        decode_id(self.id)
    }

    fn dlc(&self) -> usize {
        self.len as usize
    }

    fn data(&self) -> &[u8] {
        self.payload()
    }
}

/// Fold a typed identifier into the marker-bit `u32` form.
pub fn encode_id(id: Id) -> u32 {
    match id {
        Id::Standard(standard) => standard.as_raw() as u32,
        Id::Extended(extended) => extended.as_raw() | CAN_MSG_EXT_ID_MASK,
    }
}

/// Expand a marker-bit `u32` into the typed identifier form. Out-of-range
/// bits are masked off, matching what the hardware registers would drop.
pub fn decode_id(raw: u32) -> Id {
    if raw & CAN_MSG_EXT_ID_MASK != 0 {
        match ExtendedId::new(raw & ExtendedId::MAX.as_raw()) {
            Some(extended) => Id::Extended(extended),
            None => Id::Extended(ExtendedId::ZERO),
        }
    } else {
        match StandardId::new((raw & StandardId::MAX.as_raw() as u32) as u16) {
            Some(standard) => Id::Standard(standard),
            None => Id::Standard(StandardId::ZERO),
        }
    }
}

/// Map a payload length to the CAN FD Data Length Code that carries it.
/// Lengths above 64 saturate to DLC 15.
pub fn fd_len_to_dlc(len: u8) -> u8 {
    match len {
        0..=8 => len,
        9..=12 => 9,
        13..=16 => 10,
        17..=20 => 11,
        21..=24 => 12,
        25..=32 => 13,
        33..=48 => 14,
        _ => 15,
    }
}

/// Map a CAN FD Data Length Code to the payload length it denotes.
/// DLC values above 15 saturate to 64.
pub fn fd_dlc_to_len(dlc: u8) -> u8 {
    FD_WIRE_LENGTHS[dlc.min(15) as usize]
}

/// Round a requested payload length up to the nearest length a CAN FD frame
/// can carry, clamping anything above 64 down to 64 first.
pub fn sanitize_fd_len(len: u8) -> u8 {
    fd_dlc_to_len(fd_len_to_dlc(len.min(CAN_MSG_MAX_LEN as u8)))
}
