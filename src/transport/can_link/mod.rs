//! CAN link mapping one XCP packet onto one CAN frame.
//!
//! Framing is the degenerate case: a classic frame carries up to 8 payload
//! bytes, a CAN FD frame up to 64, so no reassembly or boundary detection is
//! needed. Reception filters on one fixed identifier; transmission uses
//! another. Both identifiers are in the library's marker-bit form (see
//! [`crate::transport::can_msg`]).
//!
//! CAN FD payload lengths are quantized: a request that falls between two
//! representable lengths goes out padded with zero bytes at the next one up.
//! The XCP layer relies on its own length fields, so the padding is inert.
use crate::error::{ConfigError, LinkError};
use crate::infra::timing::Deadline;
use crate::transport::can_msg::{sanitize_fd_len, CanMsg, CAN_MSG_EXT_ID_MASK};
use crate::transport::traits::can_controller::{CanController, CanRxEvent};
use crate::transport::traits::clock::{MillisClock, Watchdog};
use embedded_can::{ExtendedId, StandardId};

/// Largest payload of a classic CAN frame.
pub const CAN_CLASSIC_MAX_DATA: u8 = 8;
/// Largest payload of a CAN FD frame.
pub const CAN_FD_MAX_DATA: u8 = 64;
/// Deadline for the controller to accept a frame for transmission.
const CAN_MSG_TX_TIMEOUT_MS: u32 = 50;

//================================================================================SETTINGS

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Link configuration, validated when the link context is created. There
/// are no meaningful defaults: both identifiers are assigned per project.
pub struct CanLinkSettings {
    /// Identifier of outgoing frames, marker-bit form.
    pub tx_msg_id: u32,
    /// Only frames with this identifier are received, marker-bit form.
    pub rx_msg_id: u32,
    /// Use CAN FD frames. The controller and the whole bus must support it.
    pub fd: bool,
}

impl CanLinkSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        validate_id(self.tx_msg_id)?;
        validate_id(self.rx_msg_id)?;
        Ok(())
    }
}

fn validate_id(id: u32) -> Result<(), ConfigError> {
    let raw = id & !CAN_MSG_EXT_ID_MASK;
    let limit = if id & CAN_MSG_EXT_ID_MASK != 0 {
        ExtendedId::MAX.as_raw()
    } else {
        StandardId::MAX.as_raw() as u32
    };
    if raw > limit {
        return Err(ConfigError::InvalidCanId(id));
    }
    Ok(())
}

//====================================================================================LINK

/// CAN link context. Owns the controller and the system services for the
/// duration of the session.
pub struct CanLink<C, S> {
    can: C,
    system: S,
    settings: CanLinkSettings,
    /// Latched when the controller reports bus-off or error passive.
    bus_error: bool,
    rx_msg: CanMsg,
}

impl<C, S> CanLink<C, S>
where
    C: CanController,
    S: MillisClock + Watchdog,
{
    /// Create the link context. The controller must already be configured
    /// for the agreed bitrate (and data bitrate, for CAN FD).
    pub fn new(can: C, system: S, settings: CanLinkSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            can,
            system,
            settings,
            bus_error: false,
            rx_msg: CanMsg {
                id: 0,
                data: [0; CAN_FD_MAX_DATA as usize],
                len: 0,
            },
        })
    }

    /// Poll for a received XCP packet. Drains at most one event from the
    /// controller per call. Frames with any other identifier are not ours
    /// and are dropped; controller error events latch the bus error flag.
    pub fn receive_packet(&mut self) -> Option<&[u8]> {
        match self.can.poll() {
            Some(CanRxEvent::Frame(msg)) => {
                if msg.id != self.settings.rx_msg_id {
                    return None;
                }
                self.rx_msg = msg;
                Some(self.rx_msg.payload())
            }
            Some(CanRxEvent::BusError) => {
                #[cfg(feature = "defmt")]
                defmt::trace!("can: controller reported a bus error");
                self.bus_error = true;
                None
            }
            None => None,
        }
    }

    /// Transmit one XCP packet as a single CAN frame. Waits up to 50 ms for
    /// the controller to accept the frame, servicing the watchdog while a
    /// busy mailbox holds it off.
    pub fn transmit_packet(&mut self, data: &[u8]) -> Result<(), LinkError> {
        let max_data = if self.settings.fd {
            CAN_FD_MAX_DATA
        } else {
            CAN_CLASSIC_MAX_DATA
        };
        if data.len() > max_data as usize {
            return Err(LinkError::PacketTooLarge);
        }
        let mut msg = match CanMsg::new(self.settings.tx_msg_id, data) {
            Some(msg) => msg,
            None => return Err(LinkError::PacketTooLarge),
        };
        if self.settings.fd {
            // Pad up to the nearest wire length; the tail bytes are zero.
            msg.len = sanitize_fd_len(msg.len);
        }

        let deadline = Deadline::after(self.system.millis(), CAN_MSG_TX_TIMEOUT_MS);
        loop {
            if self.can.try_transmit(&msg) {
                return Ok(());
            }
            self.system.service();
            if deadline.expired(self.system.millis()) {
                return Err(LinkError::TransmitTimeout);
            }
        }
    }

    /// Whether a bus error was latched since the last call. Reading clears
    /// the flag, so the caller sees each error episode once.
    pub fn is_bus_error(&mut self) -> bool {
        let latched = self.bus_error;
        self.bus_error = false;
        latched
    }
}
