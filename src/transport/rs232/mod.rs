//! Length-prefixed RS232 link for full-duplex UART connections.
//!
//! Frame layout on the wire:
//!
//! ```text
//!  --------------------------------------------------
//! | XCP len |        XCP data         | checksum (*) |
//!  --------------------------------------------------
//! ```
//!
//! The length byte declares the payload size, so frame boundaries come from
//! counting bytes rather than from line timing. The trailing checksum byte,
//! an 8-bit additive checksum seeded with the length byte, only exists when
//! both sides enable it in their settings.
//!
//! Synchronization is optimistic: any byte that parses as a plausible length
//! starts a frame capture. A desynchronized stream therefore produces bogus
//! captures until a 100 ms reception pause lets the receiver fall back to
//! waiting for a length byte. XCP's request/response pattern provides such
//! pauses naturally.
use crate::error::{ConfigError, LinkError};
use crate::infra::timing::Deadline;
use crate::transport::traits::clock::{MillisClock, Watchdog};
use crate::transport::traits::uart_port::UartPort;

/// Largest XCP payload the one-byte length prefix can declare.
pub const RS232_MAX_DATA: u8 = 255;
/// Frame buffer size: length byte, payload, optional checksum byte.
const RS232_FRAME_MAX: usize = RS232_MAX_DATA as usize + 2;
/// A frame whose remaining bytes stay away longer than this is abandoned.
const RS232_CTO_RX_PACKET_TIMEOUT_MS: u32 = 100;
/// Deadline for one byte to clear the transmit path.
const RS232_BYTE_TX_TIMEOUT_MS: u32 = 10;

//================================================================================SETTINGS

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Link configuration, validated when the link context is created.
pub struct Rs232Settings {
    /// Largest XCP payload accepted from the peer (1..=255).
    pub rx_max_data: u8,
    /// Largest XCP payload handed to [`Rs232Link::transmit_packet`] (1..=255).
    pub tx_max_data: u8,
    /// Append and verify the additive checksum byte. Both sides must agree.
    pub checksum: bool,
}

impl Default for Rs232Settings {
    fn default() -> Self {
        Self {
            rx_max_data: 64,
            tx_max_data: 64,
            checksum: false,
        }
    }
}

impl Rs232Settings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.rx_max_data == 0 {
            return Err(ConfigError::InvalidMaxData(self.rx_max_data));
        }
        if self.tx_max_data == 0 {
            return Err(ConfigError::InvalidMaxData(self.tx_max_data));
        }
        Ok(())
    }
}

//====================================================================================LINK

/// Outcome of one receive poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxOutcome {
    /// No complete frame this poll.
    Pending,
    /// A frame completed and passed validation; payload length attached.
    Delivered(usize),
    /// A frame completed but its checksum byte did not add up.
    ChecksumInvalid,
    /// A started frame stalled for too long and was abandoned.
    TimedOut,
}

/// Frame reception phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxPhase {
    /// Waiting for a byte that parses as a plausible payload length.
    AwaitingLength,
    /// Counting down the declared payload (and checksum) bytes.
    ReceivingPayload,
}

/// RS232 link context. Owns the UART and the system services for the
/// duration of the session. The UART must already be configured for the
/// agreed baudrate, 8N1, in polled mode.
pub struct Rs232Link<U, S> {
    uart: U,
    system: S,
    settings: Rs232Settings,
    phase: RxPhase,
    frame: [u8; RS232_FRAME_MAX],
    /// Bytes captured after the length byte.
    received: usize,
    deadline: Deadline,
}

impl<U, S> Rs232Link<U, S>
where
    U: UartPort,
    S: MillisClock + Watchdog,
{
    /// Create the link context.
    pub fn new(uart: U, system: S, settings: Rs232Settings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            uart,
            system,
            settings,
            phase: RxPhase::AwaitingLength,
            frame: [0; RS232_FRAME_MAX],
            received: 0,
            deadline: Deadline::after(0, 0),
        })
    }

    /// Poll for a received XCP packet. Call this from the main loop; each
    /// call consumes at most one byte from the UART. Returns the payload
    /// once the declared byte count (plus the checksum byte, when enabled)
    /// has been captured and validated.
    pub fn receive_packet(&mut self) -> Option<&[u8]> {
        match self.poll() {
            RxOutcome::Delivered(len) => Some(&self.frame[1..1 + len]),
            _ => None,
        }
    }

    fn poll(&mut self) -> RxOutcome {
        match self.phase {
            RxPhase::AwaitingLength => {
                if let Some(byte) = self.uart.read_byte() {
                    if byte > 0 && byte <= self.settings.rx_max_data {
                        self.frame[0] = byte;
                        self.received = 0;
                        self.deadline = Deadline::after(
                            self.system.millis(),
                            RS232_CTO_RX_PACKET_TIMEOUT_MS,
                        );
                        self.phase = RxPhase::ReceivingPayload;
                    }
                    // Anything else is line noise or a stale frame tail;
                    // skip it and keep looking for a length byte.
                }
                RxOutcome::Pending
            }
            RxPhase::ReceivingPayload => {
                if let Some(byte) = self.uart.read_byte() {
                    self.frame[self.received + 1] = byte;
                    self.received += 1;
                    let expected =
                        self.frame[0] as usize + usize::from(self.settings.checksum);
                    if self.received == expected {
                        self.phase = RxPhase::AwaitingLength;
                        if self.settings.checksum && !self.checksum_matches() {
                            #[cfg(feature = "defmt")]
                            defmt::trace!("rs232: checksum mismatch, frame dropped");
                            return RxOutcome::ChecksumInvalid;
                        }
                        return RxOutcome::Delivered(self.frame[0] as usize);
                    }
                    RxOutcome::Pending
                } else if self.deadline.expired(self.system.millis()) {
                    // The frame stalled. Drop the capture so the line can
                    // resynchronize on the next length byte.
                    #[cfg(feature = "defmt")]
                    defmt::trace!("rs232: packet reception timed out");
                    self.phase = RxPhase::AwaitingLength;
                    RxOutcome::TimedOut
                } else {
                    RxOutcome::Pending
                }
            }
        }
    }

    /// Verify the additive checksum of a completed capture: the sum of the
    /// length byte and all payload bytes, truncated to eight bits, must
    /// equal the trailing checksum byte.
    fn checksum_matches(&self) -> bool {
        let declared = self.frame[0] as usize;
        let mut checksum = 0u8;
        for &byte in &self.frame[..declared + 1] {
            checksum = checksum.wrapping_add(byte);
        }
        checksum == self.frame[declared + 1]
    }

    /// Transmit one XCP packet: length byte, payload, and the checksum byte
    /// when enabled.
    pub fn transmit_packet(&mut self, data: &[u8]) -> Result<(), LinkError> {
        if data.len() > self.settings.tx_max_data as usize {
            return Err(LinkError::PacketTooLarge);
        }
        self.transmit_byte(data.len() as u8)?;
        let mut checksum = data.len() as u8;
        for &byte in data {
            self.transmit_byte(byte)?;
            checksum = checksum.wrapping_add(byte);
        }
        if self.settings.checksum {
            self.transmit_byte(checksum)?;
        }
        Ok(())
    }

    fn transmit_byte(&mut self, byte: u8) -> Result<(), LinkError> {
        self.system.service();
        self.uart.write_byte(byte);
        let deadline = Deadline::after(self.system.millis(), RS232_BYTE_TX_TIMEOUT_MS);
        loop {
            if self.uart.tx_register_empty() {
                return Ok(());
            }
            self.system.service();
            if deadline.expired(self.system.millis()) {
                return Err(LinkError::TransmitTimeout);
            }
        }
    }
}
