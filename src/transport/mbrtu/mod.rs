//! Modbus RTU link with XCP packets embedded through a user-defined function
//! code, for half-duplex RS485 buses.
//!
//! Frame layout on the wire:
//!
//! ```text
//!  -----------------------------------------------------------------------
//! | Node ID | Fcn code | XCP len |        XCP data         |  CRC16 (LE)  |
//!  -----------------------------------------------------------------------
//! ```
//!
//! End of frame is the Modbus T3.5 idle event: three and a half character
//! times without a new byte. The redundant XCP length byte exists for the
//! benefit of non-realtime hosts, which cannot sample T3.5 reliably and
//! instead count bytes; this side validates it as an extra consistency check.
//!
//! The UART must run in polled mode. Reception and end-of-frame detection
//! happen inside [`MbRtuLink::receive_packet`], which the bootloader calls
//! from its main loop; an interrupt-driven UART would fight that design.
use crate::error::{ConfigError, LinkError};
use crate::infra::crc::crc16_modbus;
use crate::infra::timing::{tick_delta, us_to_ticks, Deadline};
use crate::transport::traits::clock::{FreeRunningClock, MillisClock, Watchdog};
use crate::transport::traits::uart_port::{Rs485Transceiver, UartPort};

/// Frame overhead around the XCP payload: node id, function code, XCP
/// length, and the two CRC bytes.
pub const MBRTU_FRAME_OVERHEAD: usize = 5;
/// Largest XCP payload the frame format can carry.
pub const MBRTU_MAX_DATA: u8 = 251;
/// Full frame buffer size for the largest payload.
const MBRTU_FRAME_MAX: usize = MBRTU_MAX_DATA as usize + MBRTU_FRAME_OVERHEAD;
/// Deadline for one byte to clear the transmit path. Generous; expiry means
/// the peripheral failed.
const MBRTU_BYTE_TX_TIMEOUT_MS: u32 = 10;
/// T3.5 for baudrates above 19200 bps is fixed at 1750 µs per the Modbus
/// spec, expressed in 10 µs ticks.
const MBRTU_T35_TICKS_FAST: u16 = 175;

//================================================================================SETTINGS

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Link configuration, validated when the link context is created.
pub struct MbRtuSettings {
    /// Communication speed in bits per second. Also determines T3.5.
    pub baudrate: u32,
    /// This node's Modbus slave address (1..=247).
    pub node_id: u8,
    /// User-defined function code that marks embedded XCP packets. Must be
    /// in 65..=72 or 100..=110; some other device on the bus might already
    /// use the default of 109, in which case pick another.
    pub function_code: u8,
    /// Largest XCP payload accepted from the bus (1..=251).
    pub rx_max_data: u8,
    /// Largest XCP payload handed to [`MbRtuLink::transmit_packet`] (1..=251).
    pub tx_max_data: u8,
    /// Settle time around asserting the driver-enable pin, in µs.
    /// Hardware, wire length and bus capacitance determine what is needed.
    pub driver_enable_delay_us: u16,
    /// Settle time around releasing the driver-enable pin, in µs.
    pub driver_disable_delay_us: u16,
}

impl Default for MbRtuSettings {
    fn default() -> Self {
        Self {
            baudrate: 57_600,
            node_id: 1,
            function_code: 109,
            rx_max_data: MBRTU_MAX_DATA,
            tx_max_data: MBRTU_MAX_DATA,
            driver_enable_delay_us: 10,
            driver_disable_delay_us: 10,
        }
    }
}

impl MbRtuSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.baudrate < 1200 {
            return Err(ConfigError::InvalidBaudrate(self.baudrate));
        }
        if !(1..=247).contains(&self.node_id) {
            return Err(ConfigError::InvalidNodeId(self.node_id));
        }
        if !(65..=72).contains(&self.function_code)
            && !(100..=110).contains(&self.function_code)
        {
            return Err(ConfigError::InvalidFunctionCode(self.function_code));
        }
        if self.rx_max_data == 0 || self.rx_max_data > MBRTU_MAX_DATA {
            return Err(ConfigError::InvalidMaxData(self.rx_max_data));
        }
        if self.tx_max_data == 0 || self.tx_max_data > MBRTU_MAX_DATA {
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
    /// Valid frame addressed to this node; XCP payload length attached.
    Delivered(usize),
    /// A frame completed but failed CRC validation.
    ChecksumInvalid,
    /// A valid frame for another node, or with a foreign function code.
    NotAddressedToUs,
    /// A frame shorter than the Modbus minimum, or whose embedded XCP
    /// length disagrees with the byte count on the wire.
    LengthInvalid,
}

/// Frame reception phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxPhase {
    /// Waiting for the first byte after an idle gap.
    Idle,
    /// Bytes of a frame are arriving.
    Receiving,
}

/// Modbus RTU link context. Owns the UART, the RS485 direction control and
/// the system services for the duration of the session.
pub struct MbRtuLink<U, S> {
    uart: U,
    system: S,
    settings: MbRtuSettings,
    /// T3.5 idle time in 10 µs ticks, derived from the baudrate.
    t35_ticks: u16,
    phase: RxPhase,
    rx_frame: [u8; MBRTU_FRAME_MAX],
    rx_length: usize,
    last_rx_ticks: u16,
    tx_frame: [u8; MBRTU_FRAME_MAX],
}

impl<U, S> MbRtuLink<U, S>
where
    U: UartPort + Rs485Transceiver,
    S: MillisClock + FreeRunningClock + Watchdog,
{
    /// Create the link context. The UART must already be configured for the
    /// requested baudrate, in polled mode.
    pub fn new(uart: U, system: S, settings: MbRtuSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let t35_ticks = t35_ticks(settings.baudrate);
        Ok(Self {
            uart,
            system,
            settings,
            t35_ticks,
            phase: RxPhase::Idle,
            rx_frame: [0; MBRTU_FRAME_MAX],
            rx_length: 0,
            last_rx_ticks: 0,
            tx_frame: [0; MBRTU_FRAME_MAX],
        })
    }

    /// Synchronize to the bus: switch the transceiver to receive mode, then
    /// wait for one full T3.5 idle period. A byte arriving mid-wait restarts
    /// the idle detection, so the link never starts in the middle of someone
    /// else's frame. Blocks until the bus goes quiet; the watchdog is
    /// serviced throughout.
    pub fn init(&mut self) {
        self.uart.set_driver_output(false);
        let mut start_ticks = self.system.ticks();
        loop {
            self.system.service();
            let current_ticks = self.system.ticks();
            if self.uart.read_byte().is_some() {
                start_ticks = current_ticks;
            }
            if tick_delta(current_ticks, start_ticks) >= self.t35_ticks {
                break;
            }
        }
    }

    /// Poll for a received XCP packet. Call this from the main loop; each
    /// call consumes at most one byte from the UART and checks for the T3.5
    /// end-of-frame event. Returns the XCP payload once a complete, valid
    /// frame addressed to this node has been captured. Anything else (CRC
    /// mismatch, foreign address, malformed length) is dropped without a
    /// trace, as the bus is shared and not every frame is ours to judge.
    pub fn receive_packet(&mut self) -> Option<&[u8]> {
        match self.poll() {
            RxOutcome::Delivered(len) => Some(&self.rx_frame[3..3 + len]),
            _ => None,
        }
    }

    fn poll(&mut self) -> RxOutcome {
        let current_ticks = self.system.ticks();

        if let Some(byte) = self.uart.read_byte() {
            self.last_rx_ticks = current_ticks;
            if self.phase == RxPhase::Idle {
                self.rx_length = 0;
                self.phase = RxPhase::Receiving;
            }
            if self.rx_length < self.rx_capacity() {
                self.rx_frame[self.rx_length] = byte;
                self.rx_length += 1;
            } else {
                // Frame longer than supported. Discard it and resync on the
                // next idle gap.
                #[cfg(feature = "defmt")]
                defmt::trace!("mbrtu: rx overflow, frame discarded");
                self.phase = RxPhase::Idle;
            }
        }

        if self.phase == RxPhase::Receiving
            && tick_delta(current_ticks, self.last_rx_ticks) >= self.t35_ticks
        {
            self.phase = RxPhase::Idle;
            return self.validate_frame();
        }
        RxOutcome::Pending
    }

    /// Validate the frame captured in `rx_frame` after a T3.5 event.
    fn validate_frame(&self) -> RxOutcome {
        let frame = &self.rx_frame[..self.rx_length];
        // Address, function code and CRC16 are the bare Modbus minimum.
        if frame.len() < 4 {
            return RxOutcome::LengthInvalid;
        }
        let crc_calculated = crc16_modbus(&frame[..frame.len() - 2]);
        let crc_received =
            frame[frame.len() - 2] as u16 | ((frame[frame.len() - 1] as u16) << 8);
        if crc_calculated != crc_received {
            #[cfg(feature = "defmt")]
            defmt::trace!("mbrtu: crc mismatch, frame dropped");
            return RxOutcome::ChecksumInvalid;
        }
        if frame[0] != self.settings.node_id || frame[1] != self.settings.function_code {
            return RxOutcome::NotAddressedToUs;
        }
        if frame.len() < MBRTU_FRAME_OVERHEAD
            || frame[2] as usize != frame.len() - MBRTU_FRAME_OVERHEAD
        {
            return RxOutcome::LengthInvalid;
        }
        RxOutcome::Delivered(frame.len() - MBRTU_FRAME_OVERHEAD)
    }

    /// Transmit one XCP packet as a Modbus RTU frame.
    ///
    /// XCP traffic is strictly request/response and a response only goes out
    /// after the preceding request's T3.5 end-of-frame event, so the
    /// inter-frame separation the protocol demands is already guaranteed and
    /// no extra wait is inserted here.
    ///
    /// The driver-enable pin is asserted around the transfer with the
    /// configured settle delays, and released even when a byte times out.
    pub fn transmit_packet(&mut self, data: &[u8]) -> Result<(), LinkError> {
        if data.len() > self.settings.tx_max_data as usize {
            return Err(LinkError::PacketTooLarge);
        }
        let total = data.len() + MBRTU_FRAME_OVERHEAD;

        self.tx_frame[0] = self.settings.node_id;
        self.tx_frame[1] = self.settings.function_code;
        self.tx_frame[2] = data.len() as u8;
        self.tx_frame[3..3 + data.len()].copy_from_slice(data);
        // CRC covers slave address, function code and the XCP length byte.
        let checksum = crc16_modbus(&self.tx_frame[..data.len() + 3]);
        self.tx_frame[data.len() + 3] = (checksum & 0xFF) as u8;
        self.tx_frame[data.len() + 4] = (checksum >> 8) as u8;

        self.guard_delay(self.settings.driver_enable_delay_us);
        self.uart.set_driver_output(true);
        self.guard_delay(self.settings.driver_enable_delay_us);

        let result = self.send_frame(total);

        self.guard_delay(self.settings.driver_disable_delay_us);
        self.uart.set_driver_output(false);
        self.guard_delay(self.settings.driver_disable_delay_us);

        result
    }

    fn send_frame(&mut self, total: usize) -> Result<(), LinkError> {
        for index in 0..total {
            self.system.service();
            let byte = self.tx_frame[index];
            self.transmit_byte(byte, index == total - 1)?;
        }
        Ok(())
    }

    /// Push one byte out and wait for the peripheral to take it. For the
    /// last byte of a frame the wait extends to full shift-register
    /// completion, otherwise the transceiver's output would get disabled
    /// while the stop bit is still on the wire.
    fn transmit_byte(&mut self, byte: u8, end_of_packet: bool) -> Result<(), LinkError> {
        self.uart.write_byte(byte);
        let deadline = Deadline::after(self.system.millis(), MBRTU_BYTE_TX_TIMEOUT_MS);
        loop {
            let done = if end_of_packet {
                self.uart.tx_complete()
            } else {
                self.uart.tx_register_empty()
            };
            if done {
                return Ok(());
            }
            self.system.service();
            if deadline.expired(self.system.millis()) {
                return Err(LinkError::TransmitTimeout);
            }
        }
    }

    /// Busy-wait on the free-running counter. Used for the short settle
    /// delays around the driver-enable pin.
    fn guard_delay(&mut self, delay_us: u16) {
        let wait_ticks = us_to_ticks(delay_us);
        let start_ticks = self.system.ticks();
        while tick_delta(self.system.ticks(), start_ticks) < wait_ticks {
            self.system.service();
        }
    }

    fn rx_capacity(&self) -> usize {
        self.settings.rx_max_data as usize + MBRTU_FRAME_OVERHEAD
    }
}

/// Derive the T3.5 idle time in 10 µs ticks from the baudrate.
///
/// Above 19200 bps the Modbus specification fixes the value at 1750 µs.
/// Below that it is 3.5 character times of 11 bits each, rounded up:
/// `3.5 * 11 * 100_000 / baudrate` ticks.
fn t35_ticks(baudrate: u32) -> u16 {
    if baudrate > 19_200 {
        MBRTU_T35_TICKS_FAST
    } else {
        (((3_850_000 + (baudrate - 1)) / baudrate) + 1) as u16
    }
}
