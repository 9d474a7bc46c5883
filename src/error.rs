//! Error definitions shared across the target-side link modules.
//! Host-side socket errors live in `host::socketcan` because they wrap
//! `std::io::Error` types that do not exist in `no_std` builds.
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Rejected link settings, reported before a link context is created.
pub enum ConfigError {
    /// Baudrate below the 1200 bps minimum required for T3.5 derivation.
    #[error("Unsupported baudrate: {0}")]
    InvalidBaudrate(u32),
    /// Modbus node address outside the slave range 1..=247.
    #[error("Invalid node id: {0}")]
    InvalidNodeId(u8),
    /// Function code outside the user-defined ranges 65..=72 and 100..=110.
    #[error("Invalid user function code: {0}")]
    InvalidFunctionCode(u8),
    /// Maximum packet size of zero, or beyond what the frame format carries.
    #[error("Invalid maximum packet size: {0}")]
    InvalidMaxData(u8),
    /// CAN identifier with bits outside the 11-bit or 29-bit range.
    #[error("Invalid CAN identifier: {0:#010x}")]
    InvalidCanId(u32),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Failures while pushing a packet out of a link.
pub enum LinkError {
    /// A byte or frame did not leave the peripheral within its deadline.
    /// The packet attempt is abandoned; the peer's timeout drives the retry.
    #[error("Transmit path stalled")]
    TransmitTimeout,
    /// Payload longer than the configured maximum for this link.
    #[error("Packet exceeds the configured maximum length")]
    PacketTooLarge,
}
