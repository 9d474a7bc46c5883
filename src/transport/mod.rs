//! Target-side transport links. Each one frames XCP packets for a specific
//! physical layer and recovers packet boundaries from a lossy byte or frame
//! stream:
//!
//! - [`mbrtu`]: Modbus RTU over half-duplex RS485, T3.5 idle framing.
//! - [`rs232`]: plain UART, length-prefixed framing with an optional
//!   additive checksum.
//! - [`can_link`]: classic CAN or CAN FD, one packet per frame.
//!
//! All links are polled from the bootloader's main loop and never block on
//! reception. Corrupted or foreign traffic is dropped silently; on these
//! buses that is routine, and the XCP master's timeout handles the retry.
pub mod can_link;
pub mod can_msg;
pub mod mbrtu;
pub mod rs232;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;
