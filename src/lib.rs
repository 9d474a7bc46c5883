//! `xcplink` library: transport links that carry XCP packets between a
//! bootloader target and its programming host over lossy byte and frame
//! streams. The crate exposes the target-side links (Modbus RTU, RS232,
//! CAN), the checksum and timing primitives they build on, and an optional
//! `std` host interface for Linux SocketCAN.
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(test)]
extern crate std;

/// Link configuration and transmit errors.
pub mod error;
/// Checksum engines, image signature, and wrap-safe time arithmetic.
pub mod infra;
/// Target-side transport links and their hardware abstraction traits.
pub mod transport;

/// Host-side Linux SocketCAN interface (requires the `host-socketcan`
/// feature, which pulls in `std`).
#[cfg(feature = "host-socketcan")]
pub mod host;
