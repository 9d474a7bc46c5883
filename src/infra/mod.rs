//! Support components shared by the transport links and by host tooling:
//! checksum engines for frame validation and image integrity, plus wrap-safe
//! time arithmetic for the polling loops.
pub mod crc;
pub mod signature;
pub mod timing;
