//! Host-side interfaces used by programming tools, as opposed to the
//! `no_std` links that run inside the bootloader target.
pub mod socketcan;
