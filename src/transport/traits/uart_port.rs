//! Minimal abstraction for a polled UART peripheral. Allows the serial links
//! to plug into various targets (vendor HAL, register-level driver, test
//! double) without owning baudrate or pin setup, which stays with the board.

/// Contract for byte-level, non-blocking UART access.
///
/// The links never block inside these methods. Pacing and deadlines live in
/// the link state machines, so every method here must return immediately.
pub trait UartPort {
    /// Take the next received byte out of the peripheral, if one is pending.
    fn read_byte(&mut self) -> Option<u8>;
    /// Load one byte into the transmit data register. Only called after
    /// `tx_register_empty` reported space, or right after the previous byte
    /// completed.
    fn write_byte(&mut self, byte: u8);
    /// `true` when the transmit data register can accept the next byte.
    fn tx_register_empty(&mut self) -> bool;
    /// `true` once the last loaded byte has fully left the shift register.
    /// Half-duplex links gate their driver-enable release on this.
    fn tx_complete(&mut self) -> bool;
}

/// Direction control for an RS485 transceiver's DE/NRE pin pair.
pub trait Rs485Transceiver {
    /// Drive the transceiver into transmit mode (`true`) or receive mode
    /// (`false`).
    fn set_driver_output(&mut self, enable: bool);
}
