//! Abstraction traits between the links and the board support package
//! (UART, RS485 transceiver, CAN controller, clocks, and watchdog).
pub mod can_controller;
pub mod clock;
pub mod uart_port;
