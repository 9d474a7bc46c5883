//! Scripted hardware doubles shared by the transport unit tests.
use crate::transport::can_msg::CanMsg;
use crate::transport::traits::can_controller::{CanController, CanRxEvent};
use crate::transport::traits::clock::{FreeRunningClock, MillisClock, Watchdog};
use crate::transport::traits::uart_port::{Rs485Transceiver, UartPort};
use std::collections::VecDeque;
use std::vec::Vec;

/// UART double: queued receive bytes, recorded transmit bytes, and
/// controllable transmit-path status flags.
pub(crate) struct MockUart {
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
    /// Value reported by `tx_register_empty`.
    pub tx_accepts: bool,
    /// Value reported by `tx_complete`.
    pub tx_done: bool,
    /// Every driver-enable transition, in call order.
    pub de_log: Vec<bool>,
}

impl MockUart {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            tx: Vec::new(),
            tx_accepts: true,
            tx_done: true,
            de_log: Vec::new(),
        }
    }

    pub fn queue_bytes(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }
}

impl UartPort for MockUart {
    fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn write_byte(&mut self, byte: u8) {
        self.tx.push(byte);
    }

    fn tx_register_empty(&mut self) -> bool {
        self.tx_accepts
    }

    fn tx_complete(&mut self) -> bool {
        self.tx_done
    }
}

impl Rs485Transceiver for MockUart {
    fn set_driver_output(&mut self, enable: bool) {
        self.de_log.push(enable);
    }
}

/// Clock and watchdog double. Both clocks return their current value and
/// then advance by the configured step, so wait loops terminate while
/// single polls observe a stable reading when the step is zero.
pub(crate) struct MockSystem {
    pub now_ms: u32,
    pub ms_step: u32,
    pub now_ticks: u16,
    pub tick_step: u16,
    pub services: u32,
}

impl MockSystem {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            ms_step: 0,
            now_ticks: 0,
            tick_step: 0,
            services: 0,
        }
    }
}

impl MillisClock for MockSystem {
    fn millis(&mut self) -> u32 {
        let now = self.now_ms;
        self.now_ms = self.now_ms.wrapping_add(self.ms_step);
        now
    }
}

impl FreeRunningClock for MockSystem {
    fn ticks(&mut self) -> u16 {
        let now = self.now_ticks;
        self.now_ticks = self.now_ticks.wrapping_add(self.tick_step);
        now
    }
}

impl Watchdog for MockSystem {
    fn service(&mut self) {
        self.services += 1;
    }
}

/// CAN controller double: queued receive events and recorded transmissions.
pub(crate) struct MockCan {
    pub rx: VecDeque<CanRxEvent>,
    pub tx: Vec<CanMsg>,
    /// Whether a transmit mailbox is free.
    pub mailbox_free: bool,
}

impl MockCan {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            tx: Vec::new(),
            mailbox_free: true,
        }
    }
}

impl CanController for MockCan {
    fn poll(&mut self) -> Option<CanRxEvent> {
        self.rx.pop_front()
    }

    fn try_transmit(&mut self, msg: &CanMsg) -> bool {
        if self.mailbox_free {
            self.tx.push(*msg);
        }
        self.mailbox_free
    }
}
