//! Test doubles that simulate a target board during integration tests: a
//! UART with scripted byte arrivals, a CAN controller with scripted events,
//! and a shared clock that advances as the links poll it.
// Each scenario crate uses a subset of these helpers.
#![allow(dead_code)]
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use xcplink::transport::can_msg::CanMsg;
use xcplink::transport::traits::can_controller::{CanController, CanRxEvent};
use xcplink::transport::traits::clock::{FreeRunningClock, MillisClock, Watchdog};
use xcplink::transport::traits::uart_port::{Rs485Transceiver, UartPort};

struct SimState {
    /// Scheduled arrivals as (due tick, byte), in chronological order.
    script: VecDeque<(u32, u8)>,
    tx_log: Vec<u8>,
    de_log: Vec<bool>,
    /// Current time in 10 µs ticks, wide so long runs never wrap the sim.
    now_ticks: u32,
    services: u32,
}

#[derive(Clone)]
/// Board double for the serial links. Clone handles share one state, so the
/// same object can serve as both the UART and the system services of a link
/// while the test keeps a handle for scripting and assertions.
///
/// Time advances by one tick (10 µs) on every clock read and on every
/// data-register poll, so the polling loops move through the byte script
/// without the test driving the clock by hand.
pub struct SerialSim {
    state: Rc<RefCell<SimState>>,
}

impl SerialSim {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                script: VecDeque::new(),
                tx_log: Vec::new(),
                de_log: Vec::new(),
                now_ticks: 0,
                services: 0,
            })),
        }
    }

    /// Current simulated time in ticks.
    pub fn now_tick(&self) -> u32 {
        self.state.borrow().now_ticks
    }

    /// Schedule one byte to arrive at an absolute tick.
    pub fn schedule_byte(&self, due_tick: u32, byte: u8) {
        self.state.borrow_mut().script.push_back((due_tick, byte));
    }

    /// Schedule a byte burst starting at `start_tick` with `gap_ticks`
    /// between bytes. Returns the arrival tick of the last byte.
    pub fn schedule_frame(&self, start_tick: u32, gap_ticks: u32, bytes: &[u8]) -> u32 {
        let mut due = start_tick;
        for &byte in bytes {
            self.schedule_byte(due, byte);
            due += gap_ticks;
        }
        due - gap_ticks
    }

    /// Everything the link transmitted so far.
    pub fn tx_log(&self) -> Vec<u8> {
        self.state.borrow().tx_log.clone()
    }

    /// Every driver-enable transition so far.
    pub fn de_log(&self) -> Vec<bool> {
        self.state.borrow().de_log.clone()
    }

    /// Watchdog services observed so far.
    pub fn services(&self) -> u32 {
        self.state.borrow().services
    }
}

impl UartPort for SerialSim {
    fn read_byte(&mut self) -> Option<u8> {
        let mut state = self.state.borrow_mut();
        let now = state.now_ticks;
        // Polling the data register costs one tick, byte or not.
        state.now_ticks += 1;
        match state.script.front() {
            Some(&(due, byte)) if due <= now => {
                state.script.pop_front();
                Some(byte)
            }
            _ => None,
        }
    }

    fn write_byte(&mut self, byte: u8) {
        self.state.borrow_mut().tx_log.push(byte);
    }

    fn tx_register_empty(&mut self) -> bool {
        true
    }

    fn tx_complete(&mut self) -> bool {
        true
    }
}

impl Rs485Transceiver for SerialSim {
    fn set_driver_output(&mut self, enable: bool) {
        self.state.borrow_mut().de_log.push(enable);
    }
}

impl FreeRunningClock for SerialSim {
    fn ticks(&mut self) -> u16 {
        let mut state = self.state.borrow_mut();
        let now = state.now_ticks;
        state.now_ticks += 1;
        (now & 0xFFFF) as u16
    }
}

impl MillisClock for SerialSim {
    fn millis(&mut self) -> u32 {
        let mut state = self.state.borrow_mut();
        let now = state.now_ticks;
        state.now_ticks += 1;
        now / 100
    }
}

impl Watchdog for SerialSim {
    fn service(&mut self) {
        self.state.borrow_mut().services += 1;
    }
}

#[derive(Clone)]
/// Controller double for the CAN link: scripted receive events plus a
/// transmit log.
pub struct CanSim {
    state: Rc<RefCell<CanSimState>>,
}

struct CanSimState {
    events: VecDeque<CanRxEvent>,
    tx_log: Vec<CanMsg>,
}

impl CanSim {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(CanSimState {
                events: VecDeque::new(),
                tx_log: Vec::new(),
            })),
        }
    }

    pub fn push_frame(&self, msg: CanMsg) {
        self.state.borrow_mut().events.push_back(CanRxEvent::Frame(msg));
    }

    pub fn push_bus_error(&self) {
        self.state.borrow_mut().events.push_back(CanRxEvent::BusError);
    }

    pub fn tx_log(&self) -> Vec<CanMsg> {
        self.state.borrow().tx_log.clone()
    }
}

impl CanController for CanSim {
    fn poll(&mut self) -> Option<CanRxEvent> {
        self.state.borrow_mut().events.pop_front()
    }

    fn try_transmit(&mut self, msg: &CanMsg) -> bool {
        self.state.borrow_mut().tx_log.push(*msg);
        true
    }
}
