//! Linux SocketCAN interface for the host side of a CAN session.
//!
//! Reception runs on a dedicated event thread that drains the socket and
//! fans each frame out to registered [`CanEvents`] subscribers, so callers
//! get frames pushed to them instead of polling. Transmission and
//! subscription stay on the caller's threads. The interface works entirely
//! in the library's marker-bit identifier form (see
//! [`crate::transport::can_msg`]); the EFF bit of raw SocketCAN identifier
//! words never leaks through.
use crate::transport::can_msg::{decode_id, encode_id, sanitize_fd_len, CanMsg, CAN_MSG_EXT_ID_MASK};
use log::{debug, trace, warn};
use socketcan::errors::{CanError, ControllerProblem};
use socketcan::{
    CanAnyFrame, CanErrorFrame, CanFdFrame, CanFdSocket, CanFilter, CanFrame, CanSocket,
    EmbeddedFrame, Socket, SocketOptions,
};
use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// MTU reported by Linux on network interfaces that support CAN FD frames.
const CANFD_MTU: libc::c_int = 72;
/// EFF bit of a raw SocketCAN identifier word.
const CAN_EFF_FLAG: u32 = 0x8000_0000;
/// Error class: the controller went bus-off.
const CAN_ERR_BUSOFF: u32 = 0x0000_0040;
/// Error class: controller state changes (error warning/passive).
const CAN_ERR_CRTL: u32 = 0x0000_0004;
/// Sleep between socket drains on the event thread.
const EVENT_POLL_SLEEP_US: u64 = 10;

//==================================================================================ERRORS

/// Failures of the SocketCAN interface.
#[derive(Debug)]
pub enum Error {
    /// I/O error from the underlying socket operations.
    Io(io::Error),
    /// `connect` was called on an interface that is already connected.
    AlreadyConnected,
    /// `transmit` was called before `connect`.
    NotConnected,
    /// CAN FD was requested but the network interface does not support it.
    FdNotSupported,
    /// The message payload does not fit the negotiated frame format.
    PacketTooLarge,
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::AlreadyConnected => write!(f, "already connected"),
            Error::NotConnected => write!(f, "not connected"),
            Error::FdNotSupported => write!(f, "interface does not support CAN FD"),
            Error::PacketTooLarge => write!(f, "packet too large for the frame format"),
        }
    }
}

//================================================================================SETTINGS

/// Interface configuration.
#[derive(Debug, Clone)]
pub struct SocketCanSettings {
    /// Network interface name, e.g. `can0` or `vcan0`.
    pub device: String,
    /// Open a CAN FD socket. The interface MTU is probed to confirm
    /// support before the connection is accepted.
    pub fd: bool,
    /// Reception filter code, marker-bit form. Ignored while
    /// `filter_mask` is zero.
    pub filter_code: u32,
    /// Reception filter mask, marker-bit form. Zero receives everything.
    pub filter_mask: u32,
}

impl Default for SocketCanSettings {
    fn default() -> Self {
        Self {
            device: String::from("can0"),
            fd: false,
            filter_code: 0,
            filter_mask: 0,
        }
    }
}

//==================================================================================EVENTS

/// Subscriber callbacks, invoked from the event thread for received frames
/// and from the transmitting thread for sent ones. Implementations override
/// what they care about.
pub trait CanEvents {
    /// A data frame was received.
    fn msg_rxed(&self, _msg: &CanMsg) {}
    /// A frame was handed to the kernel for transmission.
    fn msg_txed(&self, _msg: &CanMsg) {}
}

type Subscribers = Vec<Arc<dyn CanEvents + Send + Sync>>;

/// State shared between the interface handle and the event thread.
struct SharedState {
    bus_error: Mutex<bool>,
    subscribers: RwLock<Subscribers>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            bus_error: Mutex::new(false),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    fn latch_bus_error(&self) {
        *self.bus_error.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    fn clear_bus_error(&self) {
        *self.bus_error.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    fn take_bus_error(&self) -> bool {
        let mut latched = self.bus_error.lock().unwrap_or_else(PoisonError::into_inner);
        let value = *latched;
        *latched = false;
        value
    }

    /// Clone the subscriber list so callbacks run without holding the lock.
    /// A subscriber may therefore register further subscribers from inside
    /// its callback without deadlocking.
    fn snapshot(&self) -> Subscribers {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn dispatch_rxed(&self, msg: &CanMsg) {
        for subscriber in self.snapshot() {
            subscriber.msg_rxed(msg);
        }
    }

    fn dispatch_txed(&self, msg: &CanMsg) {
        for subscriber in self.snapshot() {
            subscriber.msg_txed(msg);
        }
    }
}

//===============================================================================INTERFACE

/// Classic or FD socket behind one read/write surface.
enum RawSock {
    Classic(CanSocket),
    Fd(CanFdSocket),
}

impl RawSock {
    fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            RawSock::Classic(sock) => sock.set_nonblocking(true),
            RawSock::Fd(sock) => sock.set_nonblocking(true),
        }
    }

    fn apply_filters(&self, filters: &[CanFilter]) -> io::Result<()> {
        match self {
            RawSock::Classic(sock) => sock.set_filters(filters),
            RawSock::Fd(sock) => sock.set_filters(filters),
        }
    }

    fn apply_error_filter(&self, mask: u32) -> io::Result<()> {
        match self {
            RawSock::Classic(sock) => sock.set_error_filter(mask),
            RawSock::Fd(sock) => sock.set_error_filter(mask),
        }
    }

    fn raw_fd(&self) -> RawFd {
        match self {
            RawSock::Classic(sock) => sock.as_raw_fd(),
            RawSock::Fd(sock) => sock.as_raw_fd(),
        }
    }

    fn read_any(&self) -> io::Result<CanAnyFrame> {
        match self {
            RawSock::Classic(sock) => sock.read_frame().map(|frame| match frame {
                CanFrame::Data(data) => CanAnyFrame::Normal(data),
                CanFrame::Remote(remote) => CanAnyFrame::Remote(remote),
                CanFrame::Error(error) => CanAnyFrame::Error(error),
            }),
            RawSock::Fd(sock) => sock.read_frame(),
        }
    }

    fn write_msg(&self, msg: &CanMsg) -> Result<(), Error> {
        let id = decode_id(msg.id);
        match self {
            RawSock::Classic(sock) => {
                if msg.len > 8 {
                    return Err(Error::PacketTooLarge);
                }
                let frame = CanFrame::new(id, msg.payload()).ok_or(Error::PacketTooLarge)?;
                sock.write_frame(&frame)?;
            }
            RawSock::Fd(sock) => {
                // Pad up to the nearest representable length; the payload
                // buffer's tail bytes are zero by construction.
                let wire_len = sanitize_fd_len(msg.len) as usize;
                let frame =
                    CanFdFrame::new(id, &msg.data[..wire_len]).ok_or(Error::PacketTooLarge)?;
                sock.write_frame(&frame)?;
            }
        }
        Ok(())
    }
}

/// Live connection: the socket, the event thread, and its stop flag.
struct Connection {
    sock: Arc<RawSock>,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// Handle to one SocketCAN network interface.
///
/// Dropping the handle disconnects, which stops and joins the event thread
/// before the socket closes.
pub struct SocketCanInterface {
    settings: SocketCanSettings,
    shared: Arc<SharedState>,
    connection: Option<Connection>,
}

impl SocketCanInterface {
    /// Create a disconnected interface handle.
    pub fn new(settings: SocketCanSettings) -> Self {
        Self {
            settings,
            shared: Arc::new(SharedState::new()),
            connection: None,
        }
    }

    /// Subscribe to frame events. Callbacks fire in registration order.
    /// Registration works before and after `connect`.
    pub fn register_events(&self, events: Arc<dyn CanEvents + Send + Sync>) {
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(events);
    }

    /// Open the socket, install the reception and error filters, and start
    /// the event thread. Any failure along the way closes the socket again
    /// and leaves the interface disconnected.
    pub fn connect(&mut self) -> Result<(), Error> {
        if self.connection.is_some() {
            return Err(Error::AlreadyConnected);
        }
        self.shared.clear_bus_error();

        let sock = if self.settings.fd {
            let sock = CanFdSocket::open(&self.settings.device)?;
            if interface_mtu(sock.as_raw_fd(), &self.settings.device)? < CANFD_MTU {
                return Err(Error::FdNotSupported);
            }
            RawSock::Fd(sock)
        } else {
            RawSock::Classic(CanSocket::open(&self.settings.device)?)
        };
        sock.set_nonblocking()?;

        if self.settings.filter_mask != 0 {
            let filter = CanFilter::new(
                remap_eff_bit(self.settings.filter_code),
                remap_eff_bit(self.settings.filter_mask),
            );
            sock.apply_filters(&[filter])?;
        }
        // Ask the kernel to report bus-off and controller state problems as
        // error frames on this socket.
        sock.apply_error_filter(CAN_ERR_BUSOFF | CAN_ERR_CRTL)?;

        let sock = Arc::new(sock);
        let cancel = Arc::new(AtomicBool::new(false));
        let thread = thread::Builder::new()
            .name(String::from("xcplink-can-rx"))
            .spawn({
                let sock = Arc::clone(&sock);
                let shared = Arc::clone(&self.shared);
                let cancel = Arc::clone(&cancel);
                move || event_loop(&sock, &shared, &cancel)
            })?;

        self.connection = Some(Connection {
            sock,
            cancel,
            thread: Some(thread),
        });
        debug!("connected to CAN interface {}", self.settings.device);
        Ok(())
    }

    /// Stop and join the event thread, close the socket, and clear the bus
    /// error flag. A no-op when already disconnected.
    pub fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.cancel.store(true, Ordering::Relaxed);
            if let Some(handle) = connection.thread.take() {
                let _ = handle.join();
            }
            debug!("disconnected from CAN interface {}", self.settings.device);
        }
        self.shared.clear_bus_error();
    }

    /// `true` while a connection is up.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Transmit one message. On success the `msg_txed` callbacks fire on
    /// the calling thread, in registration order.
    pub fn transmit(&mut self, msg: &CanMsg) -> Result<(), Error> {
        let connection = self.connection.as_ref().ok_or(Error::NotConnected)?;
        connection.sock.write_msg(msg)?;
        trace!("transmitted frame id {:#x} len {}", msg.id, msg.len);
        self.shared.dispatch_txed(msg);
        Ok(())
    }

    /// Whether a bus error was reported since the last call. Reading clears
    /// the flag, so each error episode is observed once.
    pub fn is_bus_error(&self) -> bool {
        self.shared.take_bus_error()
    }
}

impl Drop for SocketCanInterface {
    fn drop(&mut self) {
        self.disconnect();
    }
}

//============================================================================EVENT_THREAD

/// Drain the socket until it runs dry, classify and dispatch every frame,
/// then sleep briefly. Runs until the cancel flag is raised.
fn event_loop(sock: &RawSock, shared: &SharedState, cancel: &AtomicBool) {
    while !cancel.load(Ordering::Relaxed) {
        loop {
            let frame = match sock.read_any() {
                Ok(frame) => frame,
                // WouldBlock when drained; anything else also ends this pass.
                Err(_) => break,
            };
            match frame {
                // Remote frames carry no XCP data.
                CanAnyFrame::Remote(_) => {}
                CanAnyFrame::Error(error_frame) => classify_error(error_frame, shared),
                CanAnyFrame::Normal(data_frame) => {
                    if let Some(msg) = translate_frame(&data_frame) {
                        trace!("received frame id {:#x} len {}", msg.id, msg.len);
                        shared.dispatch_rxed(&msg);
                    }
                }
                CanAnyFrame::Fd(fd_frame) => {
                    if let Some(msg) = translate_frame(&fd_frame) {
                        trace!("received FD frame id {:#x} len {}", msg.id, msg.len);
                        shared.dispatch_rxed(&msg);
                    }
                }
            }
        }
        thread::sleep(Duration::from_micros(EVENT_POLL_SLEEP_US));
    }
}

/// Latch the bus error flag for bus-off and error passive conditions; other
/// error classes are transient and stay invisible to the session layer.
fn classify_error(frame: CanErrorFrame, shared: &SharedState) {
    match CanError::from(frame) {
        CanError::BusOff => {
            warn!("CAN controller went bus-off");
            shared.latch_bus_error();
        }
        CanError::ControllerProblem(problem) => match problem {
            ControllerProblem::ReceiveErrorPassive | ControllerProblem::TransmitErrorPassive => {
                warn!("CAN controller is error passive");
                shared.latch_bus_error();
            }
            _ => {}
        },
        _ => {}
    }
}

/// Translate a kernel frame into the marker-bit message form.
fn translate_frame<F: EmbeddedFrame>(frame: &F) -> Option<CanMsg> {
    CanMsg::new(encode_id(frame.id()), frame.data())
}

/// SocketCAN marks extended identifiers with the EFF bit of the raw word.
/// That bit currently coincides with [`CAN_MSG_EXT_ID_MASK`], but the two
/// constants belong to different layers, so the translation is spelled out.
fn remap_eff_bit(value: u32) -> u32 {
    if value & CAN_MSG_EXT_ID_MASK != 0 {
        (value & !CAN_MSG_EXT_ID_MASK) | CAN_EFF_FLAG
    } else {
        value
    }
}

/// Read the MTU of `device` through the SIOCGIFMTU ioctl on `fd`.
fn interface_mtu(fd: RawFd, device: &str) -> io::Result<libc::c_int> {
    let mut request: libc::ifreq = unsafe { std::mem::zeroed() };
    let name = device.as_bytes();
    // Leave room for the NUL terminator provided by the zeroed struct.
    if name.len() >= request.ifr_name.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "interface name too long",
        ));
    }
    for (target, &byte) in request.ifr_name.iter_mut().zip(name) {
        *target = byte as libc::c_char;
    }
    let rc = unsafe { libc::ioctl(fd, libc::SIOCGIFMTU as _, &mut request) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { request.ifr_ifru.ifru_mtu })
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
