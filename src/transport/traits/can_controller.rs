//! Minimal abstraction for a polled CAN controller. The link works entirely
//! in the library's marker-bit identifier form; implementations translate to
//! and from the hardware's IDE/extended-frame representation at this seam.
use crate::transport::can_msg::CanMsg;

/// One event drained from the controller by a receive poll.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CanRxEvent {
    /// A data frame arrived. Remote frames are never reported.
    Frame(CanMsg),
    /// The controller entered bus-off or error passive state.
    BusError,
}

/// Contract for non-blocking CAN controller access.
pub trait CanController {
    /// Take the next pending event out of the controller, if any.
    fn poll(&mut self) -> Option<CanRxEvent>;
    /// Try to queue `msg` into a transmit mailbox. Returns `false` when no
    /// mailbox is free; the link retries until its deadline.
    fn try_transmit(&mut self, msg: &CanMsg) -> bool;
}
