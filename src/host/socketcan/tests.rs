use super::*;
use embedded_can::ExtendedId;
use socketcan::CanDataFrame;

struct Recorder {
    index: usize,
    log: Arc<Mutex<Vec<usize>>>,
}

impl CanEvents for Recorder {
    fn msg_rxed(&self, _msg: &CanMsg) {
        self.log.lock().unwrap().push(self.index);
    }

    fn msg_txed(&self, _msg: &CanMsg) {
        self.log.lock().unwrap().push(100 + self.index);
    }
}

/// Only listens; relies on the default no-op for transmissions.
struct RxOnly {
    log: Arc<Mutex<Vec<usize>>>,
}

impl CanEvents for RxOnly {
    fn msg_rxed(&self, _msg: &CanMsg) {
        self.log.lock().unwrap().push(7);
    }
}

/// The extended marker translates to the EFF bit; standard identifiers and
/// filter masks without the marker pass through untouched.
#[test]
fn eff_bit_remapping() {
    assert_eq!(remap_eff_bit(0x7E1), 0x7E1);
    assert_eq!(
        remap_eff_bit(CAN_MSG_EXT_ID_MASK | 0x18DB_33F1),
        CAN_EFF_FLAG | 0x18DB_33F1
    );
    assert_eq!(remap_eff_bit(0x0000_07FF), 0x0000_07FF);
    assert_eq!(
        remap_eff_bit(CAN_MSG_EXT_ID_MASK | 0x1FFF_FFFF),
        CAN_EFF_FLAG | 0x1FFF_FFFF
    );
}

/// Received frames fan out to every subscriber in registration order.
#[test]
fn dispatch_preserves_registration_order() {
    let interface = SocketCanInterface::new(SocketCanSettings::default());
    let log = Arc::new(Mutex::new(Vec::new()));
    for index in 0..3 {
        interface.register_events(Arc::new(Recorder {
            index,
            log: Arc::clone(&log),
        }));
    }
    let msg = CanMsg::new(0x7E1, &[0x01]).unwrap();
    interface.shared.dispatch_rxed(&msg);
    interface.shared.dispatch_txed(&msg);
    assert_eq!(*log.lock().unwrap(), [0, 1, 2, 100, 101, 102]);
}

/// Subscribers override only the callbacks they care about.
#[test]
fn unimplemented_callbacks_default_to_no_ops() {
    let interface = SocketCanInterface::new(SocketCanSettings::default());
    let log = Arc::new(Mutex::new(Vec::new()));
    interface.register_events(Arc::new(RxOnly {
        log: Arc::clone(&log),
    }));
    let msg = CanMsg::new(0x123, &[]).unwrap();
    interface.shared.dispatch_txed(&msg);
    assert!(log.lock().unwrap().is_empty());
    interface.shared.dispatch_rxed(&msg);
    assert_eq!(*log.lock().unwrap(), [7]);
}

/// The bus error flag latches until read, then clears.
#[test]
fn bus_error_flag_is_read_once() {
    let interface = SocketCanInterface::new(SocketCanSettings::default());
    assert!(!interface.is_bus_error());
    interface.shared.latch_bus_error();
    interface.shared.latch_bus_error();
    assert!(interface.is_bus_error());
    assert!(!interface.is_bus_error());
}

/// Transmitting without a connection fails cleanly.
#[test]
fn transmit_requires_a_connection() {
    let mut interface = SocketCanInterface::new(SocketCanSettings::default());
    assert!(!interface.is_connected());
    let msg = CanMsg::new(0x7E1, &[0x01]).unwrap();
    assert!(matches!(interface.transmit(&msg), Err(Error::NotConnected)));
}

/// Kernel frames translate into the marker-bit message form.
#[test]
fn kernel_frames_translate_to_marker_form() {
    let id = ExtendedId::new(0x18DB_33F1).unwrap();
    let frame: CanDataFrame = EmbeddedFrame::new(id, &[0x11, 0x22, 0x33]).unwrap();
    let msg = translate_frame(&frame).unwrap();
    assert_eq!(msg.id, CAN_MSG_EXT_ID_MASK | 0x18DB_33F1);
    assert_eq!(msg.payload(), &[0x11, 0x22, 0x33]);
}

/// Disconnecting twice and dropping a disconnected handle are no-ops.
#[test]
fn disconnect_is_idempotent() {
    let mut interface = SocketCanInterface::new(SocketCanSettings::default());
    interface.disconnect();
    interface.disconnect();
    assert!(!interface.is_connected());
}
