//! USB CDC serial carrying the command protocol. The USB interrupt moves
//! received bytes into an inbox; the control loop drains it and writes
//! replies back.

use core::cell::RefCell;

use common::message_queue::{MessageQueue, MessageQueueInterface};
use critical_section::Mutex;
use defmt::{debug, warn, Debug2Format};
use generic::pump_error::PumpError;
use generic::pump_proto::LINE_TERMINATOR;
use rp2040_hal::usb::UsbBus;
use usb_device::device::UsbDevice;
use usb_device::UsbError;
use usbd_serial::SerialPort;

pub const INBOX_CAPACITY: usize = 256;
/// Polls allowed while the host is not draining our writes.
const WRITE_ATTEMPTS: usize = 1_000;

pub struct UsbLink {
    device: UsbDevice<'static, UsbBus>,
    serial: SerialPort<'static, UsbBus>,
}

static USB_LINK: Mutex<RefCell<Option<UsbLink>>> = Mutex::new(RefCell::new(None));
static INBOX: Mutex<RefCell<MessageQueue<u8, INBOX_CAPACITY>>> = Mutex::new(RefCell::new(MessageQueue::new()));

pub fn install(device: UsbDevice<'static, UsbBus>, serial: SerialPort<'static, UsbBus>) {
    critical_section::with(|cs| {
        USB_LINK.borrow_ref_mut(cs).replace(UsbLink { device, serial });
    });
}

/// Called from the USB interrupt.
pub fn on_interrupt() {
    critical_section::with(|cs| {
        let mut link = USB_LINK.borrow_ref_mut(cs);
        let Some(UsbLink { device, serial }) = link.as_mut() else {
            return;
        };
        if !device.poll(&mut [&mut *serial]) {
            return;
        }
        let mut buf = [0u8; 64];
        match serial.read(&mut buf) {
            Ok(count) => {
                let mut inbox = INBOX.borrow_ref_mut(cs);
                for &byte in &buf[..count] {
                    if inbox.enqueue(byte).is_err() {
                        warn!("serial inbox full, dropping input");
                        break;
                    }
                }
            }
            Err(UsbError::WouldBlock) => {}
            Err(err) => debug!("usb read error: {:?}", Debug2Format(&err)),
        }
    });
}

/// Moves received bytes into `buf`; returns how many.
pub fn drain_inbox(buf: &mut [u8]) -> usize {
    critical_section::with(|cs| {
        let mut inbox = INBOX.borrow_ref_mut(cs);
        let mut count = 0;
        while count < buf.len() {
            match inbox.dequeue() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        count
    })
}

fn write_all(link: &mut UsbLink, bytes: &[u8]) -> Result<(), PumpError> {
    let UsbLink { device, serial } = link;
    let mut written = 0;
    let mut attempts = 0;
    while written < bytes.len() {
        match serial.write(&bytes[written..]) {
            Ok(count) => written += count,
            Err(UsbError::WouldBlock) => {
                attempts += 1;
                if attempts > WRITE_ATTEMPTS {
                    return Err(PumpError::SerialWriteError);
                }
                device.poll(&mut [&mut *serial]);
            }
            Err(_) => return Err(PumpError::SerialWriteError),
        }
    }
    Ok(())
}

/// Sends one reply followed by the line terminator.
pub fn send_line(line: &str) -> Result<(), PumpError> {
    critical_section::with(|cs| {
        let mut link = USB_LINK.borrow_ref_mut(cs);
        let link = link.as_mut().ok_or(PumpError::SerialWriteError)?;
        write_all(link, line.as_bytes())?;
        write_all(link, &[LINE_TERMINATOR])
    })
}
