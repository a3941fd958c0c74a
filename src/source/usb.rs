// src/source/usb.rs
//
// USB bulk-endpoint byte source. Enumerates the fixed device table, with
// autodiscover-flagged entries falling back to a scan of the active
// configuration for a vendor-specific trace interface. Claims the
// interface and performs bulk reads with a 10 ms timeout; a timeout is
// not an error.
//
// Follows the gs_usb nusb driver's pattern (io/gs_usb/windows.rs):
// `nusb::list_devices()` enumeration, `device.claim_interface()`, and a
// `bulk_in_queue` that is submitted once with several requests in flight
// and topped up by one fresh submission per completion, kept alive across
// the whole streaming session rather than rebuilt per read. The timeout
// is adapted from that driver's tokio timeout to `async_io::Timer` +
// `futures_lite::block_on` since this crate has no async runtime.

use std::time::Duration;

use futures_lite::future::{block_on, or};
use nusb::transfer::{Queue, RequestBuffer};
use nusb::Interface;

use super::{ByteSource, SourceStatus, RECONNECT_BACKOFF};
use crate::error::OrbError;

/// USB bulk read timeout: a timed-out poll yields `n = 0` with no error.
const USB_READ_TIMEOUT: Duration = Duration::from_millis(10);
/// Size of each pre-submitted bulk transfer request.
const USB_REQUEST_SIZE: usize = 4096;
/// Number of bulk requests kept in flight for throughput.
const USB_QUEUE_DEPTH: usize = 4;

/// Vendor-specific trace-class descriptor match used by autodiscover:
/// class 0xFF, subclass 0x54, protocol 0x00 or 0x01, exactly one
/// endpoint.
const AUTODISCOVER_CLASS: u8 = 0xFF;
const AUTODISCOVER_SUBCLASS: u8 = 0x54;
const AUTODISCOVER_PROTOCOLS: [u8; 2] = [0x00, 0x01];

#[derive(Clone, Copy)]
struct UsbTableEntry {
    vid: u16,
    pid: u16,
    autodiscover: bool,
    fallback_interface: u8,
    fallback_endpoint: u8,
    label: &'static str,
}

/// The fixed USB device table.
const USB_TABLE: [UsbTableEntry; 3] = [
    UsbTableEntry {
        vid: 0x1209,
        pid: 0x3443,
        autodiscover: true,
        fallback_interface: 0,
        fallback_endpoint: 0x81,
        label: "Orbtrace",
    },
    UsbTableEntry {
        vid: 0x1d50,
        pid: 0x6018,
        autodiscover: false,
        fallback_interface: 5,
        fallback_endpoint: 0x85,
        label: "Blackmagic",
    },
    UsbTableEntry {
        vid: 0x2b3e,
        pid: 0xc610,
        autodiscover: false,
        fallback_interface: 3,
        fallback_endpoint: 0x85,
        label: "Phywhisperer",
    },
];

pub struct UsbSource {
    interface: Option<Interface>,
    /// The bulk-IN transfer queue, submitted once at open time and kept
    /// alive for the life of the connection: each `read()` drains one
    /// completion and resubmits a single replacement buffer, rather than
    /// rebuilding the queue (and losing the other in-flight transfers) on
    /// every call.
    queue: Option<Queue<RequestBuffer>>,
    endpoint: u8,
    label: String,
}

impl UsbSource {
    pub fn new() -> Self {
        UsbSource { interface: None, queue: None, endpoint: 0, label: "usb".to_string() }
    }

    fn open(&mut self) -> Result<(), OrbError> {
        let devices = nusb::list_devices()
            .map_err(|e| OrbError::other("usb", format!("failed to enumerate devices: {e}")))?;

        let mut found = None;
        for dev in devices {
            if let Some(entry) = USB_TABLE.iter().find(|e| e.vid == dev.vendor_id() && e.pid == dev.product_id()) {
                found = Some((dev, *entry));
                break;
            }
        }

        let (dev_info, entry) = found.ok_or_else(|| OrbError::not_found("usb"))?;

        let device = dev_info.open().map_err(|e| OrbError::connection(entry.label, e.to_string()))?;

        let (iface_num, endpoint) = if entry.autodiscover {
            scan_trace_interface(&device).unwrap_or((entry.fallback_interface, entry.fallback_endpoint))
        } else {
            (entry.fallback_interface, entry.fallback_endpoint)
        };

        let interface = device
            .claim_interface(iface_num as u32)
            .map_err(|e| OrbError::connection(entry.label, format!("claim_interface({iface_num}): {e}")))?;

        let mut queue = interface.bulk_in_queue(endpoint);
        for _ in 0..USB_QUEUE_DEPTH {
            queue.submit(RequestBuffer::new(USB_REQUEST_SIZE));
        }

        self.interface = Some(interface);
        self.queue = Some(queue);
        self.endpoint = endpoint;
        self.label = entry.label.to_string();
        Ok(())
    }
}

/// Scan the active configuration for an autodiscover-eligible trace
/// interface: class 0xFF, subclass 0x54, protocol 0x00/0x01, exactly one
/// endpoint. Returns `(interface_number, endpoint_address)` on match.
fn scan_trace_interface(device: &nusb::Device) -> Option<(u8, u8)> {
    let config = device.active_configuration().ok()?;
    for iface in config.interface_alt_settings() {
        if iface.class() == AUTODISCOVER_CLASS
            && iface.subclass() == AUTODISCOVER_SUBCLASS
            && AUTODISCOVER_PROTOCOLS.contains(&iface.protocol())
        {
            let endpoints: Vec<_> = iface.endpoints().collect();
            if endpoints.len() == 1 {
                return Some((iface.interface_number(), endpoints[0].address()));
            }
        }
    }
    None
}

impl ByteSource for UsbSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn read(&mut self, buf: &mut [u8]) -> (usize, SourceStatus) {
        if self.queue.is_none() {
            if let Err(e) = self.open() {
                std::thread::sleep(RECONNECT_BACKOFF);
                return (0, SourceStatus::Transient(e));
            }
        }

        enum Outcome {
            Completed(Vec<u8>),
            TimedOut,
        }

        let queue = self.queue.as_mut().unwrap();
        let outcome = block_on(or(
            async { Outcome::Completed(queue.next_complete().await.data) },
            async {
                async_io::Timer::after(USB_READ_TIMEOUT).await;
                Outcome::TimedOut
            },
        ));

        match outcome {
            Outcome::TimedOut => (0, SourceStatus::Ok),
            Outcome::Completed(data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                // Keep USB_QUEUE_DEPTH requests in flight: replace the one
                // just drained instead of leaving the queue to drain empty.
                self.queue.as_mut().unwrap().submit(RequestBuffer::new(USB_REQUEST_SIZE));
                (n, SourceStatus::Ok)
            }
        }
    }
}

impl Default for UsbSource {
    fn default() -> Self {
        Self::new()
    }
}
