// src/source/mod.rs
//
// ByteSource: the polymorphic producer side of the pipeline. Four
// variants plus an FPGA sub-mode of the serial source, all blocking, all
// driven from the main thread - the sole producer into the Raw Block
// Ring. Modeled on the per-kind reader modules (io/serial.rs,
// io/gvret_tcp.rs, io/gvret_usb.rs) but collapsed behind one trait instead
// of a per-reader `IODevice` async trait, since this crate's threading
// model is blocking OS threads, not an async runtime.

mod file;
mod serial;
mod tcp;
mod usb;

pub use file::FileSource;
pub use serial::SerialSource;
pub use tcp::TcpSource;
pub use usb::UsbSource;

use crate::error::OrbError;
use crate::options::{Options, SourceKind};

/// Outcome of one `read` call.
#[derive(Debug)]
pub enum SourceStatus {
    Ok,
    EndOfInput,
    Transient(OrbError),
    Fatal(OrbError),
}

/// The byte-producing contract every source variant implements.
///
/// `read` blocks until at least one byte is available, `buf` is full, a
/// timeout elapses (USB only - yields `n = 0` with `SourceStatus::Ok`), or
/// an error occurs. The source owns its own reconnect/retry policy
/// internally so that from the caller's side only `Transient` (retry after
/// backoff) and `Fatal` (give up, exit process) need to be distinguished.
pub trait ByteSource: Send {
    fn read(&mut self, buf: &mut [u8]) -> (usize, SourceStatus);

    /// Short name used in log lines, e.g. "usb", "tcp(host:port)".
    fn name(&self) -> &str;
}

/// Bounded backoff between retries of a transient open/connect failure.
pub const RECONNECT_BACKOFF: std::time::Duration = std::time::Duration::from_millis(500);

/// Build the configured source. This only constructs the source value;
/// actual device opening happens lazily on the first `read` call so that
/// transient open failures go through the same retry loop as a later
/// disconnect.
pub fn build_source(options: &Options) -> Box<dyn ByteSource> {
    match &options.source {
        SourceKind::Usb => Box::new(UsbSource::new()),
        SourceKind::Tcp { host, port } => Box::new(TcpSource::new(host.clone(), *port)),
        SourceKind::Serial { device, baud } => {
            Box::new(SerialSource::new(device.clone(), *baud, options.fpga_width))
        }
        SourceKind::File { path, terminate_on_eof } => {
            Box::new(FileSource::new(path.clone(), *terminate_on_eof))
        }
    }
}
