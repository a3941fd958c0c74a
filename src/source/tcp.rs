// src/source/tcp.rs
//
// TCP debug-server byte source. Resolves and connects, retrying every
// 500 ms until success or shutdown; on disconnect loops back to
// reconnect. Follows the connect-with-retry shape of
// io/gvret_tcp.rs's probe/connect path, rendered blocking instead of
// its tokio connect.

use std::io::Read;
use std::net::TcpStream;
use std::time::Duration;

use super::{ByteSource, SourceStatus, RECONNECT_BACKOFF};
use crate::error::OrbError;

pub struct TcpSource {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
}

impl TcpSource {
    pub fn new(host: String, port: u16) -> Self {
        TcpSource { host, port, stream: None }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn connect(&mut self) -> Result<(), OrbError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .map_err(|e| OrbError::from_io_error(self.address(), "connect", e))?;
        stream
            .set_read_timeout(Some(Duration::from_millis(500)))
            .map_err(|e| OrbError::from_io_error(self.address(), "set_read_timeout", e))?;
        self.stream = Some(stream);
        Ok(())
    }
}

impl ByteSource for TcpSource {
    fn name(&self) -> &str {
        "tcp"
    }

    fn read(&mut self, buf: &mut [u8]) -> (usize, SourceStatus) {
        if self.stream.is_none() {
            if let Err(e) = self.connect() {
                std::thread::sleep(RECONNECT_BACKOFF);
                return (0, SourceStatus::Transient(e));
            }
        }

        let stream = self.stream.as_mut().unwrap();
        match stream.read(buf) {
            Ok(0) => {
                // Peer closed the connection; reconnect.
                self.stream = None;
                (0, SourceStatus::Transient(OrbError::connection(self.address(), "peer closed connection")))
            }
            Ok(n) => (n, SourceStatus::Ok),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                (0, SourceStatus::Ok)
            }
            Err(e) => {
                self.stream = None;
                (0, SourceStatus::Transient(OrbError::from_io_error(self.address(), "read", e)))
            }
        }
    }
}
