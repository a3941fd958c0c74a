// src/source/file.rs
//
// File byte source. Blocking read; on EOF either terminates (the `-e`
// flag) or sleeps and polls for more data appended to the file.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use super::{ByteSource, SourceStatus};
use crate::error::OrbError;

/// File-EOF poll interval when not terminating on EOF.
const EOF_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct FileSource {
    path: PathBuf,
    terminate_on_eof: bool,
    file: Option<File>,
}

impl FileSource {
    pub fn new(path: PathBuf, terminate_on_eof: bool) -> Self {
        FileSource { path, terminate_on_eof, file: None }
    }

    fn ensure_open(&mut self) -> Result<(), OrbError> {
        if self.file.is_some() {
            return Ok(());
        }
        let f = File::open(&self.path)
            .map_err(|e| OrbError::file_open(self.path.display().to_string(), e.to_string()))?;
        self.file = Some(f);
        Ok(())
    }
}

impl ByteSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn read(&mut self, buf: &mut [u8]) -> (usize, SourceStatus) {
        if let Err(e) = self.ensure_open() {
            // A failed open is fatal (exit -4), not retried.
            return (0, SourceStatus::Fatal(e));
        }
        let file = self.file.as_mut().unwrap();
        match file.read(buf) {
            Ok(0) => {
                if self.terminate_on_eof {
                    (0, SourceStatus::EndOfInput)
                } else {
                    std::thread::sleep(EOF_POLL_INTERVAL);
                    (0, SourceStatus::Ok)
                }
            }
            Ok(n) => (n, SourceStatus::Ok),
            Err(e) => {
                self.file = None;
                (0, SourceStatus::Transient(OrbError::from_io_error(self.path.display().to_string(), "read", e)))
            }
        }
    }
}
