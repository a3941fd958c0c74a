// src/options.rs
//
// Command-line configuration surface. Parsed with clap's derive API, then
// validated into a fully-resolved Options value the rest of the crate
// consumes - the same parse-then-validate-in-one-place shape used when
// turning a tauri command's raw args into a SerialConfig/GvretUsbConfig
// before spawning a reader.

use std::path::PathBuf;

use clap::Parser;

use crate::error::OrbError;

pub const DEFAULT_LISTEN_PORT: u16 = 3443;
pub const DEFAULT_TCP_HOST: &str = "localhost";
pub const DEFAULT_TCP_PORT: u16 = 2332;
pub const DEFAULT_SERIAL_BAUD: u32 = 115_200;
/// The FPGA/orbtrace link runs at a fixed rate; when `-o` selects a trace
/// width, the serial port is always opened at this baud regardless of `-a`.
pub const FPGA_FIXED_BAUD: u32 = 12_000_000;

#[derive(Parser, Debug, Clone)]
#[command(name = "orbflux", about = "Trace demultiplexer for ARM Cortex-M trace streams", disable_help_flag = false)]
struct RawArgs {
    /// Serial speed (baud)
    #[arg(short = 'a', value_name = "BAUD")]
    baud: Option<u32>,

    /// Terminate when file source reaches EOF
    #[arg(short = 'e')]
    eof_terminate: bool,

    /// File source path
    #[arg(short = 'f', value_name = "PATH")]
    file: Option<PathBuf>,

    /// Base listen port
    #[arg(short = 'l', value_name = "PORT")]
    listen_port: Option<u16>,

    /// Interval reporter period in ms (0 disables)
    #[arg(short = 'm', value_name = "MS")]
    interval_ms: Option<u64>,

    /// FPGA/orbtrace trace width (1, 2 or 4); implies TPIU
    #[arg(short = 'o', value_name = "WIDTH")]
    fpga_width: Option<u8>,

    /// Serial device path
    #[arg(short = 'p', value_name = "DEV")]
    serial_device: Option<String>,

    /// TCP debug-server host[:port]
    #[arg(short = 's', value_name = "HOST[:PORT]")]
    tcp_server: Option<String>,

    /// Enable TPIU, comma-separated decimal channel list (1..127)
    #[arg(short = 't', value_name = "LIST")]
    tpiu_channels: Option<String>,

    /// Enable ORBFLOW/COBS framing, comma-separated decimal channel (tag)
    /// list (1..127). Additive and symmetric to `-t`, mutually exclusive
    /// with it (see DESIGN.md).
    #[arg(short = 'c', long = "orbflow", value_name = "LIST")]
    orbflow_channels: Option<String>,

    /// Verbosity 0..3
    #[arg(short = 'v', value_name = "0..3", default_value_t = 0)]
    verbosity: u8,
}

#[derive(Debug, Clone)]
pub enum SourceKind {
    Usb,
    Tcp { host: String, port: u16 },
    Serial { device: String, baud: u32 },
    File { path: PathBuf, terminate_on_eof: bool },
}

#[derive(Debug, Clone)]
pub enum Framing {
    None,
    Tpiu { channels: Vec<u8> },
    Orbflow { channels: Vec<u8> },
}

/// FPGA trace-width parameter, applies only when the source is an
/// FPGA-mediated serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpgaWidth(pub u8);

#[derive(Debug, Clone)]
pub struct Options {
    pub source: SourceKind,
    pub framing: Framing,
    pub listen_port: u16,
    pub interval_report_ms: u64,
    pub fpga_width: Option<FpgaWidth>,
    pub verbosity: u8,
}

impl Options {
    /// Parses `std::env::args()`. `-h`/`--help` prints usage and exits 0
    /// directly, matching clap's own convention rather than being
    /// surfaced as a `Config` error with exit code -1.
    pub fn parse_from_argv() -> Result<Options, OrbError> {
        let raw = match RawArgs::try_parse() {
            Ok(raw) => raw,
            Err(e) if matches!(e.kind(), clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion) => {
                e.print().ok();
                std::process::exit(0);
            }
            Err(e) => return Err(OrbError::config(e.to_string())),
        };
        Options::from_raw(raw)
    }

    fn from_raw(raw: RawArgs) -> Result<Options, OrbError> {
        let exclusive_count = [raw.file.is_some(), raw.serial_device.is_some(), raw.tcp_server.is_some()]
            .iter()
            .filter(|x| **x)
            .count();
        if exclusive_count > 1 {
            return Err(OrbError::config("at most one of -f, -p, -s may be given"));
        }

        let fpga_width = match raw.fpga_width {
            Some(w) => {
                if !matches!(w, 1 | 2 | 4) {
                    return Err(OrbError::config(format!("-o width must be 1, 2, or 4 (got {w})")));
                }
                Some(FpgaWidth(w))
            }
            None => None,
        };

        let source = if let Some(path) = raw.file {
            SourceKind::File { path, terminate_on_eof: raw.eof_terminate }
        } else if let Some(device) = raw.serial_device {
            let baud = if fpga_width.is_some() {
                FPGA_FIXED_BAUD
            } else {
                raw.baud.unwrap_or(DEFAULT_SERIAL_BAUD)
            };
            SourceKind::Serial { device, baud }
        } else if let Some(server) = raw.tcp_server {
            let (host, port) = parse_host_port(&server)?;
            SourceKind::Tcp { host, port }
        } else {
            SourceKind::Usb
        };

        if raw.tpiu_channels.is_some() && raw.orbflow_channels.is_some() {
            return Err(OrbError::config("-t (TPIU) and -c/--orbflow (ORBFLOW) are mutually exclusive"));
        }

        let tpiu_channels = match &raw.tpiu_channels {
            Some(list) => Some(parse_channel_list(list)?),
            None => None,
        };
        let orbflow_channels = match &raw.orbflow_channels {
            Some(list) => Some(parse_channel_list(list)?),
            None => None,
        };

        let framing = if let Some(channels) = tpiu_channels {
            Framing::Tpiu { channels }
        } else if let Some(channels) = orbflow_channels {
            Framing::Orbflow { channels }
        } else if fpga_width.is_some() {
            // -o implies TPIU but does not by itself name channels; the
            // operator must still supply -t. Treated as a config error
            // rather than guessing a channel set.
            return Err(OrbError::config("-o implies TPIU framing; -t <list> is required"));
        } else {
            Framing::None
        };

        if fpga_width.is_some() && !matches!(source, SourceKind::Serial { .. }) {
            return Err(OrbError::config("-o (FPGA width) only applies to a serial source (-p)"));
        }

        Ok(Options {
            source,
            framing,
            listen_port: raw.listen_port.unwrap_or(DEFAULT_LISTEN_PORT),
            interval_report_ms: raw.interval_ms.unwrap_or(0),
            fpga_width,
            verbosity: raw.verbosity.min(3),
        })
    }
}

fn parse_host_port(spec: &str) -> Result<(String, u16), OrbError> {
    match spec.rsplit_once(':') {
        Some((host, port_str)) => {
            let port: u16 = port_str
                .parse()
                .map_err(|_| OrbError::config(format!("invalid port in -s {spec}")))?;
            let host = if host.is_empty() { DEFAULT_TCP_HOST.to_string() } else { host.to_string() };
            Ok((host, port))
        }
        None => Ok((spec.to_string(), DEFAULT_TCP_PORT)),
    }
}

fn parse_channel_list(list: &str) -> Result<Vec<u8>, OrbError> {
    let mut channels = Vec::new();
    for part in list.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let ch: u8 = part
            .parse()
            .map_err(|_| OrbError::config(format!("invalid channel '{part}' in -t list")))?;
        if !(1..=127).contains(&ch) {
            return Err(OrbError::config(format!("channel {ch} out of range 1..127")));
        }
        channels.push(ch);
    }
    if channels.is_empty() {
        return Err(OrbError::config("-t requires at least one channel"));
    }
    Ok(channels)
}
