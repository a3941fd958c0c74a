// src/supervisor.rs
//
// Control flow: a supervisor configures channels, spawns the Processor
// and (optionally) the Reporter, then runs the Byte Source's blocking
// ingest loop on its own thread (the main thread) until shutdown.
// `main.rs` itself is reduced to CLI parsing, logging init, and
// reporting the final exit code.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::context::{Context, Handler};
use crate::error::OrbError;
use crate::options::{Framing, Options};
use crate::registry::ChannelRegistry;
use crate::ring::RawBlockRing;
use crate::source::{self, SourceStatus};

/// Runs the demultiplexer to completion: builds the per-channel (or
/// global) Subscriber Registries at their configured ports, spawns the
/// Processor and Interval Reporter threads, then drives the Byte Source's
/// blocking read loop on the calling thread. Returns once the source signals
/// end-of-input (file sources with `-e`) or a fatal error occurs; a SIGINT
/// delivered via the installed handler requests the same orderly shutdown.
pub fn run(options: Options) -> Result<(), OrbError> {
    let ending = Arc::new(AtomicBool::new(false));

    let (handlers, default_registry) = build_registries(&options, ending.clone())?;
    let ctx = Arc::new(Context::with_ending(options, handlers, default_registry, ending.clone()));

    install_signal_handler(ctx.clone())?;

    let processor_ctx = ctx.clone();
    std::thread::spawn(move || crate::processor::run(&processor_ctx));

    if ctx.options.interval_report_ms > 0 {
        let reporter_ctx = ctx.clone();
        std::thread::spawn(move || crate::reporter::run(&reporter_ctx));
    }

    // Threads are not joined: the Processor and Reporter run until
    // `ending` is observed, and the OS reclaims them at process exit.
    run_source_loop(&ctx)
}

fn install_signal_handler(ctx: Arc<Context>) -> Result<(), OrbError> {
    ctrlc::set_handler(move || ctx.request_shutdown())
        .map_err(|e| OrbError::other_no_device(format!("failed to install signal handler: {e}")))
}

/// Builds one Subscriber Registry per configured channel (TPIU/ORBFLOW),
/// each listening on `base_port + index(channel)`, or a single global
/// registry at `base_port` when framing is none. Binding failure is
/// fatal: the registry underpins every downstream delivery path.
fn build_registries(
    options: &Options,
    ending: Arc<AtomicBool>,
) -> Result<(Vec<Handler>, Option<Arc<ChannelRegistry>>), OrbError> {
    match &options.framing {
        Framing::None => {
            let registry = ChannelRegistry::spawn(options.listen_port, ending).map_err(|e| {
                OrbError::other_no_device(format!(
                    "failed to bind listener on port {}: {e}",
                    options.listen_port
                ))
            })?;
            Ok((Vec::new(), Some(registry)))
        }
        Framing::Tpiu { channels } | Framing::Orbflow { channels } => {
            let mut handlers = Vec::with_capacity(channels.len());
            for (index, &channel) in channels.iter().enumerate() {
                let port = options.listen_port.checked_add(index as u16).ok_or_else(|| {
                    OrbError::config("too many channels: listen port range overflowed u16")
                })?;
                let registry = ChannelRegistry::spawn(port, ending.clone()).map_err(|e| {
                    OrbError::other_no_device(format!("failed to bind listener on port {port}: {e}"))
                })?;
                handlers.push(Handler { channel, registry });
            }
            Ok((handlers, None))
        }
    }
}

/// The Byte Source's blocking ingest loop: the sole producer into the Raw
/// Block Ring. Checks `ending` between reads, the only suspension points
/// on this thread, so shutdown is never delayed behind a second blocking
/// call.
fn run_source_loop(ctx: &Context) -> Result<(), OrbError> {
    let mut src = source::build_source(&ctx.options);
    let mut block = RawBlockRing::new_block();

    while !ctx.ending.load(Ordering::Relaxed) {
        let (n, status) = src.read(&mut block.data);
        match status {
            SourceStatus::Ok => {
                if n > 0 {
                    block.fill = n;
                    ctx.ring.publish(block);
                    block = RawBlockRing::new_block();
                }
            }
            SourceStatus::EndOfInput => {
                tracing::info!(source = src.name(), "end of input, shutting down");
                break;
            }
            SourceStatus::Transient(e) => {
                tracing::warn!(source = src.name(), error = %e, "transient source error, retrying");
            }
            SourceStatus::Fatal(e) => {
                tracing::error!(source = src.name(), error = %e, "fatal source error");
                ctx.request_shutdown();
                return Err(e);
            }
        }
    }

    ctx.request_shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::SourceKind;

    fn test_options(framing: Framing, listen_port: u16) -> Options {
        Options {
            source: SourceKind::File { path: "/dev/null".into(), terminate_on_eof: true },
            framing,
            listen_port,
            interval_report_ms: 0,
            fpga_width: None,
            verbosity: 0,
        }
    }

    #[test]
    fn build_registries_none_framing_yields_single_default() {
        let ending = Arc::new(AtomicBool::new(false));
        let options = test_options(Framing::None, 0);
        let (handlers, default_registry) = build_registries(&options, ending.clone()).unwrap();
        assert!(handlers.is_empty());
        assert!(default_registry.is_some());
        ending.store(true, Ordering::Relaxed);
    }

    #[test]
    fn build_registries_tpiu_yields_one_handler_per_channel() {
        let ending = Arc::new(AtomicBool::new(false));
        let options = test_options(Framing::Tpiu { channels: vec![3, 5] }, 0);
        let (handlers, default_registry) = build_registries(&options, ending.clone()).unwrap();
        assert_eq!(handlers.len(), 2);
        assert!(default_registry.is_none());
        assert_eq!(handlers[0].channel, 3);
        assert_eq!(handlers[1].channel, 5);
        assert_ne!(handlers[0].registry.port(), handlers[1].registry.port());
        ending.store(true, Ordering::Relaxed);
    }

    #[test]
    fn end_of_input_shuts_down_cleanly() {
        let ending = Arc::new(AtomicBool::new(false));
        let options = test_options(Framing::None, 0);
        let (handlers, default_registry) = build_registries(&options, ending.clone()).unwrap();
        let ctx = Context::with_ending(options, handlers, default_registry, ending);

        // File source is /dev/null with terminate_on_eof: immediate EOF.
        let result = run_source_loop(&ctx);
        assert!(result.is_ok());
        assert!(ctx.ending.load(Ordering::Relaxed));
    }
}
