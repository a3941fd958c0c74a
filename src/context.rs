// src/context.rs
//
// Application context: the shared state every thread needs, constructed
// once at startup and handed to each thread entry-point by reference
// (`Arc` clones), instead of a global record. No statics; ownership is
// explicit.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8};
use std::sync::{Arc, Mutex};

use crate::cobs::OFlowStats;
use crate::options::Options;
use crate::registry::ChannelRegistry;
use crate::ring::RawBlockRing;
use crate::tpiu::TpiuStats;

/// One configured output channel: a decoded-byte destination plus the
/// registry that fans its bytes out to subscribers.
pub struct Handler {
    pub channel: u8,
    pub registry: Arc<ChannelRegistry>,
}

/// Shared decoder statistics, updated by the Processor after each block
/// and read by the Interval Reporter.
#[derive(Default)]
pub struct DecoderStats {
    pub tpiu: Mutex<TpiuStats>,
    pub tpiu_leds: AtomicU8,
    pub oflow: Mutex<OFlowStats>,
}

/// Shared application state, constructed once in `main` and threaded
/// explicitly to the Processor, Reporter, and Source loops.
pub struct Context {
    pub options: Options,
    pub ring: Arc<RawBlockRing>,
    pub ending: Arc<AtomicBool>,
    pub interval_bytes: Arc<AtomicU64>,
    pub handlers: Vec<Handler>,
    /// Registry used when framing is `None`: a single global fan-out.
    pub default_registry: Option<Arc<ChannelRegistry>>,
    pub decoder_stats: Arc<DecoderStats>,
}

impl Context {
    pub fn new(
        options: Options,
        handlers: Vec<Handler>,
        default_registry: Option<Arc<ChannelRegistry>>,
    ) -> Self {
        Self::with_ending(options, handlers, default_registry, Arc::new(AtomicBool::new(false)))
    }

    /// Like `new`, but takes an externally-owned `ending` flag so the
    /// caller can share one shutdown signal between the Context and the
    /// Subscriber Registries it was built with (main.rs's supervisor:
    /// registries are spawned, and therefore need their `ending` flag,
    /// before the Context that owns their Handlers exists).
    pub fn with_ending(
        options: Options,
        handlers: Vec<Handler>,
        default_registry: Option<Arc<ChannelRegistry>>,
        ending: Arc<AtomicBool>,
    ) -> Self {
        Context {
            options,
            ring: Arc::new(RawBlockRing::new()),
            ending,
            interval_bytes: Arc::new(AtomicU64::new(0)),
            handlers,
            default_registry,
            decoder_stats: Arc::new(DecoderStats::default()),
        }
    }

    pub fn request_shutdown(&self) {
        use std::sync::atomic::Ordering;
        self.ending.store(true, Ordering::Relaxed);
        self.ring.close();
    }
}
