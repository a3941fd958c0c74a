// src/processor.rs
//
// Distribution Processor: the sole consumer of the Raw Block Ring. One
// cycle per filled raw block - decode (TPIU / ORBFLOW / none), route
// bytes to the matching channel Handler's staging buffer via a linear
// scan with a one-element cache (a hash map is unwarranted here - at most
// 127 channels and typically 1-8 active), flush each non-empty staging
// buffer to its registry at block end.

use std::sync::atomic::Ordering;

use crate::cobs::CobsDecoder;
use crate::context::Context;
use crate::tpiu::{TpiuDecoder, TpiuEvent};

/// Linear scan over the configured handlers for `channel`, with a
/// one-element cache of the most recently matched index: for <=127
/// channels and typical N of 1-8 active, this beats a hash map.
struct HandlerCache {
    last_match: Option<usize>,
}

impl HandlerCache {
    fn new() -> Self {
        HandlerCache { last_match: None }
    }

    fn find(&mut self, handlers: &[crate::context::Handler], channel: u8) -> Option<usize> {
        if let Some(idx) = self.last_match {
            if handlers.get(idx).map(|h| h.channel) == Some(channel) {
                return Some(idx);
            }
        }
        let found = handlers.iter().position(|h| h.channel == channel);
        self.last_match = found;
        found
    }
}

/// Runs until the ring is closed and drained; waiting for the next
/// filled block is this loop's only suspension point.
pub fn run(ctx: &Context) {
    match &ctx.options.framing {
        crate::options::Framing::None => run_passthrough(ctx),
        crate::options::Framing::Tpiu { .. } => run_tpiu(ctx),
        crate::options::Framing::Orbflow { .. } => run_orbflow(ctx),
    }
}

fn run_passthrough(ctx: &Context) {
    let registry = ctx
        .default_registry
        .as_ref()
        .expect("default registry must exist when framing is none");

    while let Some(block) = ctx.ring.take() {
        ctx.interval_bytes.fetch_add(block.fill as u64, Ordering::Relaxed);
        registry.send(block.as_slice());
    }
}

fn run_tpiu(ctx: &Context) {
    let mut decoder = TpiuDecoder::new();
    let mut cache = HandlerCache::new();
    let mut staging: Vec<Vec<u8>> = ctx.handlers.iter().map(|_| Vec::new()).collect();

    while let Some(block) = ctx.ring.take() {
        ctx.interval_bytes.fetch_add(block.fill as u64, Ordering::Relaxed);

        for &byte in block.as_slice() {
            if let TpiuEvent::PacketReady(frame) = decoder.feed(byte) {
                for (channel, data_byte) in frame.entries {
                    if let Some(idx) = cache.find(&ctx.handlers, channel) {
                        staging[idx].push(data_byte);
                    }
                    // Channel outside the configured set: dropped silently.
                }
            }
        }

        flush_all(ctx, &mut staging);
        publish_tpiu_stats(ctx, &decoder);
    }
}

fn run_orbflow(ctx: &Context) {
    let mut decoder = CobsDecoder::new();
    let mut cache = HandlerCache::new();
    let mut staging: Vec<Vec<u8>> = ctx.handlers.iter().map(|_| Vec::new()).collect();

    while let Some(block) = ctx.ring.take() {
        ctx.interval_bytes.fetch_add(block.fill as u64, Ordering::Relaxed);

        for &byte in block.as_slice() {
            if let Some(frame) = decoder.feed(byte, crate::cobs::now_ns()) {
                // Bad-checksum frames are dropped rather than forwarded.
                if !frame.good {
                    continue;
                }
                if let Some(idx) = cache.find(&ctx.handlers, frame.tag) {
                    staging[idx].extend_from_slice(&frame.payload);
                }
            }
        }

        flush_all(ctx, &mut staging);
        *ctx.decoder_stats.oflow.lock().unwrap() = decoder.stats();
    }
}

fn flush_all(ctx: &Context, staging: &mut [Vec<u8>]) {
    for (handler, buf) in ctx.handlers.iter().zip(staging.iter_mut()) {
        if !buf.is_empty() {
            handler.registry.send(buf);
            buf.clear();
        }
    }
}

fn publish_tpiu_stats(ctx: &Context, decoder: &TpiuDecoder) {
    *ctx.decoder_stats.tpiu.lock().unwrap() = decoder.stats();
    ctx.decoder_stats.tpiu_leds.store(decoder.leds(), Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Handler;
    use crate::options::{Framing, Options, SourceKind};
    use crate::registry::ChannelRegistry;
    use std::io::Read;
    use std::net::TcpStream;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn test_options(framing: Framing) -> Options {
        Options {
            source: SourceKind::File { path: "/dev/null".into(), terminate_on_eof: true },
            framing,
            listen_port: 0,
            interval_report_ms: 0,
            fpga_width: None,
            verbosity: 0,
        }
    }

    #[test]
    fn channel_isolation_tpiu() {
        let ending = Arc::new(AtomicBool::new(false));
        let reg1 = ChannelRegistry::spawn(0, ending.clone()).unwrap();
        let reg2 = ChannelRegistry::spawn(0, ending.clone()).unwrap();

        let mut c1 = TcpStream::connect(("127.0.0.1", reg1.port())).unwrap();
        let mut c2 = TcpStream::connect(("127.0.0.1", reg2.port())).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));

        let options = test_options(Framing::Tpiu { channels: vec![1, 2] });
        let handlers = vec![
            Handler { channel: 1, registry: reg1.clone() },
            Handler { channel: 2, registry: reg2.clone() },
        ];
        let ctx = crate::context::Context::new(options, handlers, None);

        // Feed a schedule with channel 1 and channel 2 bytes through the ring.
        let schedule: Vec<(u8, u8)> = vec![
            (1, 0x10), (1, 0x20), (2, 0x30), (2, 0x40),
            (1, 0xFF), (1, 0x01), (1, 0x02),
        ];
        let bytes = encode_tpiu_schedule(&schedule);
        let mut block = crate::ring::RawBlockRing::new_block();
        block.data[..bytes.len()].copy_from_slice(&bytes);
        block.fill = bytes.len();
        ctx.ring.publish(block);
        ctx.ring.close();

        run_tpiu(&ctx);

        let mut buf1 = [0u8; 3];
        let mut buf2 = [0u8; 2];
        c1.read_exact(&mut buf1).unwrap();
        c2.read_exact(&mut buf2).unwrap();
        assert_eq!(buf1, [0x10, 0x20, 0xFF]);
        assert_eq!(buf2, [0x30, 0x40]);
        ending.store(true, Ordering::Relaxed);
    }

    fn encode_tpiu_schedule(schedule: &[(u8, u8)]) -> Vec<u8> {
        assert_eq!(schedule.len() % 7, 0);
        let mut out = Vec::new();
        out.extend_from_slice(&crate::tpiu::SYNC_SEQUENCE);
        let mut current = 0u8;
        for frame_schedule in schedule.chunks(7) {
            let mut frame = [0u8; 16];
            let mut aux = 0u8;
            for (i, (ch, byte)) in frame_schedule.iter().enumerate() {
                frame[i * 2] = (ch << 1) | 1;
                frame[i * 2 + 1] = *byte;
                aux |= 1 << i;
                current = *ch;
            }
            frame[14] = (current << 1) | 1;
            frame[15] = aux;
            out.extend_from_slice(&frame);
        }
        out
    }
}
