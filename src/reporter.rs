// src/reporter.rs
//
// Interval Reporter: a periodic thread that atomically reads and resets
// the throughput counter, scales it to bits/sec, and
// renders a single status line - plus TPIU decoder stats when TPIU
// framing is active - using ANSI cursor-up + clear-line for a stationary
// display. Disabled when the configured period is 0.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::context::Context;
use crate::options::Framing;

/// Informal max link data rate used to compute link-utilisation percent.
/// TPIU over a typical SWO/trace link tops out well under this; it is a
/// display heuristic, not a protocol constant.
const MAX_DATA_RATE_BPS: f64 = 100_000_000.0;

pub fn run(ctx: &Context) {
    let period_ms = ctx.options.interval_report_ms;
    if period_ms == 0 {
        return;
    }
    let period = Duration::from_millis(period_ms);

    // First line is printed without a preceding cursor-up.
    let mut first = true;

    while !ctx.ending.load(Ordering::Relaxed) {
        std::thread::sleep(period);
        if ctx.ending.load(Ordering::Relaxed) {
            break;
        }

        let bytes = ctx.interval_bytes.swap(0, Ordering::Relaxed);
        let bits_per_sec = (bytes as f64) * 8.0 * 1000.0 / (period_ms as f64);
        let utilisation = ((bits_per_sec / MAX_DATA_RATE_BPS) * 100.0).min(100.0);

        let mut line = format!("{bits_per_sec:>12.0} bits/sec  {utilisation:>5.1}% full");

        if matches!(ctx.options.framing, Framing::Tpiu { .. }) {
            let stats = *ctx.decoder_stats.tpiu.lock().unwrap();
            let leds = ctx.decoder_stats.tpiu_leds.load(Ordering::Relaxed);
            line.push_str(&format!(
                "  leds={leds:04b} frames={} pending={} lost={}",
                stats.total_frames, stats.pending_count, stats.lost_frames
            ));
        }

        let dropped = ctx.ring.dropped_blocks();
        if dropped > 0 {
            line.push_str(&format!("  dropped_blocks={dropped}"));
        }

        if !first {
            print!("\x1b[1A\x1b[2K");
        }
        first = false;
        println!("{line}");
    }
}
