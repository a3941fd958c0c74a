// src/tpiu.rs
//
// TPIU synchronous frame decoder.
//
// A byte-at-a-time state machine: scans for the 4-byte sync sequence,
// assembles 16-byte frames, and decodes each frame's stream-ID-change
// bytes and aux "change before" flags into a tagged (channel, byte)
// schedule. Kept as a small, dependency-free struct in the style of the
// teacher's decoder-ish helpers (io/gvret_common.rs's parse_gvret_frames) -
// a plain function/struct over a byte buffer, no async, no I/O.

pub const SYNC_SEQUENCE: [u8; 4] = [0xFF, 0xFF, 0xFF, 0x7F];
const FRAME_LEN: usize = 16;

/// One decoded TPIU half-frame: up to 15 (stream, byte) entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TpiuFrame {
    pub entries: Vec<(u8, u8)>,
}

/// Decoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpiuState {
    Unsynced,
    Rxing(u8),
    NewlySynced,
    Synced,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpiuEvent {
    None,
    Rxing,
    NewSync,
    Synced,
    Unsynced,
    PacketReady(TpiuFrame),
    Error,
}

/// LED bit positions for the 4-bit state indicator.
pub mod led {
    pub const DATA: u8 = 1 << 0;
    pub const TX: u8 = 1 << 1;
    pub const OVERFLOW: u8 = 1 << 2;
    pub const HEARTBEAT: u8 = 1 << 3;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TpiuStats {
    pub total_frames: u64,
    pub pending_count: usize,
    pub lost_frames: u64,
}

pub struct TpiuDecoder {
    state: TpiuState,
    /// Rolling window of the most recently seen raw bytes, used to detect
    /// the sync sequence regardless of frame-boundary alignment.
    window: [u8; 4],
    frame_buf: [u8; FRAME_LEN],
    offset: usize,
    current_stream: u8,
    stats: TpiuStats,
    leds: u8,
}

impl TpiuDecoder {
    pub fn new() -> Self {
        TpiuDecoder {
            state: TpiuState::Unsynced,
            window: [0; 4],
            frame_buf: [0; FRAME_LEN],
            offset: 0,
            current_stream: 0,
            stats: TpiuStats::default(),
            leds: 0,
        }
    }

    pub fn state(&self) -> TpiuState {
        self.state
    }

    pub fn stats(&self) -> TpiuStats {
        let mut s = self.stats;
        s.pending_count = self.offset;
        s
    }

    pub fn leds(&self) -> u8 {
        self.leds
    }

    /// Feed one raw byte, returning the event it produced.
    pub fn feed(&mut self, byte: u8) -> TpiuEvent {
        self.window.rotate_left(1);
        self.window[3] = byte;

        if self.window == SYNC_SEQUENCE {
            if self.offset > 0 {
                self.stats.lost_frames += 1;
                self.leds |= led::OVERFLOW;
            }
            self.offset = 0;
            self.state = TpiuState::NewlySynced;
            return TpiuEvent::NewSync;
        }

        if self.state == TpiuState::Unsynced {
            return TpiuEvent::None;
        }

        self.frame_buf[self.offset] = byte;
        self.offset += 1;

        if self.offset < FRAME_LEN {
            self.state = TpiuState::Rxing(self.offset as u8);
            return TpiuEvent::Rxing;
        }

        // Frame complete.
        self.offset = 0;
        match decode_frame(&self.frame_buf, &mut self.current_stream) {
            Ok(frame) => {
                self.stats.total_frames += 1;
                self.state = TpiuState::Synced;
                if !frame.entries.is_empty() {
                    self.leds |= led::DATA;
                }
                self.leds ^= led::HEARTBEAT;
                TpiuEvent::PacketReady(frame)
            }
            Err(()) => {
                self.stats.lost_frames += 1;
                self.state = TpiuState::Unsynced;
                TpiuEvent::Error
            }
        }
    }
}

impl Default for TpiuDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode one completed 16-byte TPIU frame per ARM TPIU rules.
///
/// Bytes at even offsets (0, 2, .., 12) are each either a stream-ID-change
/// marker (LSB set, new stream = byte >> 1) or plain data for the current
/// stream; when a marker, the aux byte's corresponding bit says whether the
/// change applies before (the following odd byte already uses the new
/// stream) or after (the following odd byte still uses the old stream) the
/// paired odd byte. Odd offsets are always data. Offset 14 has no odd
/// partner: a marker there updates the stream with no accompanying data.
fn decode_frame(frame: &[u8; FRAME_LEN], current_stream: &mut u8) -> Result<TpiuFrame, ()> {
    let aux = frame[15];
    let mut entries = Vec::with_capacity(15);

    for pair in 0..7usize {
        let even = frame[pair * 2];
        let odd = frame[pair * 2 + 1];
        if even & 1 == 1 {
            let new_stream = even >> 1;
            if new_stream == 0 {
                return Err(());
            }
            if aux & (1 << pair) != 0 {
                *current_stream = new_stream;
                entries.push((*current_stream, odd));
            } else {
                entries.push((*current_stream, odd));
                *current_stream = new_stream;
            }
        } else {
            entries.push((*current_stream, even));
            entries.push((*current_stream, odd));
        }
    }

    let last = frame[14];
    if last & 1 == 1 {
        let new_stream = last >> 1;
        if new_stream == 0 {
            return Err(());
        }
        *current_stream = new_stream;
    } else {
        entries.push((*current_stream, last));
    }

    Ok(TpiuFrame { entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a conforming TPIU byte stream from a (channel, byte) schedule.
    /// Every pair's even slot is a (possibly redundant) stream-ID marker
    /// with aux bit set (change-before), so the odd slot can carry any
    /// data byte value without LSB ambiguity. Slot 14 is always a
    /// redundant marker carrying no data. `schedule.len()` must be a
    /// multiple of 7 so it divides evenly into frames.
    fn encode_schedule(schedule: &[(u8, u8)]) -> Vec<u8> {
        assert_eq!(schedule.len() % 7, 0);
        let mut out = Vec::new();
        out.extend_from_slice(&SYNC_SEQUENCE);
        let mut current = 0u8;

        for frame_schedule in schedule.chunks(7) {
            let mut frame = [0u8; FRAME_LEN];
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

    fn decode_all(bytes: &[u8]) -> Vec<(u8, u8)> {
        let mut dec = TpiuDecoder::new();
        let mut out = Vec::new();
        for &b in bytes {
            if let TpiuEvent::PacketReady(frame) = dec.feed(b) {
                out.extend(frame.entries);
            }
        }
        out
    }

    #[test]
    fn round_trip_schedule() {
        let schedule: Vec<(u8, u8)> = vec![
            (1, 0x10), (1, 0x20), (2, 0x30), (2, 0x40),
            (1, 0xFF), (3, 0x01), (3, 0x02),
            (3, 0x03), (3, 0x04), (3, 0x05), (3, 0x06), (3, 0x07), (3, 0x08), (3, 0x09),
        ];
        let bytes = encode_schedule(&schedule);
        let decoded = decode_all(&bytes);
        assert_eq!(decoded, schedule);
    }

    #[test]
    fn deterministic_regardless_of_chunk_boundaries() {
        let schedule: Vec<(u8, u8)> =
            (0..14).map(|i| (1 + (i % 3) as u8, i as u8)).collect();
        let bytes = encode_schedule(&schedule);

        let whole = decode_all(&bytes);

        // Feed in ragged chunks of varying size.
        let mut dec = TpiuDecoder::new();
        let mut chunked = Vec::new();
        for chunk in bytes.chunks(3) {
            for &b in chunk {
                if let TpiuEvent::PacketReady(frame) = dec.feed(b) {
                    chunked.extend(frame.entries);
                }
            }
        }

        assert_eq!(whole, schedule);
        assert_eq!(chunked, schedule);
    }

    #[test]
    fn invariant_under_noise_prefix() {
        let schedule: Vec<(u8, u8)> = vec![(5, 0xAA); 7];
        let bytes = encode_schedule(&schedule);

        let mut noisy = vec![0x00, 0x11, 0x22, 0xFF, 0xFF, 0x7F]; // partial false sync
        noisy.extend_from_slice(&bytes);

        assert_eq!(decode_all(&noisy), schedule);
    }

    #[test]
    fn mid_frame_resync_discards_partial_frame_and_counts_loss() {
        let mut dec = TpiuDecoder::new();
        for &b in &SYNC_SEQUENCE {
            dec.feed(b);
        }
        // Feed a few partial frame bytes, then an unexpected sync sequence.
        dec.feed(0x01);
        dec.feed(0x02);
        dec.feed(0x03);
        for &b in &SYNC_SEQUENCE {
            dec.feed(b);
        }
        assert_eq!(dec.stats().lost_frames, 1);
        assert_eq!(dec.state(), TpiuState::NewlySynced);
    }

    #[test]
    fn invalid_channel_zero_is_malformed() {
        let mut dec = TpiuDecoder::new();
        for &b in &SYNC_SEQUENCE {
            dec.feed(b);
        }
        // Even byte 0x01 -> new_stream = 0, invalid.
        let mut last = TpiuEvent::None;
        for b in [0x01u8, 0x10, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0] {
            last = dec.feed(b);
        }
        assert_eq!(last, TpiuEvent::Error);
        assert_eq!(dec.state(), TpiuState::Unsynced);
        assert_eq!(dec.stats().lost_frames, 1);
    }

    #[test]
    fn unsynced_ignores_bytes_until_sync_seen() {
        let mut dec = TpiuDecoder::new();
        for b in [0x00u8, 0x01, 0x02, 0x03] {
            assert_eq!(dec.feed(b), TpiuEvent::None);
        }
        assert_eq!(dec.state(), TpiuState::Unsynced);
    }
}
