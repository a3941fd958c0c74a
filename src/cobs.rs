// src/cobs.rs
//
// COBS (Consistent Overhead Byte Stuffing) framing plus the ORBFLOW inner
// packet format it carries. SYNC byte 0x00 delimits
// COBS-encoded records; each decoded record splits into tag + payload +
// checksum, with the unsigned byte sum of the whole record required to be
// zero mod 256.

pub const SYNC: u8 = 0x00;

/// One decoded ORBFLOW record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OFlowFrame {
    pub tag: u8,
    pub payload: Vec<u8>,
    pub sum: u8,
    pub good: bool,
    pub tstamp_ns: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OFlowStats {
    pub frames_ok: u64,
    pub checksum_errors: u64,
    pub cobs_errors: u64,
}

/// `true` iff `byte` is the COBS frame delimiter.
pub fn is_end_of_frame(byte: u8) -> bool {
    byte == SYNC
}

/// Scans `buf` for the next SYNC byte, returning its index if present.
pub fn find_frame_extent(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == SYNC)
}

/// Standard COBS encode: stuffs zero bytes out of `input`, producing a
/// SYNC-free block. The caller appends the SYNC delimiter separately.
pub fn cobs_encode(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() + input.len() / 254 + 1);
    let mut code_idx = 0usize;
    output.push(0); // placeholder, patched below
    let mut code: u8 = 1;

    for &byte in input {
        if byte == 0 {
            output[code_idx] = code;
            code_idx = output.len();
            output.push(0);
            code = 1;
        } else {
            output.push(byte);
            code += 1;
            if code == 0xFF {
                output[code_idx] = code;
                code_idx = output.len();
                output.push(0);
                code = 1;
            }
        }
    }
    output[code_idx] = code;
    output
}

/// Standard COBS decode. Returns `Err(())` on malformed stuffing (a code
/// byte pointing past the end of the block).
pub fn cobs_decode(input: &[u8]) -> Result<Vec<u8>, ()> {
    let mut output = Vec::with_capacity(input.len());
    let mut i = 0usize;

    while i < input.len() {
        let code = input[i] as usize;
        if code == 0 {
            return Err(());
        }
        i += 1;
        let end = i + code - 1;
        if end > input.len() {
            return Err(());
        }
        output.extend_from_slice(&input[i..end]);
        i = end;
        if code < 0xFF && i < input.len() {
            output.push(0);
        }
    }
    Ok(output)
}

/// Encode a channel + payload into a SYNC-delimited, COBS-stuffed wire
/// record. Used when re-serialising, and by this crate's own round-trip
/// tests.
pub fn encode_orbflow(channel: u8, payload: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(payload.len() + 2);
    record.push(channel);
    record.extend_from_slice(payload);
    let sum: u32 = channel as u32 + payload.iter().map(|&b| b as u32).sum::<u32>();
    let trailer = ((256 - (sum % 256)) % 256) as u8;
    record.push(trailer);

    let mut out = cobs_encode(&record);
    out.push(SYNC);
    out
}

/// Streaming COBS/ORBFLOW decoder: accumulates bytes until SYNC, then
/// decodes the COBS block and splits it into tag/payload/checksum.
pub struct CobsDecoder {
    buf: Vec<u8>,
    stats: OFlowStats,
}

impl CobsDecoder {
    pub fn new() -> Self {
        CobsDecoder { buf: Vec::new(), stats: OFlowStats::default() }
    }

    pub fn stats(&self) -> OFlowStats {
        self.stats
    }

    /// Feed one raw byte, stamping `now_ns` on any frame it completes.
    pub fn feed(&mut self, byte: u8, now_ns: u64) -> Option<OFlowFrame> {
        if !is_end_of_frame(byte) {
            self.buf.push(byte);
            return None;
        }
        if self.buf.is_empty() {
            return None; // back-to-back delimiters carry no record
        }
        let raw = std::mem::take(&mut self.buf);
        match cobs_decode(&raw) {
            Ok(record) if record.len() >= 2 => {
                let tag = record[0];
                let sum = record[record.len() - 1];
                let payload = record[1..record.len() - 1].to_vec();
                let total: u32 =
                    tag as u32 + payload.iter().map(|&b| b as u32).sum::<u32>() + sum as u32;
                let good = total % 256 == 0;
                if good {
                    self.stats.frames_ok += 1;
                } else {
                    self.stats.checksum_errors += 1;
                }
                Some(OFlowFrame { tag, payload, sum, good, tstamp_ns: now_ns })
            }
            Ok(_) => {
                self.stats.cobs_errors += 1;
                None
            }
            Err(()) => {
                self.stats.cobs_errors += 1;
                None
            }
        }
    }
}

impl Default for CobsDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wall-clock time in nanoseconds since the UNIX epoch, used to stamp
/// ORBFLOW frames on arrival.
pub fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg_bytes(seed: u64, len: usize) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (state >> 33) as u8
            })
            .collect()
    }

    #[test]
    fn cobs_round_trip_no_zeros() {
        for len in [0usize, 1, 2, 13, 254, 255, 600, 4096] {
            let data: Vec<u8> = lcg_bytes(len as u64 + 1, len).into_iter().map(|b| b | 1).collect();
            assert!(!data.contains(&0));
            let encoded = cobs_encode(&data);
            assert!(!encoded.contains(&0));
            let decoded = cobs_decode(&encoded).unwrap();
            assert_eq!(decoded, data);
        }
    }

    #[test]
    fn cobs_round_trip_with_zeros() {
        for len in [1usize, 5, 256, 1000, 4096] {
            let data = lcg_bytes(len as u64 + 99, len);
            let encoded = cobs_encode(&data);
            assert!(!encoded.contains(&0));
            let decoded = cobs_decode(&encoded).unwrap();
            assert_eq!(decoded, data);
        }
    }

    #[test]
    fn cobs_round_trip_empty() {
        let encoded = cobs_encode(&[]);
        assert_eq!(cobs_decode(&encoded).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn cobs_decode_rejects_embedded_zero_code() {
        assert!(cobs_decode(&[0x02, 0x01, 0x00]).is_err());
    }

    #[test]
    fn cobs_decode_rejects_truncated_block() {
        assert!(cobs_decode(&[0x05, 0x01, 0x02]).is_err());
    }

    #[test]
    fn orbflow_untampered_frame_is_good() {
        // channel 7, payload 41 42 43 -> trailer (256 - (7+0x41+0x42+0x43)) mod 256
        let channel = 7u8;
        let payload = [0x41u8, 0x42, 0x43];
        let wire = encode_orbflow(channel, &payload);

        let mut dec = CobsDecoder::new();
        let mut got = None;
        for &b in &wire {
            if let Some(f) = dec.feed(b, 1234) {
                got = Some(f);
            }
        }
        let frame = got.expect("frame decoded");
        assert!(frame.good);
        assert_eq!(frame.tag, channel);
        assert_eq!(frame.payload, payload);
        assert_eq!(frame.tstamp_ns, 1234);
        assert_eq!(dec.stats().frames_ok, 1);
        assert_eq!(dec.stats().checksum_errors, 0);
    }

    #[test]
    fn orbflow_tampered_payload_is_never_good() {
        let wire = encode_orbflow(7, &[0x41, 0x42, 0x43]);
        // Flip a payload byte post-encode by round-tripping through COBS
        // decode, tampering, then re-encoding - exercises the checksum
        // rather than the stuffing.
        let record = {
            // wire = cobs(record) ++ SYNC
            let stuffed = &wire[..wire.len() - 1];
            cobs_decode(stuffed).unwrap()
        };
        let mut tampered = record.clone();
        tampered[1] ^= 0xFF;
        let mut out = cobs_encode(&tampered);
        out.push(SYNC);

        let mut dec = CobsDecoder::new();
        let mut got = None;
        for &b in &out {
            if let Some(f) = dec.feed(b, 0) {
                got = Some(f);
            }
        }
        assert!(!got.unwrap().good);
        assert_eq!(dec.stats().checksum_errors, 1);
    }

    #[test]
    fn short_record_is_not_a_frame() {
        // A single-byte record (just a tag, no checksum) is below the
        // L >= 2 floor and must not produce a frame.
        let encoded = cobs_encode(&[0x07]);
        let mut wire = encoded;
        wire.push(SYNC);

        let mut dec = CobsDecoder::new();
        let mut got = None;
        for &b in &wire {
            got = dec.feed(b, 0).or(got);
        }
        assert!(got.is_none());
        assert_eq!(dec.stats().cobs_errors, 1);
    }

    #[test]
    fn is_end_of_frame_and_find_frame_extent() {
        assert!(is_end_of_frame(0x00));
        assert!(!is_end_of_frame(0x01));
        let buf = [1u8, 2, 3, 0, 4, 5];
        assert_eq!(find_frame_extent(&buf), Some(3));
        assert_eq!(find_frame_extent(&[1, 2, 3]), None);
    }
}
