use std::collections::BTreeMap;
use crate::basic::var::{RTCM3_CRC_LEN, RTCM3_HEADER_LEN, RTCM3_PREAMBLE};

/// One RTCM3 message lifted out of the stream. The CRC is not checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionFrame {
    pub msg_no: u16,
    pub payload: Vec<u8>,
}

/// Streaming RTCM3 frame synchronizer.
///
/// Bytes are fed in arbitrary chunks; the carry-over buffer keeps partial frames
/// between calls. Each inbound stream owns its own framer.
#[derive(Debug, Default)]
pub struct RtcmFramer {
    buf: Vec<u8>,
    stats: BTreeMap<u16, u64>,
}

/// Message number from the top 12 bits of a payload.
pub fn msg_number(payload: &[u8]) -> Option<u16> {
    if payload.len() < 2 {
        return None;
    }
    Some((((payload[0] as u16) << 4) | ((payload[1] as u16) >> 4)) & 0xFFF)
}

impl RtcmFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `data` and returns every frame completed by it, in stream order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<CorrectionFrame> {
        self.buf.extend_from_slice(data);
        let mut frames = Vec::new();

        loop {
            match self.buf.iter().position(|&b| b == RTCM3_PREAMBLE) {
                // nothing to sync on: drop the whole buffer
                None => {
                    self.buf.clear();
                    break;
                }
                Some(0) => {}
                Some(start) => {
                    self.buf.drain(..start);
                }
            }
            if self.buf.len() < RTCM3_HEADER_LEN {
                break;
            }
            let len = ((((self.buf[1] as u16) << 8) | (self.buf[2] as u16)) & 0x3FF) as usize;
            let total = RTCM3_HEADER_LEN + len + RTCM3_CRC_LEN;
            if self.buf.len() < total {
                break;
            }
            let payload = &self.buf[RTCM3_HEADER_LEN..RTCM3_HEADER_LEN + len];
            if let Some(msg_no) = msg_number(payload) {
                *self.stats.entry(msg_no).or_insert(0) += 1;
                frames.push(CorrectionFrame {
                    msg_no,
                    payload: payload.to_vec(),
                });
            }
            self.buf.drain(..total);
        }

        frames
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Per-message counts, sorted by message number.
    pub fn stats(&self) -> Vec<(u16, u64)> {
        self.stats.iter().map(|(&k, &v)| (k, v)).collect()
    }

    pub fn reset_stats(&mut self) {
        self.stats.clear();
    }
}

/// Wraps `payload` in an RTCM3 frame with a zero CRC.
#[cfg(test)]
pub(crate) fn make_frame(payload: &[u8]) -> Vec<u8> {
    let len = payload.len();
    let mut frame = vec![RTCM3_PREAMBLE, ((len >> 8) & 0x03) as u8, (len & 0xFF) as u8];
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&[0; RTCM3_CRC_LEN]);
    frame
}
