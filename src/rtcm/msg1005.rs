use nalgebra::Vector3;
use crate::basic::pos::ecef2pos;
use crate::basic::var::{GeoPos, MSG_STATION_ARP};
use crate::error::{RelayError, Result};

const MIN_PAYLOAD: usize = 8;
const ECEF_SCALE: f64 = 0.0001;
// 12+12+6+4+38+1+1+38+2+38
const MSG1005_BITS: usize = 152;

/// Reference station position carried by RTCM 1005.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationFix {
    pub station_id: u16,
    pub itrf_year: u8,
    /// ECEF antenna reference point (m)
    pub ecef: Vector3<f64>,
    pub pos: GeoPos,
}

/// Extract an unsigned big-endian bit field, MSB first.
pub fn getbitu(buff: &[u8], pos: usize, len: usize) -> u64 {
    let mut bits = 0u64;
    for i in pos..pos + len {
        bits = (bits << 1) | ((buff[i / 8] >> (7 - i % 8)) & 1) as u64;
    }
    bits
}

/// Extract a two's complement signed bit field.
pub fn getbits(buff: &[u8], pos: usize, len: usize) -> i64 {
    let bits = getbitu(buff, pos, len);
    if len == 0 || len >= 64 || bits & (1 << (len - 1)) == 0 {
        return bits as i64;
    }
    (bits | (!0u64 << len)) as i64
}

/// Decodes a 1005 payload (header and CRC stripped). `None` if it is not one.
pub fn decode(payload: &[u8]) -> Option<StationFix> {
    parse(payload).ok()
}

/// Like [`decode`], with the reason a payload was rejected.
pub fn parse(payload: &[u8]) -> Result<StationFix> {
    if payload.len() < MIN_PAYLOAD || payload.len() * 8 < MSG1005_BITS {
        return Err(RelayError::Parse(format!(
            "1005 payload too short: {} bytes",
            payload.len()
        )));
    }
    let mut i = 0;
    let msg_no = getbitu(payload, i, 12) as u16;
    if msg_no != MSG_STATION_ARP {
        return Err(RelayError::Parse(format!("message {} is not 1005", msg_no)));
    }
    i += 12;
    let station_id = getbitu(payload, i, 12) as u16;
    i += 12;
    let itrf_year = getbitu(payload, i, 6) as u8;
    // GPS, GLONASS, Galileo and reference-station indicators
    i += 6 + 4;
    let x = getbits(payload, i, 38);
    // single receiver oscillator + reserved
    i += 38 + 2;
    let y = getbits(payload, i, 38);
    // quarter cycle indicator
    i += 38 + 2;
    let z = getbits(payload, i, 38);

    let ecef = Vector3::new(x as f64, y as f64, z as f64) * ECEF_SCALE;
    Ok(StationFix {
        station_id,
        itrf_year,
        ecef,
        pos: ecef2pos(&ecef),
    })
}

/// Encodes a 1005 payload; the inverse of [`decode`], used to drive tests.
#[cfg(test)]
pub(crate) fn encode(station_id: u16, ecef: &Vector3<f64>) -> Vec<u8> {
    fn setbitu(buff: &mut [u8], pos: usize, len: usize, data: u64) {
        for k in 0..len {
            let i = pos + k;
            let bit = (data >> (len - 1 - k)) & 1;
            if bit == 1 {
                buff[i / 8] |= 1 << (7 - i % 8);
            } else {
                buff[i / 8] &= !(1 << (7 - i % 8));
            }
        }
    }
    let mask = (1u64 << 38) - 1;
    let mut buff = vec![0u8; MSG1005_BITS / 8];
    setbitu(&mut buff, 0, 12, MSG_STATION_ARP as u64);
    setbitu(&mut buff, 12, 12, station_id as u64);
    setbitu(&mut buff, 30, 4, 0b1001);
    setbitu(&mut buff, 34, 38, ((ecef[0] / ECEF_SCALE).round() as i64) as u64 & mask);
    setbitu(&mut buff, 74, 38, ((ecef[1] / ECEF_SCALE).round() as i64) as u64 & mask);
    setbitu(&mut buff, 114, 38, ((ecef[2] / ECEF_SCALE).round() as i64) as u64 & mask);
    buff
}
