use chrono::NaiveTime;
use crate::basic::time::{time2nmea, utc_now};
use crate::basic::var::GeoPos;
use crate::error::{RelayError, Result};

/// Quality fields reported in the keep-alive GGA.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GgaOpt {
    /// 4 = RTK fixed, tells the caster we want high quality corrections
    pub quality: u8,
    pub nsat: u8,
    pub hdop: f64,
    pub geoid_sep: f64,
}

impl Default for GgaOpt {
    fn default() -> Self {
        GgaOpt {
            quality: 4,
            nsat: 12,
            hdop: 0.8,
            geoid_sep: 0.0,
        }
    }
}

/// XOR of every byte between `$` and `*`.
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0, |sum, it| sum ^ it)
}

/// Degrees to NMEA `(d)ddmm.mmmm,H`, `deg_width` being 2 for latitude and 3 for longitude.
fn deg2nmea(deg: f64, deg_width: usize, pos: char, neg: char) -> String {
    let hemi = if deg >= 0.0 { pos } else { neg };
    // work in 1e-4 minutes so rounding never yields a 60.0000 minute field
    let total = (deg.abs() * 60.0 * 1e4).round() as u64;
    let d = total / 600_000;
    let m = total % 600_000;
    format!(
        "{:0width$}{:02}.{:04},{}",
        d,
        m / 10_000,
        m % 10_000,
        hemi,
        width = deg_width
    )
}

/// Builds a `$GPGGA` sentence for `pos` stamped with `time`.
pub fn encode(pos: &GeoPos, opt: &GgaOpt, time: NaiveTime) -> Result<Vec<u8>> {
    if !pos.lat.is_finite() || pos.lat.abs() > 90.0 {
        return Err(RelayError::InvalidInput(format!("latitude {}", pos.lat)));
    }
    if !pos.lon.is_finite() || pos.lon.abs() > 180.0 {
        return Err(RelayError::InvalidInput(format!("longitude {}", pos.lon)));
    }
    if !pos.alt.is_finite() {
        return Err(RelayError::InvalidInput(format!("altitude {}", pos.alt)));
    }

    // age of corrections and differential station id left empty
    let body = format!(
        "GPGGA,{},{},{},{},{:02},{:.1},{:.2},M,{:.1},M,,",
        time2nmea(time),
        deg2nmea(pos.lat, 2, 'N', 'S'),
        deg2nmea(pos.lon, 3, 'E', 'W'),
        opt.quality,
        opt.nsat,
        opt.hdop,
        pos.alt,
        opt.geoid_sep
    );
    let cs = checksum(body.as_bytes());
    Ok(format!("${}*{:02X}\r\n", body, cs).into_bytes())
}

/// Default-quality GGA stamped with the current UTC time.
pub fn build_gga(pos: &GeoPos) -> Result<Vec<u8>> {
    encode(pos, &GgaOpt::default(), utc_now())
}
