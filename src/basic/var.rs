use serde::{Deserialize, Serialize};

// WGS84 ellipsoid
pub const RE_WGS84: f64 = 6378137.0;
pub const FE_WGS84: f64 = 1.0 / 298.257223563;

pub const RTCM3_PREAMBLE: u8 = 0xD3;
pub const RTCM3_HEADER_LEN: usize = 3;
pub const RTCM3_CRC_LEN: usize = 3;
pub const MSG_STATION_ARP: u16 = 1005;

pub const NTRIP_DEFAULT_PORT: u16 = 2101;
pub const SERIAL_DEFAULT_BAUD: u32 = 57600;

/// Geodetic position: latitude/longitude in degrees, ellipsoidal height in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoPos {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

impl GeoPos {
    pub fn new(lat: f64, lon: f64, alt: f64) -> Self {
        GeoPos { lat, lon, alt }
    }
}

impl std::fmt::Display for GeoPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.7}, {:.7}, {:.1}m", self.lat, self.lon, self.alt)
    }
}
