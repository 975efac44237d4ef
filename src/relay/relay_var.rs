use std::fmt;
use std::time::{Duration, Instant};
use serde::{Deserialize, Serialize};
use crate::basic::var::GeoPos;
use crate::rtcm::StationFix;

/// How network corrections are relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ForwardMode {
    /// Always forward network RTK.
    #[default]
    Normal,
    /// Prefer the local base station; fall back to network RTK when it goes quiet.
    Backup,
}

impl fmt::Display for ForwardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardMode::Normal => write!(f, "normal"),
            ForwardMode::Backup => write!(f, "backup"),
        }
    }
}

/// Freshness and last station fix of one inbound stream.
#[derive(Debug, Clone, Default)]
pub struct SourceHealth {
    pub last_byte: Option<Instant>,
    pub last_fix: Option<Instant>,
    pub saw_fix: bool,
    pub fix: Option<StationFix>,
    pub bytes: u64,
}

impl SourceHealth {
    pub fn touch(&mut self, len: usize, now: Instant) {
        self.last_byte = Some(now);
        self.bytes += len as u64;
    }

    /// Stores a decoded fix; true if it is the first one or the station changed.
    pub fn record_fix(&mut self, fix: StationFix, now: Instant) -> bool {
        let fresh = self.fix.map_or(true, |f| f.station_id != fix.station_id);
        self.fix = Some(fix);
        self.last_fix = Some(now);
        self.saw_fix = true;
        fresh
    }

    /// Bytes seen within `timeout` of `now`. Never online before the first byte.
    pub fn online(&self, now: Instant, timeout: Duration) -> bool {
        self.last_byte
            .map_or(false, |t| now.saturating_duration_since(t) <= timeout)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArbitrationState {
    pub forward_enabled: bool,
    /// Last value logged, so transitions are reported once.
    pub announced: Option<bool>,
}

/// Outcome of evaluating one network chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub forward: bool,
    /// The forwarding state differs from the previously announced one.
    pub changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseStatus {
    NoData,
    /// Bytes arrive but no 1005 has been decoded.
    DataNoFix,
    Online,
}

impl fmt::Display for BaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseStatus::NoData => write!(f, "no data"),
            BaseStatus::DataNoFix => write!(f, "data without 1005"),
            BaseStatus::Online => write!(f, "online"),
        }
    }
}

/// Point-in-time view of the relay for the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayStatus {
    pub mode: ForwardMode,
    pub forward_enabled: bool,
    pub base: BaseStatus,
    pub local_fix: Option<GeoPos>,
    pub net_fix: Option<GeoPos>,
    /// Horizontal and vertical distance (m) between the local and network reference stations.
    pub offset: Option<(f64, f64)>,
    pub net_bytes: u64,
    pub local_bytes: u64,
    pub net_msgs: Vec<(u16, u64)>,
    pub serial_sent: u64,
    pub serial_received: u64,
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let forward = match (self.mode, self.forward_enabled) {
            (ForwardMode::Normal, _) => "forwarding network RTK",
            (ForwardMode::Backup, true) => "forwarding network RTK (base silent)",
            (ForwardMode::Backup, false) => "network RTK suppressed (base online)",
        };
        write!(
            f,
            "rtcm {}B serial {}B | base: {} | {}",
            self.net_bytes, self.serial_sent, self.base, forward
        )?;
        if let Some(p) = self.local_fix {
            write!(f, " | base 1005: {}", p)?;
        }
        if let Some(p) = self.net_fix {
            write!(f, " | network 1005: {}", p)?;
        }
        if let Some((h, v)) = self.offset {
            write!(f, " | datum offset ~{:.2}m h, {:.2}m v", h, v)?;
        }
        Ok(())
    }
}
