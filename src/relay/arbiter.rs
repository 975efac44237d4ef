use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use crate::basic::ntrip::{CorrectionSink, PositionProvider};
use crate::basic::pos::base_offset;
use crate::basic::var::{GeoPos, MSG_STATION_ARP};
use crate::error::Result;
use crate::relay::relay_var::{
    ArbitrationState, BaseStatus, ForwardMode, RelayStatus, SourceHealth, Verdict,
};
use crate::relay::serial::Uplink;
use crate::rtcm::{msg1005, RtcmFramer};

#[derive(Debug, Clone)]
pub struct ArbiterOpt {
    pub mode: ForwardMode,
    /// Local stream silence after which network RTK is forwarded again.
    pub timeout: Duration,
    /// Report the local station's 1005 position in the GGA keep-alive (backup mode).
    pub use_station_pos: bool,
    pub static_pos: GeoPos,
}

impl Default for ArbiterOpt {
    fn default() -> Self {
        ArbiterOpt {
            mode: ForwardMode::Normal,
            timeout: Duration::from_secs(10),
            use_station_pos: true,
            static_pos: GeoPos::default(),
        }
    }
}

// Everything both stream workers touch, updated as one unit.
#[derive(Debug, Default)]
struct ArbiterState {
    net_framer: RtcmFramer,
    local_framer: RtcmFramer,
    net: SourceHealth,
    local: SourceHealth,
    arb: ArbitrationState,
}

/// Chooses between network and local-base corrections.
///
/// Network chunks arrive on the NTRIP worker and local chunks on the serial receive
/// worker; both go through one lock so a forwarding decision always sees a consistent
/// snapshot of the two streams.
pub struct Arbitrator {
    opt: ArbiterOpt,
    uplink: Arc<dyn Uplink>,
    state: Mutex<ArbiterState>,
}

impl Arbitrator {
    pub fn new(opt: ArbiterOpt, uplink: Arc<dyn Uplink>) -> Self {
        let state = ArbiterState {
            arb: ArbitrationState {
                forward_enabled: true,
                announced: None,
            },
            ..ArbiterState::default()
        };
        Arbitrator {
            opt,
            uplink,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ArbiterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn on_network(&self, data: &[u8]) -> Verdict {
        self.on_network_at(data, Instant::now())
    }

    /// Evaluates a network chunk received at `now` and relays it unchanged if allowed.
    pub fn on_network_at(&self, data: &[u8], now: Instant) -> Verdict {
        let (verdict, msgs) = {
            let mut st = self.lock();
            st.net.touch(data.len(), now);
            let frames = st.net_framer.feed(data);
            for f in frames.iter().filter(|f| f.msg_no == MSG_STATION_ARP) {
                match msg1005::parse(&f.payload) {
                    Ok(fix) => {
                        if st.net.record_fix(fix, now) {
                            info!("network reference station {}: {}", fix.station_id, fix.pos);
                        }
                    }
                    Err(e) => debug!("network 1005 ignored: {}", e),
                }
            }

            let local_online = st.local.online(now, self.opt.timeout);
            let forward = !(self.opt.mode == ForwardMode::Backup && local_online);
            st.arb.forward_enabled = forward;
            let changed = st.arb.announced != Some(forward);
            if changed {
                st.arb.announced = Some(forward);
                match (self.opt.mode, forward) {
                    (ForwardMode::Backup, true) => info!("backup mode: forwarding network RTK"),
                    (ForwardMode::Backup, false) => {
                        info!("backup mode: base station online, network RTK suppressed")
                    }
                    (ForwardMode::Normal, _) => info!("normal mode: forwarding network RTK"),
                }
            }
            let msgs: Vec<u16> = frames.iter().map(|f| f.msg_no).collect();
            (Verdict { forward, changed }, msgs)
        };

        for m in &msgs {
            debug!("{} RX", m);
        }
        if verdict.forward {
            match self.uplink.send(data) {
                // transparent relay: same message sequence goes out
                Ok(()) => {
                    for m in &msgs {
                        debug!("{} TX", m);
                    }
                }
                Err(e) => warn!("serial send failed, chunk dropped: {}", e),
            }
        }
        verdict
    }

    pub fn on_local(&self, data: &[u8]) {
        self.on_local_at(data, Instant::now())
    }

    /// Records bytes from the local base station received at `now`.
    pub fn on_local_at(&self, data: &[u8], now: Instant) {
        let mut st = self.lock();
        st.local.touch(data.len(), now);
        let frames = st.local_framer.feed(data);
        for f in frames.iter().filter(|f| f.msg_no == MSG_STATION_ARP) {
            match msg1005::parse(&f.payload) {
                Ok(fix) => {
                    if st.local.record_fix(fix, now) {
                        info!("local base station {}: {}", fix.station_id, fix.pos);
                    }
                }
                Err(e) => debug!("local 1005 ignored: {}", e),
            }
        }
    }

    pub fn snapshot(&self) -> RelayStatus {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> RelayStatus {
        let st = self.lock();
        let base = match (st.local.online(now, self.opt.timeout), st.local.saw_fix) {
            (false, _) => BaseStatus::NoData,
            (true, false) => BaseStatus::DataNoFix,
            (true, true) => BaseStatus::Online,
        };
        let local_fix = st.local.fix.map(|f| f.pos);
        let net_fix = st.net.fix.map(|f| f.pos);
        let offset = match (local_fix, net_fix) {
            (Some(a), Some(b)) => Some(base_offset(&a, &b)),
            _ => None,
        };
        RelayStatus {
            mode: self.opt.mode,
            forward_enabled: st.arb.forward_enabled,
            base,
            local_fix,
            net_fix,
            offset,
            net_bytes: st.net.bytes,
            local_bytes: st.local.bytes,
            net_msgs: st.net_framer.stats(),
            serial_sent: 0,
            serial_received: 0,
        }
    }
}

impl PositionProvider for Arbitrator {
    fn position(&self) -> Result<GeoPos> {
        if self.opt.mode == ForwardMode::Backup && self.opt.use_station_pos {
            if let Some(fix) = self.lock().local.fix {
                return Ok(fix.pos);
            }
        }
        Ok(self.opt.static_pos)
    }
}

impl CorrectionSink for Arbitrator {
    fn on_correction(&self, data: &[u8]) {
        self.on_network(data);
    }
}
