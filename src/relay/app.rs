use std::sync::Arc;
use tracing::{info, warn};
use crate::basic::ntrip::{NtripSession, SessionState};
use crate::config::RelayConfig;
use crate::error::Result;
use crate::relay::arbiter::Arbitrator;
use crate::relay::relay_var::RelayStatus;
use crate::relay::serial::SerialChannel;

/// A running relay: caster session, arbitration and the radio link.
pub struct Relay {
    arbiter: Arc<Arbitrator>,
    serial: Arc<SerialChannel>,
    ntrip: Option<NtripSession>,
}

impl Relay {
    /// Opens the serial link and connects to the caster. Must run inside a tokio runtime.
    pub fn start(cfg: &RelayConfig) -> Result<Self> {
        cfg.validate()?;
        let serial = Arc::new(SerialChannel::new(cfg.serial.port.trim(), cfg.serial.baudrate));
        let arbiter = Arc::new(Arbitrator::new(cfg.arbiter_opt(), serial.clone()));

        let local = arbiter.clone();
        serial.open(Some(Box::new(move |data: &[u8]| local.on_local(data))))?;

        let ntrip = NtripSession::start(cfg.ntrip_opt(), arbiter.clone(), arbiter.clone());
        info!(
            "relay started: {}:{}/{} -> {} ({} mode)",
            cfg.ntrip.host, cfg.ntrip.port, cfg.ntrip.mountpoint, cfg.serial.port, cfg.mode
        );
        Ok(Relay {
            arbiter,
            serial,
            ntrip: Some(ntrip),
        })
    }

    pub fn status(&self) -> RelayStatus {
        let mut status = self.arbiter.snapshot();
        status.serial_sent = self.serial.bytes_sent();
        status.serial_received = self.serial.bytes_received();
        status
    }

    pub fn session_state(&self) -> SessionState {
        self.ntrip
            .as_ref()
            .map_or(SessionState::Stopped, |s| s.state())
    }

    /// Stops the caster session, then releases the serial port.
    pub async fn stop(mut self) {
        if let Some(ntrip) = self.ntrip.take() {
            ntrip.stop().await;
        }
        let serial = self.serial.clone();
        // joining the receive thread sleeps; keep it off the runtime workers
        if let Err(e) = tokio::task::spawn_blocking(move || serial.close()).await {
            warn!("serial close task failed: {}", e);
        }
        info!("relay stopped");
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        // the receive callback holds the arbiter, which holds the channel
        self.serial.close();
    }
}
