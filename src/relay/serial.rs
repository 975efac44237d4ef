use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use serialport::SerialPort;
use tracing::{debug, info, warn};
use crate::error::{RelayError, Result};

const RX_CHUNK: usize = 4096;
const RX_ERROR_PAUSE: Duration = Duration::from_millis(200);
const RX_JOIN_TIMEOUT: Duration = Duration::from_secs(1);
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Called on the receive worker with every chunk read from the port.
pub type RxCallback = Box<dyn Fn(&[u8]) + Send>;

/// Outgoing side of the correction relay.
pub trait Uplink: Send + Sync {
    fn send(&self, data: &[u8]) -> Result<()>;
}

struct RxWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Duplex serial link to the radio.
///
/// Writes go through a mutex-guarded handle. An optional worker thread polls the
/// port for bytes from a local base station without ever blocking on a read.
pub struct SerialChannel {
    port: String,
    baud: u32,
    poll_interval: Duration,
    writer: Mutex<Option<Box<dyn SerialPort>>>,
    rx: Mutex<Option<RxWorker>>,
    bytes_sent: AtomicU64,
    bytes_received: Arc<AtomicU64>,
}

impl SerialChannel {
    pub fn new(port: &str, baud: u32) -> Self {
        SerialChannel {
            port: port.to_string(),
            baud,
            poll_interval: Duration::from_millis(20),
            writer: Mutex::new(None),
            rx: Mutex::new(None),
            bytes_sent: AtomicU64::new(0),
            bytes_received: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn is_open(&self) -> bool {
        self.writer.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Opens the port; starts the receive worker when `on_rx` is given. No-op if already open.
    pub fn open(&self, on_rx: Option<RxCallback>) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if writer.is_some() {
            return Ok(());
        }
        let unavailable = |source: serialport::Error| RelayError::PortUnavailable {
            port: self.port.clone(),
            source,
        };
        let port = serialport::new(&self.port, self.baud)
            .timeout(WRITE_TIMEOUT)
            .open()
            .map_err(unavailable)?;

        if let Some(on_rx) = on_rx {
            let reader = port.try_clone().map_err(unavailable)?;
            let stop = Arc::new(AtomicBool::new(false));
            let received = self.bytes_received.clone();
            let poll = self.poll_interval;
            let handle = thread::Builder::new()
                .name("serial-rx".into())
                .spawn({
                    let stop = stop.clone();
                    move || rx_loop(reader, on_rx, stop, received, poll)
                })?;
            *self.rx.lock().unwrap_or_else(|e| e.into_inner()) = Some(RxWorker { stop, handle });
        }

        *writer = Some(port);
        info!("serial port opened: {} @ {}", self.port, self.baud);
        Ok(())
    }

    /// Writes every byte of `data`.
    pub fn send(&self, data: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let port = writer
            .as_mut()
            .ok_or_else(|| RelayError::NotOpen(self.port.clone()))?;
        port.write_all(data).map_err(RelayError::Write)?;
        self.bytes_sent.fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Stops the receive worker and releases the port. Safe to call repeatedly.
    pub fn close(&self) {
        let worker = self.rx.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            worker.stop.store(true, Ordering::Relaxed);
            join_bounded(worker.handle, RX_JOIN_TIMEOUT);
        }
        if self.writer.lock().unwrap_or_else(|e| e.into_inner()).take().is_some() {
            info!("serial port closed: {}", self.port);
        }
    }
}

impl Uplink for SerialChannel {
    fn send(&self, data: &[u8]) -> Result<()> {
        SerialChannel::send(self, data)
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        self.close();
    }
}

fn rx_loop(
    mut port: Box<dyn SerialPort>,
    on_rx: RxCallback,
    stop: Arc<AtomicBool>,
    received: Arc<AtomicU64>,
    poll: Duration,
) {
    let mut buf = vec![0u8; RX_CHUNK];
    while !stop.load(Ordering::Relaxed) {
        let available = match port.bytes_to_read() {
            Ok(n) => n as usize,
            Err(e) => {
                warn!("serial poll error: {}", e);
                thread::sleep(RX_ERROR_PAUSE);
                continue;
            }
        };
        if available == 0 {
            thread::sleep(poll);
            continue;
        }
        match port.read(&mut buf[..available.min(RX_CHUNK)]) {
            Ok(0) => thread::sleep(poll),
            Ok(n) => {
                received.fetch_add(n as u64, Ordering::Relaxed);
                on_rx(&buf[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => {
                warn!("serial read error: {}", e);
                thread::sleep(RX_ERROR_PAUSE);
            }
        }
    }
    debug!("serial receive worker exited");
}

/// Joins `handle` if it finishes within `limit`; otherwise leaves it detached.
fn join_bounded(handle: JoinHandle<()>, limit: Duration) {
    let deadline = Instant::now() + limit;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("serial receive worker did not stop in time");
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    let _ = handle.join();
}
