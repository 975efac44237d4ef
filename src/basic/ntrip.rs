use std::io;
use std::sync::Arc;
use std::time::Instant;
use base64::{engine::general_purpose, Engine as _};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};
use crate::basic::gga::build_gga;
use crate::basic::var::{GeoPos, NTRIP_DEFAULT_PORT};
use crate::error::{RelayError, Result};

const RESP_MAX: usize = 4096;
const READ_BUF: usize = 4096;
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const OK_MARKERS: [&[u8]; 3] = [b"ICY 200 OK", b"HTTP/1.0 200", b"HTTP/1.1 200"];

/// Source of the position reported to the caster in the GGA keep-alive.
pub trait PositionProvider: Send + Sync {
    fn position(&self) -> Result<GeoPos>;
}

impl PositionProvider for GeoPos {
    fn position(&self) -> Result<GeoPos> {
        Ok(*self)
    }
}

/// Receiver of raw correction bytes, called on the session worker.
pub trait CorrectionSink: Send + Sync {
    fn on_correction(&self, data: &[u8]);
}

impl<F> CorrectionSink for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn on_correction(&self, data: &[u8]) {
        self(data)
    }
}

/// Caster endpoint and session timing.
#[derive(Debug, Clone)]
pub struct NtripOpt {
    pub host: String,
    pub port: u16,
    pub mountpoint: String,
    pub username: String,
    pub password: String,
    pub gga_interval: Duration,
    /// Bounds how long a stop request waits on a silent socket.
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
    pub backoff_init: Duration,
    pub backoff_max: Duration,
    pub backoff_factor: f64,
}

impl Default for NtripOpt {
    fn default() -> Self {
        NtripOpt {
            host: String::new(),
            port: NTRIP_DEFAULT_PORT,
            mountpoint: String::new(),
            username: String::new(),
            password: String::new(),
            gga_interval: Duration::from_secs(15),
            read_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            backoff_init: Duration::from_secs(2),
            backoff_max: Duration::from_secs(60),
            backoff_factor: 1.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Backoff,
    Stopped,
}

/// Reconnect delay growing geometrically up to a cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    init: Duration,
    max: Duration,
    factor: f64,
    cur: Duration,
}

impl Backoff {
    pub fn new(init: Duration, max: Duration, factor: f64) -> Self {
        Backoff { init, max, factor, cur: init }
    }

    /// Delay to wait now; the following call returns a longer one.
    pub fn next(&mut self) -> Duration {
        let delay = self.cur;
        self.cur = self.cur.mul_f64(self.factor).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.cur = self.init;
    }
}

/// Builds the NTRIP GET request for the configured mountpoint.
pub fn build_request(opt: &NtripOpt) -> String {
    let auth = general_purpose::STANDARD.encode(format!("{}:{}", opt.username, opt.password));
    format!(
        "GET /{} HTTP/1.0\r\n\
         Host: {}\r\n\
         User-Agent: NTRIP rtk-relay/{}\r\n\
         Authorization: Basic {}\r\n\
         Ntrip-Version: Ntrip/2.0\r\n\
         Connection: close\r\n\
         \r\n",
        opt.mountpoint.trim_start_matches('/'),
        opt.host,
        env!("CARGO_PKG_VERSION"),
        auth
    )
}

/// Checks the first response read and returns the correction bytes that followed the header.
pub fn check_response(resp: &[u8]) -> Result<&[u8]> {
    let accepted = OK_MARKERS
        .iter()
        .any(|m| resp.windows(m.len()).any(|w| w == *m));
    if !accepted {
        let head = &resp[..resp.len().min(100)];
        return Err(RelayError::ConnectionRejected(
            String::from_utf8_lossy(head).trim().to_string(),
        ));
    }
    match resp.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(end) => Ok(&resp[end + 4..]),
        None => Ok(&[]),
    }
}

/// Connects to the caster and performs the handshake.
///
/// Returns the stream along with any correction bytes received with the response header.
pub async fn conntrip(opt: &NtripOpt) -> Result<(TcpStream, Vec<u8>)> {
    let server = format!("{}:{}", opt.host, opt.port);
    info!("connecting to NTRIP caster {}/{}", server, opt.mountpoint);

    let mut stream = timeout(opt.connect_timeout, TcpStream::connect(&server))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
    stream.write_all(build_request(opt).as_bytes()).await?;

    let mut resp = vec![0; RESP_MAX];
    let n = timeout(opt.connect_timeout, stream.read(&mut resp))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no handshake response"))??;
    let leftover = check_response(&resp[..n])?.to_vec();
    info!("NTRIP connected to {}", server);

    Ok((stream, leftover))
}

/// A running caster connection on its own tokio task.
pub struct NtripSession {
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<SessionState>,
    handle: Option<JoinHandle<()>>,
}

impl NtripSession {
    /// Spawns the session worker; must be called inside a tokio runtime.
    pub fn start(
        opt: NtripOpt,
        provider: Arc<dyn PositionProvider>,
        sink: Arc<dyn CorrectionSink>,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let handle = tokio::spawn(run(opt, provider, sink, stop_rx, state_tx));
        info!("NTRIP session started");
        NtripSession {
            stop_tx,
            state_rx,
            handle: Some(handle),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Signals the worker and waits for it, aborting it if it does not finish in time.
    pub async fn stop(mut self) {
        self.stop_tx.send_replace(true);
        if let Some(handle) = self.handle.take() {
            let abort = handle.abort_handle();
            if timeout(JOIN_TIMEOUT, handle).await.is_err() {
                warn!("NTRIP worker did not stop in time, aborting");
                abort.abort();
            }
        }
        info!("NTRIP session stopped");
    }
}

impl Drop for NtripSession {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}

async fn wait_stop(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

async fn run(
    opt: NtripOpt,
    provider: Arc<dyn PositionProvider>,
    sink: Arc<dyn CorrectionSink>,
    mut stop: watch::Receiver<bool>,
    state: watch::Sender<SessionState>,
) {
    let mut backoff = Backoff::new(opt.backoff_init, opt.backoff_max, opt.backoff_factor);

    while !*stop.borrow() {
        state.send_replace(SessionState::Connecting);
        let mut streamed = false;
        match stream_once(&opt, &*provider, &*sink, &mut stop, &state, &mut streamed).await {
            Ok(()) => break,
            Err(e) => {
                if streamed {
                    backoff.reset();
                }
                let delay = backoff.next();
                warn!("NTRIP error: {}, reconnecting in {:.1}s", e, delay.as_secs_f64());
                state.send_replace(SessionState::Backoff);
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = wait_stop(&mut stop) => break,
                }
            }
        }
    }

    state.send_replace(SessionState::Stopped);
    info!("NTRIP worker exited");
}

/// One connect + stream cycle. `Ok` only when stopped; the socket is dropped on return.
async fn stream_once(
    opt: &NtripOpt,
    provider: &dyn PositionProvider,
    sink: &dyn CorrectionSink,
    stop: &mut watch::Receiver<bool>,
    state: &watch::Sender<SessionState>,
    streamed: &mut bool,
) -> Result<()> {
    let (mut stream, leftover) = tokio::select! {
        r = conntrip(opt) => r?,
        _ = wait_stop(stop) => return Ok(()),
    };
    *streamed = true;
    state.send_replace(SessionState::Streaming);
    if !leftover.is_empty() {
        sink.on_correction(&leftover);
    }

    let mut last_gga: Option<Instant> = None;
    let mut buf = vec![0u8; READ_BUF];
    loop {
        if *stop.borrow() {
            return Ok(());
        }
        if last_gga.map_or(true, |t| t.elapsed() >= opt.gga_interval) {
            match provider.position().and_then(|pos| build_gga(&pos)) {
                Ok(gga) => {
                    stream.write_all(&gga).await?;
                    last_gga = Some(Instant::now());
                    debug!("GGA sent: {}", String::from_utf8_lossy(&gga).trim_end());
                }
                Err(e) => warn!("GGA keep-alive skipped: {}", e),
            }
        }

        let n = tokio::select! {
            r = timeout(opt.read_timeout, stream.read(&mut buf)) => match r {
                Ok(r) => r?,
                Err(_) => continue,
            },
            _ = wait_stop(stop) => return Ok(()),
        };
        if n == 0 {
            return Err(RelayError::Transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "caster closed the stream",
            )));
        }
        sink.on_correction(&buf[..n]);
    }
}
