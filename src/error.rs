use std::io;
use thiserror::Error;

/// Errors raised by the relay engine.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The caster answered the handshake with something other than a success line.
    #[error("NTRIP connection rejected: {0}")]
    ConnectionRejected(String),
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("serial port {0} is not open")]
    NotOpen(String),
    #[error("serial port {port} unavailable: {source}")]
    PortUnavailable {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("serial write failed: {0}")]
    Write(#[source] io::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("config file error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
