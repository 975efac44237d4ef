pub mod basic;
pub mod config;
pub mod error;
pub mod logging;
pub mod relay;
pub mod rtcm;

pub use config::{load_config, save_config, RelayConfig};
pub use error::{RelayError, Result};
pub use relay::{ForwardMode, Relay, RelayStatus};
