pub mod app;
pub mod arbiter;
pub mod relay_var;
pub mod serial;

pub use app::Relay;
pub use arbiter::{ArbiterOpt, Arbitrator};
pub use relay_var::{BaseStatus, ForwardMode, RelayStatus, Verdict};
pub use serial::{SerialChannel, Uplink};
