//! RTCM3 stream handling: frame synchronization and the station coordinate message.

pub mod frame;
pub mod msg1005;

pub use frame::{CorrectionFrame, RtcmFramer};
pub use msg1005::StationFix;
