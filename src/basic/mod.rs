pub mod gga;
pub mod ntrip;
pub mod pos;
pub mod time;
pub mod var;
