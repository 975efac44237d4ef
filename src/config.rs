use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::info;
use crate::basic::ntrip::NtripOpt;
use crate::basic::var::{GeoPos, NTRIP_DEFAULT_PORT, SERIAL_DEFAULT_BAUD};
use crate::error::{RelayError, Result};
use crate::relay::arbiter::ArbiterOpt;
use crate::relay::relay_var::ForwardMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseStationConfig {
    pub timeout_seconds: f64,
    pub use_1005_position: bool,
}

impl Default for BaseStationConfig {
    fn default() -> Self {
        BaseStationConfig {
            timeout_seconds: 10.0,
            use_1005_position: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NtripConfig {
    pub host: String,
    pub port: u16,
    pub mountpoint: String,
    pub username: String,
    pub password: String,
}

impl Default for NtripConfig {
    fn default() -> Self {
        NtripConfig {
            host: String::new(),
            port: NTRIP_DEFAULT_PORT,
            mountpoint: String::new(),
            username: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baudrate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: String::new(),
            baudrate: SERIAL_DEFAULT_BAUD,
        }
    }
}

/// Persisted relay settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub mode: ForwardMode,
    pub base_station: BaseStationConfig,
    pub ntrip: NtripConfig,
    /// Static position reported to the caster.
    pub position: GeoPos,
    pub serial: SerialConfig,
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.trim().is_empty() {
            return Err(RelayError::Config("serial port is not set".into()));
        }
        if self.serial.baudrate == 0 {
            return Err(RelayError::Config("baud rate must be positive".into()));
        }
        if self.ntrip.host.trim().is_empty() {
            return Err(RelayError::Config("NTRIP host is not set".into()));
        }
        self.base_timeout()?;
        let pos = &self.position;
        if !(-90.0..=90.0).contains(&pos.lat) || !(-180.0..=180.0).contains(&pos.lon) {
            return Err(RelayError::Config(format!("position out of range: {}", pos)));
        }
        Ok(())
    }

    fn base_timeout(&self) -> Result<Duration> {
        let secs = self.base_station.timeout_seconds;
        match Duration::try_from_secs_f64(secs) {
            Ok(d) if !d.is_zero() => Ok(d),
            _ => Err(RelayError::Config(format!(
                "base station timeout must be a positive number of seconds, got {}",
                secs
            ))),
        }
    }

    pub fn ntrip_opt(&self) -> NtripOpt {
        NtripOpt {
            host: self.ntrip.host.trim().to_string(),
            port: self.ntrip.port,
            mountpoint: self.ntrip.mountpoint.trim().to_string(),
            username: self.ntrip.username.clone(),
            password: self.ntrip.password.clone(),
            ..NtripOpt::default()
        }
    }

    pub fn arbiter_opt(&self) -> ArbiterOpt {
        ArbiterOpt {
            mode: self.mode,
            timeout: self
                .base_timeout()
                .unwrap_or_else(|_| ArbiterOpt::default().timeout),
            use_station_pos: self.base_station.use_1005_position,
            static_pos: self.position,
        }
    }
}

/// Reads the config at `path`, or the defaults if the file does not exist.
pub fn load_config(path: &Path) -> Result<RelayConfig> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("config {} not found, using defaults", path.display());
            Ok(RelayConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn save_config(cfg: &RelayConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, serde_json::to_string_pretty(cfg)?)?;
    info!("config saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn valid() -> RelayConfig {
        let mut cfg = RelayConfig::default();
        cfg.serial.port = "/dev/ttyUSB0".into();
        cfg.ntrip.host = "caster.example.com".into();
        cfg.ntrip.mountpoint = "RTCM3".into();
        cfg
    }

    #[test]
    fn test_missing_file_defaults() {
        let dir = tempdir().unwrap();
        let cfg = load_config(&dir.path().join("absent.json")).unwrap();
        assert_eq!(cfg, RelayConfig::default());
        assert_eq!(cfg.mode, ForwardMode::Normal);
        assert_eq!(cfg.ntrip.port, 2101);
        assert_eq!(cfg.serial.baudrate, 57600);
        assert_eq!(cfg.base_station.timeout_seconds, 10.0);
        assert!(cfg.base_station.use_1005_position);
    }

    #[test]
    fn test_partial_file_merges() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(
            &path,
            r#"{"mode": "backup", "ntrip": {"host": "h"}, "position": {"lat": 31.5}}"#,
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.mode, ForwardMode::Backup);
        assert_eq!(cfg.ntrip.host, "h");
        assert_eq!(cfg.ntrip.port, 2101);
        assert_eq!(cfg.position, GeoPos::new(31.5, 0.0, 0.0));
        assert_eq!(cfg.serial, SerialConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cfg.json");
        let mut cfg = valid();
        cfg.mode = ForwardMode::Backup;
        cfg.base_station.timeout_seconds = 4.5;
        save_config(&cfg, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"mode\": \"backup\""));
        assert_eq!(load_config(&path).unwrap(), cfg);
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config(&path), Err(RelayError::Json(_))));
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());
        assert!(RelayConfig::default().validate().is_err());

        let mut cfg = valid();
        cfg.serial.baudrate = 0;
        assert!(matches!(cfg.validate(), Err(RelayError::Config(_))));

        let mut cfg = valid();
        cfg.ntrip.host = "  ".into();
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.base_station.timeout_seconds = 0.0;
        assert!(cfg.validate().is_err());

        for bad in [-1.0, f64::NAN, f64::INFINITY, 1e20] {
            let mut cfg = valid();
            cfg.base_station.timeout_seconds = bad;
            assert!(matches!(cfg.validate(), Err(RelayError::Config(_))), "{}", bad);
            assert_eq!(cfg.arbiter_opt().timeout, Duration::from_secs(10));
        }

        let mut cfg = valid();
        cfg.position.lat = 91.0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.position.lon = -180.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_derived_options() {
        let mut cfg = valid();
        cfg.mode = ForwardMode::Backup;
        cfg.base_station.timeout_seconds = 2.5;
        cfg.base_station.use_1005_position = false;
        cfg.position = GeoPos::new(30.0, 114.0, 20.0);

        let ntrip = cfg.ntrip_opt();
        assert_eq!(ntrip.host, "caster.example.com");
        assert_eq!(ntrip.mountpoint, "RTCM3");
        assert_eq!(ntrip.gga_interval, Duration::from_secs(15));

        let arb = cfg.arbiter_opt();
        assert_eq!(arb.mode, ForwardMode::Backup);
        assert_eq!(arb.timeout, Duration::from_millis(2500));
        assert!(!arb.use_station_pos);
        assert_eq!(arb.static_pos, cfg.position);
    }
}
