use std::path::PathBuf;
use std::process;
use std::time::Duration;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use rtk_relay::config::{load_config, save_config, RelayConfig};
use rtk_relay::error::Result;
use rtk_relay::logging::init_logging;
use rtk_relay::relay::{ForwardMode, Relay};

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(
    name = "rtk-relay",
    version,
    about = "Relay NTRIP RTK corrections to a serial radio, with local base station fallback.",
    after_help = "If you have any questions, please reach out to: ghk40041@whu.edu.cn"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the relay until Ctrl-C
    Run {
        /// Config File
        #[clap(short = 'c', long = "config", default_value = "rtk-relay.json")]
        config: PathBuf,

        /// Forward Mode
        #[clap(short = 'm', long = "mode", value_enum)]
        mode: Option<ForwardMode>,

        /// Serial Port to the Radio
        #[clap(short = 'd', long = "serial-port")]
        serial_port: Option<String>,

        /// Serial Baud Rate
        #[clap(short = 'b', long = "baud")]
        baud: Option<u32>,

        /// NTRIP Caster Host
        #[clap(short = 's', long = "host")]
        host: Option<String>,

        /// NTRIP Caster Port
        #[clap(short = 'p', long = "port")]
        port: Option<u16>,

        /// Mountpoint
        #[clap(short = 't', long = "mountpoint")]
        mountpoint: Option<String>,

        /// Username
        #[clap(short = 'u', long = "username")]
        username: Option<String>,

        /// Password
        #[clap(short = 'w', long = "password")]
        password: Option<String>,

        /// Latitude for GGA (deg)
        #[clap(long = "lat", allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Longitude for GGA (deg)
        #[clap(long = "lon", allow_negative_numbers = true)]
        lon: Option<f64>,

        /// Ellipsoidal Height for GGA (m)
        #[clap(long = "alt", allow_negative_numbers = true)]
        alt: Option<f64>,

        /// Also Write Logs to This Directory
        #[clap(short = 'l', long = "log-dir")]
        log_dir: Option<PathBuf>,

        /// Persist the Merged Config
        #[clap(long = "save")]
        save: bool,
    },
    /// Write a default config file
    Init {
        /// Config File
        #[clap(short = 'c', long = "config", default_value = "rtk-relay.json")]
        config: PathBuf,
    },
}

struct Overrides {
    mode: Option<ForwardMode>,
    serial_port: Option<String>,
    baud: Option<u32>,
    host: Option<String>,
    port: Option<u16>,
    mountpoint: Option<String>,
    username: Option<String>,
    password: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    alt: Option<f64>,
}

impl Overrides {
    fn apply(self, cfg: &mut RelayConfig) {
        if let Some(v) = self.mode {
            cfg.mode = v;
        }
        if let Some(v) = self.serial_port {
            cfg.serial.port = v;
        }
        if let Some(v) = self.baud {
            cfg.serial.baudrate = v;
        }
        if let Some(v) = self.host {
            cfg.ntrip.host = v;
        }
        if let Some(v) = self.port {
            cfg.ntrip.port = v;
        }
        if let Some(v) = self.mountpoint {
            cfg.ntrip.mountpoint = v;
        }
        if let Some(v) = self.username {
            cfg.ntrip.username = v;
        }
        if let Some(v) = self.password {
            cfg.ntrip.password = v;
        }
        if let Some(v) = self.lat {
            cfg.position.lat = v;
        }
        if let Some(v) = self.lon {
            cfg.position.lon = v;
        }
        if let Some(v) = self.alt {
            cfg.position.alt = v;
        }
    }
}

async fn run(cfg: RelayConfig) -> Result<()> {
    let relay = Relay::start(&cfg)?;
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                info!("[{:?}] {}", relay.session_state(), relay.status());
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!("failed to listen for Ctrl-C: {}", e);
                }
                info!("stopping");
                break;
            }
        }
    }
    relay.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    match args.command {
        Commands::Run {
            config,
            mode,
            serial_port,
            baud,
            host,
            port,
            mountpoint,
            username,
            password,
            lat,
            lon,
            alt,
            log_dir,
            save,
        } => {
            let _guard = match init_logging(log_dir.as_deref()) {
                Ok(g) => g,
                Err(e) => {
                    eprintln!("failed to initialise logging: {}", e);
                    process::exit(1);
                }
            };
            let mut cfg = match load_config(&config) {
                Ok(c) => c,
                Err(e) => {
                    error!("{}", e);
                    process::exit(1);
                }
            };
            let overrides = Overrides {
                mode,
                serial_port,
                baud,
                host,
                port,
                mountpoint,
                username,
                password,
                lat,
                lon,
                alt,
            };
            overrides.apply(&mut cfg);
            if save {
                if let Err(e) = save_config(&cfg, &config) {
                    error!("{}", e);
                    process::exit(1);
                }
            }
            if let Err(e) = run(cfg).await {
                error!("{}", e);
                process::exit(1);
            }
        }
        Commands::Init { config } => {
            let _guard = init_logging(None).ok();
            if let Err(e) = save_config(&RelayConfig::default(), &config) {
                error!("{}", e);
                process::exit(1);
            }
        }
    }
}
