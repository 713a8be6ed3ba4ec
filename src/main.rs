use std::{
    error::Error,
    io::{self, Write},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver},
        Arc,
    },
};

use clap::Parser;
use linux_embedded_hal::Delay;
use log::{error, info, warn};

use imu_streamer::{
    bus::I2cBus,
    config::Config,
    mpu6050::Mpu6050,
    publish::Published,
    scheduler::Scheduler,
};

#[derive(Parser)]
#[command(version, about = "Publishes MPU6050 acceleration and angular rate")]
struct Args {
    /// toml config, defaults to ~/.config/imu-streamer/config.toml when present
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// i2c adapter number, overrides the config
    #[arg(short, long)]
    bus: Option<i64>,
    /// device address, hex with a 0x prefix (0x68) or decimal (104)
    #[arg(short, long)]
    address: Option<String>,
}

fn load_config(args: &Args) -> Result<Config, Box<dyn Error>> {
    let path = args.config.clone().or_else(|| {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".config/imu-streamer/config.toml"))
            .filter(|path| path.is_file())
    });

    let mut config = match path {
        Some(path) => {
            info!("loading {}", path.display());
            Config::load(path)?
        }
        None => Config::default(),
    };

    config.apply_overrides(args.bus, args.address.as_deref())?;
    Ok(config)
}

// writes each published message as one line; raises `stop` once stdout is gone
fn stream(messages: Receiver<Published>, stop: Arc<AtomicBool>) {
    let stdout = io::stdout();

    for published in messages {
        let mut out = stdout.lock();
        if let Err(err) = writeln!(out, "{} {}", published.topic, published.message) {
            warn!("stopping stream: {}", err);
            break;
        }
    }

    stop.store(true, Ordering::Relaxed);
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;
    info!(
        "imu on /dev/i2c-{} at 0x{:02x}, frame {:?}",
        config.device.bus, config.device.addr, config.frame_id
    );

    let bus = I2cBus::open(config.device.bus)?;
    let mut mpu = Mpu6050::new(bus, config.device.addr);

    // the sensor state is unknown if this fails, never start sampling then
    if let Err(err) = mpu.start(&mut Delay) {
        error!("sensor configuration failed: {}", err);
        return Err(err.into());
    }

    let stop = Arc::new(AtomicBool::new(false));
    let (tx, rx) = channel();
    let streamer = {
        let stop = stop.clone();
        std::thread::Builder::new()
            .name("imu stream".into())
            .spawn(move || stream(rx, stop))?
    };

    let mut scheduler = Scheduler::new(mpu, tx, config.frame_id, config.sample_period)
        .with_temperature(config.temperature_period);
    let result = scheduler.run(&stop);

    drop(scheduler);
    if streamer.join().is_err() {
        error!("stream thread panicked");
    }

    result?;
    Ok(())
}
