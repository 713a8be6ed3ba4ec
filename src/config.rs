use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::registers::{DEFAULT_ADDRESS, VALID_ADDRESSES};

const DEFAULT_BUS: u8 = 1;
const DEFAULT_FRAME_ID: &str = "imu";
const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("device address {0:?} is not a hex number")]
    InvalidAddress(String),
    #[error("device address 0x{0:x} is outside 0x08..=0x77")]
    AddressOutOfRange(i64),
    #[error("bus index {0} is not a valid i2c adapter number")]
    InvalidBus(i64),
    #[error("{0} must be greater than zero")]
    ZeroPeriod(&'static str),
    #[error("frame id must not be empty")]
    EmptyFrameId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Device {
    pub bus: u8,
    pub addr: u8,
}

impl Default for Device {
    fn default() -> Self {
        Self {
            bus: DEFAULT_BUS,
            addr: DEFAULT_ADDRESS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub device: Device,
    pub frame_id: String,
    pub sample_period: Duration,
    // none keeps the temperature topic off
    pub temperature_period: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: Device::default(),
            frame_id: DEFAULT_FRAME_ID.to_owned(),
            sample_period: DEFAULT_SAMPLE_PERIOD,
            temperature_period: None,
        }
    }
}

// file form: 0x68, 104 or "0x68" (strings are hex)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AddressValue {
    Number(i64),
    Text(String),
}

impl AddressValue {
    pub fn from_arg(arg: &str) -> Self {
        match arg.trim().parse::<i64>() {
            Ok(value) => AddressValue::Number(value),
            Err(_) => AddressValue::Text(arg.to_owned()),
        }
    }

    pub fn resolve(&self) -> Result<u8, ConfigError> {
        let value = match self {
            AddressValue::Number(value) => *value,
            AddressValue::Text(text) => {
                let trimmed = text.trim();
                let digits = trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"))
                    .unwrap_or(trimmed);
                i64::from_str_radix(digits, 16)
                    .map_err(|_| ConfigError::InvalidAddress(text.clone()))?
            }
        };

        u8::try_from(value)
            .ok()
            .filter(|addr| VALID_ADDRESSES.contains(addr))
            .ok_or(ConfigError::AddressOutOfRange(value))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    bus: Option<i64>,
    device_address: Option<AddressValue>,
    frame_id: Option<String>,
    sample_period_ms: Option<u64>,
    temperature_period_ms: Option<u64>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        let mut config = Config::default();

        if let Some(bus) = file.bus {
            config.set_bus(bus)?;
        }
        if let Some(addr) = file.device_address {
            config.device.addr = addr.resolve()?;
        }
        if let Some(frame_id) = file.frame_id {
            if frame_id.is_empty() {
                return Err(ConfigError::EmptyFrameId);
            }
            config.frame_id = frame_id;
        }
        if let Some(ms) = file.sample_period_ms {
            config.sample_period = period("sample_period_ms", ms)?;
        }
        if let Some(ms) = file.temperature_period_ms {
            config.temperature_period = Some(period("temperature_period_ms", ms)?);
        }

        Ok(config)
    }

    // cli address is hex only with a 0x prefix, so 104 and 0x68 are the same device
    pub fn apply_overrides(
        &mut self,
        bus: Option<i64>,
        address: Option<&str>,
    ) -> Result<(), ConfigError> {
        if let Some(bus) = bus {
            self.set_bus(bus)?;
        }
        if let Some(address) = address {
            self.device.addr = AddressValue::from_arg(address).resolve()?;
        }
        Ok(())
    }

    pub fn set_bus(&mut self, bus: i64) -> Result<(), ConfigError> {
        self.device.bus = u8::try_from(bus).map_err(|_| ConfigError::InvalidBus(bus))?;
        Ok(())
    }
}

fn period(key: &'static str, ms: u64) -> Result<Duration, ConfigError> {
    if ms == 0 {
        return Err(ConfigError::ZeroPeriod(key));
    }
    Ok(Duration::from_millis(ms))
}
